// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Line-oriented serial link to the agent.

use anyhow::{bail, Context, Result};
use serialport::{ClearBuffer, SerialPort, SerialPortType};
use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};

/// Default timeout for serial operations in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Erasing the whole application region takes far longer than one record.
pub const ERASE_TIMEOUT_MS: u64 = 10_000;

/// USB identity of the agent's CDC interface.
pub const AGENT_VID: u16 = 0x2E8A;
pub const AGENT_PID: u16 = 0x000A;
pub const AGENT_PRODUCT: &str = "hexboot agent";

/// Replies slower than this are reported.
const SLOW_REPLY: Duration = Duration::from_millis(500);

/// Time for a freshly enumerated CDC port to settle before the first write.
const OPEN_SETTLE: Duration = Duration::from_millis(500);

/// Longest reply line accepted before giving up on a terminator.
const MAX_REPLY_LEN: usize = 256;

/// Where to find the agent: a fixed port name or auto-detection.
#[derive(Clone, Debug)]
pub struct PortSelector {
    pub port: Option<String>,
    pub timeout_ms: u64,
}

impl PortSelector {
    /// Resolve the port name. Auto-detection runs on every call, since the
    /// agent re-enumerates after each reset.
    pub fn resolve(&self) -> Result<String> {
        match &self.port {
            Some(port) => Ok(port.clone()),
            None => find_agent_port()?.context("No hexboot agent found. Is the device connected?"),
        }
    }

    pub fn open(&self) -> Result<Link> {
        Link::open(&self.resolve()?, self.timeout_ms)
    }
}

/// Look for the agent among the USB serial ports.
pub fn find_agent_port() -> Result<Option<String>> {
    let ports = serialport::available_ports().context("Failed to enumerate serial ports")?;
    let found = ports.into_iter().find(|port| match &port.port_type {
        SerialPortType::UsbPort(usb) => {
            (usb.vid == AGENT_VID && usb.pid == AGENT_PID)
                || usb.product.as_deref() == Some(AGENT_PRODUCT)
        }
        _ => false,
    });
    if let Some(port) = &found {
        tracing::info!("Found agent at {}", port.port_name);
    }
    Ok(found.map(|port| port.port_name))
}

/// One line-per-command conversation with the agent.
pub struct Link {
    port: Box<dyn SerialPort>,
    rx_buf: Vec<u8>,
}

impl Link {
    pub fn open(port_name: &str, timeout_ms: u64) -> Result<Self> {
        let port = serialport::new(port_name, 115200)
            .timeout(Duration::from_millis(timeout_ms))
            .open()
            .with_context(|| format!("Failed to open serial port {}", port_name))?;

        thread::sleep(OPEN_SETTLE);
        port.clear(ClearBuffer::Input)
            .context("Failed to clear serial input buffer")?;

        Ok(Self {
            port,
            rx_buf: Vec::with_capacity(MAX_REPLY_LEN),
        })
    }

    pub fn port_name(&self) -> String {
        self.port.name().unwrap_or_else(|| "?".to_string())
    }

    /// Send one command line; the terminator is appended here.
    pub fn send_line(&mut self, line: &str) -> Result<()> {
        self.port
            .write_all(line.as_bytes())
            .and_then(|_| self.port.write_all(b"\r\n"))
            .and_then(|_| self.port.flush())
            .context("Failed to write to serial port")
    }

    /// Read one reply line, terminator stripped.
    pub fn read_line(&mut self) -> Result<String> {
        self.rx_buf.clear();
        let mut byte = [0u8; 1];

        loop {
            match self.port.read(&mut byte) {
                Ok(1) => match byte[0] {
                    b'\n' => break,
                    b'\r' => {}
                    b => {
                        if self.rx_buf.len() >= MAX_REPLY_LEN {
                            bail!("Reply longer than {} bytes", MAX_REPLY_LEN);
                        }
                        self.rx_buf.push(b);
                    }
                },
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    bail!("Timeout waiting for reply");
                }
                Err(e) => bail!("Serial read error: {}", e),
            }
        }

        Ok(String::from_utf8_lossy(&self.rx_buf).into_owned())
    }

    /// Send a command line and wait for its reply line.
    pub fn command(&mut self, line: &str) -> Result<String> {
        self.send_line(line)?;
        let start = Instant::now();
        let reply = self.read_line()?;
        let elapsed = start.elapsed();
        if elapsed > SLOW_REPLY {
            tracing::warn!("Slow reply to {:?}: {:.2}s", truncate(line), elapsed.as_secs_f32());
        }
        tracing::debug!("{} -> {}", truncate(line), reply);
        Ok(reply)
    }

    /// Send a command and wait for the reply with a custom timeout.
    pub fn command_with_timeout(&mut self, line: &str, timeout_ms: u64) -> Result<String> {
        let old_timeout = self.port.timeout();
        self.port
            .set_timeout(Duration::from_millis(timeout_ms))
            .context("Failed to set timeout")?;

        let result = self.command(line);

        let _ = self.port.set_timeout(old_timeout);
        result
    }
}

fn truncate(line: &str) -> &str {
    line.get(..30).unwrap_or(line)
}
