// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations for agent operations.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use hexboot_common::hex::RecordType;
use hexboot_common::protocol::MSG_UNKNOWN;
use hexboot_common::{Command, DiagnosticsSnapshot, Reply, Status, UploadStats};

use crate::hexfile::{self, HexImage};
use crate::transport::{Link, PortSelector, AGENT_PID, AGENT_VID, ERASE_TIMEOUT_MS};

/// Record failures tolerated before an upload is abandoned.
pub const DEFAULT_MAX_ERRORS: usize = 5;

/// Pause before `J` so the agent finishes the `C` bookkeeping.
const JUMP_DELAY: Duration = Duration::from_millis(200);

/// What to do once the image is in flash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AfterUpload {
    Jump,
    Reset,
    Stay,
}

#[derive(Clone, Copy, Debug)]
pub struct UploadOptions {
    pub verify: bool,
    pub after: AfterUpload,
    pub max_errors: usize,
}

fn cmd(command: Command) -> String {
    char::from(command.as_byte()).to_string()
}

/// Query the version line. Returns `None` if the agent answered with anything
/// else.
fn query_version(link: &mut Link) -> Result<Option<String>> {
    let line = link.command(&cmd(Command::ReadVersion))?;
    let reply = Reply::parse(&line);
    Ok(match reply.status {
        None if reply.message.starts_with("BL") => Some(reply.message.to_string()),
        _ => None,
    })
}

/// Print the version line and the decoded diagnostics.
pub fn version(selector: &PortSelector) -> Result<()> {
    let mut link = selector.open()?;
    let Some(line) = query_version(&mut link)? else {
        bail!("Failed to read version");
    };
    println!("{}", line);
    if let Some(snapshot) = DiagnosticsSnapshot::parse(&line) {
        print_snapshot(&snapshot);
    }
    Ok(())
}

fn print_snapshot(snapshot: &DiagnosticsSnapshot) {
    println!("  Agent jumps:        {}", snapshot.stub_to_app);
    println!("  Returns from app:   {}", snapshot.jump_returns);
    println!("  Entered via reset:  {}", snapshot.saw_reset);
    println!("  Agent reset cause:  0x{:04X}", snapshot.boot_reset_cause);
    println!("  App reset cause:    0x{:04X}", snapshot.app_reset_cause);
    println!("  App trap code:      {}", snapshot.app_trap_code);
    println!("  App stage:          {}", snapshot.app_stage);
}

/// Ask the agent to start the application.
pub fn jump(selector: &PortSelector) -> Result<()> {
    let mut link = selector.open()?;
    send_jump(&mut link)
}

fn send_jump(link: &mut Link) -> Result<()> {
    println!("Jumping to application...");
    let line = link.command(&cmd(Command::JumpToApp))?;
    let reply = Reply::parse(&line);
    if !reply.is_ok() {
        bail!("Jump refused: {}", describe_reply(&reply));
    }
    println!("  Agent: {}", reply.message);
    Ok(())
}

/// Reset the device. The agent acknowledges but the reply may be lost in the
/// reset, so it is not waited for.
pub fn reset(selector: &PortSelector) -> Result<()> {
    let mut link = selector.open()?;
    send_reset(&mut link)
}

fn send_reset(link: &mut Link) -> Result<()> {
    println!("Resetting device...");
    link.send_line(&cmd(Command::Reset))
}

/// List serial ports, marking the ones that look like the agent.
pub fn ports() -> Result<()> {
    let ports = serialport::available_ports().context("Failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in ports {
        match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => {
                let marker = if usb.vid == AGENT_VID && usb.pid == AGENT_PID {
                    " <- agent"
                } else {
                    ""
                };
                println!(
                    "  {}: {} (VID:{:04X} PID:{:04X}){}",
                    port.port_name,
                    usb.product.as_deref().unwrap_or("?"),
                    usb.vid,
                    usb.pid,
                    marker
                );
            }
            _ => println!("  {}", port.port_name),
        }
    }
    Ok(())
}

/// Upload an image: erase, stream every record, verify, then start it.
pub fn upload(selector: &PortSelector, file: &Path, options: UploadOptions) -> Result<()> {
    let image = hexfile::load(file)?;
    print_image_summary(file, &image);

    let mut link = selector.open()?;
    upload_image(&mut link, &image, options)?;

    println!();
    println!("Firmware uploaded successfully!");
    if options.after == AfterUpload::Stay {
        println!(
            "Use 'hexboot-upload --port {} jump' to start the application.",
            link.port_name()
        );
    }
    Ok(())
}

fn print_image_summary(file: &Path, image: &HexImage) {
    println!(
        "Image: {} ({} records, {} data bytes, CRC32: 0x{:08x})",
        file.display(),
        image.records.len(),
        image.data_bytes,
        image.crc32
    );
    if let Some((lo, hi)) = image.address_range {
        println!("Range: 0x{:08X}..=0x{:08X}", lo, hi);
    }
    println!();
}

fn upload_image(link: &mut Link, image: &HexImage, options: UploadOptions) -> Result<()> {
    match query_version(link)? {
        Some(line) => println!("Agent: {}", line),
        None => tracing::warn!("Could not read agent version"),
    }

    print!("Erasing application area... ");
    std::io::stdout().flush()?;
    let line = link.command_with_timeout(&cmd(Command::EraseFlash), ERASE_TIMEOUT_MS)?;
    let reply = Reply::parse(&line);
    if !reply.is_ok() {
        println!("FAILED");
        bail!("Erase failed: {}", describe_reply(&reply));
    }
    println!("OK");

    stream_records(link, image, options.max_errors)?;

    if options.verify {
        print!("Verifying... ");
        std::io::stdout().flush()?;
        let line = link.command(&cmd(Command::Verify))?;
        let reply = Reply::parse(&line);
        if !reply.is_ok() {
            println!("FAILED");
            bail!("Verify failed: {}", describe_reply(&reply));
        }
        match UploadStats::parse(reply.message) {
            Some(stats) => println!(
                "OK - {} bytes, {} pages",
                stats.bytes_written, stats.pages_erased
            ),
            None => println!("OK - {}", reply.message),
        }
    }

    match options.after {
        AfterUpload::Jump => {
            thread::sleep(JUMP_DELAY);
            send_jump(link)
        }
        AfterUpload::Reset => send_reset(link),
        AfterUpload::Stay => Ok(()),
    }
}

fn stream_records(link: &mut Link, image: &HexImage, max_errors: usize) -> Result<()> {
    let pb = ProgressBar::new(image.records.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} records {msg}",
            )?
            .progress_chars("#>-"),
    );

    let mut errors = 0;
    let mut bytes_sent = 0;
    for (index, record) in image.records.iter().enumerate() {
        if let Some((RecordType::Data, len)) = hexfile::describe(record) {
            bytes_sent += len;
        }

        let line = match link.command(record) {
            Ok(line) => line,
            Err(e) => {
                pb.abandon();
                return Err(e.context(format!("No reply to record {}", index)));
            }
        };
        let reply = Reply::parse(&line);
        if !reply.is_ok() {
            errors += 1;
            pb.println(format!(
                "  ERROR on record {}: {}... ({})",
                index,
                record.get(..30).unwrap_or(record),
                describe_reply(&reply)
            ));
            if errors > max_errors {
                pb.abandon();
                bail!("Too many errors ({}), aborting", errors);
            }
        }

        pb.set_message(format!("({} bytes)", bytes_sent));
        pb.inc(1);
    }

    pb.finish();
    if errors > 0 {
        tracing::warn!("{} records were rejected", errors);
    }
    Ok(())
}

fn describe_reply(reply: &Reply<'_>) -> String {
    match reply.status {
        Some(Status::Unknown) => MSG_UNKNOWN.to_string(),
        Some(_) => reply.message.to_string(),
        None => format!("unexpected reply {:?}", reply.message),
    }
}

// =============================================================================
// Soak loop
// =============================================================================

/// When the soak loop re-uploads the image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum UploadMode {
    Once,
    Each,
}

#[derive(Clone, Debug)]
pub struct SoakOptions {
    pub iterations: u32,
    pub image: Option<PathBuf>,
    pub upload_mode: UploadMode,
    pub verify: bool,
    pub max_errors: usize,
    pub after_jump_delay: Duration,
    pub between_iter_delay: Duration,
    pub csv_log: Option<PathBuf>,
}

const CSV_HEADER: &str =
    "ts,iter,pre_version,post_version,pre_sj,post_sj,pre_jr,post_jr,pre_br,post_br,note";

/// One soak iteration as logged.
#[derive(Debug, Default)]
pub struct SoakRow {
    pub ts: String,
    pub iter: u32,
    pub pre_version: Option<String>,
    pub post_version: Option<String>,
    pub note: String,
}

impl SoakRow {
    pub fn to_csv(&self) -> String {
        let pre = self.pre_version.as_deref().and_then(DiagnosticsSnapshot::parse);
        let post = self.post_version.as_deref().and_then(DiagnosticsSnapshot::parse);
        fn field(snapshot: Option<DiagnosticsSnapshot>, get: fn(&DiagnosticsSnapshot) -> String) -> String {
            snapshot.as_ref().map(get).unwrap_or_default()
        }
        [
            csv_field(&self.ts),
            self.iter.to_string(),
            csv_field(self.pre_version.as_deref().unwrap_or("")),
            csv_field(self.post_version.as_deref().unwrap_or("")),
            field(pre, |s| s.stub_to_app.to_string()),
            field(post, |s| s.stub_to_app.to_string()),
            field(pre, |s| s.jump_returns.to_string()),
            field(post, |s| s.jump_returns.to_string()),
            field(pre, |s| format!("{:04X}", s.boot_reset_cause)),
            field(post, |s| format!("{:04X}", s.boot_reset_cause)),
            csv_field(&self.note),
        ]
        .join(",")
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Append-only CSV log; the header is written once per new file.
struct SoakLog {
    file: fs::File,
}

impl SoakLog {
    fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "{}", CSV_HEADER)?;
        }
        Ok(Self { file })
    }

    fn write(&mut self, row: &SoakRow) -> Result<()> {
        writeln!(self.file, "{}", row.to_csv())?;
        Ok(())
    }
}

/// Poll the version until the agent answers or `timeout` passes.
fn version_with_retry(selector: &PortSelector, timeout: Duration) -> Option<String> {
    const POLL: Duration = Duration::from_millis(300);
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        let attempt = selector
            .open()
            .and_then(|mut link| query_version(&mut link));
        match attempt {
            Ok(Some(line)) => return Some(line),
            Ok(None) => {}
            Err(e) => tracing::debug!("Version probe failed: {:#}", e),
        }
        thread::sleep(POLL);
    }
    None
}

/// Repeated version, optional upload, jump, version cycle. Each iteration
/// shows whether control stayed in the application or came back to the agent.
pub fn soak(selector: &PortSelector, options: &SoakOptions) -> Result<()> {
    if options.iterations == 0 {
        bail!("iterations must be > 0");
    }
    let image = options.image.as_deref().map(hexfile::load).transpose()?;
    let mut log = options.csv_log.as_deref().map(SoakLog::open).transpose()?;

    for iter in 1..=options.iterations {
        println!("\n--- Soak iteration {}/{} ---", iter, options.iterations);
        let mut row = SoakRow {
            ts: chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            iter,
            ..SoakRow::default()
        };

        row.pre_version = version_with_retry(selector, Duration::from_secs(3));
        match &row.pre_version {
            Some(line) => println!("Pre:  {}", line),
            None => println!("Pre:  (agent not reachable)"),
        }

        let upload_now = match options.upload_mode {
            UploadMode::Each => true,
            UploadMode::Once => iter == 1,
        };
        let mut did_upload = false;
        match image.as_ref().filter(|_| upload_now) {
            Some(image) => {
                did_upload = true;
                let result = selector.open().and_then(|mut link| {
                    upload_image(
                        &mut link,
                        image,
                        UploadOptions {
                            verify: options.verify,
                            after: AfterUpload::Jump,
                            max_errors: options.max_errors,
                        },
                    )
                });
                if let Err(e) = result {
                    println!("Upload failed: {:#}", e);
                    row.post_version = version_with_retry(selector, Duration::from_secs(3));
                    row.note = "upload_failed".to_string();
                    if let Some(log) = log.as_mut() {
                        log.write(&row)?;
                    }
                    bail!("Soak aborted in iteration {}", iter);
                }
            }
            None => match selector.open() {
                Ok(mut link) => {
                    if let Err(e) = send_jump(&mut link) {
                        println!("Jump: {:#}", e);
                    }
                }
                Err(_) => println!("Jump: (agent not reachable; skipping jump)"),
            },
        }

        thread::sleep(options.after_jump_delay);

        row.post_version = version_with_retry(selector, Duration::from_secs(2));
        row.note = soak_note(row.post_version.is_some(), did_upload);
        match &row.post_version {
            Some(line) => println!("Post: {}", line),
            None => println!("Post: (agent not reachable; application likely running)"),
        }

        if let Some(log) = log.as_mut() {
            log.write(&row)?;
        }
        thread::sleep(options.between_iter_delay);
    }
    Ok(())
}

/// A reachable agent after the jump means control came back.
fn soak_note(agent_reachable: bool, uploaded: bool) -> String {
    let base = if agent_reachable {
        "agent_returned"
    } else {
        "agent_gone"
    };
    if uploaded {
        format!("{};uploaded", base)
    } else {
        base.to_string()
    }
}
