// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! In-memory flash, transport and clock for host-side tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;

use hexboot_common::hex::{record_checksum, RecordType};
use hexboot_common::{FlashDriver, FlashError, Monotonic, Transport, ROW_WORDS};

/// Program memory backed by a map. Unwritten words read as erased.
pub struct MockFlash {
    pub erased_word: u32,
    pub words: HashMap<u32, u32>,
    pub units_per_word: u32,
    pub erased_pages: Vec<u32>,
    pub rows: Vec<(u32, [u32; ROW_WORDS])>,
    pub fail_erase_at: Option<u32>,
    pub fail_write_at: Option<u32>,
}

impl MockFlash {
    pub fn pic24() -> Self {
        Self {
            erased_word: 0x00FF_FFFF,
            words: HashMap::new(),
            units_per_word: 2,
            erased_pages: Vec::new(),
            rows: Vec::new(),
            fail_erase_at: None,
            fail_write_at: None,
        }
    }
}

impl FlashDriver for MockFlash {
    fn erase_page(&mut self, address: u32) -> Result<(), FlashError> {
        if self.fail_erase_at == Some(address) {
            return Err(FlashError::Erase { address });
        }
        self.erased_pages.push(address);
        Ok(())
    }

    fn write_row(&mut self, base: u32, row: &[u32; ROW_WORDS]) -> Result<(), FlashError> {
        if self.fail_write_at == Some(base) {
            return Err(FlashError::Write { address: base });
        }
        for (i, &word) in row.iter().enumerate() {
            self.words.insert(base + i as u32 * self.units_per_word, word);
        }
        self.rows.push((base, *row));
        Ok(())
    }

    fn read_word(&mut self, address: u32) -> u32 {
        self.words.get(&address).copied().unwrap_or(self.erased_word)
    }
}

/// Scripted host link. Everything written is captured as text.
pub struct MockTransport {
    pub input: VecDeque<u8>,
    pub output: Vec<u8>,
    pub session_active: bool,
    pub polls: usize,
    pub detached: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            input: VecDeque::new(),
            output: Vec::new(),
            session_active: true,
            polls: 0,
            detached: false,
        }
    }

    pub fn with_input(text: &str) -> Self {
        let mut transport = Self::new();
        transport.push(text);
        transport
    }

    pub fn push(&mut self, text: &str) {
        self.input.extend(text.bytes());
    }

    /// Reply lines written so far, terminators stripped.
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.output)
            .split("\r\n")
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

impl Transport for MockTransport {
    fn read_available(&mut self, buf: &mut [u8]) -> usize {
        let count = buf.len().min(self.input.len());
        for slot in &mut buf[..count] {
            *slot = self.input.pop_front().unwrap_or(0);
        }
        count
    }

    fn write_ready(&mut self) -> bool {
        true
    }

    fn write(&mut self, bytes: &[u8]) -> usize {
        self.output.extend_from_slice(bytes);
        bytes.len()
    }

    fn is_session_active(&mut self) -> bool {
        self.session_active
    }

    fn poll(&mut self) {
        self.polls += 1;
    }

    fn detach(&mut self) {
        self.detached = true;
    }
}

/// Clock that advances by `step_ms` on every read.
pub struct MockClock {
    pub now: u64,
    pub step_ms: u64,
}

impl MockClock {
    pub fn stepping(step_ms: u64) -> Self {
        Self { now: 0, step_ms }
    }
}

impl Monotonic for MockClock {
    fn now_ms(&mut self) -> u64 {
        let now = self.now;
        self.now += self.step_ms;
        now
    }
}

/// Delay that only adds up the requested time.
#[derive(Default)]
pub struct MockDelay {
    pub total_ns: u64,
}

impl embedded_hal::delay::DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }
}

/// Build a record line with a valid checksum, without terminator.
pub fn record(record_type: RecordType, address: u16, data: &[u8]) -> String {
    let mut line = String::new();
    let _ = write!(
        line,
        ":{:02X}{:04X}{:02X}",
        data.len(),
        address,
        record_type.as_u8()
    );
    for byte in data {
        let _ = write!(line, "{:02X}", byte);
    }
    let _ = write!(line, "{:02X}", record_checksum(record_type, address, data));
    line
}

pub fn data_record(address: u16, data: &[u8]) -> String {
    record(RecordType::Data, address, data)
}

pub fn eof_record() -> String {
    record(RecordType::EndOfFile, 0, &[])
}
