// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command dispatcher: assembles lines from the transport and executes them.
//!
//! One line is processed to completion, reply included, before the next byte
//! is looked at. Commands:
//! - `V`: version and diagnostics snapshot
//! - `E`: erase the application region
//! - `:`: one HEX record
//! - `C`: flush and report totals
//! - `J`: flush, acknowledge, request the jump
//! - `X`: acknowledge, request a plain reset
//!
//! Anything else, `R` and `W` included, is answered `?Unknown command`.

use heapless::Vec;

use crate::decoder::{LoadError, RecordDecoder, RecordOutcome};
use crate::diagnostics::PersistentDiagnostics;
use crate::flash::FlashDriver;
use crate::layout::FlashLayout;
use crate::protocol::{
    format_response, format_version, Command, Status, UploadStats, LINE_CAPACITY, MSG_BAD_STATE,
    MSG_ERASED, MSG_ERASE_FAILED, MSG_HEX_ERROR, MSG_JUMPING, MSG_RESETTING, MSG_UNKNOWN,
    MSG_WRITE_FAILED, READ_CHUNK,
};
use crate::row_buffer::FlashRowBuffer;
use crate::transport::{send_line, Transport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootloaderState {
    /// No erase seen since start-up.
    Idle,
    /// Application region erased, no word stored yet.
    ReceivingImage,
    /// At least one word of the new image stored.
    Programming,
    /// Flushing the last row for `C`.
    Verifying,
    /// End of image reached (EOF record or `C`).
    Complete,
    /// Erase or write failed; only a successful erase leaves this state.
    Error,
}

/// How a session hands control back to the board.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionExit {
    /// Jump request armed in diagnostics; reset into the application.
    JumpToApplication,
    /// Plain reset, no jump intent.
    Reset,
}

pub struct Dispatcher {
    layout: FlashLayout,
    line: Vec<u8, LINE_CAPACITY>,
    state: BootloaderState,
    decoder: RecordDecoder,
    rows: FlashRowBuffer,
    stats: UploadStats,
    host_activity: bool,
}

impl Dispatcher {
    pub fn new(layout: FlashLayout) -> Self {
        Self {
            layout,
            line: Vec::new(),
            state: BootloaderState::Idle,
            decoder: RecordDecoder::new(layout),
            rows: FlashRowBuffer::new(layout),
            stats: UploadStats::default(),
            host_activity: false,
        }
    }

    pub fn state(&self) -> BootloaderState {
        self.state
    }

    pub fn stats(&self) -> UploadStats {
        self.stats
    }

    pub fn rows(&self) -> &FlashRowBuffer {
        &self.rows
    }

    /// Any byte arrived from the host since the last clear.
    pub fn had_host_activity(&self) -> bool {
        self.host_activity
    }

    pub fn clear_host_activity(&mut self) {
        self.host_activity = false;
    }

    /// Pull one chunk from the transport and process it.
    pub fn poll<T: Transport, F: FlashDriver>(
        &mut self,
        transport: &mut T,
        flash: &mut F,
        diag: &mut PersistentDiagnostics,
    ) -> Option<SessionExit> {
        let mut buf = [0u8; READ_CHUNK];
        let count = transport.read_available(&mut buf);
        if count == 0 {
            return None;
        }
        self.host_activity = true;

        for &byte in &buf[..count.min(READ_CHUNK)] {
            if let Some(exit) = self.submit(byte, transport, flash, diag) {
                return Some(exit);
            }
        }
        None
    }

    /// Feed one received byte. CR or LF ends a line; empty lines are ignored
    /// and characters beyond the line capacity are dropped.
    pub fn submit<T: Transport, F: FlashDriver>(
        &mut self,
        byte: u8,
        transport: &mut T,
        flash: &mut F,
        diag: &mut PersistentDiagnostics,
    ) -> Option<SessionExit> {
        if byte != b'\r' && byte != b'\n' {
            let _ = self.line.push(byte);
            return None;
        }
        if self.line.is_empty() {
            return None;
        }

        let line = core::mem::take(&mut self.line);
        self.dispatch(&line, transport, flash, diag)
    }

    fn dispatch<T: Transport, F: FlashDriver>(
        &mut self,
        line: &[u8],
        transport: &mut T,
        flash: &mut F,
        diag: &mut PersistentDiagnostics,
    ) -> Option<SessionExit> {
        let first = *line.first()?;
        diag.record_command(first);

        match Command::from_byte(first) {
            Some(Command::ReadVersion) => {
                send_line(transport, format_version(&diag.snapshot()).as_bytes());
                None
            }
            Some(Command::EraseFlash) => {
                self.handle_erase(transport, flash);
                None
            }
            Some(Command::HexRecord) => {
                self.handle_record(line, transport, flash);
                None
            }
            Some(Command::Verify) => {
                self.handle_verify(transport, flash);
                None
            }
            Some(Command::JumpToApp) => self.handle_jump(transport, flash, diag),
            Some(Command::Reset) => {
                reply(transport, Status::Ok, MSG_RESETTING);
                Some(SessionExit::Reset)
            }
            Some(Command::ReadFlash | Command::WriteFlash) | None => {
                reply(transport, Status::Unknown, MSG_UNKNOWN);
                None
            }
        }
    }

    /// Erase every application page, keeping the link serviced in between.
    fn handle_erase<T: Transport, F: FlashDriver>(&mut self, transport: &mut T, flash: &mut F) {
        self.rows.discard();
        self.decoder.reset();
        self.stats = UploadStats::default();

        for page in self.layout.page_addresses() {
            if let Err(_err) = flash.erase_page(page) {
                #[cfg(feature = "defmt")]
                defmt::warn!("erase failed: {}", _err);
                self.state = BootloaderState::Error;
                reply(transport, Status::Error, MSG_ERASE_FAILED);
                return;
            }
            self.stats.pages_erased += 1;
            transport.poll();
        }

        #[cfg(feature = "defmt")]
        defmt::debug!("erased {} pages", self.stats.pages_erased);
        self.state = BootloaderState::ReceivingImage;
        reply(transport, Status::Ok, MSG_ERASED);
    }

    fn handle_record<T: Transport, F: FlashDriver>(
        &mut self,
        line: &[u8],
        transport: &mut T,
        flash: &mut F,
    ) {
        match self.state {
            BootloaderState::Idle => self.state = BootloaderState::ReceivingImage,
            BootloaderState::ReceivingImage | BootloaderState::Programming => {}
            BootloaderState::Verifying | BootloaderState::Complete | BootloaderState::Error => {
                reply(transport, Status::Error, MSG_BAD_STATE);
                return;
            }
        }

        match self.decoder.process_line(line, &mut self.rows, flash) {
            Ok(RecordOutcome::Data { words }) => {
                self.stats.bytes_written += u32::from(words) * self.layout.value_bytes();
                if words > 0 && self.state == BootloaderState::ReceivingImage {
                    self.state = BootloaderState::Programming;
                }
                reply(transport, Status::Ok, "");
            }
            Ok(RecordOutcome::EndOfFile) => {
                self.state = BootloaderState::Complete;
                reply(transport, Status::Ok, "");
            }
            Ok(RecordOutcome::AddressChanged | RecordOutcome::Ignored) => {
                reply(transport, Status::Ok, "");
            }
            Err(LoadError::Decode(_err)) => {
                #[cfg(feature = "defmt")]
                defmt::debug!("rejected record: {}", _err);
                reply(transport, Status::Error, MSG_HEX_ERROR);
            }
            Err(LoadError::Flash(_err)) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("{}", _err);
                self.state = BootloaderState::Error;
                reply(transport, Status::Error, MSG_WRITE_FAILED);
            }
        }
    }

    fn handle_verify<T: Transport, F: FlashDriver>(&mut self, transport: &mut T, flash: &mut F) {
        if self.state == BootloaderState::Error {
            reply(transport, Status::Error, MSG_BAD_STATE);
            return;
        }

        self.state = BootloaderState::Verifying;
        if self.rows.flush(flash).is_err() {
            self.state = BootloaderState::Error;
            reply(transport, Status::Error, MSG_WRITE_FAILED);
            return;
        }

        self.state = BootloaderState::Complete;
        let mut message: heapless::String<48> = heapless::String::new();
        let _ = core::fmt::write(&mut message, format_args!("{}", self.stats));
        reply(transport, Status::Ok, &message);
    }

    fn handle_jump<T: Transport, F: FlashDriver>(
        &mut self,
        transport: &mut T,
        flash: &mut F,
        diag: &mut PersistentDiagnostics,
    ) -> Option<SessionExit> {
        if self.rows.flush(flash).is_err() {
            self.state = BootloaderState::Error;
            reply(transport, Status::Error, MSG_WRITE_FAILED);
            return None;
        }

        reply(transport, Status::Ok, MSG_JUMPING);
        diag.mark_jump_request();
        Some(SessionExit::JumpToApplication)
    }
}

fn reply<T: Transport>(transport: &mut T, status: Status, message: &str) {
    send_line(transport, format_response(status, message).as_bytes());
}
