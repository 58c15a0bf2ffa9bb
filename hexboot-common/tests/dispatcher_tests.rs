// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! End-to-end line protocol tests against the PIC24 layout.

mod support;

use std::panic::{catch_unwind, AssertUnwindSafe};

use hexboot_common::hex::MAX_RECORD_DATA;
use hexboot_common::{
    BootloaderState, Dispatcher, FlashDriver, FlashError, FlashLayout, PersistentDiagnostics,
    SessionExit, ROW_WORDS,
};

use support::{data_record, eof_record, MockFlash, MockTransport};

const SIXTEEN_BYTES: [u8; 16] = [
    0x00, 0x02, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x11, 0x22, 0x33, 0x00, 0x44, 0x55, 0x66,
    0x00,
];

struct Session {
    dispatcher: Dispatcher,
    transport: MockTransport,
    flash: MockFlash,
    diag: PersistentDiagnostics,
}

impl Session {
    fn new() -> Self {
        Self {
            dispatcher: Dispatcher::new(FlashLayout::PIC24FJ64GB002),
            transport: MockTransport::new(),
            flash: MockFlash::pic24(),
            diag: PersistentDiagnostics::zeroed(),
        }
    }

    /// Send `text` and process everything; returns the first session exit.
    fn send(&mut self, text: &str) -> Option<SessionExit> {
        self.transport.push(text);
        while !self.transport.input.is_empty() {
            if let Some(exit) =
                self.dispatcher
                    .poll(&mut self.transport, &mut self.flash, &mut self.diag)
            {
                return Some(exit);
            }
        }
        None
    }

    /// Send one line and return the reply lines it produced.
    fn command(&mut self, line: &str) -> Vec<String> {
        let before = self.transport.lines().len();
        self.send(&format!("{}\r\n", line));
        self.transport.lines()[before..].to_vec()
    }

    fn erased(mut self) -> Self {
        assert_eq!(self.command("E"), ["+Erased"]);
        self
    }
}

// =============================================================================
// Version and unknown commands
// =============================================================================

#[test]
fn test_version_on_fresh_diagnostics() {
    let mut s = Session::new();
    assert_eq!(
        s.command("V"),
        ["BLv1.2 SJ=0 JR=0 SR=0 BR=0000 AL=0000 AT=0 AS=0"]
    );
    assert_eq!(s.diag.command_count, 1);
    assert_eq!(s.diag.last_command, u16::from(b'V'));
}

#[test]
fn test_version_reports_diagnostics() {
    let mut s = Session::new();
    s.diag.stub_to_app_count = 3;
    s.diag.jump_return_count = 1;
    s.diag.saw_reset_entry = 1;
    s.diag.last_reset_cause = 0x0008;
    s.diag.app_last_reset_cause = 0x0004;
    s.diag.app_trap_code = 1;
    s.diag.app_stage = 4;
    assert_eq!(
        s.command("V"),
        ["BLv1.2 SJ=3 JR=1 SR=1 BR=0008 AL=0004 AT=1 AS=4"]
    );
}

#[test]
fn test_unknown_commands() {
    let mut s = Session::new();
    assert_eq!(s.command("Z"), ["?Unknown command"]);
    assert_eq!(s.command("R"), ["?Unknown command"]);
    assert_eq!(s.command("W"), ["?Unknown command"]);
    assert_eq!(s.diag.command_count, 3);
}

#[test]
fn test_empty_lines_are_ignored() {
    let mut s = Session::new();
    assert_eq!(s.send("\r\n\r\n\n"), None);
    assert!(s.transport.output.is_empty());
    assert_eq!(s.diag.command_count, 0);
}

#[test]
fn test_crlf_produces_one_reply() {
    let mut s = Session::new();
    s.send("Z\r\nZ\n");
    assert_eq!(s.transport.lines(), ["?Unknown command", "?Unknown command"]);
}

#[test]
fn test_overlong_line_is_truncated() {
    let mut s = Session::new();
    let line = "Q".repeat(300);
    assert_eq!(s.command(&line), ["?Unknown command"]);
}

#[test]
fn test_poll_marks_host_activity() {
    let mut s = Session::new();
    assert!(!s.dispatcher.had_host_activity());
    s.send("\n");
    assert!(s.dispatcher.had_host_activity());
    s.dispatcher.clear_host_activity();
    assert!(!s.dispatcher.had_host_activity());
}

// =============================================================================
// Erase
// =============================================================================

#[test]
fn test_erase_covers_application_pages() {
    let mut s = Session::new();
    assert_eq!(s.command("E"), ["+Erased"]);
    assert_eq!(s.flash.erased_pages.len(), 27);
    assert_eq!(s.flash.erased_pages[0], 0x4000);
    assert_eq!(s.flash.erased_pages[26], 0xA800);
    assert_eq!(s.dispatcher.state(), BootloaderState::ReceivingImage);
    assert_eq!(s.dispatcher.stats().pages_erased, 27);
}

#[test]
fn test_erase_services_transport_between_pages() {
    let mut s = Session::new();
    s.command("E");
    assert!(s.transport.polls >= 27);
}

#[test]
fn test_erase_failure_is_sticky_until_next_erase() {
    let mut s = Session::new();
    s.flash.fail_erase_at = Some(0x5000);
    assert_eq!(s.command("E"), ["-Erase failed"]);
    assert_eq!(s.dispatcher.state(), BootloaderState::Error);

    assert_eq!(s.command(&data_record(0x8000, &SIXTEEN_BYTES)), ["-Bad state"]);
    assert_eq!(s.command("C"), ["-Bad state"]);
    assert_eq!(s.dispatcher.state(), BootloaderState::Error);

    s.flash.fail_erase_at = None;
    assert_eq!(s.command("E"), ["+Erased"]);
    assert_eq!(s.dispatcher.state(), BootloaderState::ReceivingImage);
}

// =============================================================================
// HEX records
// =============================================================================

#[test]
fn test_data_record_acknowledged() {
    let mut s = Session::new().erased();
    assert_eq!(s.command(&data_record(0x8000, &SIXTEEN_BYTES)), ["+"]);
    assert_eq!(s.dispatcher.state(), BootloaderState::Programming);
    assert_eq!(s.dispatcher.stats().bytes_written, 12);
    assert_eq!(s.dispatcher.rows().pending_base(), Some(0x4000));
}

#[test]
fn test_largest_record_fits_the_line_buffer() {
    let mut s = Session::new().erased();
    let line = data_record(0x8000, &[0x11; MAX_RECORD_DATA]);
    assert_eq!(s.command(&line), ["+"]);
    assert_eq!(s.dispatcher.stats().bytes_written, 48);
    assert_eq!(s.dispatcher.state(), BootloaderState::Programming);
}

#[test]
fn test_record_without_erase_starts_receiving() {
    let mut s = Session::new();
    assert_eq!(s.command(&data_record(0x8000, &SIXTEEN_BYTES)), ["+"]);
    assert_eq!(s.dispatcher.state(), BootloaderState::Programming);
}

#[test]
fn test_record_outside_region_keeps_receiving() {
    let mut s = Session::new().erased();
    assert_eq!(s.command(&data_record(0x0000, &SIXTEEN_BYTES)), ["+"]);
    assert_eq!(s.dispatcher.state(), BootloaderState::ReceivingImage);
    assert_eq!(s.dispatcher.stats().bytes_written, 0);
}

#[test]
fn test_bad_checksum_replies_hex_error() {
    let mut s = Session::new().erased();
    let line = data_record(0x8000, &SIXTEEN_BYTES);
    let (body, _) = line.split_at(line.len() - 2);
    let corrupted = format!("{}00", body);
    assert_eq!(s.command(&corrupted), ["-HEX error"]);
    assert_eq!(s.dispatcher.state(), BootloaderState::ReceivingImage);
    assert_eq!(s.dispatcher.rows().pending_base(), None);
}

#[test]
fn test_end_of_file_completes_and_flushes() {
    let mut s = Session::new().erased();
    s.command(&data_record(0x8000, &SIXTEEN_BYTES));
    assert_eq!(s.command(&eof_record()), ["+"]);
    assert_eq!(s.dispatcher.state(), BootloaderState::Complete);
    assert_eq!(s.flash.rows.len(), 1);
    assert_eq!(s.flash.read_word(0x4000), 0x040200);
    assert_eq!(s.flash.read_word(0x4004), 0x332211);
}

#[test]
fn test_record_after_complete_is_bad_state() {
    let mut s = Session::new().erased();
    s.command(&eof_record());
    assert_eq!(s.command(&data_record(0x8000, &SIXTEEN_BYTES)), ["-Bad state"]);
}

#[test]
fn test_write_failure_enters_error() {
    let mut s = Session::new().erased();
    s.flash.fail_write_at = Some(0x4000);
    s.command(&data_record(0x8000, &SIXTEEN_BYTES));
    assert_eq!(
        s.command(&data_record(0x8100, &SIXTEEN_BYTES)),
        ["-Write failed"]
    );
    assert_eq!(s.dispatcher.state(), BootloaderState::Error);
}

// =============================================================================
// Verify
// =============================================================================

#[test]
fn test_verify_reports_totals() {
    let mut s = Session::new().erased();
    s.command(&data_record(0x8000, &SIXTEEN_BYTES));
    assert_eq!(s.command("C"), ["+OK: 12 bytes, 27 pages"]);
    assert_eq!(s.dispatcher.state(), BootloaderState::Complete);
    assert_eq!(s.flash.rows.len(), 1);
}

#[test]
fn test_verify_without_erase_reports_zero() {
    let mut s = Session::new();
    assert_eq!(s.command("C"), ["+OK: 0 bytes, 0 pages"]);
}

#[test]
fn test_verify_flush_failure() {
    let mut s = Session::new().erased();
    s.flash.fail_write_at = Some(0x4000);
    s.command(&data_record(0x8000, &SIXTEEN_BYTES));
    assert_eq!(s.command("C"), ["-Write failed"]);
    assert_eq!(s.dispatcher.state(), BootloaderState::Error);
}

#[test]
fn test_erase_resets_totals() {
    let mut s = Session::new().erased();
    s.command(&data_record(0x8000, &SIXTEEN_BYTES));
    s.command("E");
    assert_eq!(s.command("C"), ["+OK: 0 bytes, 27 pages"]);
}

// =============================================================================
// Jump and reset
// =============================================================================

#[test]
fn test_jump_flushes_partial_row_and_arms_request() {
    let mut s = Session::new().erased();
    s.command(&data_record(0x8000, &SIXTEEN_BYTES));
    assert!(s.flash.rows.is_empty());

    let exit = s.send("J\r\n");
    assert_eq!(exit, Some(SessionExit::JumpToApplication));
    assert_eq!(s.transport.lines().last().unwrap(), "+Jumping...");
    assert_eq!(s.flash.rows.len(), 1);
    assert!(s.diag.jump_requested());
    assert!(s.diag.jump_attempted());
}

#[test]
fn test_jump_blocked_by_flush_failure() {
    let mut s = Session::new().erased();
    s.flash.fail_write_at = Some(0x4000);
    s.command(&data_record(0x8000, &SIXTEEN_BYTES));

    assert_eq!(s.send("J\r\n"), None);
    assert_eq!(s.transport.lines().last().unwrap(), "-Write failed");
    assert!(!s.diag.jump_requested());
}

#[test]
fn test_reset_command() {
    let mut s = Session::new();
    assert_eq!(s.send("X\r\n"), Some(SessionExit::Reset));
    assert_eq!(s.transport.lines(), ["+Resetting..."]);
    assert!(!s.diag.jump_requested());
}

#[test]
fn test_exit_stops_processing_the_chunk() {
    let mut s = Session::new();
    assert_eq!(s.send("X\r\nV\r\n"), Some(SessionExit::Reset));
    assert_eq!(s.transport.lines(), ["+Resetting..."]);
}

#[test]
fn test_full_upload_session() {
    let mut s = Session::new();
    let version = s.command("V");
    assert!(version[0].starts_with("BLv1.2 "));
    assert_eq!(s.command("E"), ["+Erased"]);
    for (i, chunk) in [SIXTEEN_BYTES; 20].iter().enumerate() {
        assert_eq!(s.command(&data_record(0x8000 + i as u16 * 16, chunk)), ["+"]);
    }
    assert_eq!(s.command(&eof_record()), ["+"]);
    assert_eq!(s.command("C"), ["+OK: 240 bytes, 27 pages"]);
    assert_eq!(s.send("J\r\n"), Some(SessionExit::JumpToApplication));
    // 80 words from 0x4000 span two rows
    assert_eq!(s.flash.rows.len(), 2);
    assert_eq!(s.diag.command_count, 25);
}

// =============================================================================
// Command bookkeeping
// =============================================================================

/// Flash whose erase never comes back, like a wedged controller.
struct WedgedFlash;

impl FlashDriver for WedgedFlash {
    fn erase_page(&mut self, address: u32) -> Result<(), FlashError> {
        panic!("erase at 0x{:06X} never completes", address);
    }

    fn write_row(&mut self, _base: u32, _row: &[u32; ROW_WORDS]) -> Result<(), FlashError> {
        Ok(())
    }

    fn read_word(&mut self, _address: u32) -> u32 {
        0x00FF_FFFF
    }
}

#[test]
fn test_command_recorded_before_it_runs() {
    let mut dispatcher = Dispatcher::new(FlashLayout::PIC24FJ64GB002);
    let mut transport = MockTransport::new();
    let mut flash = WedgedFlash;
    let mut diag = PersistentDiagnostics::zeroed();
    diag.command_count = 4;
    diag.last_command = u16::from(b'V');

    transport.push("E\r\n");
    let result = catch_unwind(AssertUnwindSafe(|| {
        dispatcher.poll(&mut transport, &mut flash, &mut diag)
    }));

    assert!(result.is_err());
    assert_eq!(diag.last_command, u16::from(b'E'));
    assert_eq!(diag.command_count, 5);
    assert!(transport.lines().is_empty());
}
