// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Core of the hexboot update agent.
//!
//! Everything here is hardware-agnostic and host-testable:
//! - `hex`, `decoder`, `row_buffer`: Intel HEX records down to flash rows
//! - `dispatcher`, `protocol`: the line protocol and its state machine
//! - `handoff`, `diagnostics`: start-of-day arbitration and the persistent window
//! - `flash`, `transport`: traits a board port implements
//!
//! Features:
//! - `std`: `std::error::Error` impls for host tools
//! - `embedded`: application-side helpers (Cortex-M)
//! - `defmt`: `defmt::Format` derives and debug logging

#![cfg_attr(not(feature = "std"), no_std)]

pub mod agent;
pub mod decoder;
pub mod diagnostics;
pub mod dispatcher;
pub mod flash;
pub mod handoff;
pub mod hex;
pub mod layout;
pub mod protocol;
pub mod row_buffer;
pub mod transport;

#[cfg(feature = "embedded")]
pub mod app;

pub use diagnostics::{DiagnosticsSnapshot, PersistentDiagnostics, ResetCause};
pub use dispatcher::{BootloaderState, Dispatcher, SessionExit};
pub use flash::{FlashDriver, FlashError};
pub use handoff::{BootEntry, HandoffConfig, HandoffDecision, WindowExpiry};
pub use layout::{FlashLayout, DIAGNOSTICS_ADDR, ROW_WORDS};
pub use protocol::{Command, Reply, Status, UploadStats, VERSION_STRING};
pub use transport::{Monotonic, Transport};

#[cfg(feature = "embedded")]
use embedded_hal::delay::DelayNs;
#[cfg(feature = "embedded")]
use embedded_hal::digital::OutputPin;

/// Blink an LED a specified number of times.
#[cfg(feature = "embedded")]
pub fn blink(led: &mut impl OutputPin, timer: &mut impl DelayNs, count: u32, period_ms: u32) {
    for _ in 0..count {
        led.set_high().ok();
        timer.delay_ms(period_ms);
        led.set_low().ok();
        timer.delay_ms(period_ms);
    }
}
