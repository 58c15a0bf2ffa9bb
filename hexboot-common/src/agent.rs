// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Agent loop helpers shared by board ports.

use embedded_hal::delay::DelayNs;

use crate::diagnostics::PersistentDiagnostics;
use crate::dispatcher::{Dispatcher, SessionExit};
use crate::flash::FlashDriver;
use crate::transport::{Monotonic, Transport};

/// Time given to the last reply to leave before a reset.
pub const RESPONSE_DRAIN_MS: u32 = 100;

/// Time off the bus before the reset into the application.
pub const DETACH_SETTLE_MS: u32 = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WindowOutcome {
    /// The host sent something; stay resident.
    HostActivity,
    Expired,
    /// A command ended the session inside the window.
    Exit(SessionExit),
}

/// Service the transport once. Commands are only read while a host session
/// is up.
pub fn service<T: Transport, F: FlashDriver>(
    dispatcher: &mut Dispatcher,
    transport: &mut T,
    flash: &mut F,
    diag: &mut PersistentDiagnostics,
) -> Option<SessionExit> {
    transport.poll();
    if !transport.is_session_active() {
        return None;
    }
    dispatcher.poll(transport, flash, diag)
}

/// Run the agent for at most `window_ms`, returning as soon as the host shows
/// up or a command ends the session.
pub fn run_entry_window<T: Transport, F: FlashDriver, C: Monotonic>(
    dispatcher: &mut Dispatcher,
    transport: &mut T,
    flash: &mut F,
    diag: &mut PersistentDiagnostics,
    clock: &mut C,
    window_ms: u32,
) -> WindowOutcome {
    dispatcher.clear_host_activity();
    let start = clock.now_ms();

    loop {
        if let Some(exit) = service(dispatcher, transport, flash, diag) {
            return WindowOutcome::Exit(exit);
        }
        if dispatcher.had_host_activity() {
            return WindowOutcome::HostActivity;
        }
        if clock.now_ms().saturating_sub(start) >= u64::from(window_ms) {
            return WindowOutcome::Expired;
        }
    }
}

/// Serve the host until a command ends the session.
pub fn run_session<T: Transport, F: FlashDriver>(
    dispatcher: &mut Dispatcher,
    transport: &mut T,
    flash: &mut F,
    diag: &mut PersistentDiagnostics,
) -> SessionExit {
    loop {
        if let Some(exit) = service(dispatcher, transport, flash, diag) {
            return exit;
        }
    }
}

/// Let the final reply drain, and for a jump drop off the bus, before the
/// caller resets.
pub fn prepare_reset<T: Transport, D: DelayNs>(exit: SessionExit, transport: &mut T, delay: &mut D) {
    for _ in 0..RESPONSE_DRAIN_MS {
        transport.poll();
        delay.delay_ms(1);
    }

    if exit == SessionExit::JumpToApplication {
        transport.detach();
        delay.delay_ms(DETACH_SETTLE_MS);
    }
}
