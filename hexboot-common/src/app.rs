// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Application-side access to the persistent diagnostics window.
//!
//! The application owns the `app_*` fields: it reports how far it got during
//! start-up and which fault ended it, so the agent can show both on the next
//! version query.

use crate::diagnostics::PersistentDiagnostics;
use crate::layout::DIAGNOSTICS_ADDR;

// --- Start-up milestones reported in `app_stage` ---

pub const STAGE_ENTRY: u16 = 1;
pub const STAGE_CLOCKS: u16 = 2;
pub const STAGE_USB: u16 = 3;
pub const STAGE_RUNNING: u16 = 4;

// --- Codes reported in `app_trap_code` ---

pub const TRAP_HARD_FAULT: u16 = 0x0001;
pub const TRAP_DEFAULT_HANDLER: u16 = 0x0002;

/// Current content of the diagnostics window.
pub fn read_diagnostics() -> PersistentDiagnostics {
    unsafe { PersistentDiagnostics::read_from(DIAGNOSTICS_ADDR) }
}

/// Read-modify-write of the diagnostics window.
pub fn update_diagnostics(f: impl FnOnce(&mut PersistentDiagnostics)) {
    let mut diag = read_diagnostics();
    f(&mut diag);
    unsafe { diag.write_to(DIAGNOSTICS_ADDR) };
}

/// Call first thing after entry.
pub fn record_boot() {
    update_diagnostics(|diag| {
        diag.app_boot_count = diag.app_boot_count.wrapping_add(1);
        diag.app_last_reset_cause = diag.last_reset_cause;
        diag.app_stage = STAGE_ENTRY;
    });
}

pub fn set_stage(stage: u16) {
    update_diagnostics(|diag| diag.app_stage = stage);
}

/// Record a fault. Safe to call from exception handlers.
pub fn record_trap(code: u16) {
    update_diagnostics(|diag| {
        diag.app_trap_code = code;
        diag.app_trap_count = diag.app_trap_count.wrapping_add(1);
    });
}

/// Record a fault and reset into the agent. For exception handlers.
pub fn trap_reset(code: u16) -> ! {
    record_trap(code);
    update_diagnostics(|diag| diag.mark_reset_request());
    cortex_m::peripheral::SCB::sys_reset();
}

/// Reset into the agent.
///
/// The jump sentinel armed by the agent is still set, so the agent treats
/// this boot as a return from the application and stays resident.
pub fn reboot_to_agent() -> ! {
    update_diagnostics(|diag| diag.mark_reset_request());
    // Let the last diagnostics write settle
    cortex_m::asm::delay(100_000);

    cortex_m::peripheral::SCB::sys_reset();
}

/// Reset and come straight back into the application.
///
/// Arms the same jump request the agent uses for `J`, so the agent performs
/// the jump on its next entry instead of treating the reset as a return.
pub fn reboot() -> ! {
    update_diagnostics(|diag| {
        diag.mark_jump_request();
        diag.mark_reset_request();
    });
    cortex_m::asm::delay(100_000);

    cortex_m::peripheral::SCB::sys_reset();
}
