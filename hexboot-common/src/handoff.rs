// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Start-of-day handoff arbitration - pure logic without hardware dependencies.
//!
//! Runs once per reset, before any peripheral is touched. A jump into the
//! application always starts from a fresh reset: the agent arms
//! `jump_requested`, resets, and the next boot consumes the request. The
//! `jump_attempted` sentinel stays armed while the application runs, so
//! finding it on a later entry means the application came back (fault,
//! watchdog or explicit return) and the agent must not jump again on its own.

use crate::diagnostics::{PersistentDiagnostics, ResetCause, WARM_MARKER};

/// Default entry window after reset.
pub const DEFAULT_WINDOW_MS: u32 = 15_000;

/// What to do when the entry window closes without host activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WindowExpiry {
    /// Keep the agent resident. Nothing runs without an explicit `J`.
    #[default]
    StayResident,
    /// Reset into the application, unless this boot is a return from it.
    JumpIfHealthy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HandoffConfig {
    /// Entry window length; 0 disables the window.
    pub window_ms: u32,
    pub on_expiry: WindowExpiry,
}

impl HandoffConfig {
    pub const DEFAULT: Self = Self {
        window_ms: DEFAULT_WINDOW_MS,
        on_expiry: WindowExpiry::StayResident,
    };
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Facts established while evaluating the reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootEntry {
    pub cause: ResetCause,
    /// A jump request from the previous session was consumed.
    pub jump_pending: bool,
    /// The previous session jumped and control came back.
    pub returned_from_app: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResidentReason {
    NoApplication,
    /// A jump was requested but the entry word is not plausible.
    InvalidApplication,
    HostActivity,
    WindowExpired,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HandoffDecision {
    /// Transfer control now; peripherals are still untouched.
    JumpToApplication,
    StayResident(ResidentReason),
    /// Run the agent for at most `window_ms`, watching for the host.
    WaitForHost { window_ms: u32 },
    /// Jump request armed; reset so the next boot performs the jump.
    ResetIntoApplication,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ArbiterState {
    EvaluatingReset,
    WaitForHostWindow,
    AgentActive,
    JumpPending,
}

impl ArbiterState {
    /// State entered once `decision` has been taken.
    pub fn after(decision: HandoffDecision) -> Self {
        match decision {
            HandoffDecision::JumpToApplication | HandoffDecision::ResetIntoApplication => {
                Self::JumpPending
            }
            HandoffDecision::StayResident(_) => Self::AgentActive,
            HandoffDecision::WaitForHost { .. } => Self::WaitForHostWindow,
        }
    }
}

/// Evaluate the reset: clear diagnostics after power loss, record the cause,
/// consume a pending jump request or detect a return from the application.
pub fn begin_boot(diag: &mut PersistentDiagnostics, cause: ResetCause) -> BootEntry {
    if cause.is_power_on() {
        diag.clear();
    }
    diag.warm_marker = WARM_MARKER;
    diag.last_reset_cause = cause.bits();
    diag.saw_reset_entry = 1;

    let mut entry = BootEntry {
        cause,
        jump_pending: false,
        returned_from_app: false,
    };

    if diag.jump_requested() {
        diag.jump_requested = 0;
        entry.jump_pending = true;
    } else if diag.jump_attempted() {
        diag.jump_attempted = 0;
        diag.jump_return_count = diag.jump_return_count.wrapping_add(1);
        entry.returned_from_app = true;
    }

    entry
}

/// Decide what this boot does, given whether the application looks valid.
pub fn decide(
    entry: &BootEntry,
    diag: &mut PersistentDiagnostics,
    app_valid: bool,
    config: &HandoffConfig,
) -> HandoffDecision {
    if entry.jump_pending {
        if app_valid {
            diag.stub_to_app_count = diag.stub_to_app_count.wrapping_add(1);
            return HandoffDecision::JumpToApplication;
        }
        diag.jump_attempted = 0;
        return HandoffDecision::StayResident(ResidentReason::InvalidApplication);
    }

    if !app_valid {
        return HandoffDecision::StayResident(ResidentReason::NoApplication);
    }

    if config.window_ms == 0 {
        return on_window_expired(entry, diag, config);
    }
    HandoffDecision::WaitForHost {
        window_ms: config.window_ms,
    }
}

/// The entry window closed without host activity.
pub fn on_window_expired(
    entry: &BootEntry,
    diag: &mut PersistentDiagnostics,
    config: &HandoffConfig,
) -> HandoffDecision {
    match config.on_expiry {
        WindowExpiry::JumpIfHealthy if !entry.returned_from_app => {
            diag.mark_jump_request();
            HandoffDecision::ResetIntoApplication
        }
        _ => HandoffDecision::StayResident(ResidentReason::WindowExpired),
    }
}
