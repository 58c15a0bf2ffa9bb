// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Unit tests for start-of-day arbitration and the jump/return bookkeeping.

use hexboot_common::diagnostics::WARM_MARKER;
use hexboot_common::handoff::{
    begin_boot, decide, on_window_expired, ArbiterState, ResidentReason, DEFAULT_WINDOW_MS,
};
use hexboot_common::{
    HandoffConfig, HandoffDecision, PersistentDiagnostics, ResetCause, WindowExpiry,
};

const AUTO_START: HandoffConfig = HandoffConfig {
    window_ms: DEFAULT_WINDOW_MS,
    on_expiry: WindowExpiry::JumpIfHealthy,
};

fn warm_diagnostics() -> PersistentDiagnostics {
    let mut diag = PersistentDiagnostics::zeroed();
    diag.command_count = 7;
    diag.jump_return_count = 2;
    diag.stub_to_app_count = 5;
    diag.app_boot_count = 9;
    diag
}

// =============================================================================
// Reset cause tests
// =============================================================================

fn warm_block() -> PersistentDiagnostics {
    let mut diag = warm_diagnostics();
    diag.warm_marker = WARM_MARKER;
    diag
}

#[test]
fn test_cold_block_reports_power_on() {
    let mut diag = warm_diagnostics();
    diag.mark_reset_request();
    assert_eq!(
        diag.take_reset_cause(ResetCause::EXTERNAL),
        ResetCause::POWER_ON
    );
    assert_eq!(diag.reset_requested, 0);
}

#[test]
fn test_requested_reset_wins_over_stale_external_flag() {
    let mut diag = warm_block();
    diag.mark_reset_request();
    assert_eq!(
        diag.take_reset_cause(ResetCause::EXTERNAL),
        ResetCause::SOFTWARE
    );
}

#[test]
fn test_reset_request_is_consumed() {
    let mut diag = warm_block();
    diag.mark_reset_request();
    diag.take_reset_cause(ResetCause::EXTERNAL);
    assert_eq!(
        diag.take_reset_cause(ResetCause::EXTERNAL),
        ResetCause::EXTERNAL
    );
}

#[test]
fn test_watchdog_wins_over_reset_request() {
    let mut diag = warm_block();
    diag.mark_reset_request();
    assert_eq!(
        diag.take_reset_cause(ResetCause::WATCHDOG),
        ResetCause::WATCHDOG
    );
}

#[test]
fn test_requested_reset_cycle_through_begin_boot() {
    let mut diag = warm_block();
    diag.mark_reset_request();
    let cause = diag.take_reset_cause(ResetCause::EXTERNAL);
    let entry = begin_boot(&mut diag, cause);
    assert_eq!(entry.cause, ResetCause::SOFTWARE);
    assert_eq!(diag.last_reset_cause, ResetCause::SOFTWARE.bits());
    assert_eq!(diag.command_count, 7);
}

// =============================================================================
// begin_boot tests
// =============================================================================

#[test]
fn test_power_on_clears_diagnostics() {
    let mut diag = warm_diagnostics();
    diag.mark_jump_request();

    let entry = begin_boot(&mut diag, ResetCause::POWER_ON);
    assert!(!entry.jump_pending);
    assert!(!entry.returned_from_app);
    assert_eq!(diag.command_count, 0);
    assert_eq!(diag.jump_return_count, 0);
    assert_eq!(diag.app_boot_count, 0);
    assert_eq!(diag.last_reset_cause, ResetCause::POWER_ON.bits());
    assert_eq!(diag.saw_reset_entry, 1);
    assert!(diag.is_warm());
}

#[test]
fn test_brown_out_clears_diagnostics() {
    let mut diag = warm_diagnostics();
    begin_boot(&mut diag, ResetCause::BROWN_OUT | ResetCause::EXTERNAL);
    assert_eq!(diag.command_count, 0);
}

#[test]
fn test_warm_reset_preserves_diagnostics() {
    let mut diag = warm_diagnostics();
    let entry = begin_boot(&mut diag, ResetCause::SOFTWARE);
    assert_eq!(entry.cause, ResetCause::SOFTWARE);
    assert_eq!(diag.command_count, 7);
    assert_eq!(diag.jump_return_count, 2);
    assert_eq!(diag.app_boot_count, 9);
    assert_eq!(diag.last_reset_cause, ResetCause::SOFTWARE.bits());
}

#[test]
fn test_jump_request_is_consumed() {
    let mut diag = warm_diagnostics();
    diag.mark_jump_request();

    let entry = begin_boot(&mut diag, ResetCause::SOFTWARE);
    assert!(entry.jump_pending);
    assert!(!diag.jump_requested());
    assert!(diag.jump_attempted());
    assert_eq!(diag.jump_return_count, 2);
}

#[test]
fn test_return_from_application_is_counted() {
    let mut diag = warm_diagnostics();
    diag.jump_attempted = hexboot_common::diagnostics::JUMP_ATTEMPT_MAGIC;

    let entry = begin_boot(&mut diag, ResetCause::WATCHDOG);
    assert!(entry.returned_from_app);
    assert!(!entry.jump_pending);
    assert!(!diag.jump_attempted());
    assert_eq!(diag.jump_return_count, 3);
}

// =============================================================================
// decide tests
// =============================================================================

#[test]
fn test_pending_jump_with_valid_app() {
    let mut diag = warm_diagnostics();
    diag.mark_jump_request();
    let entry = begin_boot(&mut diag, ResetCause::SOFTWARE);

    let decision = decide(&entry, &mut diag, true, &HandoffConfig::DEFAULT);
    assert_eq!(decision, HandoffDecision::JumpToApplication);
    assert_eq!(diag.stub_to_app_count, 6);
    assert!(diag.jump_attempted());
}

#[test]
fn test_pending_jump_with_invalid_app_stays() {
    let mut diag = warm_diagnostics();
    diag.mark_jump_request();
    let entry = begin_boot(&mut diag, ResetCause::SOFTWARE);

    let decision = decide(&entry, &mut diag, false, &HandoffConfig::DEFAULT);
    assert_eq!(
        decision,
        HandoffDecision::StayResident(ResidentReason::InvalidApplication)
    );
    assert!(!diag.jump_attempted());
    assert_eq!(diag.stub_to_app_count, 5);
}

#[test]
fn test_no_application_stays_resident() {
    let mut diag = PersistentDiagnostics::zeroed();
    let entry = begin_boot(&mut diag, ResetCause::POWER_ON);
    assert_eq!(
        decide(&entry, &mut diag, false, &AUTO_START),
        HandoffDecision::StayResident(ResidentReason::NoApplication)
    );
}

#[test]
fn test_valid_application_opens_window() {
    let mut diag = PersistentDiagnostics::zeroed();
    let entry = begin_boot(&mut diag, ResetCause::POWER_ON);
    assert_eq!(
        decide(&entry, &mut diag, true, &HandoffConfig::default()),
        HandoffDecision::WaitForHost {
            window_ms: DEFAULT_WINDOW_MS
        }
    );
}

#[test]
fn test_zero_window_applies_expiry_policy() {
    let mut diag = PersistentDiagnostics::zeroed();
    let entry = begin_boot(&mut diag, ResetCause::POWER_ON);

    let resident = HandoffConfig {
        window_ms: 0,
        on_expiry: WindowExpiry::StayResident,
    };
    assert_eq!(
        decide(&entry, &mut diag, true, &resident),
        HandoffDecision::StayResident(ResidentReason::WindowExpired)
    );
    assert!(!diag.jump_requested());

    let auto = HandoffConfig {
        window_ms: 0,
        ..AUTO_START
    };
    assert_eq!(
        decide(&entry, &mut diag, true, &auto),
        HandoffDecision::ResetIntoApplication
    );
    assert!(diag.jump_requested());
}

// =============================================================================
// Window expiry
// =============================================================================

#[test]
fn test_expiry_default_stays_resident() {
    let mut diag = PersistentDiagnostics::zeroed();
    let entry = begin_boot(&mut diag, ResetCause::EXTERNAL);
    assert_eq!(
        on_window_expired(&entry, &mut diag, &HandoffConfig::DEFAULT),
        HandoffDecision::StayResident(ResidentReason::WindowExpired)
    );
}

#[test]
fn test_expiry_after_return_does_not_jump_again() {
    let mut diag = PersistentDiagnostics::zeroed();
    diag.jump_attempted = hexboot_common::diagnostics::JUMP_ATTEMPT_MAGIC;
    let entry = begin_boot(&mut diag, ResetCause::WATCHDOG);

    assert_eq!(
        on_window_expired(&entry, &mut diag, &AUTO_START),
        HandoffDecision::StayResident(ResidentReason::WindowExpired)
    );
    assert!(!diag.jump_requested());
}

// =============================================================================
// Full cycles
// =============================================================================

#[test]
fn test_jump_then_fault_cycle() {
    let mut diag = PersistentDiagnostics::zeroed();
    begin_boot(&mut diag, ResetCause::POWER_ON);

    // Host sends J; the agent resets
    diag.mark_jump_request();
    let entry = begin_boot(&mut diag, ResetCause::SOFTWARE);
    assert_eq!(
        decide(&entry, &mut diag, true, &AUTO_START),
        HandoffDecision::JumpToApplication
    );

    // Application faults and the watchdog brings the agent back
    let entry = begin_boot(&mut diag, ResetCause::WATCHDOG);
    assert!(entry.returned_from_app);
    let snapshot = diag.snapshot();
    assert_eq!(snapshot.stub_to_app, 1);
    assert_eq!(snapshot.jump_returns, 1);
    assert_eq!(snapshot.saw_reset, 1);
    assert_eq!(snapshot.boot_reset_cause, ResetCause::WATCHDOG.bits());
}

#[test]
fn test_arbiter_state_after_decision() {
    assert_eq!(
        ArbiterState::after(HandoffDecision::JumpToApplication),
        ArbiterState::JumpPending
    );
    assert_eq!(
        ArbiterState::after(HandoffDecision::ResetIntoApplication),
        ArbiterState::JumpPending
    );
    assert_eq!(
        ArbiterState::after(HandoffDecision::WaitForHost { window_ms: 10 }),
        ArbiterState::WaitForHostWindow
    );
    assert_eq!(
        ArbiterState::after(HandoffDecision::StayResident(ResidentReason::HostActivity)),
        ArbiterState::AgentActive
    );
}
