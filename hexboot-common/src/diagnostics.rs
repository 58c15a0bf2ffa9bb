// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Diagnostics that survive a warm reset.
//!
//! The block lives in a RAM window that neither the agent nor the application
//! zero-initialises. It is cleared only after a power-on or brown-out reset,
//! so a chain of jump/fault/reset events can be reconstructed afterwards.
//!
//! The agent writes the `jump_*`, `stub_to_app_count`, `saw_reset_entry`,
//! `last_*` and `command_count` fields. The `app_*` fields belong to the
//! application; the agent only reads them.

use core::fmt;

/// Set in `jump_requested` right before the reset that should enter the
/// application.
pub const JUMP_REQUEST_MAGIC: u16 = 0xB007;

/// Set in `jump_attempted` whenever a jump is on its way. Finding it on entry
/// without a pending request means control came back from the application.
pub const JUMP_ATTEMPT_MAGIC: u16 = 0xB00B;

/// Set in `reset_requested` by whoever issues a software reset. Chip reset
/// flags can outlive the reset that set them, so this tells a requested reset
/// apart from a stale external one.
pub const RESET_REQUEST_MAGIC: u16 = 0xB05E;

/// Kept in `warm_marker` while RAM holds a valid block. Any other value after
/// reset means RAM lost power.
pub const WARM_MARKER: u16 = 0x5AFE;

/// Hardware reset cause, normalised into a bit set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResetCause(pub u16);

impl ResetCause {
    pub const POWER_ON: Self = Self(1 << 0);
    pub const BROWN_OUT: Self = Self(1 << 1);
    pub const SOFTWARE: Self = Self(1 << 2);
    pub const WATCHDOG: Self = Self(1 << 3);
    pub const EXTERNAL: Self = Self(1 << 4);
    pub const TRAP: Self = Self(1 << 5);

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Power was lost, so RAM contents are meaningless.
    pub const fn is_power_on(self) -> bool {
        self.0 & (Self::POWER_ON.0 | Self::BROWN_OUT.0) != 0
    }
}

impl core::ops::BitOr for ResetCause {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Persistent diagnostics block (repr(C), 32 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PersistentDiagnostics {
    pub jump_requested: u16,
    pub jump_attempted: u16,
    pub jump_return_count: u16,
    pub stub_to_app_count: u16,
    pub saw_reset_entry: u16,
    pub last_reset_cause: u16,
    pub last_command: u16,
    pub command_count: u16,
    pub app_trap_code: u16,
    pub app_trap_count: u16,
    pub app_boot_count: u16,
    pub app_stage: u16,
    pub app_last_reset_cause: u16,
    pub warm_marker: u16,
    pub reset_requested: u16,
    pub _reserved: u16,
}

const _: () = assert!(core::mem::size_of::<PersistentDiagnostics>() == 32);

impl PersistentDiagnostics {
    pub const fn zeroed() -> Self {
        Self {
            jump_requested: 0,
            jump_attempted: 0,
            jump_return_count: 0,
            stub_to_app_count: 0,
            saw_reset_entry: 0,
            last_reset_cause: 0,
            last_command: 0,
            command_count: 0,
            app_trap_code: 0,
            app_trap_count: 0,
            app_boot_count: 0,
            app_stage: 0,
            app_last_reset_cause: 0,
            warm_marker: 0,
            reset_requested: 0,
            _reserved: 0,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::zeroed();
    }

    /// Note the command character of a line about to be executed.
    ///
    /// Volatile stores, so the block already shows the command if it never
    /// returns.
    pub fn record_command(&mut self, command: u8) {
        let count = self.command_count.wrapping_add(1);
        unsafe {
            core::ptr::addr_of_mut!(self.last_command).write_volatile(u16::from(command));
            core::ptr::addr_of_mut!(self.command_count).write_volatile(count);
        }
    }

    /// Mark the next reset as requested by software.
    pub fn mark_reset_request(&mut self) {
        self.reset_requested = RESET_REQUEST_MAGIC;
    }

    /// Resolve the cause of the reset that just happened and consume the
    /// software reset request.
    ///
    /// `hardware` is the board's best reading of its reset flags. A block
    /// without the warm marker lost power. A watchdog timeout wins over a
    /// pending request, which in turn wins over any other flag.
    pub fn take_reset_cause(&mut self, hardware: ResetCause) -> ResetCause {
        let requested = self.reset_requested == RESET_REQUEST_MAGIC;
        self.reset_requested = 0;

        if !self.is_warm() {
            ResetCause::POWER_ON
        } else if hardware.contains(ResetCause::WATCHDOG) {
            hardware
        } else if requested {
            ResetCause::SOFTWARE
        } else {
            hardware
        }
    }

    /// Arm both jump sentinels ahead of the reset into the application.
    pub fn mark_jump_request(&mut self) {
        self.jump_attempted = JUMP_ATTEMPT_MAGIC;
        self.jump_requested = JUMP_REQUEST_MAGIC;
    }

    /// The block survived the last reset.
    pub fn is_warm(&self) -> bool {
        self.warm_marker == WARM_MARKER
    }

    pub fn jump_requested(&self) -> bool {
        self.jump_requested == JUMP_REQUEST_MAGIC
    }

    pub fn jump_attempted(&self) -> bool {
        self.jump_attempted == JUMP_ATTEMPT_MAGIC
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            stub_to_app: self.stub_to_app_count,
            jump_returns: self.jump_return_count,
            saw_reset: self.saw_reset_entry,
            boot_reset_cause: self.last_reset_cause,
            app_reset_cause: self.app_last_reset_cause,
            app_trap_code: self.app_trap_code,
            app_stage: self.app_stage,
        }
    }

    /// Read the block from a fixed address.
    ///
    /// # Safety
    /// `addr` must point to a readable, aligned region of at least 32 bytes.
    pub unsafe fn read_from(addr: u32) -> Self {
        core::ptr::read_volatile(addr as *const Self)
    }

    /// Write the block to a fixed address.
    ///
    /// # Safety
    /// `addr` must point to a writable, aligned region of at least 32 bytes
    /// that nothing else uses.
    pub unsafe fn write_to(&self, addr: u32) {
        core::ptr::write_volatile(addr as *mut Self, *self);
    }
}

/// The subset of diagnostics reported on the version line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiagnosticsSnapshot {
    /// SJ: jumps the agent performed.
    pub stub_to_app: u16,
    /// JR: returns into the agent after a jump attempt.
    pub jump_returns: u16,
    /// SR: the agent was entered through a reset.
    pub saw_reset: u16,
    /// BR: reset cause seen by the agent.
    pub boot_reset_cause: u16,
    /// AL: reset cause seen by the application.
    pub app_reset_cause: u16,
    /// AT: last application trap code.
    pub app_trap_code: u16,
    /// AS: last application stage.
    pub app_stage: u16,
}

impl DiagnosticsSnapshot {
    /// Extract the fields from a version line such as
    /// `BLv1.2 SJ=1 JR=0 SR=1 BR=0004 AL=0004 AT=0 AS=3`.
    ///
    /// Every field must be present. Unknown tokens are ignored.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields: [Option<u16>; 7] = [None; 7];
        for token in line.split_ascii_whitespace() {
            let Some((key, value)) = token.split_once('=') else {
                continue;
            };
            let (slot, radix) = match key {
                "SJ" => (0, 10),
                "JR" => (1, 10),
                "SR" => (2, 10),
                "BR" => (3, 16),
                "AL" => (4, 16),
                "AT" => (5, 10),
                "AS" => (6, 10),
                _ => continue,
            };
            fields[slot] = Some(u16::from_str_radix(value, radix).ok()?);
        }

        let [Some(sj), Some(jr), Some(sr), Some(br), Some(al), Some(at), Some(as_)] = fields else {
            return None;
        };
        Some(Self {
            stub_to_app: sj,
            jump_returns: jr,
            saw_reset: sr,
            boot_reset_cause: br,
            app_reset_cause: al,
            app_trap_code: at,
            app_stage: as_,
        })
    }
}

impl fmt::Display for DiagnosticsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SJ={} JR={} SR={} BR={:04X} AL={:04X} AT={} AS={}",
            self.stub_to_app,
            self.jump_returns,
            self.saw_reset,
            self.boot_reset_cause,
            self.app_reset_cause,
            self.app_trap_code,
            self.app_stage
        )
    }
}
