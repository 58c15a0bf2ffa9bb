// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Boot management: reset cause, application validation, and jump.

use hexboot_common::handoff::{HandoffConfig, WindowExpiry};
use hexboot_common::{FlashDriver, FlashLayout, PersistentDiagnostics, ResetCause, DIAGNOSTICS_ADDR};
use rp2040_hal::pac;

pub const LAYOUT: FlashLayout = FlashLayout::RP2040;

/// 15 s entry window, then reset into a healthy application.
pub const HANDOFF: HandoffConfig = HandoffConfig {
    window_ms: 15_000,
    on_expiry: WindowExpiry::JumpIfHealthy,
};

const RAM_START: u32 = 0x2000_0000;
const RAM_END: u32 = 0x2004_2000;

struct VectorTable {
    initial_sp: u32,
    reset_vector: u32,
}

impl VectorTable {
    fn read<F: FlashDriver>(flash: &mut F, addr: u32) -> Self {
        Self {
            initial_sp: flash.read_word(addr),
            reset_vector: flash.read_word(addr + 4),
        }
    }

    fn is_valid_for_xip_execution(&self) -> bool {
        // Thumb bit set, handler inside the application region
        let target = self.reset_vector & !1;
        self.reset_vector & 1 == 1
            && LAYOUT.contains(target)
            && (RAM_START..=RAM_END).contains(&self.initial_sp)
    }
}

/// The persistent window in place. Every write lands in RAM that outlives
/// the next reset, so nothing has to be stored back before resetting.
///
/// # Safety
/// Call once. The returned reference must be the only access to the window.
pub unsafe fn diagnostics() -> &'static mut PersistentDiagnostics {
    &mut *(DIAGNOSTICS_ADDR as *mut PersistentDiagnostics)
}

/// Map the chip's reset flags onto [`ResetCause`].
///
/// `CHIP_RESET` keeps reporting the last chip-level reset across processor
/// resets, so `HAD_RUN` alone cannot tell a RUN-pin reset from a later
/// `sys_reset`. Power loss and requested resets are therefore taken from the
/// persistent block, which also consumes the request.
pub fn read_reset_cause(diag: &mut PersistentDiagnostics) -> ResetCause {
    let p = unsafe { pac::Peripherals::steal() };
    let chip = p.VREG_AND_CHIP_RESET.chip_reset().read();
    let reason = p.WATCHDOG.reason().read();

    let hardware = if reason.timer().bit_is_set() {
        ResetCause::WATCHDOG
    } else if reason.force().bit_is_set() {
        ResetCause::SOFTWARE
    } else if chip.had_run().bit_is_set() || chip.had_psm_restart().bit_is_set() {
        ResetCause::EXTERNAL
    } else {
        ResetCause::SOFTWARE
    };
    diag.take_reset_cause(hardware)
}

/// The entry word must be plausible and the vector table must point into
/// the application and RAM.
pub fn application_is_valid<F: FlashDriver>(flash: &mut F) -> bool {
    let entry = flash.read_word(LAYOUT.entry_address);
    if !LAYOUT.is_plausible_entry(entry) {
        return false;
    }
    VectorTable::read(flash, LAYOUT.app_start).is_valid_for_xip_execution()
}

/// Hand control to the application's vector table at `app_addr`.
///
/// # Safety
/// The vector table at `app_addr` must have passed [`application_is_valid`].
/// Peripherals must still be in their reset state.
pub unsafe fn jump_to_application<F: FlashDriver>(flash: &mut F, app_addr: u32) -> ! {
    let vt = VectorTable::read(flash, app_addr);

    prepare_for_handoff();
    relocate_vector_table(app_addr);
    jump(vt.initial_sp, vt.reset_vector);
}

unsafe fn prepare_for_handoff() {
    cortex_m::interrupt::disable();

    // Clear pending, then disable, every NVIC line
    const NVIC_ICPR: *mut u32 = 0xE000_E280 as *mut u32;
    NVIC_ICPR.write_volatile(0xFFFF_FFFF);
    const NVIC_ICER: *mut u32 = 0xE000_E180 as *mut u32;
    NVIC_ICER.write_volatile(0xFFFF_FFFF);
}

unsafe fn relocate_vector_table(addr: u32) {
    const SCB_VTOR: *mut u32 = 0xE000_ED08 as *mut u32;
    SCB_VTOR.write_volatile(addr);

    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

unsafe fn jump(initial_sp: u32, reset_vector: u32) -> ! {
    core::arch::asm!(
        "msr msp, {sp}",
        "cpsie i",
        "bx {reset}",
        sp = in(reg) initial_sp,
        reset = in(reg) reset_vector,
        options(noreturn)
    );
}

/// Reset the chip, marking the reset as requested.
pub fn reset(diag: &mut PersistentDiagnostics) -> ! {
    diag.mark_reset_request();
    cortex_m::peripheral::SCB::sys_reset();
}
