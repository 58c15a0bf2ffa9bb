// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! hexboot agent for RP2040: Intel HEX updates over USB CDC.
//!
//! Phase 1 decides, before any peripheral is initialised, whether this boot
//! jumps into the application. Phase 2 (agent mode) only runs otherwise.

#![no_std]
#![no_main]

mod boot;
mod flash;
mod peripherals;
mod update;
mod usb_transport;

use defmt_rtt as _;
use hexboot_common::handoff::{self, HandoffDecision};
use panic_probe as _;

defmt::timestamp!("{=u64:us}", { 0 });

use cortex_m_rt::entry;

#[link_section = ".boot2"]
#[used]
pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_GENERIC_03H;

#[entry]
fn main() -> ! {
    // Sole reference to the persistent window for the life of the agent
    let diag = unsafe { boot::diagnostics() };
    let cause = boot::read_reset_cause(diag);
    let entry = handoff::begin_boot(diag, cause);

    let mut flash = flash::RomFlash::new();
    let app_valid = boot::application_is_valid(&mut flash);
    let decision = handoff::decide(&entry, diag, app_valid, &boot::HANDOFF);

    defmt::println!(
        "hexboot {}: cause=0x{:04x} {} valid={}",
        hexboot_common::VERSION_STRING,
        cause.bits(),
        entry,
        app_valid
    );

    let window_ms = match decision {
        HandoffDecision::JumpToApplication => {
            defmt::println!("Jumping to application");
            unsafe { boot::jump_to_application(&mut flash, boot::LAYOUT.app_start) }
        }
        HandoffDecision::ResetIntoApplication => boot::reset(diag),
        HandoffDecision::StayResident(reason) => {
            defmt::println!("Staying resident: {}", reason);
            None
        }
        HandoffDecision::WaitForHost { window_ms } => Some(window_ms),
    };

    let Some(mut p) = peripherals::init() else {
        defmt::println!("Clock init failed");
        boot::reset(diag);
    };
    update::enter_agent_mode(&mut p, &mut flash, diag, &entry, window_ms)
}
