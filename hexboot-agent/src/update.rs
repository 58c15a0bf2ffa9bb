// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Agent mode: USB CDC line protocol until a command ends the session.
//!
//! With an entry window the agent first waits for host activity. If none
//! arrives, the handoff policy decides between staying resident and a
//! reset into the application.

use crate::boot;
use crate::flash::RomFlash;
use crate::peripherals::{self, Peripherals, TimerClock};
use crate::usb_transport::UsbTransport;
use embedded_hal::digital::{OutputPin, StatefulOutputPin};
use hexboot_common::agent::{self, WindowOutcome};
use hexboot_common::handoff::{self, BootEntry, HandoffDecision};
use hexboot_common::{Dispatcher, PersistentDiagnostics, SessionExit};
use rp2040_hal as hal;
use usb_device::class_prelude::UsbBusAllocator;

/// LED toggle period while no host is connected.
const IDLE_BLINK_MS: u64 = 250;

/// Run the agent. Never returns: every exit is a reset.
pub fn enter_agent_mode(
    p: &mut Peripherals,
    flash: &mut RomFlash,
    diag: &mut PersistentDiagnostics,
    entry: &BootEntry,
    window_ms: Option<u32>,
) -> ! {
    defmt::println!("Agent mode");

    hexboot_common::blink(&mut p.led_pin, &mut p.timer, 10, 50);

    let Some(mut usb) = p.usb.take() else {
        defmt::println!("USB peripherals already taken");
        boot::reset(diag);
    };
    let usb_bus = peripherals::store_usb_bus(UsbBusAllocator::new(hal::usb::UsbBus::new(
        usb.regs,
        usb.dpram,
        usb.clock,
        true,
        &mut usb.resets,
    )));
    let mut transport = match UsbTransport::new(usb_bus) {
        Ok(transport) => transport,
        Err(_) => {
            defmt::println!("USB device setup failed");
            boot::reset(diag);
        }
    };

    let mut clock = TimerClock::new(p.timer);
    let mut dispatcher = Dispatcher::new(boot::LAYOUT);
    defmt::println!("USB CDC initialized");

    if let Some(window_ms) = window_ms {
        defmt::println!("Waiting {} ms for the host", window_ms);
        match agent::run_entry_window(
            &mut dispatcher,
            &mut transport,
            flash,
            diag,
            &mut clock,
            window_ms,
        ) {
            WindowOutcome::HostActivity => defmt::println!("Host connected, staying resident"),
            WindowOutcome::Exit(exit) => finish(exit, &mut transport, p, diag),
            WindowOutcome::Expired => {
                match handoff::on_window_expired(entry, diag, &boot::HANDOFF) {
                    HandoffDecision::ResetIntoApplication => {
                        defmt::println!("Window expired, starting application");
                        finish(SessionExit::JumpToApplication, &mut transport, p, diag);
                    }
                    _ => defmt::println!("Window expired, staying resident"),
                }
            }
        }
    }

    run_resident(&mut dispatcher, &mut transport, flash, diag, &mut clock, p)
}

fn run_resident(
    dispatcher: &mut Dispatcher,
    transport: &mut UsbTransport,
    flash: &mut RomFlash,
    diag: &mut PersistentDiagnostics,
    clock: &mut TimerClock,
    p: &mut Peripherals,
) -> ! {
    use hexboot_common::{Monotonic, Transport};

    let mut last_toggle = clock.now_ms();
    loop {
        if let Some(exit) = agent::service(dispatcher, transport, flash, diag) {
            finish(exit, transport, p, diag);
        }

        // Solid LED with a host attached, blinking otherwise
        if transport.is_session_active() {
            p.led_pin.set_high().ok();
        } else if clock.now_ms().saturating_sub(last_toggle) >= IDLE_BLINK_MS {
            last_toggle = clock.now_ms();
            p.led_pin.toggle().ok();
        }
    }
}

fn finish(
    exit: SessionExit,
    transport: &mut UsbTransport,
    p: &mut Peripherals,
    diag: &mut PersistentDiagnostics,
) -> ! {
    defmt::println!("Session exit: {}", exit);
    agent::prepare_reset(exit, transport, &mut p.timer);
    boot::reset(diag)
}
