// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Sample application started by the hexboot agent.
//!
//! Reports its start-up progress and faults through the persistent
//! diagnostics window and offers a small USB serial console.

#![no_std]
#![no_main]

use core::fmt::Write as _;

use cortex_m_rt::{entry, exception, ExceptionFrame};
use defmt_rtt as _;
use embedded_hal::digital::OutputPin;
use embedded_hal::digital::StatefulOutputPin;
use hexboot_common::app::{self, STAGE_CLOCKS, STAGE_RUNNING, STAGE_USB};
use panic_probe as _;
use rp2040_hal as hal;
use rp2040_hal::usb::UsbBus;
use usb_device::class_prelude::UsbBusAllocator;
use usb_device::prelude::*;
use usbd_serial::SerialPort;

defmt::timestamp!("{=u64:us}", { 0 });

/// Static storage for UsbBusAllocator (required by usb-device for 'static lifetime).
static mut USB_BUS: Option<UsbBusAllocator<UsbBus>> = None;

/// Address outside every mapped region; reading it raises a HardFault.
const UNMAPPED_ADDR: u32 = 0xF000_0000;

enum Action {
    None,
    Bootload,
    Reboot,
}

fn process_command(line: &str, out: &mut heapless::String<256>) -> Action {
    match line.trim() {
        "help" | "?" => {
            let _ = out.push_str(
                "Available commands:\r\n  help     - Show this help\r\n  status   - Show diagnostics\r\n  bootload - Reset into the agent\r\n  reboot   - Restart the application\r\n  fault    - Trigger a HardFault\r\n",
            );
        }
        "status" => {
            let diag = app::read_diagnostics();
            let _ = write!(
                out,
                "{}\r\n  boots={} traps={} last_trap={} stage={}\r\n",
                diag.snapshot(),
                diag.app_boot_count,
                diag.app_trap_count,
                diag.app_trap_code,
                diag.app_stage
            );
        }
        "bootload" => {
            let _ = out.push_str("Rebooting to agent...\r\n");
            return Action::Bootload;
        }
        "reboot" => {
            let _ = out.push_str("Rebooting...\r\n");
            return Action::Reboot;
        }
        "fault" => {
            let _ = unsafe { (UNMAPPED_ADDR as *const u32).read_volatile() };
        }
        "" => {}
        _ => {
            let _ = out.push_str("Unknown command. Type 'help' for available commands.\r\n");
        }
    }
    Action::None
}

#[entry]
fn main() -> ! {
    app::record_boot();
    defmt::println!("Application started");

    let mut pac = unsafe { hal::pac::Peripherals::steal() };

    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);
    let Ok(clocks) = hal::clocks::init_clocks_and_plls(
        12_000_000u32,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    ) else {
        defmt::println!("Clock init failed");
        app::reboot_to_agent();
    };
    app::set_stage(STAGE_CLOCKS);

    let mut timer = hal::Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);
    let sio = hal::Sio::new(pac.SIO);
    let pins = hal::gpio::Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    let mut led_pin = pins.gpio25.into_push_pull_output();
    hexboot_common::blink(&mut led_pin, &mut timer, 5, 100);

    let usb_bus = unsafe {
        let slot = &mut *core::ptr::addr_of_mut!(USB_BUS);
        &*slot.insert(UsbBusAllocator::new(hal::usb::UsbBus::new(
            pac.USBCTRL_REGS,
            pac.USBCTRL_DPRAM,
            clocks.usb_clock,
            true,
            &mut pac.RESETS,
        )))
    };

    let mut serial = SerialPort::new(usb_bus);
    let Ok(builder) = UsbDeviceBuilder::new(usb_bus, UsbVidPid(0x2E8A, 0x000B)).strings(&[
        StringDescriptors::default()
            .manufacturer("ADNT")
            .product("hexboot sample app")
            .serial_number("APP001"),
    ]) else {
        app::reboot_to_agent();
    };
    let mut usb_dev = builder.device_class(usbd_serial::USB_CLASS_CDC).build();
    app::set_stage(STAGE_USB);

    defmt::println!("USB CDC initialized, entering main loop");
    app::set_stage(STAGE_RUNNING);

    let mut cmd_buf: heapless::Vec<u8, 64> = heapless::Vec::new();
    let mut blink_counter = 0u32;

    loop {
        usb_dev.poll(&mut [&mut serial]);

        let mut buf = [0u8; 64];
        if let Ok(count) = serial.read(&mut buf) {
            for &byte in &buf[..count] {
                // Echo character
                let _ = serial.write(&[byte]);

                if byte == b'\r' || byte == b'\n' {
                    let _ = serial.write(b"\r\n");
                    if cmd_buf.is_empty() {
                        continue;
                    }

                    let mut out = heapless::String::<256>::new();
                    let action = match core::str::from_utf8(&cmd_buf) {
                        Ok(line) => process_command(line, &mut out),
                        Err(_) => Action::None,
                    };
                    cmd_buf.clear();
                    let _ = serial.write(out.as_bytes());

                    if !matches!(action, Action::None) {
                        // Flush USB before resetting
                        for _ in 0..100 {
                            usb_dev.poll(&mut [&mut serial]);
                            cortex_m::asm::delay(10_000);
                        }
                        match action {
                            Action::Bootload => app::reboot_to_agent(),
                            _ => app::reboot(),
                        }
                    }
                } else if byte == 0x7F || byte == 0x08 {
                    // Backspace
                    if cmd_buf.pop().is_some() {
                        let _ = serial.write(b"\x08 \x08");
                    }
                } else {
                    let _ = cmd_buf.push(byte);
                }
            }
        }

        // Slow blink LED to show activity
        blink_counter += 1;
        if blink_counter >= 500_000 {
            blink_counter = 0;
            if led_pin.is_set_high().unwrap_or(false) {
                led_pin.set_low().ok();
            } else {
                led_pin.set_high().ok();
            }
        }
    }
}

#[exception]
unsafe fn HardFault(_frame: &ExceptionFrame) -> ! {
    app::trap_reset(app::TRAP_HARD_FAULT);
}

#[exception]
unsafe fn DefaultHandler(_irqn: i16) {
    app::trap_reset(app::TRAP_DEFAULT_HANDLER);
}
