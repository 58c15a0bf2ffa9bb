// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Peripheral initialization for agent mode.

use hexboot_common::Monotonic;
use rp2040_hal as hal;
use rp2040_hal::usb::UsbBus;
use usb_device::class_prelude::UsbBusAllocator;

pub type LedPin =
    hal::gpio::Pin<hal::gpio::bank0::Gpio25, hal::gpio::FunctionSioOutput, hal::gpio::PullDown>;

/// Static storage for UsbBusAllocator (required by usb-device for 'static lifetime).
static mut USB_BUS: Option<UsbBusAllocator<UsbBus>> = None;

/// Store the allocator and hand out its `'static` reference.
pub fn store_usb_bus(bus: UsbBusAllocator<UsbBus>) -> &'static UsbBusAllocator<UsbBus> {
    unsafe {
        let slot = &mut *core::ptr::addr_of_mut!(USB_BUS);
        slot.insert(bus)
    }
}

/// Millisecond clock on top of the 1 MHz system timer.
pub struct TimerClock {
    timer: hal::Timer,
}

impl TimerClock {
    pub fn new(timer: hal::Timer) -> Self {
        Self { timer }
    }
}

impl Monotonic for TimerClock {
    fn now_ms(&mut self) -> u64 {
        self.timer.get_counter().ticks() / 1_000
    }
}

pub struct Peripherals {
    pub led_pin: LedPin,
    pub timer: hal::Timer,
    pub usb: Option<UsbPeripherals>,
}

pub struct UsbPeripherals {
    pub regs: hal::pac::USBCTRL_REGS,
    pub dpram: hal::pac::USBCTRL_DPRAM,
    pub clock: hal::clocks::UsbClock,
    pub resets: hal::pac::RESETS,
}

/// Bring up clocks, timer, LED and the USB peripheral handles.
///
/// Returns `None` if the crystal or PLLs fail to lock.
pub fn init() -> Option<Peripherals> {
    let mut pac = unsafe { hal::pac::Peripherals::steal() };

    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);
    let clocks = hal::clocks::init_clocks_and_plls(
        12_000_000u32,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .ok()?;

    let timer = hal::Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);
    let sio = hal::Sio::new(pac.SIO);
    let pins = hal::gpio::Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    Some(Peripherals {
        led_pin: pins.gpio25.into_push_pull_output(),
        timer,
        usb: Some(UsbPeripherals {
            regs: pac.USBCTRL_REGS,
            dpram: pac.USBCTRL_DPRAM,
            clock: clocks.usb_clock,
            resets: pac.RESETS,
        }),
    })
}
