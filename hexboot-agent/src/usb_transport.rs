// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! USB CDC transport for the line protocol.

use hexboot_common::Transport;
use rp2040_hal::pac;
use rp2040_hal::usb::UsbBus;
use usb_device::class_prelude::UsbBusAllocator;
use usb_device::device::BuilderError;
use usb_device::prelude::*;
use usbd_serial::SerialPort;

pub const USB_VID: u16 = 0x2E8A;
pub const USB_PID: u16 = 0x000A;
pub const USB_PRODUCT: &str = "hexboot agent";

pub struct UsbTransport {
    serial: SerialPort<'static, UsbBus>,
    usb_dev: UsbDevice<'static, UsbBus>,
}

impl UsbTransport {
    pub fn new(usb_bus: &'static UsbBusAllocator<UsbBus>) -> Result<Self, BuilderError> {
        let serial = SerialPort::new(usb_bus);
        let usb_dev = UsbDeviceBuilder::new(usb_bus, UsbVidPid(USB_VID, USB_PID))
            .strings(&[StringDescriptors::default()
                .manufacturer("ADNT")
                .product(USB_PRODUCT)
                .serial_number("HB001")])?
            .device_class(usbd_serial::USB_CLASS_CDC)
            .build();

        Ok(Self { serial, usb_dev })
    }
}

impl Transport for UsbTransport {
    fn read_available(&mut self, buf: &mut [u8]) -> usize {
        self.serial.read(buf).unwrap_or(0)
    }

    fn write_ready(&mut self) -> bool {
        self.usb_dev.state() == UsbDeviceState::Configured
    }

    fn write(&mut self, bytes: &[u8]) -> usize {
        // WouldBlock means the endpoint buffer is full
        self.serial.write(bytes).unwrap_or(0)
    }

    fn is_session_active(&mut self) -> bool {
        self.usb_dev.state() == UsbDeviceState::Configured
    }

    fn poll(&mut self) {
        self.usb_dev.poll(&mut [&mut self.serial]);
        let _ = self.serial.flush();
    }

    /// Drop the D+ pull-up so the host sees the device leave.
    fn detach(&mut self) {
        let regs = unsafe { &*pac::USBCTRL_REGS::ptr() };
        regs.sie_ctrl().modify(|_, w| w.pullup_en().clear_bit());
    }
}
