// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! [`FlashDriver`] backed by the RP2040 ROM flash routines.
//!
//! Erase and program need XIP torn down, so every instruction between
//! `connect_internal_flash` and `flash_enter_cmd_xip` must run from RAM. The
//! wrappers live in `.data` and call ROM function pointers resolved once in
//! [`RomFlash::new`].

use hexboot_common::layout::{RP2040_FLASH_BASE, RP2040_PAGE_SIZE, RP2040_SECTOR_SIZE};
use hexboot_common::{FlashDriver, FlashError, ROW_WORDS};

type RomFnVoid = unsafe extern "C" fn();
type RomFnErase = unsafe extern "C" fn(u32, usize, u32, u8);
type RomFnProgram = unsafe extern "C" fn(u32, *const u8, usize);

const SECTOR_ERASE_CMD: u8 = 0x20;

static mut ROM_CONNECT_INTERNAL_FLASH: RomFnVoid = dummy_void;
static mut ROM_FLASH_EXIT_XIP: RomFnVoid = dummy_void;
static mut ROM_FLASH_RANGE_ERASE: RomFnErase = dummy_erase;
static mut ROM_FLASH_RANGE_PROGRAM: RomFnProgram = dummy_program;
static mut ROM_FLASH_FLUSH_CACHE: RomFnVoid = dummy_void;
static mut ROM_FLASH_ENTER_CMD_XIP: RomFnVoid = dummy_void;

unsafe extern "C" fn dummy_void() {}
unsafe extern "C" fn dummy_erase(_: u32, _: usize, _: u32, _: u8) {}
unsafe extern "C" fn dummy_program(_: u32, _: *const u8, _: usize) {}

/// Look up a ROM function by its two-character tag.
unsafe fn rom_func_lookup(tag: &[u8; 2]) -> usize {
    let fn_table = *(0x14 as *const u16) as *const u16;
    let lookup: unsafe extern "C" fn(*const u16, u32) -> usize =
        core::mem::transmute::<usize, unsafe extern "C" fn(*const u16, u32) -> usize>(
            *(0x18 as *const u16) as usize,
        );
    lookup(fn_table, u16::from_le_bytes(*tag) as u32)
}

#[link_section = ".data"]
#[inline(never)]
unsafe fn erase_sector(offset: u32) {
    cortex_m::interrupt::disable();
    ROM_CONNECT_INTERNAL_FLASH();
    ROM_FLASH_EXIT_XIP();
    ROM_FLASH_RANGE_ERASE(
        offset,
        RP2040_SECTOR_SIZE as usize,
        RP2040_SECTOR_SIZE,
        SECTOR_ERASE_CMD,
    );
    ROM_FLASH_FLUSH_CACHE();
    ROM_FLASH_ENTER_CMD_XIP();
    cortex_m::interrupt::enable();
}

#[link_section = ".data"]
#[inline(never)]
unsafe fn program_page(offset: u32, data: *const u8, len: usize) {
    cortex_m::interrupt::disable();
    ROM_CONNECT_INTERNAL_FLASH();
    ROM_FLASH_EXIT_XIP();
    ROM_FLASH_RANGE_PROGRAM(offset, data, len);
    ROM_FLASH_FLUSH_CACHE();
    ROM_FLASH_ENTER_CMD_XIP();
    cortex_m::interrupt::enable();
}

fn read_volatile_word(address: u32) -> u32 {
    unsafe { (address as *const u32).read_volatile() }
}

/// Program memory of the on-board QSPI flash.
///
/// Writes are read back; a mismatch is reported as a write failure.
pub struct RomFlash {
    _private: (),
}

impl RomFlash {
    /// Resolve the ROM routines. Lookups read the ROM table, so XIP must
    /// still be active.
    pub fn new() -> Self {
        unsafe {
            ROM_CONNECT_INTERNAL_FLASH =
                core::mem::transmute::<usize, RomFnVoid>(rom_func_lookup(b"IF"));
            ROM_FLASH_EXIT_XIP = core::mem::transmute::<usize, RomFnVoid>(rom_func_lookup(b"EX"));
            ROM_FLASH_RANGE_ERASE =
                core::mem::transmute::<usize, RomFnErase>(rom_func_lookup(b"RE"));
            ROM_FLASH_RANGE_PROGRAM =
                core::mem::transmute::<usize, RomFnProgram>(rom_func_lookup(b"RP"));
            ROM_FLASH_FLUSH_CACHE =
                core::mem::transmute::<usize, RomFnVoid>(rom_func_lookup(b"FC"));
            ROM_FLASH_ENTER_CMD_XIP =
                core::mem::transmute::<usize, RomFnVoid>(rom_func_lookup(b"CX"));
        }
        Self { _private: () }
    }
}

impl FlashDriver for RomFlash {
    fn erase_page(&mut self, address: u32) -> Result<(), FlashError> {
        if address < RP2040_FLASH_BASE || address % RP2040_SECTOR_SIZE != 0 {
            return Err(FlashError::Erase { address });
        }
        unsafe { erase_sector(address - RP2040_FLASH_BASE) };

        if read_volatile_word(address) != u32::MAX {
            return Err(FlashError::Erase { address });
        }
        Ok(())
    }

    fn write_row(&mut self, base: u32, row: &[u32; ROW_WORDS]) -> Result<(), FlashError> {
        if base < RP2040_FLASH_BASE || base % RP2040_PAGE_SIZE != 0 {
            return Err(FlashError::Write { address: base });
        }

        let mut page = [0u8; RP2040_PAGE_SIZE as usize];
        for (bytes, word) in page.chunks_exact_mut(4).zip(row.iter()) {
            bytes.copy_from_slice(&word.to_le_bytes());
        }
        unsafe { program_page(base - RP2040_FLASH_BASE, page.as_ptr(), page.len()) };

        let mismatch = row
            .iter()
            .enumerate()
            .any(|(i, &word)| read_volatile_word(base + i as u32 * 4) != word);
        if mismatch {
            return Err(FlashError::Write { address: base });
        }
        Ok(())
    }

    fn read_word(&mut self, address: u32) -> u32 {
        read_volatile_word(address)
    }
}
