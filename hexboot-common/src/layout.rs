// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Program memory geometry and the address policy derived from it.
//!
//! All addresses handled here are *native* addresses: the unit the target's
//! program counter counts in. Image files address bytes; the ratio between the
//! two is part of the layout, as is the shape of a program word inside a HEX
//! data record.

/// Program words per flash row (the granularity of one `write_row`).
pub const ROW_WORDS: usize = 64;

// --- RP2040 memory map ---

pub const RP2040_FLASH_BASE: u32 = 0x1000_0000;
pub const RP2040_APP_ADDR: u32 = 0x1001_0000;
pub const RP2040_APP_SIZE: u32 = 768 * 1024;
pub const RP2040_SECTOR_SIZE: u32 = 4096;
pub const RP2040_PAGE_SIZE: u32 = 256;

/// Fixed RAM window holding [`crate::diagnostics::PersistentDiagnostics`].
/// Neither the agent's nor the application's RAM region may cover it.
pub const DIAGNOSTICS_ADDR: u32 = 0x2003_BF00;

/// Immutable flash geometry and application address range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashLayout {
    /// First native address of the application region.
    pub app_start: u32,
    /// Last native address of the application region (inclusive).
    pub app_end: u32,
    /// Word inspected to decide whether an application is installed.
    pub entry_address: u32,
    /// Erase page size in native units.
    pub page_units: u32,
    /// Native units occupied by one program word.
    pub units_per_word: u32,
    /// Image byte address divided by this gives the native address.
    pub image_bytes_per_unit: u32,
    /// Bits of a decoded 4-byte group that carry program data.
    pub value_mask: u32,
    /// Content of an erased program word.
    pub erased_word: u32,
}

impl FlashLayout {
    /// PIC24FJ64GB002: 24-bit instructions, 2 PC units each, stored in HEX
    /// files as 4 bytes whose top byte is a phantom pad.
    pub const PIC24FJ64GB002: Self = Self {
        app_start: 0x4000,
        app_end: 0xABFE,
        entry_address: 0x4000,
        page_units: 1024,
        units_per_word: 2,
        image_bytes_per_unit: 2,
        value_mask: 0x00FF_FFFF,
        erased_word: 0x00FF_FFFF,
    };

    /// RP2040 XIP flash: byte addressed, 32-bit words, no phantom byte.
    /// The entry word is the reset vector of the application's vector table.
    pub const RP2040: Self = Self {
        app_start: RP2040_APP_ADDR,
        app_end: RP2040_APP_ADDR + RP2040_APP_SIZE - 1,
        entry_address: RP2040_APP_ADDR + 4,
        page_units: RP2040_SECTOR_SIZE,
        units_per_word: 4,
        image_bytes_per_unit: 1,
        value_mask: 0xFFFF_FFFF,
        erased_word: 0xFFFF_FFFF,
    };

    /// Native units covered by one row.
    pub const fn row_span(&self) -> u32 {
        ROW_WORDS as u32 * self.units_per_word
    }

    /// Row-aligned base of the row containing `address`.
    pub const fn row_base(&self, address: u32) -> u32 {
        address - address % self.row_span()
    }

    /// Slot of `address` inside the row starting at `base`.
    pub const fn row_index(&self, base: u32, address: u32) -> usize {
        ((address - base) / self.units_per_word) as usize
    }

    pub const fn contains(&self, address: u32) -> bool {
        address >= self.app_start && address <= self.app_end
    }

    /// Whether a row starting at `base` may be programmed.
    pub const fn contains_row(&self, base: u32) -> bool {
        self.contains(base)
    }

    /// Program bytes carried by one word (3 for a phantom-padded word).
    pub const fn value_bytes(&self) -> u32 {
        (32 - self.value_mask.leading_zeros()).div_ceil(8)
    }

    /// Start address of every erase page in the application region.
    pub fn page_addresses(&self) -> impl Iterator<Item = u32> {
        (self.app_start..=self.app_end).step_by(self.page_units as usize)
    }

    /// Erased or zeroed memory never holds a usable entry point.
    pub const fn is_plausible_entry(&self, word: u32) -> bool {
        let word = word & self.value_mask;
        word != self.erased_word & self.value_mask && word != self.value_mask && word != 0
    }
}
