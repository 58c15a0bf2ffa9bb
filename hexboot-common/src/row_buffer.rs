// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Row-granular write coalescing in front of a [`FlashDriver`].
//!
//! The flash primitive programs whole aligned rows, while HEX records deliver
//! a handful of words at a time. Words are collected into the single row
//! buffer until a write targets another row, then the buffered row is written
//! in one operation. Slots never written keep the erased fill value.

use crate::flash::{FlashDriver, FlashError};
use crate::layout::{FlashLayout, ROW_WORDS};

pub struct FlashRowBuffer {
    layout: FlashLayout,
    base: Option<u32>,
    words: [u32; ROW_WORDS],
    high_water: u16,
    rows_written: u32,
}

impl FlashRowBuffer {
    pub fn new(layout: FlashLayout) -> Self {
        Self {
            layout,
            base: None,
            words: [layout.erased_word; ROW_WORDS],
            high_water: 0,
            rows_written: 0,
        }
    }

    /// Base address of the row being assembled, if any.
    pub fn pending_base(&self) -> Option<u32> {
        self.base
    }

    /// One past the highest slot written in the pending row.
    pub fn high_water(&self) -> u16 {
        self.high_water
    }

    pub fn words(&self) -> &[u32; ROW_WORDS] {
        &self.words
    }

    /// Rows handed to the flash driver since creation.
    pub fn rows_written(&self) -> u32 {
        self.rows_written
    }

    /// Store `value` at native `address`, flushing the pending row first when
    /// the address belongs to a different row.
    pub fn write_word<F: FlashDriver>(
        &mut self,
        flash: &mut F,
        address: u32,
        value: u32,
    ) -> Result<(), FlashError> {
        let base = self.layout.row_base(address);
        if self.base != Some(base) {
            self.flush(flash)?;
            self.words = [self.layout.erased_word; ROW_WORDS];
            self.base = Some(base);
        }

        let index = self.layout.row_index(base, address);
        self.words[index] = value;
        if index as u16 >= self.high_water {
            self.high_water = index as u16 + 1;
        }
        Ok(())
    }

    /// Write out the pending row, if any. Rows outside the application
    /// region are dropped. The pending state is cleared even when the write
    /// fails.
    pub fn flush<F: FlashDriver>(&mut self, flash: &mut F) -> Result<(), FlashError> {
        let Some(base) = self.base.take() else {
            return Ok(());
        };

        let fill = self.layout.erased_word;
        for slot in &mut self.words[self.high_water as usize..] {
            *slot = fill;
        }
        self.high_water = 0;

        if !self.layout.contains_row(base) {
            return Ok(());
        }
        flash.write_row(base, &self.words)?;
        self.rows_written += 1;
        Ok(())
    }

    /// Forget the pending row without writing it.
    pub fn discard(&mut self) {
        self.base = None;
        self.high_water = 0;
        self.words = [self.layout.erased_word; ROW_WORDS];
    }
}
