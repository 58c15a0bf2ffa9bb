// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Abstract program-memory driver consumed by the update engine.

use core::fmt;

use crate::layout::ROW_WORDS;

/// A failed erase or program operation. The engine never retries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    Erase { address: u32 },
    Write { address: u32 },
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Erase { address } => write!(f, "erase failed at 0x{:06X}", address),
            Self::Write { address } => write!(f, "row write failed at 0x{:06X}", address),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FlashError {}

/// Erase/program/read primitives of the target's program memory.
///
/// Addresses are native addresses as defined by the active
/// [`FlashLayout`](crate::layout::FlashLayout).
pub trait FlashDriver {
    /// Erase the page starting at `address`.
    fn erase_page(&mut self, address: u32) -> Result<(), FlashError>;

    /// Program one full row. `base` is row-aligned.
    fn write_row(&mut self, base: u32, row: &[u32; ROW_WORDS]) -> Result<(), FlashError>;

    /// Read back one program word.
    fn read_word(&mut self, address: u32) -> u32;
}
