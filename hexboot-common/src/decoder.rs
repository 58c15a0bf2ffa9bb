// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Applies decoded HEX records to program memory.
//!
//! Data records are split into 4-byte groups, one program word each, stored
//! little-endian in the image. A trailing group shorter than 4 bytes is
//! ignored. Words landing outside the application region are skipped.

use core::fmt;

use crate::flash::{FlashDriver, FlashError};
use crate::hex::{DecodeError, HexRecord, RecordType};
use crate::layout::FlashLayout;
use crate::row_buffer::FlashRowBuffer;

/// Image bytes consumed per program word.
pub const GROUP_BYTES: usize = 4;

/// Effect of one applied record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordOutcome {
    /// Data record; `words` program words were stored.
    Data { words: u16 },
    /// End-of-file record; the pending row was flushed.
    EndOfFile,
    /// Extended address register updated.
    AddressChanged,
    /// Start address records carry nothing to program.
    Ignored,
}

/// Failure while processing one record line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoadError {
    Decode(DecodeError),
    Flash(FlashError),
}

impl From<DecodeError> for LoadError {
    fn from(err: DecodeError) -> Self {
        Self::Decode(err)
    }
}

impl From<FlashError> for LoadError {
    fn from(err: FlashError) -> Self {
        Self::Flash(err)
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(err) => write!(f, "{}", err),
            Self::Flash(err) => write!(f, "{}", err),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LoadError {}

pub struct RecordDecoder {
    layout: FlashLayout,
    extended_address: u32,
}

impl RecordDecoder {
    pub fn new(layout: FlashLayout) -> Self {
        Self {
            layout,
            extended_address: 0,
        }
    }

    pub fn extended_address(&self) -> u32 {
        self.extended_address
    }

    pub fn reset(&mut self) {
        self.extended_address = 0;
    }

    /// Parse `line` and apply it. Nothing is modified when parsing fails.
    pub fn process_line<F: FlashDriver>(
        &mut self,
        line: &[u8],
        rows: &mut FlashRowBuffer,
        flash: &mut F,
    ) -> Result<RecordOutcome, LoadError> {
        let record = HexRecord::parse(line)?;
        Ok(self.apply(&record, rows, flash)?)
    }

    pub fn apply<F: FlashDriver>(
        &mut self,
        record: &HexRecord,
        rows: &mut FlashRowBuffer,
        flash: &mut F,
    ) -> Result<RecordOutcome, FlashError> {
        match record.record_type {
            RecordType::Data => self.store_data(record, rows, flash),
            RecordType::EndOfFile => {
                rows.flush(flash)?;
                Ok(RecordOutcome::EndOfFile)
            }
            RecordType::ExtendedLinearAddress => {
                self.extended_address = u32::from(record.address_payload().unwrap_or(0)) << 16;
                Ok(RecordOutcome::AddressChanged)
            }
            RecordType::ExtendedSegmentAddress => {
                self.extended_address = u32::from(record.address_payload().unwrap_or(0)) << 4;
                Ok(RecordOutcome::AddressChanged)
            }
            RecordType::StartSegmentAddress | RecordType::StartLinearAddress => {
                Ok(RecordOutcome::Ignored)
            }
        }
    }

    fn store_data<F: FlashDriver>(
        &mut self,
        record: &HexRecord,
        rows: &mut FlashRowBuffer,
        flash: &mut F,
    ) -> Result<RecordOutcome, FlashError> {
        let layout = self.layout;
        let byte_address = self.extended_address.wrapping_add(u32::from(record.address));
        let native = byte_address / layout.image_bytes_per_unit;

        let mut words = 0u16;
        for (i, group) in record.data.chunks_exact(GROUP_BYTES).enumerate() {
            let address = native.wrapping_add(i as u32 * layout.units_per_word);
            if !layout.contains(address) {
                continue;
            }
            let value = u32::from_le_bytes([group[0], group[1], group[2], group[3]]);
            rows.write_word(flash, address, value & layout.value_mask)?;
            words += 1;
        }

        Ok(RecordOutcome::Data { words })
    }
}
