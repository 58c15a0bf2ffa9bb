// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Intel HEX image loading and pre-flight checks.
//!
//! The agent consumes records line by line, so the image is kept as the list
//! of record lines found in the file. Every line is checked up front with the
//! same parser the agent runs, and the file as a whole with `ihex`, so a
//! malformed image is rejected before anything is erased.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use crc::{Crc, CRC_32_ISO_HDLC};

use hexboot_common::hex::{HexRecord, RecordType};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// A parsed image ready to be streamed.
#[derive(Debug)]
pub struct HexImage {
    /// Record lines in file order, without terminators.
    pub records: Vec<String>,
    pub data_records: usize,
    pub data_bytes: usize,
    /// Lowest and highest absolute byte address carrying data.
    pub address_range: Option<(u32, u32)>,
    /// CRC-32 over the data payloads in file order.
    pub crc32: u32,
}

pub fn load(path: &Path) -> Result<HexImage> {
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    parse(&text).with_context(|| format!("Invalid HEX file {}", path.display()))
}

pub fn parse(text: &str) -> Result<HexImage> {
    let mut records = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if !line.starts_with(':') {
            if !line.is_empty() {
                tracing::warn!("Skipping line {}: not a record", number + 1);
            }
            continue;
        }
        HexRecord::parse(line.as_bytes())
            .map_err(|e| anyhow::anyhow!("line {}: {}", number + 1, e))?;
        records.push(line.to_string());
    }
    if records.is_empty() {
        bail!("No records found");
    }

    let mut digest = CRC32.digest();
    let mut data_records = 0;
    let mut data_bytes = 0;
    let mut address_range: Option<(u32, u32)> = None;
    let mut upper_address = 0u32;
    let mut saw_eof = false;

    let joined = records.join("\n");
    for record in ihex::Reader::new(&joined) {
        match record.context("Record rejected")? {
            ihex::Record::Data { offset, value } => {
                let start = upper_address.wrapping_add(u32::from(offset));
                let end = start.wrapping_add(value.len().saturating_sub(1) as u32);
                address_range = Some(match address_range {
                    Some((lo, hi)) => (lo.min(start), hi.max(end)),
                    None => (start, end),
                });
                digest.update(&value);
                data_records += 1;
                data_bytes += value.len();
            }
            ihex::Record::ExtendedLinearAddress(addr) => upper_address = u32::from(addr) << 16,
            ihex::Record::ExtendedSegmentAddress(addr) => upper_address = u32::from(addr) << 4,
            ihex::Record::EndOfFile => {
                saw_eof = true;
            }
            ihex::Record::StartSegmentAddress { .. } | ihex::Record::StartLinearAddress(_) => {}
        }
    }
    if !saw_eof {
        tracing::warn!("Image has no end-of-file record");
    }

    Ok(HexImage {
        records,
        data_records,
        data_bytes,
        address_range,
        crc32: digest.finalize(),
    })
}

/// Record type and payload length of a line, for progress reporting.
pub fn describe(line: &str) -> Option<(RecordType, usize)> {
    HexRecord::parse(line.as_bytes())
        .ok()
        .map(|record| (record.record_type, record.data.len()))
}
