// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Intel HEX record parsing.
//!
//! A record line has the shape `:LLAAAATT[DD...]CC`. Every field is a pair of
//! ASCII hex digits. Parsing is all-or-nothing: a record either decodes
//! completely with a matching checksum or is rejected without side effects.

use core::fmt;

use heapless::Vec;

/// Leading character of every record line.
pub const RECORD_MARKER: u8 = b':';

/// Largest payload accepted in one record.
pub const MAX_RECORD_DATA: usize = 64;

/// Byte count, two address bytes, record type and checksum.
const RECORD_OVERHEAD: usize = 5;

/// Characters in the longest accepted record line, marker included.
pub const MAX_RECORD_LINE: usize = 1 + 2 * (MAX_RECORD_DATA + RECORD_OVERHEAD);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordType {
    Data,
    EndOfFile,
    ExtendedSegmentAddress,
    StartSegmentAddress,
    ExtendedLinearAddress,
    StartLinearAddress,
}

impl RecordType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Data),
            0x01 => Some(Self::EndOfFile),
            0x02 => Some(Self::ExtendedSegmentAddress),
            0x03 => Some(Self::StartSegmentAddress),
            0x04 => Some(Self::ExtendedLinearAddress),
            0x05 => Some(Self::StartLinearAddress),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Data => 0x00,
            Self::EndOfFile => 0x01,
            Self::ExtendedSegmentAddress => 0x02,
            Self::StartSegmentAddress => 0x03,
            Self::ExtendedLinearAddress => 0x04,
            Self::StartLinearAddress => 0x05,
        }
    }
}

/// Structural problems with a record line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FormatError {
    MissingMarker,
    InvalidDigit { position: usize },
    OddLength,
    TooShort,
    TooLong,
    LengthMismatch { byte_count: u8, actual: usize },
    UnknownRecordType(u8),
    BadAddressPayload { len: usize },
}

/// Why a record line was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    Format(FormatError),
    Checksum { expected: u8, computed: u8 },
}

impl From<FormatError> for DecodeError {
    fn from(err: FormatError) -> Self {
        Self::Format(err)
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingMarker => write!(f, "line does not start with ':'"),
            Self::InvalidDigit { position } => write!(f, "invalid hex digit at column {}", position),
            Self::OddLength => write!(f, "odd number of hex digits"),
            Self::TooShort => write!(f, "record shorter than its header"),
            Self::TooLong => write!(f, "record payload exceeds {} bytes", MAX_RECORD_DATA),
            Self::LengthMismatch { byte_count, actual } => {
                write!(f, "byte count {} but {} payload bytes", byte_count, actual)
            }
            Self::UnknownRecordType(t) => write!(f, "unknown record type 0x{:02X}", t),
            Self::BadAddressPayload { len } => {
                write!(f, "address record carries {} bytes instead of 2", len)
            }
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Format(err) => write!(f, "format error: {}", err),
            Self::Checksum { expected, computed } => write!(
                f,
                "checksum mismatch: line says 0x{:02X}, computed 0x{:02X}",
                expected, computed
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FormatError {}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

/// One decoded record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HexRecord {
    pub byte_count: u8,
    /// Low 16 bits of the load address, as written in the line.
    pub address: u16,
    pub record_type: RecordType,
    pub data: Vec<u8, MAX_RECORD_DATA>,
    pub checksum: u8,
}

impl HexRecord {
    /// Decode one record line (without line terminator).
    pub fn parse(line: &[u8]) -> Result<Self, DecodeError> {
        let (&marker, digits) = line.split_first().ok_or(FormatError::MissingMarker)?;
        if marker != RECORD_MARKER {
            return Err(FormatError::MissingMarker.into());
        }
        if digits.len() % 2 != 0 {
            return Err(FormatError::OddLength.into());
        }

        let mut bytes: Vec<u8, { MAX_RECORD_DATA + RECORD_OVERHEAD }> = Vec::new();
        for (i, pair) in digits.chunks_exact(2).enumerate() {
            let byte = decode_pair(pair).ok_or(FormatError::InvalidDigit {
                position: 1 + i * 2,
            })?;
            bytes.push(byte).map_err(|_| FormatError::TooLong)?;
        }
        if bytes.len() < RECORD_OVERHEAD {
            return Err(FormatError::TooShort.into());
        }

        let (body, &[checksum]) = bytes.split_at(bytes.len() - 1) else {
            return Err(FormatError::TooShort.into());
        };
        let computed = checksum_of(body);
        if computed != checksum {
            return Err(DecodeError::Checksum {
                expected: checksum,
                computed,
            });
        }

        let byte_count = body[0];
        let payload = &body[4..];
        if payload.len() != byte_count as usize {
            return Err(FormatError::LengthMismatch {
                byte_count,
                actual: payload.len(),
            }
            .into());
        }

        let record_type =
            RecordType::from_u8(body[3]).ok_or(FormatError::UnknownRecordType(body[3]))?;
        if matches!(
            record_type,
            RecordType::ExtendedLinearAddress | RecordType::ExtendedSegmentAddress
        ) && payload.len() != 2
        {
            return Err(FormatError::BadAddressPayload { len: payload.len() }.into());
        }

        let mut data = Vec::new();
        data.extend_from_slice(payload)
            .map_err(|_| FormatError::TooLong)?;

        Ok(Self {
            byte_count,
            address: u16::from_be_bytes([body[1], body[2]]),
            record_type,
            data,
            checksum,
        })
    }

    /// Payload of an address record as a big-endian 16-bit value.
    pub fn address_payload(&self) -> Option<u16> {
        match self.data[..] {
            [hi, lo] => Some(u16::from_be_bytes([hi, lo])),
            _ => None,
        }
    }
}

/// Two's complement of the byte sum, as carried in the last field of a record.
pub fn checksum_of(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b))
        .wrapping_neg()
}

/// Checksum a record with the given fields would carry.
pub fn record_checksum(record_type: RecordType, address: u16, data: &[u8]) -> u8 {
    let [hi, lo] = address.to_be_bytes();
    let header = [data.len() as u8, hi, lo, record_type.as_u8()];
    header
        .iter()
        .chain(data)
        .fold(0u8, |acc, &b| acc.wrapping_add(b))
        .wrapping_neg()
}

fn decode_pair(pair: &[u8]) -> Option<u8> {
    match pair {
        [hi, lo] => Some((nibble(*hi)? << 4) | nibble(*lo)?),
        _ => None,
    }
}

fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nibble_accepts_both_cases() {
        assert_eq!(decode_pair(b"aF"), Some(0xAF));
        assert_eq!(decode_pair(b"Af"), Some(0xAF));
        assert_eq!(decode_pair(b"g0"), None);
    }

    #[test]
    fn test_eof_checksum() {
        assert_eq!(record_checksum(RecordType::EndOfFile, 0, &[]), 0xFF);
    }

    #[test]
    fn test_extended_linear_checksum() {
        // :020000040000FA
        assert_eq!(
            record_checksum(RecordType::ExtendedLinearAddress, 0, &[0x00, 0x00]),
            0xFA
        );
    }

    #[test]
    fn test_parse_rejects_empty_line() {
        assert_eq!(
            HexRecord::parse(b""),
            Err(DecodeError::Format(FormatError::MissingMarker))
        );
    }
}
