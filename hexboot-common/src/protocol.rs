// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Line protocol shared by the agent and the host tool.
//!
//! Every command is one ASCII line terminated by CR and/or LF; the first
//! character selects the command. Every reply is one line: a status character
//! followed by an optional message, terminated by CRLF. The version reply is
//! the only line without a status character.

use core::fmt::{self, Write};

use heapless::String;

use crate::diagnostics::DiagnosticsSnapshot;
use crate::hex::MAX_RECORD_LINE;

/// Reported by the `V` command.
pub const VERSION_STRING: &str = "BLv1.2";

/// Longest command line kept; extra characters are dropped. A record with
/// the largest accepted payload must fit.
pub const LINE_CAPACITY: usize = MAX_RECORD_LINE;

/// Bytes pulled from the transport per poll.
pub const READ_CHUNK: usize = 64;

pub const LINE_END: &str = "\r\n";

// Reply messages
pub const MSG_ERASED: &str = "Erased";
pub const MSG_ERASE_FAILED: &str = "Erase failed";
pub const MSG_HEX_ERROR: &str = "HEX error";
pub const MSG_WRITE_FAILED: &str = "Write failed";
pub const MSG_BAD_STATE: &str = "Bad state";
pub const MSG_JUMPING: &str = "Jumping...";
pub const MSG_RESETTING: &str = "Resetting...";
pub const MSG_UNKNOWN: &str = "Unknown command";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    ReadVersion,
    ReadFlash,
    WriteFlash,
    EraseFlash,
    Verify,
    JumpToApp,
    Reset,
    HexRecord,
}

impl Command {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'V' => Some(Self::ReadVersion),
            b'R' => Some(Self::ReadFlash),
            b'W' => Some(Self::WriteFlash),
            b'E' => Some(Self::EraseFlash),
            b'C' => Some(Self::Verify),
            b'J' => Some(Self::JumpToApp),
            b'X' => Some(Self::Reset),
            b':' => Some(Self::HexRecord),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::ReadVersion => b'V',
            Self::ReadFlash => b'R',
            Self::WriteFlash => b'W',
            Self::EraseFlash => b'E',
            Self::Verify => b'C',
            Self::JumpToApp => b'J',
            Self::Reset => b'X',
            Self::HexRecord => b':',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    Ok,
    Error,
    Unknown,
}

impl Status {
    pub fn as_char(self) -> char {
        match self {
            Self::Ok => '+',
            Self::Error => '-',
            Self::Unknown => '?',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Self::Ok),
            '-' => Some(Self::Error),
            '?' => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// One outgoing reply, terminator included.
pub type ResponseLine = String<LINE_CAPACITY>;

/// `<status><message>\r\n`. An empty message yields a bare status line.
pub fn format_response(status: Status, message: &str) -> ResponseLine {
    let mut line = ResponseLine::new();
    // Messages are short constants; capacity is never exceeded.
    let _ = write!(line, "{}{}{}", status.as_char(), message, LINE_END);
    line
}

/// `<version> <snapshot>\r\n`.
pub fn format_version(snapshot: &DiagnosticsSnapshot) -> ResponseLine {
    let mut line = ResponseLine::new();
    let _ = write!(line, "{} {}{}", VERSION_STRING, snapshot, LINE_END);
    line
}

/// Totals reported by a successful `C`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UploadStats {
    pub bytes_written: u32,
    pub pages_erased: u32,
}

impl UploadStats {
    /// Parse the message of a verify reply: `OK: N bytes, M pages`.
    pub fn parse(message: &str) -> Option<Self> {
        let rest = message.trim().strip_prefix("OK:")?.trim_start();
        let (bytes, rest) = rest.split_once(" bytes, ")?;
        let pages = rest.strip_suffix(" pages")?;
        Some(Self {
            bytes_written: bytes.parse().ok()?,
            pages_erased: pages.parse().ok()?,
        })
    }
}

impl fmt::Display for UploadStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OK: {} bytes, {} pages",
            self.bytes_written, self.pages_erased
        )
    }
}

/// A reply line as seen by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reply<'a> {
    /// `None` for data lines such as the version reply.
    pub status: Option<Status>,
    pub message: &'a str,
}

impl<'a> Reply<'a> {
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut chars = line.chars();
        match chars.next().and_then(Status::from_char) {
            Some(status) => Self {
                status: Some(status),
                message: chars.as_str(),
            },
            None => Self {
                status: None,
                message: line,
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Some(Status::Ok)
    }
}
