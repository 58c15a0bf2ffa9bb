// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Byte-stream link to the host and the clock the agent runs against.

/// Host link (USB CDC on the reference board).
pub trait Transport {
    /// Copy pending received bytes into `buf` and return how many were copied.
    fn read_available(&mut self, buf: &mut [u8]) -> usize;

    /// Whether the link can take more outgoing bytes right now.
    fn write_ready(&mut self) -> bool;

    /// Queue bytes for transmission. Returns how many were accepted.
    fn write(&mut self, bytes: &[u8]) -> usize;

    /// A host is connected and has the port open.
    fn is_session_active(&mut self) -> bool;

    /// Service the link (USB stack housekeeping).
    fn poll(&mut self) {}

    /// Drop off the bus so the host sees a disconnect.
    fn detach(&mut self) {}
}

/// Monotonic millisecond clock.
pub trait Monotonic {
    fn now_ms(&mut self) -> u64;
}

/// Send a complete line, waiting for the link as needed.
///
/// Returns `false` if the session went away before every byte was accepted;
/// the rest of the line is dropped in that case.
pub fn send_line<T: Transport>(transport: &mut T, bytes: &[u8]) -> bool {
    let mut remaining = bytes;
    while !remaining.is_empty() {
        if !transport.is_session_active() {
            return false;
        }
        if !transport.write_ready() {
            transport.poll();
            continue;
        }
        let written = transport.write(remaining);
        remaining = &remaining[written.min(remaining.len())..];
        transport.poll();
    }
    true
}
