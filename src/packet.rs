//! The in-memory form of an ADB wire packet.
//!
//! Header parsing, checksum verification on receive, and the USB/TCP
//! framing itself live outside this crate: a [`Packet`] is what a transport
//! hands the dispatcher after decoding, and what the dispatcher hands back
//! to be re-encoded and sent.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use bytes::Bytes;

/// The ADB commands this crate's dispatcher understands.
///
/// `SYNC`, `CNXN`, and `AUTH` are part of the wire protocol but belong to the
/// connection handshake, which happens before a [`crate::Dispatcher`] is
/// constructed; they pass through [`Command::Other`] untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Request to open a new logical stream.
    Open,
    /// Acknowledge a `WRTE`, or the peer accepting our `OPEN`.
    Okay,
    /// Close a logical stream, or reject an `OPEN`.
    Clse,
    /// A chunk of stream payload.
    Wrte,
    /// `SYNC`, `CNXN`, `AUTH`, or any other command outside this crate's scope.
    Other(u32),
}

impl Command {
    /// The 32-bit wire identifier for well-known commands, for transports
    /// that need to re-encode a [`Packet`].
    #[must_use]
    pub fn wire_id(self) -> u32 {
        match self {
            // 'OPEN', 'OKAY', 'CLSE', 'WRTE' in little-endian ASCII, matching
            // the layout every ADB implementation uses on the wire.
            Self::Open => 0x4e45_504f,
            Self::Okay => 0x59414b4f,
            Self::Clse => 0x45534c43,
            Self::Wrte => 0x45545257,
            Self::Other(id) => id,
        }
    }
}

/// A single ADB packet, after header parsing and before re-encoding.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Which command this packet carries.
    pub command: Command,
    /// First argument; meaning depends on `command` (see module docs on
    /// [`crate::dispatcher`]).
    pub arg0: u32,
    /// Second argument; meaning depends on `command`.
    pub arg1: u32,
    /// The payload, empty for `OKAY`/`CLSE`.
    pub payload: Bytes,
    /// `0` unless `calculateChecksum` is configured, in which case this is
    /// [`checksum`] of `payload` as computed by `sendPacket`.
    pub checksum: u32,
}

impl Packet {
    /// Construct a new packet with the given fields and a zero checksum.
    #[must_use]
    pub fn new(command: Command, arg0: u32, arg1: u32, payload: Bytes) -> Self {
        Self {
            command,
            arg0,
            arg1,
            payload,
            checksum: 0,
        }
    }
}

/// Sum the payload bytes into a 32-bit checksum, matching the pre-v2 ADB
/// wire format. Ignored by v2+ transports, which this crate does not
/// distinguish beyond the `calculate_checksum` config flag that decides
/// whether to compute it at all.
#[must_use]
pub fn checksum(payload: &[u8]) -> u32 {
    payload.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32))
}

/// Decode a service string from an inbound `OPEN` payload: UTF-8, with an
/// optional trailing NUL (pre-Android-9 peers null-terminate) stripped.
pub fn decode_service_string(payload: &[u8]) -> Result<String, std::str::Utf8Error> {
    let bytes = match payload.split_last() {
        Some((0, rest)) => rest,
        _ => payload,
    };
    std::str::from_utf8(bytes).map(str::to_owned)
}
