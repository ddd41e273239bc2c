//! The duplex channel of decoded packets the dispatcher consumes.
//!
//! USB and TCP framing, header parsing, and checksum verification on
//! receive all happen below this trait; the dispatcher only ever sees
//! already-decoded [`Packet`]s.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use crate::packet::Packet;
use futures_util::{Sink, Stream};

/// A framed, full-duplex channel of ADB [`Packet`]s.
///
/// Blanket-implemented for anything that is both a [`Stream`] of decoded
/// inbound packets and a [`Sink`] for outbound ones; a USB or TCP transport
/// driver implements this by wrapping its own framing around the wire
/// format.
pub trait PacketTransport:
    Stream<Item = std::io::Result<Packet>> + Sink<Packet, Error = std::io::Error> + Send + Unpin + 'static
{
}

impl<T> PacketTransport for T where
    T: Stream<Item = std::io::Result<Packet>> + Sink<Packet, Error = std::io::Error> + Send + Unpin + 'static
{
}
