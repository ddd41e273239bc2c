//! Error types.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use thiserror::Error;

/// Errors produced by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The transport failed; the dispatcher is no longer usable.
    #[error("transport failed: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    /// An outbound payload exceeded the configured `maxPayloadSize`.
    #[error("payload of {len} bytes exceeds maxPayloadSize of {max}")]
    PayloadTooLarge {
        /// The length of the rejected payload.
        len: usize,
        /// The configured maximum.
        max: usize,
    },
    /// The peer closed the stream before it was established.
    #[error("peer rejected the open request")]
    OpenRejected,
    /// The operation was attempted on a stream that is already closed.
    #[error("stream is closed")]
    StreamClosed,
    /// The dispatcher was disposed while the operation was in flight.
    #[error("dispatcher was disposed")]
    Disposed,
    /// An inbound packet had fields that cannot be interpreted.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

/// Convenience alias for `Result<T, Error>`.
pub type Result<T, E = Error> = std::result::Result<T, E>;
