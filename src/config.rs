//! Dispatcher configuration.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

/// Default `maxPayloadSize` for ADB protocol v2+ transports.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 256 * 1024;

/// `maxPayloadSize` for pre-v2 transports, kept around for callers that
/// negotiate the older protocol.
pub const LEGACY_MAX_PAYLOAD_SIZE: usize = 4096;

/// How many inbound `WRTE` payloads a stream's read queue buffers before
/// `enqueue` starts exerting backpressure on the dispatcher's inbound loop.
pub const DEFAULT_STREAM_BUFFER_CAPACITY: usize = 16;

/// Tunables for a [`crate::Dispatcher`].
///
/// Everything here is a wire-compatibility or resource knob; there is no
/// on-disk configuration format, matching this crate's "no persisted state"
/// interface.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// Whether to compute and emit payload checksums on outbound packets,
    /// for wire compatibility with pre-v2 ADB peers.
    pub calculate_checksum: bool,
    /// Whether outbound service strings get a trailing NUL, for
    /// compatibility with pre-Android-9 daemons that parse with C string
    /// semantics.
    pub append_null_to_service_string: bool,
    /// Hard upper bound for any outbound payload.
    pub max_payload_size: usize,
    /// Bound on each stream's inbound read queue.
    pub stream_buffer_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            calculate_checksum: false,
            append_null_to_service_string: false,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            stream_buffer_capacity: DEFAULT_STREAM_BUFFER_CAPACITY,
        }
    }
}
