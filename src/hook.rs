//! The application-supplied decision point for peer-initiated streams.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use crate::stream::Stream;

/// An inbound `OPEN` event, handed synchronously to the incoming-stream
/// hook registered with [`crate::Dispatcher::new`].
///
/// Accepting means taking `stream` out and setting `handled = true`;
/// leaving `handled = false` (the default) rejects the request and the
/// dispatcher replies `CLSE(0, remoteId)`.
#[derive(Debug)]
pub struct IncomingOpen {
    /// The decoded, NUL-stripped service string the peer requested.
    pub service_string: String,
    /// The not-yet-inserted stream, if the hook wants to accept it.
    pub stream: Option<Stream>,
    /// Set to `true` to accept the stream.
    pub handled: bool,
}

/// A boxed incoming-stream decision function.
///
/// Invoked synchronously on the dispatcher's inbound task: it must not
/// block, and should hand any accepted [`Stream`] off to another task (e.g.
/// via `tokio::spawn`) rather than servicing it inline.
pub type IncomingStreamHook = Box<dyn Fn(&mut IncomingOpen) + Send + Sync>;

/// An incoming-stream hook that rejects every request. The default when no
/// hook is supplied.
#[must_use]
pub fn reject_all() -> IncomingStreamHook {
    Box::new(|_event: &mut IncomingOpen| {})
}
