//! A packet dispatcher and socket multiplexor for the Android Debug Bridge
//! (ADB) wire protocol.
//!
//! ADB carries many logical byte streams (`shell:`, `sync:`, `reboot:`, ...)
//! over one full-duplex transport (a USB bulk endpoint pair or a TCP
//! socket). [`Dispatcher`] is the state machine that demultiplexes inbound
//! packets to the right stream, arbitrates stream establishment in both
//! directions, enforces the per-stream `OKAY` stop-and-wait acknowledgment
//! discipline, and tears streams down cleanly on either side's close.
//!
//! This crate does not implement a transport (USB/TCP framing), packet
//! header parsing, or any service protocol built on top of a [`Stream`]
//! (shell, sync, reverse forwarding). It starts from an already-decoded,
//! already-authenticated [`transport::PacketTransport`].
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later
#![warn(missing_docs, missing_debug_implementations)]
#![forbid(unsafe_code)]

pub mod config;
mod dispatcher;
mod dupe;
pub mod error;
pub mod hook;
pub mod packet;
mod pending;
mod stream;
mod stream_id;
pub mod transport;

pub use config::DispatcherConfig;
pub use dispatcher::Dispatcher;
pub use dupe::Dupe;
pub use error::{Error, Result};
pub use hook::{reject_all, IncomingOpen, IncomingStreamHook};
pub use packet::{Command, Packet};
pub use stream::Stream;
pub use transport::PacketTransport;
