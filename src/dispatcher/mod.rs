//! The public dispatcher handle.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

pub(crate) mod inner;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::debug;

use crate::config::DispatcherConfig;
use crate::dupe::Dupe;
use crate::error::Error;
use crate::hook::IncomingStreamHook;
use crate::packet::Command;
use crate::stream::Stream;
use crate::transport::PacketTransport;
use inner::{Shared, StreamEntry};

/// Owns the transport, the stream table, and the pending-open table; the
/// entry point for both sides of the multiplexed ADB connection.
///
/// Cloning a `Dispatcher` is cheap (it is an `Arc` handle to the same
/// shared state); every clone observes the same streams and the same
/// `disconnected`/error signals.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").field("shared", &self.shared).finish()
    }
}

impl Dispatcher {
    /// Start the dispatcher over an already-authenticated `transport`,
    /// spawning the tasks that drive its inbound and outbound halves.
    ///
    /// `hook` is invoked synchronously whenever the peer sends `OPEN`; see
    /// [`crate::hook::IncomingOpen`] for how to accept or reject it. Use
    /// [`crate::hook::reject_all`] to refuse every incoming stream.
    pub fn new<T: PacketTransport>(
        transport: T,
        config: DispatcherConfig,
        hook: IncomingStreamHook,
    ) -> Self {
        let (tx_frame_tx, frame_rx) = mpsc::unbounded_channel();
        let shared = Shared::new(tx_frame_tx, config, hook);
        let (sink, stream) = transport.split();
        tokio::spawn(Arc::clone(&shared).run_reader(stream));
        tokio::spawn(Arc::clone(&shared).run_writer(sink, frame_rx));
        Self { shared }
    }

    /// Open a new logical stream to `service_string` (e.g. `"shell:ls"`).
    ///
    /// Resolves once the peer acknowledges the `OPEN` with its remote id,
    /// or fails with [`Error::OpenRejected`] if the peer closes it instead.
    pub async fn create_stream(&self, service_string: impl Into<String>) -> Result<Stream, Error> {
        if self.shared.is_disconnected() {
            return Err(Error::Disposed);
        }
        let service_string = service_string.into();
        let local_id = self.shared.allocator.alloc();
        let open_rx = self.shared.tables.lock().pending.add(local_id);

        let mut payload = service_string.clone().into_bytes();
        if self.shared.config.append_null_to_service_string {
            payload.push(0);
        }
        if let Err(e) = self
            .shared
            .send_packet(Command::Open, local_id, 0, Bytes::from(payload))
        {
            self.shared.tables.lock().pending.reject(local_id, Error::Disposed);
            self.shared.allocator.release(local_id);
            return Err(e);
        }

        let remote_id = match open_rx.await {
            Ok(Ok(remote_id)) => remote_id,
            Ok(Err(e)) => {
                self.shared.allocator.release(local_id);
                return Err(e);
            }
            Err(_) => {
                self.shared.allocator.release(local_id);
                return Err(Error::Disposed);
            }
        };

        let closed = Arc::new(AtomicBool::new(false));
        let (data_tx, data_rx) = mpsc::channel(self.shared.config.stream_buffer_capacity);
        self.shared.tables.lock().streams.insert(
            local_id,
            StreamEntry {
                remote_id,
                data_tx,
                closed: closed.dupe(),
                pending_ack: None,
            },
        );
        debug!(local_id, remote_id, service = %service_string, "opened stream");
        Ok(Stream::new(
            local_id,
            remote_id,
            service_string,
            true,
            data_rx,
            closed,
            self.shared.dupe(),
        ))
    }

    /// Subscribe to asynchronous error notifications (transport failures,
    /// tolerated protocol violations).
    #[must_use]
    pub fn subscribe_errors(&self) -> broadcast::Receiver<Arc<Error>> {
        self.shared.subscribe_errors()
    }

    /// Resolves once the dispatcher has terminated, for any reason. Carries
    /// no error; see [`Dispatcher::subscribe_errors`] for the cause.
    pub async fn disconnected(&self) {
        let mut rx = self.shared.subscribe_disconnected();
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }

    /// Whether the dispatcher has already terminated.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.shared.is_disconnected()
    }

    /// Tear the dispatcher down: every stream is disposed, every pending
    /// write/read/open fails, and `disconnected` resolves. Idempotent.
    pub fn dispose(&self) {
        self.shared.dispose();
    }
}
