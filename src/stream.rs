//! The per-stream handle exposed to the application.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::dispatcher::inner::Shared;
use crate::error::Error;
use crate::packet::Command;

/// A single logical ADB stream, multiplexed over the dispatcher's transport.
///
/// `read`/`write`/`close` are the application-facing surface described in
/// the crate docs; the dispatcher-facing counterparts (`enqueue`/`ack`) live
/// on [`Shared`] and act directly on the table entry this stream shares its
/// `closed` flag with.
#[derive(Debug)]
pub struct Stream {
    pub(crate) local_id: u32,
    pub(crate) remote_id: u32,
    service_string: String,
    created_locally: bool,
    data_rx: mpsc::Receiver<Bytes>,
    closed: Arc<AtomicBool>,
    shared: Arc<Shared>,
    write_lock: tokio::sync::Mutex<()>,
}

impl Stream {
    pub(crate) fn new(
        local_id: u32,
        remote_id: u32,
        service_string: String,
        created_locally: bool,
        data_rx: mpsc::Receiver<Bytes>,
        closed: Arc<AtomicBool>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            local_id,
            remote_id,
            service_string,
            created_locally,
            data_rx,
            closed,
            shared,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// This side's id for the stream.
    #[must_use]
    pub fn local_id(&self) -> u32 {
        self.local_id
    }

    /// The peer's id for the stream.
    #[must_use]
    pub fn remote_id(&self) -> u32 {
        self.remote_id
    }

    /// The service string that opened this stream, e.g. `"shell:ls"`.
    #[must_use]
    pub fn service_string(&self) -> &str {
        &self.service_string
    }

    /// Whether this side originated the `OPEN` (`true`) or the peer did
    /// (`false`).
    #[must_use]
    pub fn created_locally(&self) -> bool {
        self.created_locally
    }

    /// Whether the stream has been torn down, locally or by the peer.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Read the next queued payload, or `None` once the stream is closed
    /// and no more data is queued.
    pub async fn read(&mut self) -> Option<Bytes> {
        self.data_rx.recv().await
    }

    /// Enqueue `chunk` for transmission. Resolves once the peer has
    /// acknowledged it (the ADB stop-and-wait discipline), so at most one
    /// `WRTE` for this stream is ever in flight.
    pub async fn write(&self, chunk: Bytes) -> Result<(), Error> {
        if chunk.len() > self.shared.config.max_payload_size {
            return Err(Error::PayloadTooLarge {
                len: chunk.len(),
                max: self.shared.config.max_payload_size,
            });
        }
        if self.is_closed() {
            return Err(Error::StreamClosed);
        }
        // Hold the gate for the whole send-then-await-ack sequence so that
        // a second concurrent writer queues behind the first instead of
        // racing it onto the wire.
        let _gate = self.write_lock.lock().await;
        let ack_rx = {
            let mut tables = self.shared.tables.lock();
            let entry = tables
                .streams
                .get_mut(&self.local_id)
                .ok_or(Error::StreamClosed)?;
            let (tx, rx) = oneshot::channel();
            entry.pending_ack = Some(tx);
            rx
        };
        self.shared
            .send_packet(Command::Wrte, self.local_id, self.remote_id, chunk)?;
        ack_rx.await.map_err(|_| Error::StreamClosed)
    }

    /// Initiate teardown. Idempotent: a second call is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let entry = self.shared.tables.lock().streams.remove(&self.local_id);
        if let Some(entry) = entry {
            trace!(local_id = self.local_id, "closing stream locally");
            let _ = self
                .shared
                .send_packet(Command::Clse, self.local_id, entry.remote_id, Bytes::new());
            self.shared.allocator.release(self.local_id);
        }
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.close();
    }
}
