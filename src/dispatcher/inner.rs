//! The protocol state machine: table of live streams, pending opens, and the
//! inbound/outbound task pair that drive them.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Notify};
use tracing::{debug, error, trace, warn};

use crate::config::DispatcherConfig;
use crate::dupe::Dupe;
use crate::error::Error;
use crate::hook::{IncomingOpen, IncomingStreamHook};
use crate::packet::{checksum, decode_service_string, Command, Packet};
use crate::pending::PendingOpenTable;
use crate::stream::Stream;
use crate::stream_id::StreamIdAllocator;
use crate::transport::PacketTransport;

/// The dispatcher-facing half of an established stream's state, reached
/// through `Shared::tables`. The application-facing half is [`Stream`],
/// which shares `closed` with this entry via `Arc`.
pub(crate) struct StreamEntry {
    pub remote_id: u32,
    pub data_tx: mpsc::Sender<Bytes>,
    pub closed: Arc<AtomicBool>,
    pub pending_ack: Option<oneshot::Sender<()>>,
}

/// The two tables behind one lock, so that a `localId` is structurally
/// unable to appear in both at once.
#[derive(Default)]
pub(crate) struct Tables {
    pub streams: HashMap<u32, StreamEntry>,
    pub pending: PendingOpenTable,
}

/// Shared dispatcher state, reached through an `Arc` by the public
/// [`crate::Dispatcher`] handle, every live [`Stream`], and the inbound and
/// outbound tasks.
pub(crate) struct Shared {
    pub tx_frame_tx: mpsc::UnboundedSender<Packet>,
    pub tables: Mutex<Tables>,
    pub allocator: StreamIdAllocator,
    pub config: DispatcherConfig,
    hook: IncomingStreamHook,
    disposed: AtomicBool,
    shutdown: Notify,
    disconnected_tx: watch::Sender<bool>,
    error_tx: broadcast::Sender<Arc<Error>>,
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("config", &self.config)
            .field("disposed", &self.disposed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Shared {
    pub(crate) fn new(
        tx_frame_tx: mpsc::UnboundedSender<Packet>,
        config: DispatcherConfig,
        hook: IncomingStreamHook,
    ) -> Arc<Self> {
        let (disconnected_tx, _) = watch::channel(false);
        let (error_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            tx_frame_tx,
            tables: Mutex::new(Tables::default()),
            allocator: StreamIdAllocator::new(),
            config,
            hook,
            disposed: AtomicBool::new(false),
            shutdown: Notify::new(),
            disconnected_tx,
            error_tx,
        })
    }

    pub(crate) fn subscribe_errors(&self) -> broadcast::Receiver<Arc<Error>> {
        self.error_tx.subscribe()
    }

    pub(crate) fn subscribe_disconnected(&self) -> watch::Receiver<bool> {
        self.disconnected_tx.subscribe()
    }

    pub(crate) fn is_disconnected(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Build and send a packet. Enforces `maxPayloadSize` and applies the
    /// configured checksum; the actual write happens on the writer task that
    /// drains `tx_frame_tx`, so this never blocks.
    pub(crate) fn send_packet(
        &self,
        command: Command,
        arg0: u32,
        arg1: u32,
        payload: Bytes,
    ) -> Result<(), Error> {
        if payload.len() > self.config.max_payload_size {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: self.config.max_payload_size,
            });
        }
        let mut packet = Packet::new(command, arg0, arg1, payload);
        if self.config.calculate_checksum {
            packet.checksum = checksum(&packet.payload);
        }
        self.tx_frame_tx
            .send(packet)
            .map_err(|_| Error::Disposed)?;
        Ok(())
    }

    fn publish_error(&self, error: Error) {
        let _ = self.error_tx.send(Arc::new(error));
    }

    /// Idempotent teardown: every live stream is disposed, every pending
    /// open fails, the tables are cleared, and `disconnected` resolves.
    pub(crate) fn dispose(self: &Arc<Self>) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("disposing dispatcher");
        let (streams, pendings) = {
            let mut tables = self.tables.lock();
            (
                std::mem::take(&mut tables.streams),
                tables.pending.drain(),
            )
        };
        for (local_id, entry) in streams {
            entry.closed.store(true, Ordering::Release);
            self.allocator.release(local_id);
            // Dropping `entry` drops `data_tx` (readers see EOF) and
            // `pending_ack` (a blocked writer's oneshot fails).
        }
        for tx in pendings {
            let _ = tx.send(Err(Error::Disposed));
        }
        self.shutdown.notify_waiters();
        let _ = self.disconnected_tx.send(true);
    }

    /// Process one inbound packet, dispatching to the per-command handler.
    async fn process_packet(self: &Arc<Self>, packet: Packet) {
        trace!(command = ?packet.command, arg0 = packet.arg0, arg1 = packet.arg1, "inbound packet");
        match packet.command {
            Command::Okay => self.handle_okay(packet.arg0, packet.arg1),
            Command::Clse => self.handle_clse(packet.arg0, packet.arg1),
            Command::Wrte => self.handle_wrte(packet.arg0, packet.arg1, packet.payload).await,
            Command::Open => self.handle_open(packet.arg0, packet.payload),
            Command::Other(id) => trace!(id, "ignoring packet outside dispatcher scope"),
        }
    }

    /// `OKAY(arg0=remoteId, arg1=localId)`.
    fn handle_okay(&self, remote_id: u32, local_id: u32) {
        let stream_exists = {
            let mut tables = self.tables.lock();
            if tables.pending.resolve(local_id, remote_id) {
                return;
            }
            match tables.streams.get_mut(&local_id) {
                Some(entry) => {
                    // A write may or may not be in flight; acking is a no-op
                    // if `local_id` sent no `WRTE` awaiting this `OKAY`.
                    if let Some(tx) = entry.pending_ack.take() {
                        let _ = tx.send(());
                    }
                    true
                }
                None => false,
            }
        };
        if !stream_exists {
            warn!(local_id, remote_id, "stale OKAY, telling peer to forget it");
            let _ = self.send_packet(Command::Clse, 0, remote_id, Bytes::new());
        }
    }

    /// `CLSE(arg0=remoteId, arg1=localId)`.
    fn handle_clse(self: &Arc<Self>, remote_id: u32, local_id: u32) {
        if remote_id == 0 {
            let rejected = self.tables.lock().pending.reject(local_id, Error::OpenRejected);
            if rejected {
                return;
            }
            // Historic peers send `CLSE(0, ...)` for ordinary closes too;
            // fall through to the established-stream path below.
        }
        let entry = self.tables.lock().streams.remove(&local_id);
        let Some(entry) = entry else {
            return;
        };
        if !entry.closed.swap(true, Ordering::AcqRel) {
            let _ = self.send_packet(Command::Clse, local_id, entry.remote_id, Bytes::new());
        }
        self.allocator.release(local_id);
        debug!(local_id, remote_id, "stream closed by peer");
        // `entry` drops here: `data_tx` drop signals EOF, `pending_ack` drop
        // fails any writer awaiting an ack that will never come.
    }

    /// `WRTE(arg0=remoteId, arg1=localId)`.
    async fn handle_wrte(&self, remote_id: u32, local_id: u32, payload: Bytes) {
        let found = {
            let tables = self.tables.lock();
            tables
                .streams
                .get(&local_id)
                .map(|entry| (entry.data_tx.dupe(), entry.closed.dupe()))
        };
        let Some((data_tx, closed)) = found else {
            trace!(local_id, "WRTE for unknown stream, ignoring");
            return;
        };
        if data_tx.send(payload).await.is_err() {
            // The application dropped its `Stream`; the table-removal path
            // (`close`/`handle_clse`/`dispose`) already did the cleanup.
            return;
        }
        // The stream may have been closed while we were suspended waiting
        // for the application to drain its read queue; don't ack in that case.
        if !closed.load(Ordering::Acquire) {
            let _ = self.send_packet(Command::Okay, local_id, remote_id, Bytes::new());
        }
    }

    /// `OPEN(arg0=remoteId, arg1=0, payload=serviceString)`.
    fn handle_open(self: &Arc<Self>, remote_id: u32, payload: Bytes) {
        let service_string = match decode_service_string(&payload) {
            Ok(s) => s,
            Err(e) => {
                warn!(remote_id, %e, "OPEN with non-UTF-8 service string");
                self.publish_error(Error::ProtocolViolation(format!(
                    "OPEN service string is not valid UTF-8: {e}"
                )));
                let _ = self.send_packet(Command::Clse, 0, remote_id, Bytes::new());
                return;
            }
        };
        let local_id = self.allocator.alloc();
        let closed = Arc::new(AtomicBool::new(false));
        let (data_tx, data_rx) = mpsc::channel(self.config.stream_buffer_capacity);
        let stream = Stream::new(
            local_id,
            remote_id,
            service_string.clone(),
            false,
            data_rx,
            closed.dupe(),
            self.dupe(),
        );
        let mut event = IncomingOpen {
            service_string,
            stream: Some(stream),
            handled: false,
        };
        (self.hook)(&mut event);
        if event.handled {
            debug!(local_id, remote_id, service = %event.service_string, "accepted incoming stream");
            let entry = StreamEntry {
                remote_id,
                data_tx,
                closed,
                pending_ack: None,
            };
            self.tables.lock().streams.insert(local_id, entry);
            let _ = self.send_packet(Command::Okay, local_id, remote_id, Bytes::new());
        } else {
            debug!(local_id, remote_id, "rejected incoming stream");
            self.allocator.release(local_id);
            let _ = self.send_packet(Command::Clse, 0, remote_id, Bytes::new());
            // `event.stream`, if still present, drops here; `Stream::drop`
            // calls `close()`, which is a no-op since it was never inserted.
        }
    }

    /// Drives the inbound half: reads packets until the transport ends or
    /// errors, then disposes the dispatcher.
    pub(crate) async fn run_reader<T: PacketTransport>(
        self: Arc<Self>,
        mut reader: SplitStream<T>,
    ) {
        loop {
            if self.disposed.load(Ordering::Acquire) {
                break;
            }
            tokio::select! {
                biased;
                () = self.shutdown.notified() => break,
                item = reader.next() => match item {
                    Some(Ok(packet)) => self.process_packet(packet).await,
                    Some(Err(e)) => {
                        error!(%e, "transport read failed");
                        self.publish_error(Error::Transport(Box::new(e)));
                        break;
                    }
                    None => {
                        debug!("transport closed by peer");
                        break;
                    }
                },
            }
        }
        self.dispose();
    }

    /// Drives the outbound half: the sole owner of the transport's write
    /// side, draining the shared outbound queue in order.
    pub(crate) async fn run_writer<T: PacketTransport>(
        self: Arc<Self>,
        mut sink: SplitSink<T, Packet>,
        mut frame_rx: mpsc::UnboundedReceiver<Packet>,
    ) {
        loop {
            if self.disposed.load(Ordering::Acquire) {
                break;
            }
            tokio::select! {
                biased;
                () = self.shutdown.notified() => break,
                packet = frame_rx.recv() => match packet {
                    Some(packet) => {
                        if let Err(e) = sink.send(packet).await {
                            error!(%e, "transport write failed");
                            self.publish_error(Error::Transport(Box::new(e)));
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        let _ = sink.close().await;
        self.dispose();
    }
}
