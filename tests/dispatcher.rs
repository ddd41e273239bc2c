//! End-to-end tests against a pair of in-memory transports.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use adb_mux::hook::reject_all;
use adb_mux::{Command, Dispatcher, DispatcherConfig, Error, IncomingOpen, Packet};
use bytes::Bytes;
use futures_util::{Sink, Stream};
use tokio::sync::mpsc;

/// An in-memory half-duplex pair of `Packet` channels standing in for a
/// real USB/TCP transport, so both ends of an ADB connection can be driven
/// in one test process.
struct MemTransport {
    tx: mpsc::UnboundedSender<Packet>,
    rx: mpsc::UnboundedReceiver<Packet>,
}

fn transport_pair() -> (MemTransport, MemTransport) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        MemTransport { tx: a_tx, rx: a_rx },
        MemTransport { tx: b_tx, rx: b_rx },
    )
}

impl Stream for MemTransport {
    type Item = std::io::Result<Packet>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|opt| opt.map(Ok))
    }
}

impl Sink<Packet> for MemTransport {
    type Error = std::io::Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Packet) -> Result<(), Self::Error> {
        self.tx
            .send(item)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer dropped"))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// A hook that accepts every incoming stream and hands it to the caller
/// through an `mpsc` channel, so the test can drive it from outside the
/// dispatcher's reader task.
fn accept_into(sender: mpsc::UnboundedSender<adb_mux::Stream>) -> adb_mux::hook::IncomingStreamHook {
    Box::new(move |event: &mut IncomingOpen| {
        if let Some(stream) = event.stream.take() {
            event.handled = true;
            let _ = sender.send(stream);
        }
    })
}

#[tokio::test]
async fn local_open_is_accepted_and_can_write_and_read() {
    let (a_transport, b_transport) = transport_pair();
    let a = Dispatcher::new(a_transport, DispatcherConfig::default(), reject_all());

    let (accepted_tx, mut accepted_rx) = mpsc::unbounded_channel();
    let _b = Dispatcher::new(
        b_transport,
        DispatcherConfig::default(),
        accept_into(accepted_tx),
    );

    let mut local_stream = a.create_stream("shell:echo hi").await.unwrap();
    assert_eq!(local_stream.service_string(), "shell:echo hi");
    assert!(local_stream.created_locally());

    let mut remote_stream = accepted_rx.recv().await.unwrap();
    assert_eq!(remote_stream.service_string(), "shell:echo hi");
    assert!(!remote_stream.created_locally());

    local_stream.write(Bytes::from_static(b"ping")).await.unwrap();
    let received = remote_stream.read().await.unwrap();
    assert_eq!(&received[..], b"ping");

    remote_stream.write(Bytes::from_static(b"pong")).await.unwrap();
    let received = local_stream.read().await.unwrap();
    assert_eq!(&received[..], b"pong");
}

#[tokio::test]
async fn local_open_is_rejected_when_hook_declines() {
    let (a_transport, b_transport) = transport_pair();
    let a = Dispatcher::new(a_transport, DispatcherConfig::default(), reject_all());
    let _b = Dispatcher::new(b_transport, DispatcherConfig::default(), reject_all());

    let err = a.create_stream("shell:nope").await.unwrap_err();
    assert!(matches!(err, Error::OpenRejected));
}

#[tokio::test]
async fn write_completes_only_after_peer_acknowledges() {
    let (a_transport, b_transport) = transport_pair();
    let a = Dispatcher::new(a_transport, DispatcherConfig::default(), reject_all());

    let (accepted_tx, mut accepted_rx) = mpsc::unbounded_channel();
    let _b = Dispatcher::new(
        b_transport,
        DispatcherConfig::default(),
        accept_into(accepted_tx),
    );

    let local_stream = a.create_stream("sync:").await.unwrap();
    let mut remote_stream = accepted_rx.recv().await.unwrap();

    // A second write must not race onto the wire before the first is acked:
    // the peer reads exactly one chunk per `write()` call, in order.
    let write_order = Arc::new(Mutex::new(Vec::new()));
    let order_1 = Arc::clone(&write_order);
    let order_2 = Arc::clone(&write_order);

    let w1 = {
        let local_stream = &local_stream;
        async move {
            local_stream.write(Bytes::from_static(b"one")).await.unwrap();
            order_1.lock().unwrap().push("one");
        }
    };
    let w2 = {
        let local_stream = &local_stream;
        async move {
            local_stream.write(Bytes::from_static(b"two")).await.unwrap();
            order_2.lock().unwrap().push("two");
        }
    };

    let reader = async {
        let first = remote_stream.read().await.unwrap();
        assert_eq!(&first[..], b"one");
        let second = remote_stream.read().await.unwrap();
        assert_eq!(&second[..], b"two");
    };

    tokio::join!(w1, w2, reader);
    assert_eq!(*write_order.lock().unwrap(), vec!["one", "two"]);
}

#[tokio::test]
async fn stale_okay_is_tolerated_and_does_not_panic() {
    let (a_transport, b_transport) = transport_pair();
    let a = Dispatcher::new(a_transport, DispatcherConfig::default(), reject_all());

    // Drive the peer side directly instead of through a `Dispatcher`, so we
    // can inject a stray `OKAY` for a local id that was never opened.
    let MemTransport { tx: peer_tx, mut rx: peer_rx } = b_transport;
    peer_tx
        .send(Packet::new(Command::Okay, 99, 1, Bytes::new()))
        .unwrap();

    // The dispatcher must reply with a `CLSE` telling the peer to forget the
    // id, not panic or wedge.
    let reply = peer_rx.recv().await.unwrap();
    assert!(matches!(reply.command, Command::Clse));
    assert!(!a.is_disconnected());
}

#[tokio::test]
async fn dispose_is_idempotent_and_fails_pending_operations() {
    let (a_transport, b_transport) = transport_pair();
    let a = Dispatcher::new(a_transport, DispatcherConfig::default(), reject_all());
    let _b = Dispatcher::new(b_transport, DispatcherConfig::default(), reject_all());

    a.dispose();
    a.dispose(); // must not panic or double-run teardown

    assert!(a.is_disconnected());
    let err = a.create_stream("shell:ls").await.unwrap_err();
    assert!(matches!(err, Error::Disposed));

    a.disconnected().await; // already resolved; must not hang
}

#[tokio::test]
async fn closing_a_stream_is_idempotent() {
    let (a_transport, b_transport) = transport_pair();
    let a = Dispatcher::new(a_transport, DispatcherConfig::default(), reject_all());

    let (accepted_tx, mut accepted_rx) = mpsc::unbounded_channel();
    let _b = Dispatcher::new(
        b_transport,
        DispatcherConfig::default(),
        accept_into(accepted_tx),
    );

    let local_stream = a.create_stream("shell:ls").await.unwrap();
    let mut remote_stream = accepted_rx.recv().await.unwrap();

    local_stream.close();
    local_stream.close(); // no-op, must not panic

    assert!(remote_stream.read().await.is_none());
}

#[tokio::test]
async fn peer_initiated_open_reaches_the_hook() {
    let (a_transport, b_transport) = transport_pair();
    let a = Dispatcher::new(a_transport, DispatcherConfig::default(), reject_all());

    let (accepted_tx, mut accepted_rx) = mpsc::unbounded_channel();
    let b = Dispatcher::new(
        b_transport,
        DispatcherConfig::default(),
        accept_into(accepted_tx),
    );

    // `b` never calls create_stream itself; the peer (`a`) initiates, and
    // `b`'s hook is what decides whether the stream is handed to the app.
    let _ = b.subscribe_errors();
    let local_stream = a.create_stream("reverse:forward").await.unwrap();
    let remote_stream = accepted_rx.recv().await.unwrap();
    assert!(!remote_stream.created_locally());
    assert_eq!(local_stream.service_string(), "reverse:forward");
}

#[tokio::test]
async fn oversized_payload_is_rejected_locally() {
    let (a_transport, b_transport) = transport_pair();
    let a = Dispatcher::new(
        a_transport,
        DispatcherConfig {
            max_payload_size: 4,
            ..DispatcherConfig::default()
        },
        reject_all(),
    );
    let (accepted_tx, mut accepted_rx) = mpsc::unbounded_channel();
    let _b = Dispatcher::new(
        b_transport,
        DispatcherConfig::default(),
        accept_into(accepted_tx),
    );

    // `a`'s service string ("x:") must itself fit under its own
    // `maxPayloadSize` for this test to isolate the write-path check.
    let stream = a.create_stream("x:").await.unwrap();
    let _ = accepted_rx.recv().await.unwrap();

    let err = stream.write(Bytes::from_static(b"too big")).await.unwrap_err();
    assert!(matches!(err, Error::PayloadTooLarge { .. }));
}

#[test]
fn command_wire_ids_match_the_ascii_layout() {
    assert_eq!(Command::Open.wire_id(), 0x4e45_504f);
    assert_eq!(Command::Okay.wire_id(), 0x59414b4f);
    assert_eq!(Command::Clse.wire_id(), 0x45534c43);
    assert_eq!(Command::Wrte.wire_id(), 0x45545257);
}
