//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info, warn};
use votehub_core::Frame;

use super::broadcast::LifecycleHooks;
use super::connection::ClientConnection;
use super::keepalive::{run_keepalive, KeepaliveOutcome};
use crate::metrics::{WS_CONNECTIONS_TOTAL, WS_CONNECTION_DURATION_SECONDS, WS_DISCONNECTIONS_TOTAL};

/// Per-session tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    /// Interval between keepalive sentinels.
    pub keepalive_interval: Duration,
    /// Deadline for a single socket write.
    pub send_timeout: Duration,
    /// Outbound queue capacity.
    pub queue_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            keepalive_interval: Duration::from_secs(29),
            send_timeout: Duration::from_secs(5),
            queue_capacity: 256,
        }
    }
}

/// Run a WebSocket session for a freshly upgraded socket.
pub async fn run_session<H: LifecycleHooks>(socket: WebSocket, hooks: Arc<H>, options: SessionOptions) {
    let (ws_tx, ws_rx) = socket.split();
    drive_session(ws_tx, ws_rx, hooks, options).await;
}

/// Session body over any message sink and stream.
///
/// 1. Opens the connection through `hooks.on_open`
/// 2. Drains the outbound queue into `sink`, each write bounded by
///    `send_timeout`
/// 3. Runs the keepalive emitter
/// 4. Hands every inbound text or binary frame to `hooks.on_frame`
/// 5. On close, read error, write error or keepalive failure: closes the
///    connection, calls `hooks.on_close` once and waits for both tasks
pub(crate) async fn drive_session<H, S, R, E>(sink: S, mut stream: R, hooks: Arc<H>, options: SessionOptions)
where
    H: LifecycleHooks,
    S: Sink<Message> + Send + Unpin + 'static,
    S::Error: Display + Send,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let (connection, outbound_rx) = ClientConnection::channel(options.queue_capacity);
    let conn_id = connection.id().clone();

    if !hooks.on_open(&connection) {
        debug!(%conn_id, "connection closed before open");
        return;
    }
    let started = Instant::now();
    info!(%conn_id, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);

    let writer = tokio::spawn(write_loop(
        sink,
        outbound_rx,
        connection.clone(),
        options.send_timeout,
    ));

    let keepalive_conn = connection.clone();
    let keepalive = tokio::spawn(async move {
        if let KeepaliveOutcome::SendFailed(error) =
            run_keepalive(keepalive_conn.clone(), options.keepalive_interval).await
        {
            warn!(conn_id = %keepalive_conn.id(), %error, "keepalive failed, closing");
            let _ = keepalive_conn.close();
        }
    });

    loop {
        let next = tokio::select! {
            biased;
            () = connection.closed() => break,
            next = stream.next() => next,
        };
        match next {
            Some(Ok(Message::Text(text))) => hooks.on_frame(&connection, Frame::text(text.as_str())),
            Some(Ok(Message::Binary(data))) => hooks.on_frame(&connection, Frame::Binary(data)),
            // Pings are answered by the protocol layer.
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) | None => {
                debug!(%conn_id, "client closed the connection");
                break;
            }
            Some(Err(error)) => {
                debug!(%conn_id, %error, "read error");
                break;
            }
        }
    }

    let _ = connection.close();
    hooks.on_close(&connection);
    let _ = keepalive.await;
    let _ = writer.await;

    info!(%conn_id, dropped = connection.dropped_frames(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}

/// Forward queued frames to `sink` until the connection closes, then
/// attempt a Close frame.
///
/// A write that errors or outlives `send_timeout` closes the connection.
/// Closing the connection abandons an in-flight write.
async fn write_loop<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Frame>,
    connection: Arc<ClientConnection>,
    send_timeout: Duration,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    loop {
        let frame = tokio::select! {
            biased;
            () = connection.closed() => break,
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        let write = time::timeout(send_timeout, sink.send(to_message(frame)));
        let result = tokio::select! {
            biased;
            () = connection.closed() => return,
            result = write => result,
        };
        match result {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                debug!(conn_id = %connection.id(), %error, "socket write failed");
                let _ = connection.close();
                return;
            }
            Err(_) => {
                warn!(
                    conn_id = %connection.id(),
                    timeout_ms = send_timeout.as_millis(),
                    "socket write timed out"
                );
                let _ = connection.close();
                return;
            }
        }
    }
    let _ = time::timeout(send_timeout, sink.send(Message::Close(None))).await;
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.to_string().into()),
        Frame::Binary(data) => Message::Binary(data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use bytes::Bytes;
    use futures::channel::mpsc as fmpsc;
    use parking_lot::Mutex;

    use crate::hub::{BroadcastHub, ConnectionState};

    /// Accepts `limit` messages, then never becomes ready again.
    struct GatedSink {
        sent: Arc<Mutex<Vec<Message>>>,
        limit: usize,
    }

    impl GatedSink {
        fn new(limit: usize) -> (Self, Arc<Mutex<Vec<Message>>>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    sent: sent.clone(),
                    limit,
                },
                sent,
            )
        }
    }

    impl Sink<Message> for GatedSink {
        type Error = std::io::Error;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            if self.sent.lock().len() < self.limit {
                Poll::Ready(Ok(()))
            } else {
                Poll::Pending
            }
        }

        fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
            self.sent.lock().push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    type Inbound = fmpsc::UnboundedSender<Result<Message, std::io::Error>>;
    type InboundRx = fmpsc::UnboundedReceiver<Result<Message, std::io::Error>>;

    fn inbound() -> (Inbound, InboundRx) {
        fmpsc::unbounded()
    }

    fn open_conn(capacity: usize) -> (Arc<ClientConnection>, mpsc::Receiver<Frame>) {
        let (conn, rx) = ClientConnection::channel(capacity);
        assert!(conn.open());
        (conn, rx)
    }

    #[test]
    fn default_options() {
        let options = SessionOptions::default();
        assert_eq!(options.keepalive_interval, Duration::from_secs(29));
        assert_eq!(options.send_timeout, Duration::from_secs(5));
        assert_eq!(options.queue_capacity, 256);
    }

    #[test]
    fn text_frame_becomes_text_message() {
        let msg = to_message(Frame::text(r#"{"note":"hello"}"#));
        let Message::Text(text) = msg else {
            panic!("expected text message");
        };
        assert_eq!(text.as_str(), r#"{"note":"hello"}"#);
    }

    #[test]
    fn binary_frame_becomes_binary_message() {
        let msg = to_message(Frame::Binary(Bytes::from_static(b"\x01\x02")));
        assert_eq!(msg, Message::Binary(Bytes::from_static(b"\x01\x02")));
    }

    // ── write_loop ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn writer_forwards_in_order_then_sends_close() {
        let (conn, rx) = open_conn(8);
        let (sink, mut written) = fmpsc::unbounded::<Message>();
        let handle = tokio::spawn(write_loop(sink, rx, conn.clone(), Duration::from_secs(5)));

        conn.send(Frame::text("one")).unwrap();
        conn.send(Frame::text("two")).unwrap();
        assert_eq!(written.next().await.unwrap(), Message::Text("one".to_owned().into()));
        assert_eq!(written.next().await.unwrap(), Message::Text("two".to_owned().into()));

        let _ = conn.close();
        handle.await.unwrap();
        assert_eq!(written.next().await.unwrap(), Message::Close(None));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_write_trips_send_timeout() {
        let (conn, rx) = open_conn(8);
        let (sink, sent) = GatedSink::new(0);
        conn.send(Frame::text("stuck")).unwrap();

        let started = time::Instant::now();
        write_loop(sink, rx, conn.clone(), Duration::from_secs(5)).await;

        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(sent.lock().is_empty());
    }

    #[tokio::test]
    async fn write_error_closes_connection() {
        let (conn, rx) = open_conn(8);
        let (sink, written) = fmpsc::unbounded::<Message>();
        drop(written);
        conn.send(Frame::text("lost")).unwrap();

        write_loop(sink, rx, conn.clone(), Duration::from_secs(5)).await;

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(conn.send(Frame::text("x")), Err(crate::errors::SendError::NotOpen));
    }

    #[tokio::test(start_paused = true)]
    async fn close_abandons_stalled_write() {
        let (conn, rx) = open_conn(8);
        let (sink, _sent) = GatedSink::new(0);
        conn.send(Frame::text("stuck")).unwrap();

        let started = time::Instant::now();
        let handle = tokio::spawn(write_loop(sink, rx, conn.clone(), Duration::from_secs(3600)));
        time::sleep(Duration::from_millis(10)).await;
        let _ = conn.close();
        handle.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
    }

    // ── session ─────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn failed_keepalive_unregisters_connection() {
        let hub = Arc::new(BroadcastHub::new());
        // First keepalive is written, the second wedges the socket, the third
        // fills the queue and the fourth cannot be queued.
        let (sink, sent) = GatedSink::new(1);
        let (_client, stream) = inbound();
        let options = SessionOptions {
            keepalive_interval: Duration::from_millis(100),
            send_timeout: Duration::from_secs(3600),
            queue_capacity: 1,
        };

        let started = time::Instant::now();
        time::timeout(
            Duration::from_secs(60),
            drive_session(sink, stream, hub.clone(), options),
        )
        .await
        .expect("session should end on keepalive failure");

        assert!(started.elapsed() < options.send_timeout);
        assert_eq!(hub.connection_count(), 0);
        let sent = sent.lock();
        assert_eq!(sent.len(), 1);
        let Message::Text(text) = &sent[0] else {
            panic!("expected keepalive text, got {:?}", sent[0]);
        };
        assert!(Frame::text(text.as_str()).is_keepalive());
    }

    #[tokio::test]
    async fn client_close_unregisters_and_replies_close() {
        let hub = Arc::new(BroadcastHub::new());
        let (sink, mut written) = fmpsc::unbounded::<Message>();
        let (client, stream) = inbound();
        client.unbounded_send(Ok(Message::Close(None))).unwrap();

        drive_session(sink, stream, hub.clone(), SessionOptions::default()).await;

        assert_eq!(hub.connection_count(), 0);
        assert_eq!(written.next().await.unwrap(), Message::Close(None));
    }

    #[tokio::test]
    async fn inbound_frames_reach_other_clients() {
        let hub = Arc::new(BroadcastHub::new());
        let (peer, mut peer_rx) = ClientConnection::channel(8);
        assert!(hub.attach(&peer));

        let (sink, _written) = fmpsc::unbounded::<Message>();
        let (client, stream) = inbound();
        client
            .unbounded_send(Ok(Message::Text(r#"{"note":"hi"}"#.to_owned().into())))
            .unwrap();
        client
            .unbounded_send(Ok(Message::Text(r#"{"event":"ping"}"#.to_owned().into())))
            .unwrap();
        client
            .unbounded_send(Ok(Message::Binary(Bytes::from_static(b"\x07"))))
            .unwrap();
        client.unbounded_send(Ok(Message::Close(None))).unwrap();

        drive_session(sink, stream, hub.clone(), SessionOptions::default()).await;

        assert_eq!(peer_rx.try_recv().unwrap(), Frame::text(r#"{"note":"hi"}"#));
        assert_eq!(
            peer_rx.try_recv().unwrap(),
            Frame::Binary(Bytes::from_static(b"\x07"))
        );
        assert!(peer_rx.try_recv().is_err());
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn read_error_ends_session() {
        let hub = Arc::new(BroadcastHub::new());
        let (sink, _written) = fmpsc::unbounded::<Message>();
        let (client, stream) = inbound();
        client
            .unbounded_send(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            )))
            .unwrap();

        drive_session(sink, stream, hub.clone(), SessionOptions::default()).await;
        assert_eq!(hub.connection_count(), 0);
    }
}
