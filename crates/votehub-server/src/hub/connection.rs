//! Per-client connection state.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use votehub_core::{ConnectionId, Frame};

use crate::errors::SendError;

/// Lifecycle of a streaming connection. `Closed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Upgrade in progress; not registered.
    Connecting = 0,
    /// Registered and eligible for broadcasts.
    Open = 1,
    /// Unregistered; tasks are winding down.
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connecting,
            1 => Self::Open,
            _ => Self::Closed,
        }
    }
}

/// One connected streaming client.
///
/// Outbound frames go through a bounded queue drained by the session's
/// writer task, so [`send`](Self::send) never waits on the socket.
pub struct ClientConnection {
    id: ConnectionId,
    tx: mpsc::Sender<Frame>,
    state: AtomicU8,
    closed: CancellationToken,
    /// When the upgrade completed.
    pub connected_at: Instant,
    dropped_frames: AtomicU64,
}

impl ClientConnection {
    /// Create a connection in the `Connecting` state.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Frame>) -> Self {
        Self {
            id,
            tx,
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            closed: CancellationToken::new(),
            connected_at: Instant::now(),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Fresh connection plus the receiving end of its outbound queue.
    pub fn channel(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self::new(ConnectionId::new(), tx)), rx)
    }

    /// Connection id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the connection accepts frames.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// `Connecting` -> `Open`. Returns `false` if the connection was not
    /// `Connecting`.
    pub fn open(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Connecting as u8,
                ConnectionState::Open as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to `Closed` and wake every task waiting on [`closed`](Self::closed).
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn close(&self) -> bool {
        let prev = self
            .state
            .swap(ConnectionState::Closed as u8, Ordering::AcqRel);
        if prev == ConnectionState::Closed as u8 {
            return false;
        }
        self.closed.cancel();
        true
    }

    /// Resolves once the connection is closed.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    /// Owned handle that is cancelled when the connection closes.
    pub fn close_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Queue a frame without waiting.
    pub fn send(&self, frame: Frame) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::NotOpen);
        }
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                Err(SendError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => {
                let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                Err(SendError::ChannelClosed)
            }
        }
    }

    /// Frames that could not be queued.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Time since the connection was created.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_open(capacity: usize) -> (Arc<ClientConnection>, mpsc::Receiver<Frame>) {
        let (conn, rx) = ClientConnection::channel(capacity);
        assert!(conn.open());
        (conn, rx)
    }

    #[test]
    fn starts_connecting() {
        let (conn, _rx) = ClientConnection::channel(4);
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(!conn.is_open());
        assert!(conn.id().as_str().starts_with("conn_"));
    }

    #[test]
    fn send_before_open_fails() {
        let (conn, _rx) = ClientConnection::channel(4);
        assert_eq!(conn.send(Frame::text("x")), Err(SendError::NotOpen));
    }

    #[tokio::test]
    async fn send_after_open() {
        let (conn, mut rx) = make_open(4);
        conn.send(Frame::text("hello")).unwrap();
        assert_eq!(rx.recv().await.unwrap(), Frame::text("hello"));
    }

    #[test]
    fn open_only_from_connecting() {
        let (conn, _rx) = make_open(4);
        assert!(!conn.open());
        assert!(conn.close());
        assert!(!conn.open());
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn close_transitions_once() {
        let (conn, _rx) = make_open(4);
        assert!(conn.close());
        assert!(!conn.close());
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn close_from_connecting() {
        let (conn, _rx) = ClientConnection::channel(4);
        assert!(conn.close());
        assert!(conn.close_token().is_cancelled());
    }

    #[test]
    fn send_after_close_fails() {
        let (conn, _rx) = make_open(4);
        let _ = conn.close();
        assert_eq!(conn.send(Frame::text("x")), Err(SendError::NotOpen));
    }

    #[test]
    fn full_queue_reports_and_counts() {
        let (conn, _rx) = make_open(1);
        conn.send(Frame::text("1")).unwrap();
        assert_eq!(conn.send(Frame::text("2")), Err(SendError::QueueFull));
        assert_eq!(conn.dropped_frames(), 1);
    }

    #[test]
    fn dropped_receiver_reports_closed() {
        let (conn, rx) = make_open(4);
        drop(rx);
        assert_eq!(conn.send(Frame::text("x")), Err(SendError::ChannelClosed));
        assert_eq!(conn.dropped_frames(), 1);
    }

    #[tokio::test]
    async fn closed_future_resolves() {
        let (conn, _rx) = make_open(4);
        let waiter = conn.clone();
        let handle = tokio::spawn(async move { waiter.closed().await });
        let _ = conn.close();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn preserves_order() {
        let (conn, mut rx) = make_open(8);
        for i in 0..5 {
            conn.send(Frame::text(format!("msg_{i}"))).unwrap();
        }
        for i in 0..5 {
            assert_eq!(rx.recv().await.unwrap(), Frame::text(format!("msg_{i}")));
        }
    }

    #[test]
    fn age_increases() {
        let (conn, _rx) = ClientConnection::channel(1);
        let a = conn.age();
        std::thread::sleep(Duration::from_millis(5));
        assert!(conn.age() > a);
    }
}
