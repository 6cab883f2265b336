//! A participant attached to a session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pomosync_core::ClientId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Handle to one connected client, shared between its connection task and
/// the dispatcher of the session it is attached to.
///
/// The dispatcher only ever enqueues encoded frames; the connection's
/// writer task owns the socket.
pub struct ClientConnection {
    /// Internal id, never sent on the wire.
    pub id: ClientId,
    /// Name resolved at attach time, empty when unknown.
    pub display_name: String,
    tx: mpsc::Sender<Arc<str>>,
    close: CancellationToken,
    /// When this connection was established.
    pub connected_at: Instant,
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a client and the receiving end of its outbound queue.
    pub fn new(
        display_name: impl Into<String>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let now = Instant::now();
        let client = Arc::new(Self {
            id: ClientId::new(),
            display_name: display_name.into(),
            tx,
            close: CancellationToken::new(),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        });
        (client, rx)
    }

    /// Queue an encoded frame without waiting.
    ///
    /// Returns `false` if the queue is full or the writer is gone.
    pub fn send(&self, frame: Arc<str>) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Ask the connection task to close the socket.
    pub fn close(&self) {
        self.close.cancel();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Token fired by [`close`](Self::close).
    pub fn close_token(&self) -> CancellationToken {
        self.close.clone()
    }

    /// Record peer activity (pong, ping or data).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Check and reset the alive flag for heartbeat.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last recorded activity.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Frames that could not be queued.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
