//! Shutdown signal plus drain of in-flight connection tasks.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TrackedFuture;
use tracing::{info, warn};

/// How long shutdown waits for the listener and connections by default.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Cancels the hub and waits for its connection tasks to wind down.
///
/// Every upgraded WebSocket future is wrapped with [`track`](Self::track),
/// so shutdown can wait until each one has detached from its session.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    connections: TaskTracker,
}

impl ShutdownCoordinator {
    /// Coordinator with no connections tracked yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token observed by the listener and every connection task.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown without waiting.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown was signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wrap a connection future so [`graceful_shutdown`](Self::graceful_shutdown)
    /// waits for it.
    pub fn track<F: Future>(&self, connection: F) -> TrackedFuture<F> {
        self.connections.track_future(connection)
    }

    /// Tracked connection futures that have not finished.
    pub fn in_flight(&self) -> usize {
        self.connections.len()
    }

    /// Signal shutdown, then wait up to `timeout` for the listener task and
    /// every tracked connection.
    pub async fn graceful_shutdown(&self, listener: JoinHandle<()>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);

        self.shutdown();
        let _ = self.connections.close();
        info!(
            connections = self.in_flight(),
            timeout_secs = timeout.as_secs(),
            "draining connections"
        );

        let drain = async {
            if let Err(err) = listener.await {
                warn!(error = %err, "listener task failed");
            }
            self.connections.wait().await;
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(
                remaining = self.in_flight(),
                "shutdown timed out after {timeout:?}, some connections may still be open"
            );
        } else {
            info!("drain complete");
        }
    }
}
