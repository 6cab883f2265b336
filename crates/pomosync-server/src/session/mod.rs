//! Session rooms: a handle per session plus its dispatcher task.

pub mod dispatcher;

use std::sync::Arc;
use std::time::Duration;

use metrics::gauge;
use pomosync_core::{ClientId, HubError, Result, SessionId, TimerState, WireMessage};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::client::ClientConnection;
use crate::metrics::SESSIONS_ACTIVE;

pub use dispatcher::{AttachMode, SessionView};
use dispatcher::{SessionCommand, SessionDispatcher};

/// Longest [`SessionHandle::attach`] waits for room in a full command queue.
pub const ATTACH_QUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// Public listing entry. Owned copy, detached from the live session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session id.
    pub id: SessionId,
    /// Whether the session is listed.
    pub public: bool,
    /// Timer start in epoch millis, `0` while paused.
    pub start_time: i64,
    /// Accumulated timer seconds.
    pub elapsed_time: i64,
}

/// Cheap, cloneable handle to a live session.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    public: bool,
    commands: mpsc::Sender<SessionCommand>,
    view: watch::Receiver<SessionView>,
    stop: CancellationToken,
}

impl SessionHandle {
    /// Start a dispatcher for a new, empty session.
    pub fn spawn(id: SessionId, public: bool, queue_capacity: usize) -> Self {
        let (commands, rx) = mpsc::channel(queue_capacity.max(1));
        let (view_tx, view) = watch::channel(SessionView::default());
        let stop = CancellationToken::new();

        let dispatcher = SessionDispatcher::new(id.clone(), view_tx);
        let task_stop = stop.clone();
        gauge!(SESSIONS_ACTIVE).increment(1.0);
        drop(tokio::spawn(async move {
            dispatcher.run(rx, task_stop).await;
            gauge!(SESSIONS_ACTIVE).decrement(1.0);
        }));

        Self {
            id,
            public,
            commands,
            view,
            stop,
        }
    }

    /// Session id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Whether the session appears in public listings.
    pub fn is_public(&self) -> bool {
        self.public
    }

    /// Attach `client` and wait until its replay/ack/join frames are queued.
    ///
    /// Waits at most [`ATTACH_QUEUE_TIMEOUT`] for a queue slot, then fails
    /// with [`HubError::QueueFull`]. The registry calls this under its lock,
    /// so a flooded session cannot hold the lock longer than that.
    pub async fn attach(&self, client: Arc<ClientConnection>, mode: AttachMode) -> Result<()> {
        let permit = match tokio::time::timeout(ATTACH_QUEUE_TIMEOUT, self.commands.reserve()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(self.closed()),
            Err(_) => {
                return Err(HubError::QueueFull {
                    session_id: self.id.clone(),
                });
            }
        };
        let (reply, done) = oneshot::channel();
        permit.send(SessionCommand::Attach { client, mode, reply });
        done.await.map_err(|_| self.closed())
    }

    /// Detach a client and wait until `userLeft` is queued for the others.
    pub async fn detach(&self, client_id: &ClientId) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.commands
            .send(SessionCommand::Detach {
                client_id: client_id.clone(),
                reply,
            })
            .await
            .map_err(|_| self.closed())?;
        done.await.map_err(|_| self.closed())
    }

    /// Enqueue a client frame without waiting.
    ///
    /// A full queue rejects the new frame with [`HubError::QueueFull`].
    pub fn submit(&self, client_id: &ClientId, message: WireMessage) -> Result<()> {
        let cmd = SessionCommand::Inbound {
            client_id: client_id.clone(),
            message,
        };
        self.commands.try_send(cmd).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => HubError::QueueFull {
                session_id: self.id.clone(),
            },
            mpsc::error::TrySendError::Closed(_) => self.closed(),
        })
    }

    /// Current timer.
    pub fn timer(&self) -> TimerState {
        self.view.borrow().timer
    }

    /// Number of attached clients.
    pub fn member_count(&self) -> usize {
        self.view.borrow().members.len()
    }

    /// Display names of attached clients.
    pub fn users(&self) -> Vec<String> {
        self.view.borrow().members.clone()
    }

    /// Listing entry for this session.
    pub fn summary(&self) -> SessionSummary {
        let timer = self.timer();
        SessionSummary {
            id: self.id.clone(),
            public: self.public,
            start_time: timer.start_epoch_ms,
            elapsed_time: timer.elapsed_secs,
        }
    }

    /// Signal the dispatcher to exit.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Whether [`stop`](Self::stop) was called.
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    fn closed(&self) -> HubError {
        HubError::SessionClosed {
            session_id: self.id.clone(),
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("public", &self.public)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}
