//! Process-wide map of live sessions.
//!
//! Create, attach-to-existing and the empty-check-then-remove on disconnect
//! all run under one lock, so a session is never removed while a client is
//! mid-attach. Nothing under the lock touches the network: attaching only
//! hands the client to the session's dispatcher and waits for its reply.
//! A flooded session queue holds the lock for at most
//! [`ATTACH_QUEUE_TIMEOUT`](crate::session::ATTACH_QUEUE_TIMEOUT) before the
//! attach fails with `QueueFull`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use metrics::counter;
use pomosync_core::{HubError, Result, SessionId};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::client::ClientConnection;
use crate::metrics::SESSIONS_CREATED_TOTAL;
use crate::session::{AttachMode, SessionHandle, SessionSummary};

/// Upper bound on id regeneration when a fresh id is already taken.
const MAX_ID_ATTEMPTS: usize = 16;

/// Sizing applied to every session the registry creates.
#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    /// Bounded command queue per session.
    pub queue_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { queue_capacity: 256 }
    }
}

/// Session id → live session.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
    options: SessionOptions,
    id_source: Box<dyn Fn() -> SessionId + Send + Sync>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new(options: SessionOptions) -> Self {
        Self::with_id_source(options, SessionId::generate)
    }

    /// Create a registry drawing ids from `id_source`.
    pub fn with_id_source(
        options: SessionOptions,
        id_source: impl Fn() -> SessionId + Send + Sync + 'static,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            options,
            id_source: Box::new(id_source),
        }
    }

    /// Create a session with a fresh id and attach its creator.
    ///
    /// Ids are regenerated until one is unused, so an existing session is
    /// never overwritten.
    pub async fn create(&self, public: bool, creator: Arc<ClientConnection>) -> Result<SessionHandle> {
        let mut sessions = self.sessions.lock().await;

        let mut id = (self.id_source)();
        let mut attempts = 1;
        while sessions.contains_key(&id) {
            if attempts >= MAX_ID_ATTEMPTS {
                warn!(attempts, "could not allocate an unused session id");
                return Err(HubError::IdAllocation { attempts });
            }
            warn!(session_id = %id, "session id collision, regenerating");
            id = (self.id_source)();
            attempts += 1;
        }

        let handle = SessionHandle::spawn(id.clone(), public, self.options.queue_capacity);
        let _ = sessions.insert(id.clone(), handle.clone());
        counter!(SESSIONS_CREATED_TOTAL).increment(1);
        info!(session_id = %id, public, "session created");

        if let Err(err) = handle.attach(creator, AttachMode::Created).await {
            let _ = sessions.remove(&id);
            handle.stop();
            return Err(err);
        }
        Ok(handle)
    }

    /// Look up a session. Never creates one.
    pub async fn get(&self, id: &SessionId) -> Result<SessionHandle> {
        self.sessions
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| HubError::NotFound {
                session_id: id.clone(),
            })
    }

    /// Attach `client` to an existing session.
    pub async fn attach(&self, id: &SessionId, client: Arc<ClientConnection>) -> Result<SessionHandle> {
        let sessions = self.sessions.lock().await;
        let handle = sessions.get(id).cloned().ok_or_else(|| HubError::NotFound {
            session_id: id.clone(),
        })?;
        handle.attach(client, AttachMode::Joined).await?;
        Ok(handle)
    }

    /// Remove the session and stop its dispatcher if nobody is attached.
    ///
    /// Call once per disconnect, after the client was detached.
    pub async fn remove_if_empty(&self, id: &SessionId) -> bool {
        let mut sessions = self.sessions.lock().await;
        let empty = sessions.get(id).is_some_and(|h| h.member_count() == 0);
        if !empty {
            return false;
        }
        if let Some(handle) = sessions.remove(id) {
            handle.stop();
            info!(session_id = %id, "session removed");
        }
        true
    }

    /// Snapshot of every public session.
    pub async fn list_public(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.lock().await;
        let mut out: Vec<SessionSummary> = sessions
            .values()
            .filter(|h| h.is_public())
            .map(SessionHandle::summary)
            .collect();
        drop(sessions);
        out.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        out
    }

    /// Distinct display names attached to a session, in attach order.
    pub async fn users(&self, id: &SessionId) -> Result<Vec<String>> {
        let mut names = self.get(id).await?.users();
        let mut seen = HashSet::new();
        names.retain(|name| seen.insert(name.clone()));
        Ok(names)
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether no session is live.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Stop every dispatcher and forget all sessions.
    pub async fn shutdown_all(&self) {
        let mut sessions = self.sessions.lock().await;
        let count = sessions.len();
        for (_, handle) in sessions.drain() {
            handle.stop();
        }
        info!(count, "all sessions stopped");
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}
