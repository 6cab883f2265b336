//! Failure taxonomy for the session hub.
//!
//! None of these are fatal to the process. Each is resolved at the
//! narrowest scope that can handle it:
//!
//! | Variant              | Resolved at         | Effect                                  |
//! |----------------------|---------------------|-----------------------------------------|
//! | `NotFound`           | join handler        | `error` frame, connection closed        |
//! | `ConnectionUpgrade`  | HTTP handler        | logged, connection abandoned            |
//! | `FrameDecode`        | read loop           | frame discarded, loop continues         |
//! | `IdentityLookup`     | attach flow         | empty display name                      |
//! | `QueueFull`          | read loop           | frame dropped (reject-new)              |
//! | `SessionClosed`      | attach / read loop  | treated like `NotFound`                 |
//! | `IdAllocation`       | create handler      | `error` frame, connection closed        |

use crate::ids::SessionId;

/// Errors raised inside the hub.
#[derive(Clone, Debug, thiserror::Error)]
pub enum HubError {
    /// The requested session id is not registered.
    #[error("session not found: {session_id}")]
    NotFound {
        /// Id the client asked for.
        session_id: SessionId,
    },
    /// The HTTP request could not be upgraded to a WebSocket.
    #[error("connection upgrade failed: {0}")]
    ConnectionUpgrade(String),
    /// An inbound frame did not parse as a wire message.
    #[error("frame decode failed: {0}")]
    FrameDecode(String),
    /// The identity collaborator failed to resolve a token.
    #[error("identity lookup failed: {0}")]
    IdentityLookup(String),
    /// The session's work queue is full; the request was rejected.
    #[error("session {session_id} work queue full")]
    QueueFull {
        /// Session whose queue rejected the request.
        session_id: SessionId,
    },
    /// The session's dispatcher has stopped.
    #[error("session {session_id} closed")]
    SessionClosed {
        /// Session that stopped.
        session_id: SessionId,
    },
    /// No unused session id was found.
    #[error("no unused session id after {attempts} attempts")]
    IdAllocation {
        /// Ids tried.
        attempts: usize,
    },
}

impl HubError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::ConnectionUpgrade(_) => "connection_upgrade",
            Self::FrameDecode(_) => "frame_decode",
            Self::IdentityLookup(_) => "identity_lookup",
            Self::QueueFull { .. } => "queue_full",
            Self::SessionClosed { .. } => "session_closed",
            Self::IdAllocation { .. } => "id_allocation",
        }
    }
}

impl From<IdentityError> for HubError {
    fn from(err: IdentityError) -> Self {
        Self::IdentityLookup(err.to_string())
    }
}

/// Errors returned by the identity collaborator.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// No user is registered under the token.
    #[error("identity not found")]
    NotFound,
    /// The backing store could not be queried.
    #[error("identity lookup error: {0}")]
    Lookup(String),
}

/// Result alias for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;
