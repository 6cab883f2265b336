//! JSON wire message exchanged between browser clients and a session.
//!
//! Every frame in both directions has the same shape:
//!
//! ```json
//! {"action":"play","data":"","startTime":1700000000000,"elapsedTime":0,"username":"ana"}
//! ```
//!
//! Field names and types are a compatibility contract with deployed
//! clients. Clients usually send only `action` and `data`; missing fields
//! default. Unknown actions decode to [`Action::Unknown`] and are ignored.

use serde::{Deserialize, Serialize};

use crate::errors::HubError;
use crate::ids::SessionId;
use crate::timer::TimerState;

/// Data sent with the terminal `error` frame for an unknown session.
pub const SESSION_NOT_FOUND: &str = "Session not found";

/// Message action.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    /// Resume the shared timer.
    Play,
    /// Pause the shared timer.
    Pause,
    /// Chat line, relayed as-is.
    Chat,
    /// Server → creator: the new session id.
    Created,
    /// Server → all: a participant attached.
    UserJoined,
    /// Server → all: a participant detached.
    UserLeft,
    /// Server → client: terminal failure, connection closes afterwards.
    Error,
    /// Any action this server does not know.
    #[default]
    #[serde(other)]
    Unknown,
}

impl Action {
    /// Actions a client may trigger; everything else from a client is ignored.
    pub fn is_client_action(&self) -> bool {
        matches!(self, Self::Play | Self::Pause | Self::Chat)
    }

    /// Wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Chat => "chat",
            Self::Created => "created",
            Self::UserJoined => "userJoined",
            Self::UserLeft => "userLeft",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

/// One frame of the session protocol.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WireMessage {
    /// What happened.
    pub action: Action,
    /// Free-form payload: chat text, session id, display name, replay pair.
    pub data: String,
    /// Timer start in epoch millis, `0` while paused.
    pub start_time: i64,
    /// Accumulated timer seconds.
    pub elapsed_time: i64,
    /// Display name of the acting client, empty when not applicable.
    pub username: String,
}

impl WireMessage {
    /// Decode an inbound text frame.
    pub fn decode(text: &str) -> Result<Self, HubError> {
        serde_json::from_str(text).map_err(|e| HubError::FrameDecode(e.to_string()))
    }

    /// Encode for the wire.
    pub fn encode(&self) -> String {
        // A struct of strings and integers cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Canonical state broadcast after a client action.
    pub fn timer_update(
        action: Action,
        data: impl Into<String>,
        timer: &TimerState,
        username: impl Into<String>,
    ) -> Self {
        Self {
            action,
            data: data.into(),
            start_time: timer.start_epoch_ms,
            elapsed_time: timer.elapsed_secs,
            username: username.into(),
        }
    }

    /// Late-joiner replay: a `play` carrying `"<startTime>,<elapsedTime>"`.
    pub fn replay(timer: &TimerState) -> Self {
        Self::timer_update(Action::Play, timer.replay_data(), timer, "")
    }

    /// Acknowledgement sent to the creator of a session.
    pub fn created(session_id: &SessionId, timer: &TimerState) -> Self {
        Self::timer_update(Action::Created, session_id.as_str(), timer, "")
    }

    /// Notification that `display_name` attached.
    pub fn user_joined(display_name: &str, timer: &TimerState) -> Self {
        Self::timer_update(Action::UserJoined, display_name, timer, "")
    }

    /// Notification that `display_name` detached.
    pub fn user_left(display_name: &str, timer: &TimerState) -> Self {
        Self::timer_update(Action::UserLeft, display_name, timer, "")
    }

    /// Terminal error frame.
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            action: Action::Error,
            data: reason.into(),
            ..Self::default()
        }
    }
}
