//! Settings types. Every struct deserializes from a partial JSON object;
//! missing keys fall back to [`Default`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PomoSettings {
    /// Network and hub sizing.
    pub server: ServerSettings,
    /// Display-name resolution.
    pub identity: IdentitySettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl PomoSettings {
    /// Cross-field checks that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.identity.backend == IdentityBackend::Http
            && self.identity.base_url.as_deref().is_none_or(str::is_empty)
        {
            return Err(invalid("identity.baseUrl", "required for the http backend"));
        }
        if self.server.session_queue_capacity == 0 {
            return Err(invalid("server.sessionQueueCapacity", "must be at least 1"));
        }
        if self.server.client_queue_capacity == 0 {
            return Err(invalid("server.clientQueueCapacity", "must be at least 1"));
        }
        if self.server.heartbeat_interval_secs == 0 {
            return Err(invalid("server.heartbeatIntervalSecs", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> SettingsError {
    SettingsError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

/// Server network and hub sizing settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP/WebSocket port.
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Interval between server pings, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a connection after this many seconds without a pong.
    pub heartbeat_timeout_secs: u64,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Bounded work queue per session.
    pub session_queue_capacity: usize,
    /// Bounded outbound queue per client.
    pub client_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 1024,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 64 * 1024,
            session_queue_capacity: 256,
            client_queue_capacity: 64,
        }
    }
}

/// Which identity collaborator resolves `userId` tokens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityBackend {
    /// Every participant is anonymous.
    #[default]
    None,
    /// Names come from [`IdentitySettings::users`].
    Static,
    /// Names come from an HTTP user service.
    Http,
}

/// Display-name resolution settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentitySettings {
    /// Backend selection.
    pub backend: IdentityBackend,
    /// Token → display name, used by the `static` backend.
    pub users: HashMap<String, String>,
    /// Base URL of the user service, used by the `http` backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Per-lookup timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            backend: IdentityBackend::None,
            users: HashMap::new(),
            base_url: None,
            timeout_ms: 2_000,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
