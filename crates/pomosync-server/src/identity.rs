//! Display-name resolution for attaching clients.
//!
//! The hub never rejects a connection because of identity: any failure,
//! including a slow backend, degrades to an empty display name.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pomosync_core::{HubError, IdentityError};
use pomosync_settings::{IdentityBackend, IdentitySettings};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, warn};

/// Resolves an opaque identity token to a display name.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    /// Display name registered for `token`.
    async fn display_name(&self, token: &str) -> Result<String, IdentityError>;
}

/// Backend used when no user directory is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoIdentity;

#[async_trait]
impl IdentityLookup for NoIdentity {
    async fn display_name(&self, _token: &str) -> Result<String, IdentityError> {
        Err(IdentityError::NotFound)
    }
}

/// Fixed token → name table, loaded from settings.
#[derive(Clone, Debug, Default)]
pub struct StaticDirectory {
    users: HashMap<String, String>,
}

impl StaticDirectory {
    /// Build from a token → display name map.
    pub fn new(users: HashMap<String, String>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl IdentityLookup for StaticDirectory {
    async fn display_name(&self, token: &str) -> Result<String, IdentityError> {
        self.users.get(token).cloned().ok_or(IdentityError::NotFound)
    }
}

#[derive(Deserialize)]
struct UserRecord {
    username: String,
}

/// User service reached over HTTP: `GET {base}/users/{token}`.
#[derive(Clone, Debug)]
pub struct HttpDirectory {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpDirectory {
    /// Build a directory client for `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, IdentityError> {
        let base_url =
            Url::parse(base_url).map_err(|e| IdentityError::Lookup(format!("invalid base url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(IdentityError::Lookup(format!("invalid base url: {base_url}")));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IdentityError::Lookup(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    fn user_url(&self, token: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            let _ = segments.pop_if_empty().push("users").push(token);
        }
        url
    }
}

#[async_trait]
impl IdentityLookup for HttpDirectory {
    async fn display_name(&self, token: &str) -> Result<String, IdentityError> {
        let resp = self
            .client
            .get(self.user_url(token))
            .send()
            .await
            .map_err(|e| IdentityError::Lookup(e.to_string()))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Err(IdentityError::NotFound),
            status if status.is_success() => resp
                .json::<UserRecord>()
                .await
                .map(|record| record.username)
                .map_err(|e| IdentityError::Lookup(e.to_string())),
            status => Err(IdentityError::Lookup(format!("user service returned {status}"))),
        }
    }
}

/// Build the configured backend.
pub fn from_settings(settings: &IdentitySettings) -> Result<Arc<dyn IdentityLookup>, IdentityError> {
    Ok(match settings.backend {
        IdentityBackend::None => Arc::new(NoIdentity),
        IdentityBackend::Static => Arc::new(StaticDirectory::new(settings.users.clone())),
        IdentityBackend::Http => {
            let base = settings.base_url.as_deref().unwrap_or_default();
            Arc::new(HttpDirectory::new(
                base,
                Duration::from_millis(settings.timeout_ms),
            )?)
        }
    })
}

/// Best-effort display name for `token`.
///
/// An empty token skips the lookup. Errors and timeouts yield `""`.
pub async fn resolve_display_name(
    lookup: &dyn IdentityLookup,
    token: &str,
    timeout: Duration,
) -> String {
    if token.is_empty() {
        return String::new();
    }
    match tokio::time::timeout(timeout, lookup.display_name(token)).await {
        Ok(Ok(name)) => name,
        Ok(Err(IdentityError::NotFound)) => {
            debug!("identity token not registered, using empty display name");
            String::new()
        }
        Ok(Err(err)) => {
            let err = HubError::from(err);
            warn!(error = %err, kind = err.error_kind(), "identity lookup failed, using empty display name");
            String::new()
        }
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "identity lookup timed out");
            String::new()
        }
    }
}
