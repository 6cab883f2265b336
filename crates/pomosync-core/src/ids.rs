//! Session and client identifiers.

use std::fmt;

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of a generated session id.
pub const SESSION_ID_LEN: usize = 8;

/// Identifier of a shared session (room).
///
/// Generated ids are short enough to be typed by hand when joining a
/// private session.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh id of [`SESSION_ID_LEN`] characters from `[A-Za-z0-9]`.
    ///
    /// Uniqueness is not checked here; the registry retries on collision.
    pub fn generate() -> Self {
        let id: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_ID_LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    /// Wrap an id received from a client.
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of one attached client. Internal only, never sent on the wire.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct ClientId(String);

impl ClientId {
    /// Create a new unique client id.
    pub fn new() -> Self {
        Self(format!("client_{}", Uuid::now_v7()))
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use proptest::prelude::*;

    #[test]
    fn generated_session_id_has_fixed_length() {
        let id = SessionId::generate();
        assert_eq!(id.as_str().len(), SESSION_ID_LEN, "got: {id}");
    }

    #[test]
    fn generated_session_ids_rarely_collide() {
        let ids: HashSet<SessionId> = (0..10_000).map(|_| SessionId::generate()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn session_id_serializes_transparently() {
        let id = SessionId::from_raw("tqwcFiUI");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""tqwcFiUI""#);
        let back: SessionId = serde_json::from_str(r#""tqwcFiUI""#).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn client_id_has_prefix() {
        let id = ClientId::new();
        assert!(id.as_str().starts_with("client_"), "got: {id}");
    }

    #[test]
    fn client_ids_unique() {
        assert_ne!(ClientId::new(), ClientId::new());
    }

    proptest! {
        #[test]
        fn generated_ids_are_alphanumeric(_seed in 0u32..500) {
            let id = SessionId::generate();
            prop_assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }
}
