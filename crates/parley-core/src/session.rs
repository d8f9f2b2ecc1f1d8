//! Session registry for Parley.
//!
//! A session is an identified connection: it exists from the connection's
//! `join` until it disconnects.

use chrono::{DateTime, Utc};
use parley_protocol::UserView;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;
use uuid::Uuid;

/// Unique identifier for a connection.
///
/// A session reuses the id of the connection it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

/// Sessions are keyed by their connection's id.
pub type SessionId = ConnectionId;

impl ConnectionId {
    /// Create a connection ID from an existing value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random connection ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("conn_{}", Uuid::new_v4().simple()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An identified participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    username: String,
    joined_at: DateTime<Utc>,
    /// Registration order, used to list sessions stably.
    seq: u64,
}

impl Session {
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn joined_at(&self) -> DateTime<Utc> {
        self.joined_at
    }

    /// Public view sent to clients.
    #[must_use]
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id.to_string(),
            username: self.username.clone(),
            joined_at: self.joined_at,
        }
    }
}

/// Resolve the display name for a `join` request.
///
/// Falls back to `User<unix-millis>` when the request is blank.
#[must_use]
pub fn display_name(requested: &str) -> String {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        format!("User{}", Utc::now().timestamp_millis())
    } else {
        trimmed.to_string()
    }
}

/// Registry of identified sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
    next_seq: u64,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session for a connection.
    ///
    /// Registering an already identified connection replaces its display
    /// name and keeps its place in the listing.
    pub fn register(&mut self, id: SessionId, requested_name: &str) -> Session {
        let username = display_name(requested_name);

        if let Some(existing) = self.sessions.get_mut(&id) {
            debug!(session = %id, from = %existing.username, to = %username, "Session renamed");
            existing.username = username;
            return existing.clone();
        }

        let session = Session {
            id: id.clone(),
            username,
            joined_at: Utc::now(),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.sessions.insert(id, session.clone());

        debug!(session = %session.id, username = %session.username, "Session registered");
        session
    }

    /// Remove a session. Unknown ids are ignored.
    pub fn unregister(&mut self, id: &SessionId) -> Option<Session> {
        let session = self.sessions.remove(id);
        if session.is_some() {
            debug!(session = %id, "Session unregistered");
        }
        session
    }

    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// All sessions in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<&Session> {
        let mut sessions: Vec<&Session> = self.sessions.values().collect();
        sessions.sort_by_key(|s| s.seq);
        sessions
    }

    /// Public views of all sessions in registration order.
    #[must_use]
    pub fn views(&self) -> Vec<UserView> {
        self.list().into_iter().map(Session::view).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_generation() {
        let id1 = ConnectionId::generate();
        let id2 = ConnectionId::generate();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("conn_"));
    }

    #[test]
    fn test_register_trims_name() {
        let mut registry = SessionRegistry::new();
        let session = registry.register("conn-1".into(), "  alice \n");
        assert_eq!(session.username(), "alice");
        assert_eq!(session.id().as_str(), "conn-1");
    }

    #[test]
    fn test_register_blank_name_falls_back() {
        let mut registry = SessionRegistry::new();
        let session = registry.register("conn-1".into(), "   ");
        assert!(session.username().starts_with("User"));
        assert!(session.username()["User".len()..]
            .chars()
            .all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_list_in_registration_order() {
        let mut registry = SessionRegistry::new();
        registry.register("conn-b".into(), "bob");
        registry.register("conn-a".into(), "alice");
        registry.register("conn-c".into(), "carol");

        let names: Vec<&str> = registry.list().iter().map(|s| s.username()).collect();
        assert_eq!(names, ["bob", "alice", "carol"]);
    }

    #[test]
    fn test_reregister_keeps_position() {
        let mut registry = SessionRegistry::new();
        registry.register("conn-1".into(), "alice");
        registry.register("conn-2".into(), "bob");
        registry.register("conn-1".into(), "alicia");

        assert_eq!(registry.len(), 2);
        let names: Vec<&str> = registry.list().iter().map(|s| s.username()).collect();
        assert_eq!(names, ["alicia", "bob"]);
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let mut registry = SessionRegistry::new();
        registry.register("conn-1".into(), "alice");

        assert!(registry.unregister(&"conn-2".into()).is_none());
        assert!(registry.unregister(&"conn-1".into()).is_some());
        assert!(registry.is_empty());
    }
}
