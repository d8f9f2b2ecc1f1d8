//! Typing indicators for Parley.
//!
//! Marks are set and cleared by explicit signals only. Expiry after a quiet
//! period is the client's job: it sends `stop_typing` itself.

use crate::channel::ChannelId;
use crate::session::SessionId;
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Per-channel sets of sessions currently typing.
#[derive(Debug, Default)]
pub struct TypingTracker {
    marks: HashMap<ChannelId, HashSet<SessionId>>,
}

impl TypingTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a session as typing in a channel.
    ///
    /// Returns `true` only if the session was not already typing there.
    pub fn start(&mut self, channel_id: &str, session_id: &SessionId) -> bool {
        let started = self
            .marks
            .entry(channel_id.to_string())
            .or_default()
            .insert(session_id.clone());
        if started {
            trace!(channel = %channel_id, session = %session_id, "Typing started");
        }
        started
    }

    /// Clear a session's typing mark in a channel.
    ///
    /// Returns `true` only if the session was typing there.
    pub fn stop(&mut self, channel_id: &str, session_id: &SessionId) -> bool {
        let Some(set) = self.marks.get_mut(channel_id) else {
            return false;
        };
        let stopped = set.remove(session_id);
        if set.is_empty() {
            self.marks.remove(channel_id);
        }
        if stopped {
            trace!(channel = %channel_id, session = %session_id, "Typing stopped");
        }
        stopped
    }

    #[must_use]
    pub fn is_typing(&self, channel_id: &str, session_id: &SessionId) -> bool {
        self.marks
            .get(channel_id)
            .is_some_and(|set| set.contains(session_id))
    }

    /// Sessions typing in a channel.
    #[must_use]
    pub fn active_typers(&self, channel_id: &str) -> HashSet<SessionId> {
        self.marks.get(channel_id).cloned().unwrap_or_default()
    }

    /// Clear every mark held by a session.
    ///
    /// Returns the channels in which a mark was cleared, sorted.
    pub fn clear_session(&mut self, session_id: &SessionId) -> Vec<ChannelId> {
        let mut cleared: Vec<ChannelId> = self
            .marks
            .iter()
            .filter(|(_, set)| set.contains(session_id))
            .map(|(channel, _)| channel.clone())
            .collect();
        cleared.sort();

        for channel in &cleared {
            self.stop(channel, session_id);
        }
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> SessionId {
        SessionId::from(s)
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut typing = TypingTracker::new();

        assert!(typing.start("general", &id("s1")));
        let once = typing.active_typers("general");

        assert!(!typing.start("general", &id("s1")));
        assert_eq!(typing.active_typers("general"), once);
        assert_eq!(once.len(), 1);
    }

    #[test]
    fn test_stop_when_inactive_is_noop() {
        let mut typing = TypingTracker::new();
        assert!(!typing.stop("general", &id("s1")));

        typing.start("general", &id("s2"));
        assert!(!typing.stop("general", &id("s1")));
        assert!(typing.is_typing("general", &id("s2")));
    }

    #[test]
    fn test_start_stop() {
        let mut typing = TypingTracker::new();
        typing.start("general", &id("s1"));
        typing.start("general", &id("s2"));

        assert!(typing.stop("general", &id("s1")));
        assert!(!typing.is_typing("general", &id("s1")));
        assert_eq!(typing.active_typers("general").len(), 1);
    }

    #[test]
    fn test_clear_session() {
        let mut typing = TypingTracker::new();
        typing.start("general", &id("s1"));
        typing.start("dev", &id("s1"));
        typing.start("dev", &id("s2"));

        assert_eq!(typing.clear_session(&id("s1")), ["dev", "general"]);
        assert!(typing.active_typers("general").is_empty());
        assert_eq!(typing.active_typers("dev").len(), 1);
        assert!(typing.clear_session(&id("s1")).is_empty());
    }
}
