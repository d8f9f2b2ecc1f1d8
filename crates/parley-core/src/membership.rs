//! Membership tracking for Parley.
//!
//! Each session is joined to at most one channel. Joining another channel
//! supersedes the previous one.

use crate::channel::ChannelId;
use crate::session::SessionId;
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Session → current channel, with a reverse index for fan-out.
#[derive(Debug, Default)]
pub struct MembershipTracker {
    scopes: HashMap<SessionId, ChannelId>,
    members: HashMap<ChannelId, HashSet<SessionId>>,
}

impl MembershipTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a session's channel, superseding any previous one.
    ///
    /// Returns the superseded channel, if it differs from `channel_id`.
    pub fn join(&mut self, session_id: &SessionId, channel_id: &str) -> Option<ChannelId> {
        let previous = self
            .scopes
            .insert(session_id.clone(), channel_id.to_string());

        if let Some(prev) = &previous {
            if prev == channel_id {
                return None;
            }
            self.remove_member(prev, session_id);
        }

        self.members
            .entry(channel_id.to_string())
            .or_default()
            .insert(session_id.clone());

        trace!(session = %session_id, channel = %channel_id, superseded = ?previous, "Joined channel");
        previous
    }

    /// Leave `channel_id`, only if it is the session's current channel.
    ///
    /// Returns `true` if the session left.
    pub fn leave(&mut self, session_id: &SessionId, channel_id: &str) -> bool {
        if self.scopes.get(session_id).map(String::as_str) != Some(channel_id) {
            return false;
        }
        self.scopes.remove(session_id);
        self.remove_member(channel_id, session_id);
        true
    }

    /// Clear a session's channel unconditionally.
    pub fn leave_all(&mut self, session_id: &SessionId) -> Option<ChannelId> {
        let channel_id = self.scopes.remove(session_id)?;
        self.remove_member(&channel_id, session_id);
        Some(channel_id)
    }

    fn remove_member(&mut self, channel_id: &str, session_id: &SessionId) {
        if let Some(set) = self.members.get_mut(channel_id) {
            set.remove(session_id);
            if set.is_empty() {
                self.members.remove(channel_id);
            }
        }
    }

    /// The session's current channel.
    #[must_use]
    pub fn channel_of(&self, session_id: &SessionId) -> Option<&ChannelId> {
        self.scopes.get(session_id)
    }

    /// Sessions currently joined to a channel.
    #[must_use]
    pub fn members_of(&self, channel_id: &str) -> HashSet<SessionId> {
        self.members.get(channel_id).cloned().unwrap_or_default()
    }

    /// Number of sessions joined to a channel.
    #[must_use]
    pub fn member_count(&self, channel_id: &str) -> usize {
        self.members.get(channel_id).map_or(0, HashSet::len)
    }
}
