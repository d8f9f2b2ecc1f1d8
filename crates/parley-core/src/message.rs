//! Chat messages.

use crate::channel::ChannelId;
use crate::session::{Session, SessionId};
use chrono::{DateTime, Utc};
use parley_protocol::MessageView;
use uuid::Uuid;

/// Default maximum message length, in characters.
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 2000;

/// Check message content before it is accepted.
///
/// Content must be non-empty after trimming and at most `max_length`
/// characters long.
#[must_use]
pub fn is_valid_content(content: &str, max_length: usize) -> bool {
    !content.trim().is_empty() && content.chars().count() <= max_length
}

/// A chat message appended to a channel's history.
///
/// Author fields are captured at send time, so a later rename does not
/// rewrite history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub user_id: SessionId,
    pub username: String,
    pub content: String,
    pub encrypted: bool,
    pub timestamp: DateTime<Utc>,
    pub channel_id: ChannelId,
}

impl Message {
    /// Create a new message authored by `author`.
    #[must_use]
    pub fn new(
        author: &Session,
        channel_id: impl Into<ChannelId>,
        content: impl Into<String>,
        encrypted: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: author.id().clone(),
            username: author.username().to_string(),
            content: content.into(),
            encrypted,
            timestamp: Utc::now(),
            channel_id: channel_id.into(),
        }
    }

    #[must_use]
    pub fn view(&self) -> MessageView {
        MessageView {
            id: self.id.to_string(),
            user_id: self.user_id.to_string(),
            username: self.username.clone(),
            content: self.content.clone(),
            encrypted: self.encrypted,
            timestamp: self.timestamp,
            channel_id: self.channel_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionRegistry;

    #[test]
    fn test_content_validation() {
        assert!(is_valid_content("hello", 10));
        assert!(is_valid_content("  hi  ", 10));
        assert!(!is_valid_content("", 10));
        assert!(!is_valid_content(" \t\n ", 10));
        assert!(!is_valid_content("elevenchars", 10));
        // Length counts characters, not bytes.
        assert!(is_valid_content("ééééé", 5));
    }

    #[test]
    fn test_message_captures_author() {
        let mut registry = SessionRegistry::new();
        let author = registry.register("conn-1".into(), "alice");

        let msg = Message::new(&author, "general", "hello", false);
        registry.register("conn-1".into(), "alicia");

        assert_eq!(msg.username, "alice");
        assert_eq!(msg.user_id.as_str(), "conn-1");
        assert_eq!(msg.channel_id, "general");
    }

    #[test]
    fn test_unique_message_ids() {
        let mut registry = SessionRegistry::new();
        let author = registry.register("conn-1".into(), "alice");

        let a = Message::new(&author, "general", "one", false);
        let b = Message::new(&author, "general", "two", false);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_view() {
        let mut registry = SessionRegistry::new();
        let author = registry.register("conn-1".into(), "alice");

        let msg = Message::new(&author, "general", "hello", true);
        let view = msg.view();
        assert_eq!(view.id, msg.id.to_string());
        assert_eq!(view.user_id, "conn-1");
        assert_eq!(view.content, "hello");
        assert!(view.encrypted);
    }
}
