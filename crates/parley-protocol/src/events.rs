//! Event types for the Parley protocol.
//!
//! Every frame carries one named event with a structured payload:
//!
//! ```json
//! { "event": "join_channel", "data": "general" }
//! ```
//!
//! Client events are intents; server events are state changes pushed to a
//! single connection, to the members of one channel, or to everyone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::version::Version;

/// Error codes carried by [`ServerEvent::Error`].
pub mod codes {
    /// The frame could not be decoded.
    pub const INVALID_FRAME: u16 = 1001;
    /// The channel name is empty or malformed.
    pub const INVALID_CHANNEL: u16 = 1002;
    /// A channel with the same slug already exists.
    pub const CHANNEL_EXISTS: u16 = 1003;
    /// The server holds the maximum number of channels.
    pub const CHANNEL_LIMIT: u16 = 1004;
    /// The connection has not sent `join` yet.
    pub const NOT_IDENTIFIED: u16 = 1005;
    /// The server holds the maximum number of connections.
    pub const SERVER_FULL: u16 = 1006;
}

/// Public view of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelView {
    /// Channel slug.
    pub id: String,
    /// Display name.
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Public view of a connected user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub username: String,
    pub joined_at: DateTime<Utc>,
}

/// A chat message as delivered to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    /// Author's user id at send time.
    pub user_id: String,
    /// Author's display name at send time.
    pub username: String,
    pub content: String,
    /// Opaque client-side marker, stored and echoed only.
    pub encrypted: bool,
    pub timestamp: DateTime<Utc>,
    pub channel_id: String,
}

/// Payload of the `message` client event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub channel_id: String,
    pub content: String,
    #[serde(default)]
    pub encrypted: bool,
}

/// Payload naming a channel, used by `typing` and `stop_typing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRef {
    pub channel_id: String,
}

/// Payload of the `create_channel` client event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateChannel {
    #[serde(default)]
    pub name: String,
}

/// Keepalive payload, echoed back unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

/// Events sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Identify with a display name.
    Join(String),
    /// Switch the broadcast scope to a channel.
    JoinChannel(String),
    /// Leave a channel's broadcast scope.
    LeaveChannel(String),
    /// Send a message to a channel.
    Message(SendMessage),
    /// The user started typing.
    Typing(ChannelRef),
    /// The user stopped typing.
    StopTyping(ChannelRef),
    /// Create a new channel.
    CreateChannel(CreateChannel),
    /// Keepalive.
    Ping(Heartbeat),
}

impl ClientEvent {
    /// The event name as it appears on the wire.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Join(_) => "join",
            ClientEvent::JoinChannel(_) => "join_channel",
            ClientEvent::LeaveChannel(_) => "leave_channel",
            ClientEvent::Message(_) => "message",
            ClientEvent::Typing(_) => "typing",
            ClientEvent::StopTyping(_) => "stop_typing",
            ClientEvent::CreateChannel(_) => "create_channel",
            ClientEvent::Ping(_) => "ping",
        }
    }

    /// Create a `join` event.
    #[must_use]
    pub fn join(username: impl Into<String>) -> Self {
        ClientEvent::Join(username.into())
    }

    /// Create a `join_channel` event.
    #[must_use]
    pub fn join_channel(channel_id: impl Into<String>) -> Self {
        ClientEvent::JoinChannel(channel_id.into())
    }

    /// Create a `message` event.
    #[must_use]
    pub fn message(channel_id: impl Into<String>, content: impl Into<String>) -> Self {
        ClientEvent::Message(SendMessage {
            channel_id: channel_id.into(),
            content: content.into(),
            encrypted: false,
        })
    }

    /// Create a `typing` event.
    #[must_use]
    pub fn typing(channel_id: impl Into<String>) -> Self {
        ClientEvent::Typing(ChannelRef {
            channel_id: channel_id.into(),
        })
    }
}

/// `{ channelId, messages }` sent on `join_channel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageHistory {
    pub channel_id: String,
    pub messages: Vec<MessageView>,
}

/// `{ user, message }` sent when a user joins or leaves the chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceNotice {
    pub user: UserView,
    /// Human-readable notice, e.g. `"alice joined the chat"`.
    pub message: String,
}

/// Typing indicator for one user in one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingNotice {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub channel_id: String,
}

/// Handshake sent as the first event on every connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connected {
    pub connection_id: String,
    pub version: Version,
}

/// Error reported to the requesting connection only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub code: u16,
    pub message: String,
}

/// Events sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected(Connected),
    ChannelsList(Vec<ChannelView>),
    ChannelCreated(ChannelView),
    MessageHistory(MessageHistory),
    NewMessage(MessageView),
    UsersUpdate(Vec<UserView>),
    UserJoined(PresenceNotice),
    UserLeft(PresenceNotice),
    UserTyping(TypingNotice),
    UserStopTyping(TypingNotice),
    Error(ErrorNotice),
    Pong(Heartbeat),
}

impl ServerEvent {
    /// The event name as it appears on the wire.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected(_) => "connected",
            ServerEvent::ChannelsList(_) => "channels_list",
            ServerEvent::ChannelCreated(_) => "channel_created",
            ServerEvent::MessageHistory(_) => "message_history",
            ServerEvent::NewMessage(_) => "new_message",
            ServerEvent::UsersUpdate(_) => "users_update",
            ServerEvent::UserJoined(_) => "user_joined",
            ServerEvent::UserLeft(_) => "user_left",
            ServerEvent::UserTyping(_) => "user_typing",
            ServerEvent::UserStopTyping(_) => "user_stop_typing",
            ServerEvent::Error(_) => "error",
            ServerEvent::Pong(_) => "pong",
        }
    }

    /// Create an `error` event.
    #[must_use]
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorNotice {
            code,
            message: message.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_event_wire_shape() {
        let join: ClientEvent =
            serde_json::from_value(json!({"event": "join", "data": "alice"})).unwrap();
        assert_eq!(join, ClientEvent::join("alice"));
        assert_eq!(join.name(), "join");

        let message: ClientEvent = serde_json::from_value(json!({
            "event": "message",
            "data": {"channelId": "general", "content": "hi"}
        }))
        .unwrap();
        assert_eq!(message, ClientEvent::message("general", "hi"));

        let stop: ClientEvent = serde_json::from_value(json!({
            "event": "stop_typing",
            "data": {"channelId": "dev"}
        }))
        .unwrap();
        assert_eq!(stop.name(), "stop_typing");
    }

    #[test]
    fn test_encrypted_flag_is_kept() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "message",
            "data": {"channelId": "general", "content": "x", "encrypted": true}
        }))
        .unwrap();

        match event {
            ClientEvent::Message(msg) => assert!(msg.encrypted),
            other => panic!("Expected message, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let result =
            serde_json::from_value::<ClientEvent>(json!({"event": "delete_channel", "data": "x"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_server_event_wire_shape() {
        let event = ServerEvent::UserStopTyping(TypingNotice {
            user_id: "conn_1".into(),
            username: None,
            channel_id: "general".into(),
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "user_stop_typing",
                "data": {"userId": "conn_1", "channelId": "general"}
            })
        );
        assert_eq!(event.name(), "user_stop_typing");
    }

    #[test]
    fn test_error_event() {
        let value = serde_json::to_value(ServerEvent::error(codes::CHANNEL_EXISTS, "taken")).unwrap();
        assert_eq!(
            value,
            json!({"event": "error", "data": {"code": 1003, "message": "taken"}})
        );
    }
}
