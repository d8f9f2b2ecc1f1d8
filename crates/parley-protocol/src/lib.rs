//! # parley-protocol
//!
//! Wire protocol definitions for the Parley chat server.
//!
//! This crate defines the named events exchanged between Parley clients and
//! the server, the codecs that carry them, and protocol versioning.
//!
//! ## Events
//!
//! - `join` / `join_channel` / `leave_channel` - Identity and channel scope
//! - `message` / `new_message` / `message_history` - Chat traffic
//! - `typing` / `user_typing` - Ephemeral typing indicators
//! - `users_update` / `user_joined` / `user_left` - Presence
//!
//! ## Example
//!
//! ```rust
//! use parley_protocol::{codec, ClientEvent};
//!
//! let event = ClientEvent::message("general", "Hello, world!");
//!
//! let text = codec::encode_text(&event).unwrap();
//! let decoded: ClientEvent = codec::decode_text(&text).unwrap();
//! assert_eq!(event, decoded);
//! ```

pub mod codec;
pub mod events;
pub mod version;

pub use codec::{Encoded, ProtocolError, WireFormat};
pub use events::{
    codes, ChannelRef, ChannelView, ClientEvent, Connected, CreateChannel, ErrorNotice, Heartbeat,
    MessageHistory, MessageView, PresenceNotice, SendMessage, ServerEvent, TypingNotice, UserView,
};
pub use version::{Version, PROTOCOL_VERSION};
