//! # parley-core
//!
//! Chat state and event fan-out for the Parley server.
//!
//! This crate provides the building blocks:
//!
//! - **Session** - Identified connections and their display names
//! - **Channel** - Named rooms and their message histories
//! - **Membership** - Which channel each session is listening to
//! - **Typing** - Who is typing where
//! - **Hub** - Applies client intents and broadcasts the results
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────────┐
//! │  Connection │────▶│     Hub     │────▶│ Sessions/Channels│
//! └─────────────┘     └─────────────┘     └──────────────────┘
//!        ▲                   │
//!        │                   ▼
//!        │            ┌─────────────┐
//!        └────────────│   Outboxes  │
//!                     └─────────────┘
//! ```

pub mod channel;
pub mod hub;
pub mod membership;
pub mod message;
pub mod session;
pub mod typing;

pub use channel::{Channel, ChannelDirectory, ChannelError, ChannelId, DEFAULT_CHANNEL};
pub use hub::{Hub, HubConfig, HubError, HubStats, Outbox};
pub use membership::MembershipTracker;
pub use message::Message;
pub use session::{ConnectionId, Session, SessionId, SessionRegistry};
pub use typing::TypingTracker;
