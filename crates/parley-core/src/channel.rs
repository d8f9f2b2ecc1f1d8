//! Channel directory for Parley.
//!
//! Channels are named rooms addressed by a slug derived from their name.
//! The directory also keeps each channel's message history.

use crate::message::Message;
use chrono::{DateTime, Utc};
use parley_protocol::ChannelView;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Maximum channel name length.
pub const MAX_CHANNEL_NAME_LENGTH: usize = 256;

/// Default maximum number of channels.
pub const DEFAULT_MAX_CHANNELS: usize = 1000;

/// Slug of the channel that always exists.
pub const DEFAULT_CHANNEL: &str = "general";

/// A channel identifier (its slug).
pub type ChannelId = String;

/// Channel directory errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Invalid channel name.
    #[error("Invalid channel name: {0}")]
    InvalidName(&'static str),

    /// A channel with the same slug exists.
    #[error("Channel already exists: {0}")]
    AlreadyExists(ChannelId),

    /// The directory is full.
    #[error("Maximum channels reached")]
    LimitReached,
}

/// Validate a channel name.
///
/// # Errors
///
/// Returns an error message if the channel name is invalid.
pub fn validate_channel_name(name: &str) -> Result<(), &'static str> {
    if name.trim().is_empty() {
        return Err("Channel name cannot be empty");
    }
    if name.len() > MAX_CHANNEL_NAME_LENGTH {
        return Err("Channel name too long");
    }
    if name.chars().any(|c| c.is_control() && !c.is_whitespace()) {
        return Err("Channel name contains invalid characters");
    }
    Ok(())
}

/// Derive a channel slug: lowercase, each run of whitespace replaced by `-`.
///
/// Leading and trailing whitespace is dropped.
#[must_use]
pub fn slugify(name: &str) -> ChannelId {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// A channel's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    id: ChannelId,
    name: String,
    created_at: DateTime<Utc>,
}

impl Channel {
    fn new(id: ChannelId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn view(&self) -> ChannelView {
        ChannelView {
            id: self.id.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
        }
    }
}

/// The set of channels and their histories.
///
/// Histories are keyed independently of channels: a message addressed to a
/// channel id the directory does not know gets its own history bucket.
#[derive(Debug)]
pub struct ChannelDirectory {
    channels: HashMap<ChannelId, Channel>,
    /// Creation order.
    order: Vec<ChannelId>,
    histories: HashMap<ChannelId, Vec<Arc<Message>>>,
    max_channels: usize,
}

impl ChannelDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_CHANNELS)
    }

    /// Create an empty directory holding at most `max_channels` channels.
    #[must_use]
    pub fn with_limit(max_channels: usize) -> Self {
        Self {
            channels: HashMap::new(),
            order: Vec::new(),
            histories: HashMap::new(),
            max_channels,
        }
    }

    /// Ensure the `general` channel exists.
    pub fn create_default_channel(&mut self) {
        if !self.channels.contains_key(DEFAULT_CHANNEL) {
            self.insert(Channel::new(DEFAULT_CHANNEL.to_string(), DEFAULT_CHANNEL));
            info!(channel = DEFAULT_CHANNEL, "Created default channel");
        }
    }

    /// Create a channel from a display name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid, the slug is taken, or the
    /// directory is full. The directory is unchanged on error.
    pub fn create(&mut self, name: &str) -> Result<Channel, ChannelError> {
        validate_channel_name(name).map_err(ChannelError::InvalidName)?;

        let id = slugify(name);
        if self.channels.contains_key(&id) {
            return Err(ChannelError::AlreadyExists(id));
        }
        if self.channels.len() >= self.max_channels {
            return Err(ChannelError::LimitReached);
        }

        let channel = Channel::new(id, name.trim());
        self.insert(channel.clone());
        debug!(channel = %channel.id, name = %channel.name, "Channel created");
        Ok(channel)
    }

    fn insert(&mut self, channel: Channel) {
        self.histories.entry(channel.id.clone()).or_default();
        self.order.push(channel.id.clone());
        self.channels.insert(channel.id.clone(), channel);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Channel> {
        self.channels.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.channels.contains_key(id)
    }

    /// All channels in creation order.
    #[must_use]
    pub fn list(&self) -> Vec<&Channel> {
        self.order
            .iter()
            .filter_map(|id| self.channels.get(id))
            .collect()
    }

    #[must_use]
    pub fn views(&self) -> Vec<ChannelView> {
        self.list().into_iter().map(Channel::view).collect()
    }

    /// Append a message to its channel's history.
    pub fn append_message(&mut self, channel_id: &str, message: Arc<Message>) {
        self.histories
            .entry(channel_id.to_string())
            .or_default()
            .push(message);
    }

    /// A channel's history in send order. Empty if the channel is unknown.
    #[must_use]
    pub fn history(&self, channel_id: &str) -> &[Arc<Message>] {
        self.histories
            .get(channel_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Number of channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Total number of stored messages across all histories.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.histories.values().map(Vec::len).sum()
    }
}

impl Default for ChannelDirectory {
    fn default() -> Self {
        Self::new()
    }
}
