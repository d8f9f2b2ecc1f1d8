//! Broadcast hub for Parley.
//!
//! The hub owns all shared chat state and turns client intents into state
//! changes and the events that announce them.
//!
//! All state sits behind one lock. Each operation mutates the state and
//! queues its events to every recipient before releasing the lock, so two
//! concurrent operations are never observed in different orders by
//! different connections.

use crate::channel::{validate_channel_name, ChannelDirectory, ChannelError, ChannelId};
use crate::membership::MembershipTracker;
use crate::message::{is_valid_content, Message, DEFAULT_MAX_MESSAGE_LENGTH};
use crate::session::{ConnectionId, SessionId, SessionRegistry};
use crate::typing::TypingTracker;
use dashmap::DashMap;
use parley_protocol::{
    codes, ChannelView, ClientEvent, Connected, Heartbeat, MessageHistory, MessageView,
    PresenceNotice, SendMessage, ServerEvent, TypingNotice, UserView, PROTOCOL_VERSION,
};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, trace, warn};

/// Outbound event queue of one connection.
///
/// The transport owns the receiving end; the hub only holds this sender.
pub type Outbox = mpsc::UnboundedSender<Arc<ServerEvent>>;

/// Hub errors.
#[derive(Debug, Error)]
pub enum HubError {
    /// Channel directory rejected the request.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The connection has not sent `join`, or its session is gone.
    #[error("Connection has not joined: {0}")]
    NotIdentified(ConnectionId),

    /// The connection is not registered with the hub.
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// Maximum connections reached.
    #[error("Maximum connections reached")]
    TooManyConnections,
}

impl HubError {
    /// Protocol error code for this error.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            HubError::Channel(ChannelError::InvalidName(_)) => codes::INVALID_CHANNEL,
            HubError::Channel(ChannelError::AlreadyExists(_)) => codes::CHANNEL_EXISTS,
            HubError::Channel(ChannelError::LimitReached) => codes::CHANNEL_LIMIT,
            HubError::NotIdentified(_) | HubError::UnknownConnection(_) => codes::NOT_IDENTIFIED,
            HubError::TooManyConnections => codes::SERVER_FULL,
        }
    }
}

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of live connections.
    pub max_connections: usize,
    /// Maximum number of channels, including `general`.
    pub max_channels: usize,
    /// Maximum message length in characters.
    pub max_message_length: usize,
    /// Channels created at startup besides `general`.
    pub bootstrap_channels: Vec<String>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            max_channels: crate::channel::DEFAULT_MAX_CHANNELS,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            bootstrap_channels: Vec::new(),
        }
    }
}

/// Everything guarded by the hub lock.
struct HubState {
    sessions: SessionRegistry,
    channels: ChannelDirectory,
    membership: MembershipTracker,
    typing: TypingTracker,
}

/// The central chat hub.
pub struct Hub {
    state: Mutex<HubState>,
    /// Outbound queues of all live connections, identified or not.
    connections: DashMap<ConnectionId, Outbox>,
    config: HubConfig,
}

impl Hub {
    /// Create a new hub with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a new hub with custom configuration.
    #[must_use]
    pub fn with_config(config: HubConfig) -> Self {
        info!("Creating hub with config: {:?}", config);

        let mut channels = ChannelDirectory::with_limit(config.max_channels);
        channels.create_default_channel();
        for name in &config.bootstrap_channels {
            match channels.create(name) {
                Ok(channel) => info!(channel = %channel.id(), "Created bootstrap channel"),
                Err(ChannelError::AlreadyExists(_)) => {}
                Err(e) => warn!(name = %name, error = %e, "Skipping bootstrap channel"),
            }
        }

        Self {
            state: Mutex::new(HubState {
                sessions: SessionRegistry::new(),
                channels,
                membership: MembershipTracker::new(),
                typing: TypingTracker::new(),
            }),
            connections: DashMap::new(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Register a new connection and send it the `connected` handshake.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection limit is reached.
    pub async fn connect(&self, outbox: Outbox) -> Result<ConnectionId, HubError> {
        // Held so the limit check and the insert cannot interleave with
        // other connects or disconnects.
        let _guard = self.state.lock().await;

        if self.connections.len() >= self.config.max_connections {
            warn!(limit = self.config.max_connections, "Rejecting connection");
            return Err(HubError::TooManyConnections);
        }

        let id = ConnectionId::generate();
        let _ = outbox.send(Arc::new(ServerEvent::Connected(Connected {
            connection_id: id.to_string(),
            version: PROTOCOL_VERSION,
        })));
        self.connections.insert(id.clone(), outbox);

        debug!(connection = %id, version = %PROTOCOL_VERSION, "Connection registered");
        Ok(id)
    }

    /// Dispatch a client event.
    ///
    /// # Errors
    ///
    /// Returns the error of the underlying operation. Failed channel
    /// creation has already been reported to the connection.
    pub async fn handle(&self, id: &ConnectionId, event: ClientEvent) -> Result<(), HubError> {
        match event {
            ClientEvent::Join(name) => self.join(id, &name).await.map(drop),
            ClientEvent::JoinChannel(channel) => self.join_channel(id, &channel).await,
            ClientEvent::LeaveChannel(channel) => self.leave_channel(id, &channel).await,
            ClientEvent::Message(message) => self.send_message(id, message).await.map(drop),
            ClientEvent::Typing(target) => self.typing_start(id, &target.channel_id).await.map(drop),
            ClientEvent::StopTyping(target) => {
                self.typing_stop(id, &target.channel_id).await.map(drop)
            }
            ClientEvent::CreateChannel(request) => {
                self.create_channel(&request.name, Some(id)).await.map(drop)
            }
            ClientEvent::Ping(heartbeat) => {
                self.pong(id, heartbeat);
                Ok(())
            }
        }
    }

    /// Identify a connection.
    ///
    /// Announces the updated user list and a join notice to everyone and
    /// sends the channel list to the joining connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is not registered.
    pub async fn join(&self, id: &ConnectionId, name: &str) -> Result<UserView, HubError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if !self.connections.contains_key(id) {
            return Err(HubError::UnknownConnection(id.clone()));
        }

        let user = state.sessions.register(id.clone(), name).view();

        self.broadcast(ServerEvent::UsersUpdate(state.sessions.views()));
        self.broadcast(ServerEvent::UserJoined(PresenceNotice {
            user: user.clone(),
            message: format!("{} joined the chat", user.username),
        }));
        self.send_to(id, ServerEvent::ChannelsList(state.channels.views()));

        info!(connection = %id, username = %user.username, "User joined");
        Ok(user)
    }

    /// Move a session into a channel and send it the channel's history.
    ///
    /// Other members are not notified.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel id is malformed or the connection has
    /// not joined.
    pub async fn join_channel(&self, id: &ConnectionId, channel_id: &str) -> Result<(), HubError> {
        validate_channel_id(channel_id)?;

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        require_session(state, id)?;

        if let Some(previous) = state.membership.join(id, channel_id) {
            self.clear_typing(state, &previous, id);
        }

        let messages: Vec<MessageView> = state
            .channels
            .history(channel_id)
            .iter()
            .map(|m| m.view())
            .collect();
        let count = messages.len();
        self.send_to(
            id,
            ServerEvent::MessageHistory(MessageHistory {
                channel_id: channel_id.to_string(),
                messages,
            }),
        );

        debug!(connection = %id, channel = %channel_id, history = count, "Joined channel");
        Ok(())
    }

    /// Leave a channel if it is the session's current one.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection has not joined.
    pub async fn leave_channel(&self, id: &ConnectionId, channel_id: &str) -> Result<(), HubError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        require_session(state, id)?;

        if state.membership.leave(id, channel_id) {
            self.clear_typing(state, channel_id, id);
            debug!(connection = %id, channel = %channel_id, "Left channel");
        }
        Ok(())
    }

    /// Store a message and deliver it to the channel's members.
    ///
    /// Blank or over-length content is dropped without error and yields
    /// `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel id is malformed or the connection has
    /// not joined.
    pub async fn send_message(
        &self,
        id: &ConnectionId,
        request: SendMessage,
    ) -> Result<Option<MessageView>, HubError> {
        validate_channel_id(&request.channel_id)?;

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let author = state
            .sessions
            .get(id)
            .ok_or_else(|| HubError::NotIdentified(id.clone()))?;

        if !is_valid_content(&request.content, self.config.max_message_length) {
            debug!(connection = %id, channel = %request.channel_id, "Dropped invalid message");
            return Ok(None);
        }

        let message = Arc::new(Message::new(
            author,
            request.channel_id.clone(),
            request.content,
            request.encrypted,
        ));
        state
            .channels
            .append_message(&request.channel_id, Arc::clone(&message));

        let view = message.view();
        let members = state.membership.members_of(&request.channel_id);
        let recipients = self.broadcast_to(&members, None, ServerEvent::NewMessage(view.clone()));

        debug!(
            connection = %id,
            channel = %request.channel_id,
            recipients = recipients,
            "Message sent"
        );
        Ok(Some(view))
    }

    /// Mark a session as typing and tell the other channel members.
    ///
    /// Returns `false` if the session was already typing there or is not
    /// joined to the channel; nothing is broadcast in that case.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection has not joined.
    pub async fn typing_start(&self, id: &ConnectionId, channel_id: &str) -> Result<bool, HubError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let username = require_session(state, id)?;

        if state.membership.channel_of(id).map(String::as_str) != Some(channel_id) {
            debug!(connection = %id, channel = %channel_id, "Ignoring typing outside current channel");
            return Ok(false);
        }
        if !state.typing.start(channel_id, id) {
            return Ok(false);
        }

        let members = state.membership.members_of(channel_id);
        self.broadcast_to(
            &members,
            Some(id),
            ServerEvent::UserTyping(TypingNotice {
                user_id: id.to_string(),
                username: Some(username),
                channel_id: channel_id.to_string(),
            }),
        );
        Ok(true)
    }

    /// Clear a session's typing mark and tell the other channel members.
    ///
    /// Returns `false` if the session was not typing there.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection has not joined.
    pub async fn typing_stop(&self, id: &ConnectionId, channel_id: &str) -> Result<bool, HubError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        require_session(state, id)?;

        Ok(self.clear_typing(state, channel_id, id))
    }

    /// Create a channel and announce it to everyone.
    ///
    /// A failure is reported to `requester` only, if given.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid, the slug exists, or the
    /// channel limit is reached.
    pub async fn create_channel(
        &self,
        name: &str,
        requester: Option<&ConnectionId>,
    ) -> Result<ChannelView, HubError> {
        let mut guard = self.state.lock().await;

        match guard.channels.create(name) {
            Ok(channel) => {
                let view = channel.view();
                self.broadcast(ServerEvent::ChannelCreated(view.clone()));
                info!(channel = %view.id, name = %view.name, "Channel created");
                Ok(view)
            }
            Err(e) => {
                warn!(name = %name, error = %e, "Channel creation rejected");
                let err = HubError::from(e);
                if let Some(requester) = requester {
                    self.report_error(requester, err.code(), err.to_string());
                }
                Err(err)
            }
        }
    }

    /// Tear down a connection.
    ///
    /// If the connection had joined, its membership and typing marks are
    /// cleared and the remaining connections get the updated user list and a
    /// leave notice. Returns the removed session's public view.
    pub async fn disconnect(&self, id: &ConnectionId) -> Option<UserView> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        self.connections.remove(id);

        let Some(session) = state.sessions.unregister(id) else {
            debug!(connection = %id, "Connection closed before join");
            return None;
        };

        state.membership.leave_all(id);
        for channel_id in state.typing.clear_session(id) {
            let members = state.membership.members_of(&channel_id);
            self.broadcast_to(&members, Some(id), stop_typing(id, channel_id));
        }

        let user = session.view();
        self.broadcast(ServerEvent::UsersUpdate(state.sessions.views()));
        self.broadcast(ServerEvent::UserLeft(PresenceNotice {
            user: user.clone(),
            message: format!("{} left the chat", user.username),
        }));

        info!(connection = %id, username = %user.username, "User left");
        Some(user)
    }

    /// Answer a keepalive.
    pub fn pong(&self, id: &ConnectionId, heartbeat: Heartbeat) {
        self.send_to(id, ServerEvent::Pong(heartbeat));
    }

    /// Send an `error` event to one connection.
    pub fn report_error(&self, id: &ConnectionId, code: u16, message: impl Into<String>) {
        self.send_to(id, ServerEvent::error(code, message));
    }

    /// All channels in creation order.
    pub async fn channels(&self) -> Vec<ChannelView> {
        self.state.lock().await.channels.views()
    }

    /// A channel's history in send order.
    pub async fn history(&self, channel_id: &str) -> Vec<MessageView> {
        let state = self.state.lock().await;
        state
            .channels
            .history(channel_id)
            .iter()
            .map(|m| m.view())
            .collect()
    }

    /// All identified users in join order.
    pub async fn users(&self) -> Vec<UserView> {
        self.state.lock().await.sessions.views()
    }

    /// The channel a session is currently joined to.
    pub async fn channel_of(&self, id: &SessionId) -> Option<ChannelId> {
        self.state.lock().await.membership.channel_of(id).cloned()
    }

    /// Sessions joined to a channel.
    pub async fn members_of(&self, channel_id: &str) -> HashSet<SessionId> {
        self.state.lock().await.membership.members_of(channel_id)
    }

    /// Sessions typing in a channel.
    pub async fn active_typers(&self, channel_id: &str) -> HashSet<SessionId> {
        self.state.lock().await.typing.active_typers(channel_id)
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Get hub statistics.
    pub async fn stats(&self) -> HubStats {
        let state = self.state.lock().await;
        HubStats {
            connection_count: self.connections.len(),
            session_count: state.sessions.len(),
            channel_count: state.channels.len(),
            message_count: state.channels.message_count(),
        }
    }

    /// Clear a typing mark, notifying the channel's other members.
    fn clear_typing(&self, state: &mut HubState, channel_id: &str, id: &SessionId) -> bool {
        if !state.typing.stop(channel_id, id) {
            return false;
        }
        let members = state.membership.members_of(channel_id);
        self.broadcast_to(&members, Some(id), stop_typing(id, channel_id.to_string()));
        true
    }

    fn send_to(&self, id: &ConnectionId, event: ServerEvent) -> bool {
        match self.connections.get(id) {
            Some(outbox) => outbox.send(Arc::new(event)).is_ok(),
            None => false,
        }
    }

    /// Send an event to every live connection.
    fn broadcast(&self, event: ServerEvent) -> usize {
        let event = Arc::new(event);
        let delivered = self
            .connections
            .iter()
            .filter(|entry| entry.value().send(Arc::clone(&event)).is_ok())
            .count();
        trace!(event = event.name(), recipients = delivered, "Broadcast");
        delivered
    }

    /// Send an event to the given members, optionally skipping one.
    fn broadcast_to(
        &self,
        members: &HashSet<SessionId>,
        except: Option<&SessionId>,
        event: ServerEvent,
    ) -> usize {
        let event = Arc::new(event);
        let delivered = members
            .iter()
            .filter(|member| Some(*member) != except)
            .filter_map(|member| self.connections.get(member))
            .filter(|outbox| outbox.send(Arc::clone(&event)).is_ok())
            .count();
        trace!(event = event.name(), recipients = delivered, "Scoped broadcast");
        delivered
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// Hub statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubStats {
    /// Number of live connections.
    pub connection_count: usize,
    /// Number of identified sessions.
    pub session_count: usize,
    /// Number of channels.
    pub channel_count: usize,
    /// Number of stored messages.
    pub message_count: usize,
}

fn validate_channel_id(channel_id: &str) -> Result<(), HubError> {
    validate_channel_name(channel_id)
        .map_err(|reason| HubError::Channel(ChannelError::InvalidName(reason)))
}

/// Look up a session, returning its display name.
fn require_session(state: &HubState, id: &ConnectionId) -> Result<String, HubError> {
    state
        .sessions
        .get(id)
        .map(|s| s.username().to_string())
        .ok_or_else(|| HubError::NotIdentified(id.clone()))
}

fn stop_typing(id: &SessionId, channel_id: ChannelId) -> ServerEvent {
    ServerEvent::UserStopTyping(TypingNotice {
        user_id: id.to_string(),
        username: None,
        channel_id,
    })
}
