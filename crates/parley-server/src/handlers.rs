//! Connection handlers for Parley server.
//!
//! This module handles the HTTP routes, the connection lifecycle, and
//! frame decoding.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{
        rejection::JsonRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::BytesMut;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parley_core::{ChannelError, ConnectionId, Hub, HubError};
use parley_protocol::{codec, codes, ChannelView, ClientEvent, Encoded, ServerEvent, WireFormat};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The chat hub.
    pub hub: Hub,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            hub: Hub::with_config(config.hub_config()),
            config,
        }
    }
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/api/channels", get(list_channels).post(create_channel))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        match config.metrics_addr() {
            Ok(addr) => {
                if let Err(e) = metrics::start_metrics_server(addr) {
                    error!("Failed to start metrics server: {}", e);
                }
            }
            Err(e) => error!("Invalid metrics address: {:#}", e),
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Parley server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    serve(listener, Arc::new(AppState::new(config))).await
}

/// Serve on an already bound listener.
///
/// # Errors
///
/// Returns an error if the server stops with an I/O error.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    metrics::set_active_channels(state.hub.stats().await.channel_count);
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Body of `POST /api/channels`.
#[derive(Debug, Default, Deserialize)]
struct CreateChannelBody {
    #[serde(default)]
    name: String,
}

async fn list_channels(State(state): State<Arc<AppState>>) -> Json<Vec<ChannelView>> {
    Json(state.hub.channels().await)
}

/// An unreadable body is treated as one without a name.
async fn create_channel(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateChannelBody>, JsonRejection>,
) -> Result<(StatusCode, Json<ChannelView>), ApiError> {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            debug!(error = %rejection, "Unreadable channel request body");
            CreateChannelBody::default()
        }
    };
    let channel = state.hub.create_channel(&body.name, None).await?;
    metrics::set_active_channels(state.hub.stats().await.channel_count);
    Ok((StatusCode::CREATED, Json(channel)))
}

/// HTTP error response.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] HubError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            HubError::Channel(ChannelError::InvalidName(_)) => StatusCode::BAD_REQUEST,
            HubError::Channel(ChannelError::AlreadyExists(_)) => StatusCode::CONFLICT,
            HubError::Channel(ChannelError::LimitReached) | HubError::TooManyConnections => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            HubError::NotIdentified(_) | HubError::UnknownConnection(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let max_frame_size = state.config.limits.max_frame_size;
    ws.max_message_size(max_frame_size)
        .max_frame_size(max_frame_size)
        .on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(mut socket: WebSocket, state: Arc<AppState>) {
    let (outbox, mut inbox) = mpsc::unbounded_channel();

    let connection_id = match state.hub.connect(outbox).await {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "Connection rejected");
            metrics::record_error("connection_limit");
            if let Ok(text) = codec::encode_text(&ServerEvent::error(e.code(), e.to_string())) {
                let _ = socket.send(Message::Text(text)).await;
            }
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();
    debug!(connection = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    // Replies use the format the client last sent.
    let mut format = WireFormat::Text;

    // Read buffer for partial binary frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            biased;

            // Events queued by the hub
            Some(event) = inbox.recv() => {
                if let Err(e) = send_event(&mut sender, format, &event).await {
                    debug!(connection = %connection_id, error = %e, "Send failed");
                    break;
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let start = Instant::now();
                        format = WireFormat::Text;

                        match codec::decode_text::<ClientEvent>(&text) {
                            Ok(event) => {
                                dispatch(&state, &connection_id, event, text.len()).await;
                            }
                            Err(e) => reject_frame(&state, &connection_id, &e),
                        }

                        metrics::record_latency(start.elapsed().as_secs_f64());
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let start = Instant::now();
                        format = WireFormat::Binary;
                        read_buffer.extend_from_slice(&data);

                        loop {
                            match codec::decode_from::<ClientEvent>(&mut read_buffer) {
                                Ok(Some(event)) => {
                                    dispatch(&state, &connection_id, event, data.len()).await;
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    reject_frame(&state, &connection_id, &e);
                                    read_buffer.clear();
                                    break;
                                }
                            }
                        }

                        metrics::record_latency(start.elapsed().as_secs_f64());
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    state.hub.disconnect(&connection_id).await;
    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Apply a decoded client event.
///
/// Returns `false` if the event was rejected, ignored, or was a chat
/// message dropped as blank or too long.
async fn dispatch(
    state: &AppState,
    connection_id: &ConnectionId,
    event: ClientEvent,
    bytes: usize,
) -> bool {
    let name = event.name();
    metrics::record_event(name, "inbound", bytes);

    let result = match event {
        ClientEvent::Message(message) => state
            .hub
            .send_message(connection_id, message)
            .await
            .map(|sent| sent.is_some()),
        event => state.hub.handle(connection_id, event).await.map(|()| true),
    };

    match result {
        Ok(true) => {
            match name {
                "message" => metrics::record_broadcast(),
                "create_channel" => {
                    metrics::set_active_channels(state.hub.stats().await.channel_count);
                }
                _ => {}
            }
            true
        }
        Ok(false) => {
            debug!(connection = %connection_id, event = name, "Message dropped");
            false
        }
        Err(e @ (HubError::NotIdentified(_) | HubError::UnknownConnection(_))) => {
            debug!(connection = %connection_id, event = name, error = %e, "Ignoring event");
            false
        }
        Err(e) => {
            warn!(connection = %connection_id, event = name, error = %e, "Event rejected");
            metrics::record_error("rejected_event");
            false
        }
    }
}

/// Report an undecodable frame to its sender.
fn reject_frame(state: &AppState, connection_id: &ConnectionId, err: &codec::ProtocolError) {
    warn!(connection = %connection_id, error = %err, "Invalid frame");
    metrics::record_error("invalid_frame");
    state
        .hub
        .report_error(connection_id, codes::INVALID_FRAME, err.to_string());
}

/// Send an event to the WebSocket.
async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    format: WireFormat,
    event: &ServerEvent,
) -> Result<()> {
    let encoded = format.encode(event)?;
    metrics::record_event(event.name(), "outbound", encoded.len());

    let message = match encoded {
        Encoded::Text(text) => Message::Text(text),
        Encoded::Binary(data) => Message::Binary(data.to_vec()),
    };
    sender.send(message).await?;
    Ok(())
}
