//! Bridge WebSocket handler
//!
//! Adapts a browser WebSocket to a [`PeerLink`](crate::core::peer::PeerLink)
//! and runs one [`BridgeSession`] per connection.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Duration, timeout};
use tracing::{debug, error, info, warn};

use crate::core::audio::AudioFrame;
use crate::core::peer::{RemotePeer, peer_link};
use crate::core::pipeline::{
    BridgeSession, BridgeSessionConfig, SessionError, SessionHandle, SessionNotice,
};
use crate::core::realtime::RealtimeError;
use crate::state::{AppState, SessionSlot};

use super::messages::{
    BridgeIncomingMessage, BridgeMessageRoute, BridgeOutgoingMessage, BridgeSessionRequest,
};

/// Outgoing socket queue size
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Peer frame queue size in each direction
const PEER_BUFFER_SIZE: usize = 64;

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// How long a client may take to send its `config` message
const CONFIG_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the socket writer gets to flush after the session ends
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Bridge WebSocket handler
///
/// Reserves a session slot and upgrades the connection. Returns
/// 503 Service Unavailable when the server is at capacity.
pub async fn bridge_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let slot = match state.try_acquire_session() {
        Ok(slot) => slot,
        Err(e) => {
            warn!(error = %e, "Rejecting bridge connection");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                "Server at capacity. Please try again later.",
            )
                .into_response();
        }
    };

    info!(
        active_sessions = state.active_sessions(),
        "Bridge WebSocket connection upgrade requested"
    );

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_bridge_socket(socket, state, slot))
}

/// Stable error code reported to the browser.
fn error_code(error: &SessionError) -> &'static str {
    match error {
        e if e.is_configuration() => "configuration_error",
        SessionError::Transport(RealtimeError::ConnectionFailed(_)) => "connection_failed",
        SessionError::Transport(_) => "transport_error",
        SessionError::Bridge(_) | SessionError::Pacing(_) => "audio_error",
        SessionError::PeerClosed | SessionError::Cancelled => "session_closed",
        SessionError::Configuration(_) | SessionError::Internal(_) => "internal_error",
    }
}

/// Handle the bridge WebSocket connection
async fn handle_bridge_socket(socket: WebSocket, app_state: Arc<AppState>, slot: SessionSlot) {
    info!("Bridge WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<BridgeMessageRoute>(CHANNEL_BUFFER_SIZE);

    // Sender task for outgoing messages
    let mut sender_task = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let should_close = matches!(route, BridgeMessageRoute::Close);

            let result = match route {
                BridgeMessageRoute::Outgoing(message) => match serde_json::to_string(&message) {
                    Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing message: {}", e);
                        continue;
                    }
                },
                BridgeMessageRoute::Audio(data) => sender.send(Message::Binary(data)).await,
                BridgeMessageRoute::Close => sender.send(Message::Close(None)).await,
            };

            if let Err(e) = result {
                debug!("Failed to send WebSocket message: {}", e);
                break;
            }

            if should_close {
                break;
            }
        }
    });

    let request = match timeout(CONFIG_TIMEOUT, wait_for_config(&mut receiver, &message_tx)).await
    {
        Ok(request) => request,
        Err(_) => {
            warn!("Client did not send config in time");
            let _ = message_tx
                .send(BridgeMessageRoute::Outgoing(BridgeOutgoingMessage::error(
                    "config_timeout",
                    "No config message received",
                )))
                .await;
            None
        }
    };

    if let Some(request) = request {
        run_session(request, &mut receiver, &message_tx, &app_state).await;
    }

    let _ = message_tx.send(BridgeMessageRoute::Close).await;
    drop(message_tx);
    if timeout(WRITER_DRAIN_TIMEOUT, &mut sender_task).await.is_err() {
        sender_task.abort();
    }
    drop(slot);

    info!("Bridge WebSocket connection terminated");
}

/// Read messages until a valid `config` arrives.
///
/// Returns `None` if the client stops or disconnects first.
async fn wait_for_config(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    message_tx: &mpsc::Sender<BridgeMessageRoute>,
) -> Option<BridgeSessionRequest> {
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<BridgeIncomingMessage>(&text) {
                Ok(BridgeIncomingMessage::Config(request)) => match request.validate_size() {
                    Ok(()) => return Some(request),
                    Err(e) => {
                        warn!("Config validation failed: {}", e);
                        send_error(message_tx, "validation_error", e.to_string()).await;
                    }
                },
                Ok(BridgeIncomingMessage::Stop) => return None,
                Err(e) => {
                    warn!("Failed to parse bridge message: {}", e);
                    send_error(message_tx, "parse_error", format!("Invalid message format: {e}"))
                        .await;
                }
            },
            Ok(Message::Binary(data)) => {
                debug!(bytes = data.len(), "Dropping audio received before config");
                send_error(message_tx, "not_configured", "Send a config message first").await;
            }
            Ok(Message::Close(_)) => return None,
            Ok(_) => {}
            Err(e) => {
                warn!("Bridge WebSocket error: {}", e);
                return None;
            }
        }
    }
    None
}

/// Start a bridge session and shuttle frames until either side ends it.
async fn run_session(
    request: BridgeSessionRequest,
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    message_tx: &mpsc::Sender<BridgeMessageRoute>,
    app_state: &Arc<AppState>,
) {
    let config = &app_state.config;
    let peer_format = match request.peer_format(config.peer_format()) {
        Ok(format) => format,
        Err(e) => {
            send_error(message_tx, "unsupported_format", e.to_string()).await;
            return;
        }
    };

    let (link, remote) = peer_link(peer_format, PEER_BUFFER_SIZE);
    let session_config =
        BridgeSessionConfig::new(config.realtime_config(request.voice, request.instructions));

    let handle = match BridgeSession::start_realtime(session_config, link).await {
        Ok(handle) => handle,
        Err(e) => {
            warn!(error = %e, "Failed to start bridge session");
            send_error(message_tx, error_code(&e), e.to_string()).await;
            return;
        }
    };

    info!(id = handle.id(), %peer_format, "Bridge session running");
    let _ = message_tx
        .send(BridgeMessageRoute::Outgoing(
            BridgeOutgoingMessage::SessionStarted {
                session_id: handle.id().to_string(),
                codec: peer_format.encoding.as_str().to_string(),
                sample_rate: peer_format.sample_rate,
                channels: peer_format.channels,
            },
        ))
        .await;

    let notices = handle.subscribe();
    pump_frames(receiver, remote, notices, message_tx).await;
    finish_session(handle, message_tx).await;
}

/// Move frames between the socket and the peer link.
async fn pump_frames(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    mut remote: RemotePeer,
    mut notices: broadcast::Receiver<SessionNotice>,
    message_tx: &mpsc::Sender<BridgeMessageRoute>,
) {
    let peer_format = remote.format();
    let mut notices_open = true;

    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Binary(data))) => {
                    if remote.send(AudioFrame::new(data, peer_format)).await.is_err() {
                        debug!("Bridge stopped accepting audio");
                        break;
                    }
                }
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<BridgeIncomingMessage>(&text) {
                        Ok(BridgeIncomingMessage::Stop) => {
                            info!("Client requested stop");
                            break;
                        }
                        Ok(BridgeIncomingMessage::Config(_)) => {
                            send_error(message_tx, "already_configured", "Session already started")
                                .await;
                        }
                        Err(e) => {
                            send_error(
                                message_tx,
                                "parse_error",
                                format!("Invalid message format: {e}"),
                            )
                            .await;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("Bridge WebSocket connection closed by client");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Bridge WebSocket error: {}", e);
                    break;
                }
            },
            frame = remote.recv() => match frame {
                Some(frame) => {
                    if message_tx
                        .send(BridgeMessageRoute::Audio(frame.into_data()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                None => {
                    debug!("Bridge session stopped producing audio");
                    break;
                }
            },
            notice = notices.recv(), if notices_open => match notice {
                Ok(notice) => {
                    let _ = message_tx
                        .send(BridgeMessageRoute::Outgoing(notice.into()))
                        .await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Dropped session notices");
                }
                Err(broadcast::error::RecvError::Closed) => notices_open = false,
            },
        }
    }
}

/// Stop the session and report its outcome to the browser.
async fn finish_session(handle: SessionHandle, message_tx: &mpsc::Sender<BridgeMessageRoute>) {
    match handle.shutdown().await {
        Ok(summary) => {
            info!(
                id = %summary.id,
                end_reason = ?summary.end_reason,
                frames_from_peer = summary.frames_from_peer,
                frames_to_peer = summary.frames_to_peer,
                frames_dropped = summary.frames_dropped,
                "Bridge session finished"
            );
            let _ = message_tx
                .send(BridgeMessageRoute::Outgoing(BridgeOutgoingMessage::closed(
                    summary.end_reason,
                )))
                .await;
        }
        Err(e) => {
            warn!(error = %e, "Bridge session failed");
            send_error(message_tx, error_code(&e), e.to_string()).await;
            let _ = message_tx
                .send(BridgeMessageRoute::Outgoing(BridgeOutgoingMessage::Closed {
                    reason: "error".to_string(),
                }))
                .await;
        }
    }
}

async fn send_error(
    message_tx: &mpsc::Sender<BridgeMessageRoute>,
    code: &str,
    message: impl Into<String>,
) {
    let _ = message_tx
        .send(BridgeMessageRoute::Outgoing(BridgeOutgoingMessage::error(
            code, message,
        )))
        .await;
}
