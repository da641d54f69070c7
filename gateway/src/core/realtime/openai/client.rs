//! OpenAI Realtime API client implementation.
//!
//! This module provides the OpenAI Realtime client that implements the
//! `RealtimeTransport` trait using OpenAI's WebSocket-based Realtime API.
//!
//! # API Reference
//!
//! - Endpoint: `wss://api.openai.com/v1/realtime?model=<model>`
//! - Protocol: WebSocket with JSON events
//! - Audio: PCM 16-bit, 24kHz, mono, little-endian, base64 encoded
//!
//! # Example
//!
//! ```rust,ignore
//! use realtime_bridge::core::audio::AudioFrame;
//! use realtime_bridge::core::realtime::{OpenAIRealtime, RealtimeConfig, RealtimeTransport};
//!
//! let mut realtime = OpenAIRealtime::new(RealtimeConfig {
//!     api_key: "sk-...".to_string(),
//!     ..Default::default()
//! })?;
//! let mut events = realtime.connect().await?;
//! realtime.send_audio(&AudioFrame::speech(vec![0u8; 960]))?;
//! while let Some(event) = events.recv().await {
//!     // handle TransportEvent
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use super::config::{OPENAI_PCM16_FORMAT, OpenAIRealtimeVoice};
use super::messages::{ClientEvent, ServerEvent, SessionConfig, TurnDetection};
use crate::core::audio::{AudioFormat, AudioFrame};
use crate::core::realtime::base::{
    ConnectionState, ControlEvent, RealtimeConfig, RealtimeError, RealtimeResult,
    RealtimeTransport, TransportEvent, TurnDetectionConfig,
};

/// Channel capacity for outbound WebSocket messages.
const WS_CHANNEL_CAPACITY: usize = 256;

/// Channel capacity for inbound transport events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Pongs waiting for the writer.
const PONG_CHANNEL_CAPACITY: usize = 8;

/// How long `disconnect` waits for the close handshake before aborting.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// =============================================================================
// OpenAI Realtime Client
// =============================================================================

/// OpenAI Realtime API client implementation.
///
/// The WebSocket is split between a writer task and a reader task spawned on
/// connect. Outbound events reach the writer through a bounded channel;
/// inbound events leave the reader through the receiver returned by
/// [`connect`](RealtimeTransport::connect). A consumer that falls behind
/// only stalls the reader.
///
/// There is no automatic reconnection. A dropped connection produces one
/// terminal [`TransportEvent::Closed`] and every later send fails with
/// [`RealtimeError::ConnectionClosed`].
pub struct OpenAIRealtime {
    /// Configuration
    config: RealtimeConfig,
    /// Parsed voice
    voice: OpenAIRealtimeVoice,
    /// Connection state (shared with the I/O task)
    state: Arc<watch::Sender<ConnectionState>>,
    /// Connected flag for fast checks (shared with the I/O task)
    connected: Arc<AtomicBool>,
    /// Server-assigned session ID
    session_id: Arc<RwLock<Option<String>>>,
    /// Outbound event channel into the I/O task
    ws_sender: Option<mpsc::Sender<ClientEvent>>,
    /// I/O task handle
    connection_handle: Option<JoinHandle<()>>,
}

impl OpenAIRealtime {
    /// Create a new client. Fails if the configuration is unusable.
    pub fn new(config: RealtimeConfig) -> RealtimeResult<Self> {
        config.validate()?;

        let voice = config
            .voice
            .as_deref()
            .map(OpenAIRealtimeVoice::from_str_or_default)
            .unwrap_or_default();

        Ok(Self {
            config,
            voice,
            state: Arc::new(watch::Sender::new(ConnectionState::Disconnected)),
            connected: Arc::new(AtomicBool::new(false)),
            session_id: Arc::new(RwLock::new(None)),
            ws_sender: None,
            connection_handle: None,
        })
    }

    /// Get the configured voice.
    pub fn voice(&self) -> OpenAIRealtimeVoice {
        self.voice
    }

    /// Get the configured model identifier.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Get the session ID assigned by the service, once known.
    pub async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }

    /// Build the WebSocket URL with model parameter.
    fn build_ws_url(&self) -> RealtimeResult<url::Url> {
        let mut url = url::Url::parse(&self.config.url)
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("model", &self.config.model);
        Ok(url)
    }

    /// Build the initial session configuration.
    fn build_session_config(&self) -> SessionConfig {
        let turn_detection = match self.config.turn_detection.clone().unwrap_or_default() {
            TurnDetectionConfig::ServerVad {
                threshold,
                prefix_padding_ms,
                silence_duration_ms,
            } => TurnDetection::ServerVad {
                threshold,
                prefix_padding_ms,
                silence_duration_ms,
            },
            TurnDetectionConfig::None => TurnDetection::None {},
        };

        SessionConfig {
            modalities: Some(vec!["text".to_string(), "audio".to_string()]),
            instructions: self.config.instructions.clone(),
            voice: Some(self.voice.as_str().to_string()),
            input_audio_format: Some(OPENAI_PCM16_FORMAT.to_string()),
            output_audio_format: Some(OPENAI_PCM16_FORMAT.to_string()),
            turn_detection: Some(turn_detection),
            temperature: self.config.temperature,
        }
    }
}

/// Translate one inbound text message into a transport event.
///
/// Returns `Ok(None)` for event types the bridge does not act on. Any
/// error returned here is terminal for the connection; service `error`
/// events are not.
pub fn parse_server_message(text: &str) -> RealtimeResult<Option<TransportEvent>> {
    let event: ServerEvent = serde_json::from_str(text)
        .map_err(|e| RealtimeError::MalformedMessage(e.to_string()))?;

    let transport_event = match event {
        ServerEvent::Error { error } => {
            tracing::warn!(
                error_type = %error.error_type,
                code = ?error.code,
                message = %error.message,
                "OpenAI Realtime API error"
            );
            TransportEvent::Control(ControlEvent::ServiceError {
                error_type: error.error_type,
                code: error.code,
                message: error.message,
            })
        }
        ServerEvent::SessionCreated { session } => {
            tracing::info!(session_id = %session.id, "Realtime session created");
            TransportEvent::Control(ControlEvent::SessionCreated {
                session_id: session.id,
            })
        }
        ServerEvent::SessionUpdated { session } => {
            tracing::debug!(session_id = %session.id, "Realtime session updated");
            return Ok(None);
        }
        ServerEvent::SpeechStarted { audio_start_ms, .. } => {
            TransportEvent::Control(ControlEvent::SpeechStarted { audio_start_ms })
        }
        ServerEvent::SpeechStopped { audio_end_ms, .. } => {
            TransportEvent::Control(ControlEvent::SpeechStopped { audio_end_ms })
        }
        ServerEvent::AudioDelta { delta, .. } => {
            let audio = ServerEvent::decode_audio_delta(&delta)
                .map_err(|e| RealtimeError::AudioDecode(e.to_string()))?;
            if audio.is_empty() {
                return Ok(None);
            }
            TransportEvent::Audio(AudioFrame::speech(audio))
        }
        ServerEvent::AudioDone { response_id, .. } => {
            tracing::debug!(?response_id, "Response audio done");
            TransportEvent::Control(ControlEvent::ResponseAudioDone { response_id })
        }
        ServerEvent::AudioTranscriptDone {
            transcript,
            item_id,
        } => {
            tracing::info!(transcript = %transcript, "Response transcript");
            TransportEvent::Control(ControlEvent::TranscriptDone {
                text: transcript,
                item_id,
            })
        }
        ServerEvent::Unknown => {
            tracing::trace!("Ignoring unhandled server event");
            return Ok(None);
        }
    };

    Ok(Some(transport_event))
}

// =============================================================================
// Connection Tasks
// =============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write outbound events and pongs until the owner disconnects or the
/// connection fails. Cancels `shutdown` on exit.
async fn run_writer(
    mut ws_sink: SplitSink<WsStream, Message>,
    mut rx: mpsc::Receiver<ClientEvent>,
    mut pong_rx: mpsc::Receiver<Bytes>,
    shutdown: CancellationToken,
) -> Option<RealtimeError> {
    let reason = loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break None,
            outgoing = rx.recv() => match outgoing {
                Some(event) => match serde_json::to_string(&event) {
                    Ok(json) => Message::Text(json.into()),
                    Err(e) => {
                        tracing::error!("Failed to serialize event: {}", e);
                        continue;
                    }
                },
                None => {
                    // Owner dropped the sender: close cleanly
                    if let Err(e) = ws_sink.send(Message::Close(None)).await {
                        tracing::debug!("Failed to send close frame: {}", e);
                    }
                    break None;
                }
            },
            Some(data) = pong_rx.recv() => Message::Pong(data),
        };

        if let Err(e) = ws_sink.send(message).await {
            tracing::error!("Failed to send WebSocket message: {}", e);
            break Some(RealtimeError::ConnectionClosed(e.to_string()));
        }
    };

    shutdown.cancel();
    reason
}

/// Read server messages into transport events until the connection ends
/// or the writer stops. Cancels `shutdown` on exit.
async fn run_reader(
    mut ws_stream: SplitStream<WsStream>,
    event_tx: &mpsc::Sender<TransportEvent>,
    pong_tx: mpsc::Sender<Bytes>,
    session_id: &RwLock<Option<String>>,
    connected: &AtomicBool,
    shutdown: &CancellationToken,
) -> Option<RealtimeError> {
    let reason = loop {
        let incoming = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break None,
            incoming = ws_stream.next() => incoming,
        };

        match incoming {
            Some(Ok(Message::Text(text))) => match parse_server_message(&text) {
                Ok(Some(event)) => {
                    if let TransportEvent::Control(ControlEvent::SessionCreated {
                        session_id: ref id,
                    }) = event
                    {
                        *session_id.write().await = Some(id.clone());
                    }
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break None,
                        sent = event_tx.send(event) => {
                            if sent.is_err() {
                                tracing::debug!("Transport event receiver dropped");
                                break None;
                            }
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Terminal server message: {}", e);
                    break Some(e);
                }
            },
            Some(Ok(Message::Ping(data))) => {
                if pong_tx.try_send(data).is_err() {
                    tracing::debug!("Pong queue full, skipping pong");
                }
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(?frame, "WebSocket closed by server");
                break None;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::error!("WebSocket error: {}", e);
                break Some(RealtimeError::ConnectionClosed(e.to_string()));
            }
            None => {
                tracing::warn!("WebSocket stream ended without close frame");
                break Some(RealtimeError::ConnectionClosed(
                    "stream ended without close frame".to_string(),
                ));
            }
        }
    };

    // Later sends fail fast while the writer winds down
    if reason.is_some() {
        connected.store(false, Ordering::SeqCst);
    }
    shutdown.cancel();
    reason
}

#[async_trait]
impl RealtimeTransport for OpenAIRealtime {
    async fn connect(&mut self) -> RealtimeResult<mpsc::Receiver<TransportEvent>> {
        if self.connected.load(Ordering::SeqCst) {
            return Err(RealtimeError::InvalidConfiguration(
                "Transport is already connected".to_string(),
            ));
        }

        // Credential is checked before any network activity
        self.config.validate()?;
        self.state.send_replace(ConnectionState::Connecting);

        let url = self.build_ws_url()?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;

        let headers = request.headers_mut();
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;
        headers.insert("Authorization", auth);
        let beta = HeaderValue::from_str(&self.config.beta_header)
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;
        headers.insert("OpenAI-Beta", beta);

        let (ws_stream, _response) = match tokio_tungstenite::connect_async(request).await {
            Ok(connection) => connection,
            Err(e) => {
                self.state.send_replace(ConnectionState::Failed);
                return Err(RealtimeError::ConnectionFailed(e.to_string()));
            }
        };

        tracing::info!(model = %self.config.model, "Connected to OpenAI Realtime API");

        let (ws_sink, ws_stream) = ws_stream.split();
        let (tx, rx) = mpsc::channel::<ClientEvent>(WS_CHANNEL_CAPACITY);
        let (pong_tx, pong_rx) = mpsc::channel::<Bytes>(PONG_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(EVENT_CHANNEL_CAPACITY);

        // Session update is the first message on the wire
        tx.send(ClientEvent::SessionUpdate {
            session: self.build_session_config(),
        })
        .await
        .map_err(|e| RealtimeError::WebSocketError(e.to_string()))?;

        let state = self.state.clone();
        let connected = self.connected.clone();
        let session_id = self.session_id.clone();

        self.connected.store(true, Ordering::SeqCst);
        self.state.send_replace(ConnectionState::Connected);

        // Reader and writer run as separate tasks so a slow event consumer
        // never holds back outbound audio
        let handle = tokio::spawn(async move {
            let shutdown = CancellationToken::new();
            let writer = tokio::spawn(run_writer(ws_sink, rx, pong_rx, shutdown.clone()));
            let read_reason =
                run_reader(ws_stream, &event_tx, pong_tx, &session_id, &connected, &shutdown).await;
            let write_reason = match writer.await {
                Ok(reason) => reason,
                Err(e) => Some(RealtimeError::WebSocketError(e.to_string())),
            };
            let close_reason = read_reason.or(write_reason);

            connected.store(false, Ordering::SeqCst);
            state.send_replace(if close_reason.is_some() {
                ConnectionState::Failed
            } else {
                ConnectionState::Closed
            });
            let _ = event_tx.send(TransportEvent::Closed(close_reason)).await;
            tracing::info!("OpenAI Realtime connection task ended");
        });

        self.ws_sender = Some(tx);
        self.connection_handle = Some(handle);

        Ok(event_rx)
    }

    fn send_audio(&self, frame: &AudioFrame) -> RealtimeResult<()> {
        if frame.format() != AudioFormat::SPEECH {
            return Err(RealtimeError::InvalidAudioFormat {
                expected: AudioFormat::SPEECH,
                actual: frame.format(),
            });
        }

        let sender = self.ws_sender.as_ref().ok_or(RealtimeError::NotConnected)?;
        if !self.connected.load(Ordering::SeqCst) {
            return Err(RealtimeError::ConnectionClosed(
                "connection to speech service dropped".to_string(),
            ));
        }

        sender
            .try_send(ClientEvent::audio_append(frame.data()))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => RealtimeError::Backpressure,
                mpsc::error::TrySendError::Closed(_) => RealtimeError::ConnectionClosed(
                    "connection to speech service dropped".to_string(),
                ),
            })
    }

    async fn disconnect(&mut self) -> RealtimeResult<()> {
        // Dropping the sender makes the I/O task send a close frame and exit
        self.ws_sender = None;

        if let Some(mut handle) = self.connection_handle.take() {
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut handle).await.is_err() {
                tracing::warn!("Close handshake timed out, aborting connection task");
                handle.abort();
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        self.state.send_replace(ConnectionState::Disconnected);
        *self.session_id.write().await = None;

        tracing::info!("Disconnected from OpenAI Realtime API");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn provider_info(&self) -> serde_json::Value {
        serde_json::json!({
            "provider": "openai",
            "api_type": "WebSocket Realtime",
            "endpoint": self.config.url,
            "model": self.config.model,
            "voice": self.voice.as_str(),
            "audio_format": OPENAI_PCM16_FORMAT,
            "sample_rate": AudioFormat::SPEECH.sample_rate,
            "channels": AudioFormat::SPEECH.channels,
            "reconnect": false,
        })
    }
}

impl Drop for OpenAIRealtime {
    fn drop(&mut self) {
        if let Some(handle) = self.connection_handle.take() {
            handle.abort();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
