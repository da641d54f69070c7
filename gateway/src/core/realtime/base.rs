//! Base traits and types for the realtime speech transport.
//!
//! This module defines the abstraction over the persistent bidirectional
//! connection to the remote speech service: raw PCM goes out as append
//! events, and inbound events come back as a tagged [`TransportEvent`].
//!
//! # Audio Format
//!
//! The speech service uses PCM 16-bit signed little-endian at 24kHz, mono.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

use super::openai::{OPENAI_BETA_HEADER_VALUE, OPENAI_DEFAULT_MODEL, OPENAI_REALTIME_URL};
use crate::core::audio::{AudioFormat, AudioFrame};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur on the realtime transport.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the provider failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The connection dropped or was closed; no further sends are possible
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Inbound message could not be parsed
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Audio payload could not be decoded
    #[error("Audio decode error: {0}")]
    AudioDecode(String),

    /// Audio handed to the transport is not in the speech format
    #[error("Invalid audio format: expected {expected}, got {actual}")]
    InvalidAudioFormat {
        expected: AudioFormat,
        actual: AudioFormat,
    },

    /// Outbound queue is full
    #[error("Outbound queue full")]
    Backpressure,

    /// Not connected
    #[error("Not connected")]
    NotConnected,
}

impl RealtimeError {
    /// Whether this error means the session was misconfigured rather than
    /// the connection failing at runtime.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RealtimeError::InvalidConfiguration(_) | RealtimeError::InvalidAudioFormat { .. }
        )
    }
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Configuration Types
// =============================================================================

/// Configuration for the realtime transport.
#[derive(Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// API key for authentication
    #[serde(default)]
    pub api_key: String,

    /// WebSocket endpoint (without query string)
    #[serde(default = "default_url")]
    pub url: String,

    /// Model to use (e.g., "gpt-4o-realtime-preview")
    #[serde(default = "default_model")]
    pub model: String,

    /// Protocol version header value sent as `OpenAI-Beta`
    #[serde(default = "default_beta_header")]
    pub beta_header: String,

    /// Voice ID for audio output
    #[serde(default)]
    pub voice: Option<String>,

    /// System instructions for the assistant
    #[serde(default)]
    pub instructions: Option<String>,

    /// Temperature for response generation (0.0 to 2.0)
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Turn detection configuration
    #[serde(default)]
    pub turn_detection: Option<TurnDetectionConfig>,
}

fn default_url() -> String {
    OPENAI_REALTIME_URL.to_string()
}

fn default_model() -> String {
    OPENAI_DEFAULT_MODEL.to_string()
}

fn default_beta_header() -> String {
    OPENAI_BETA_HEADER_VALUE.to_string()
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            url: default_url(),
            model: default_model(),
            beta_header: default_beta_header(),
            voice: None,
            instructions: None,
            temperature: None,
            turn_detection: None,
        }
    }
}

impl fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("url", &self.url)
            .field("model", &self.model)
            .field("beta_header", &self.beta_header)
            .field("voice", &self.voice)
            .field("instructions", &self.instructions)
            .field("temperature", &self.temperature)
            .field("turn_detection", &self.turn_detection)
            .finish()
    }
}

impl RealtimeConfig {
    /// Check that the configuration can open a connection.
    ///
    /// A missing credential is a configuration error, caught before any
    /// network activity.
    pub fn validate(&self) -> RealtimeResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(RealtimeError::InvalidConfiguration(
                "API key is required".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(RealtimeError::InvalidConfiguration(
                "Model is required".to_string(),
            ));
        }
        url::Url::parse(&self.url).map_err(|e| {
            RealtimeError::InvalidConfiguration(format!("Invalid URL '{}': {}", self.url, e))
        })?;
        Ok(())
    }
}

/// Configuration for turn detection (VAD).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetectionConfig {
    /// Server-side VAD
    #[serde(rename = "server_vad")]
    ServerVad {
        /// Activation threshold (0.0 to 1.0)
        #[serde(default)]
        threshold: Option<f32>,
        /// Amount of audio to include before voice detection (ms)
        #[serde(default)]
        prefix_padding_ms: Option<u32>,
        /// Silence duration before end of turn (ms)
        #[serde(default)]
        silence_duration_ms: Option<u32>,
    },
    /// No automatic turn detection
    #[serde(rename = "none")]
    None,
}

impl Default for TurnDetectionConfig {
    fn default() -> Self {
        TurnDetectionConfig::ServerVad {
            threshold: Some(0.5),
            prefix_padding_ms: Some(300),
            silence_duration_ms: Some(500),
        }
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Connection state of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected to the provider
    #[default]
    Disconnected,
    /// Currently connecting
    Connecting,
    /// Connected and ready
    Connected,
    /// Connection lost or closed by the remote end
    Closed,
    /// Connection failed
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Closed => write!(f, "Closed"),
            ConnectionState::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// Inbound Events
// =============================================================================

/// Non-audio signal delivered alongside the audio stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// The service acknowledged the session
    SessionCreated {
        /// Server-assigned session ID
        session_id: String,
    },
    /// All audio for the current response has been delivered
    ResponseAudioDone {
        /// Response ID, when the service provides one
        response_id: Option<String>,
    },
    /// Final transcript of the response audio (diagnostic only)
    TranscriptDone {
        /// Transcript text
        text: String,
        /// Item ID
        item_id: Option<String>,
    },
    /// Server VAD detected the start of speech
    SpeechStarted {
        /// Audio timestamp in milliseconds
        audio_start_ms: u64,
    },
    /// Server VAD detected the end of speech
    SpeechStopped {
        /// Audio timestamp in milliseconds
        audio_end_ms: u64,
    },
    /// The service reported an error for one request. The connection stays
    /// open; only socket-level failures end it.
    ServiceError {
        /// Error category (e.g. "invalid_request_error")
        error_type: String,
        /// Machine-readable code, when provided
        code: Option<String>,
        /// Human-readable message
        message: String,
    },
}

/// Event delivered by the transport to its owner.
#[derive(Debug)]
pub enum TransportEvent {
    /// Decoded response audio (PCM 16-bit, 24kHz, mono)
    Audio(AudioFrame),
    /// Control signal
    Control(ControlEvent),
    /// The connection ended. `None` for a clean close, `Some` when it
    /// dropped or hit an unrecoverable error. Always the last event.
    Closed(Option<RealtimeError>),
}

// =============================================================================
// Base Trait
// =============================================================================

/// Persistent bidirectional connection to a realtime speech service.
///
/// The connection handle is owned exclusively by the implementor; callers
/// only see audio going in through [`send_audio`](Self::send_audio) and
/// events coming out of the receiver returned by
/// [`connect`](Self::connect).
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Open the connection and return the inbound event stream.
    async fn connect(&mut self) -> RealtimeResult<mpsc::Receiver<TransportEvent>>;

    /// Queue a PCM frame for delivery. Never waits for the remote end.
    ///
    /// Fails with [`RealtimeError::ConnectionClosed`] once the connection
    /// has dropped rather than silently discarding the frame.
    fn send_audio(&self, frame: &AudioFrame) -> RealtimeResult<()>;

    /// Close the connection.
    async fn disconnect(&mut self) -> RealtimeResult<()>;

    /// Check if the transport is connected and ready.
    fn is_ready(&self) -> bool;

    /// Get the current connection state.
    fn connection_state(&self) -> ConnectionState;

    /// Get provider information.
    fn provider_info(&self) -> serde_json::Value;
}

/// Boxed trait object for realtime transports.
pub type BoxedRealtimeTransport = Box<dyn RealtimeTransport>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "Connected");
        assert_eq!(ConnectionState::Disconnected.to_string(), "Disconnected");
        assert_eq!(ConnectionState::Closed.to_string(), "Closed");
    }

    #[test]
    fn test_default_config() {
        let config = RealtimeConfig::default();
        assert!(config.api_key.is_empty());
        assert!(config.voice.is_none());
        assert_eq!(config.url, OPENAI_REALTIME_URL);
        assert_eq!(config.beta_header, "realtime=v1");
    }

    #[test]
    fn test_validate_requires_api_key() {
        let config = RealtimeConfig::default();
        match config.validate() {
            Err(RealtimeError::InvalidConfiguration(msg)) => {
                assert!(msg.contains("API key is required"));
            }
            other => panic!("Expected InvalidConfiguration, got {:?}", other),
        }

        let config = RealtimeConfig {
            api_key: "   ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let config = RealtimeConfig {
            api_key: "sk-test".to_string(),
            url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RealtimeError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = RealtimeConfig {
            api_key: "sk-secret".to_string(),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: RealtimeConfig = serde_json::from_str(r#"{"api_key":"k"}"#).unwrap();
        assert_eq!(config.model, OPENAI_DEFAULT_MODEL);
        assert!(config.turn_detection.is_none());
    }

    #[test]
    fn test_default_turn_detection() {
        match TurnDetectionConfig::default() {
            TurnDetectionConfig::ServerVad { threshold, .. } => {
                assert_eq!(threshold, Some(0.5));
            }
            _ => panic!("Expected ServerVad default"),
        }
    }

    #[test]
    fn test_error_classification() {
        assert!(RealtimeError::InvalidConfiguration("x".into()).is_configuration());
        assert!(!RealtimeError::ConnectionClosed("x".into()).is_configuration());
        assert_eq!(RealtimeError::NotConnected.to_string(), "Not connected");
    }
}
