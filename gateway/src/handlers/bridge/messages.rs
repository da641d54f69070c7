//! Bridge WebSocket message types
//!
//! JSON control messages exchanged with the browser. Audio travels as
//! binary frames and is not described here.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::audio::{AudioEncoding, AudioFormat, SPEECH_CHANNELS, SPEECH_SAMPLE_RATE};
use crate::core::pipeline::{EndReason, SessionNotice};

/// Maximum allowed size for instructions (100 KB)
pub const MAX_INSTRUCTIONS_SIZE: usize = 100 * 1024;

// =============================================================================
// Incoming Messages (Client -> Server)
// =============================================================================

/// Incoming WebSocket messages from the browser
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum BridgeIncomingMessage {
    /// Declare the audio format and start the session
    #[serde(rename = "config")]
    Config(BridgeSessionRequest),

    /// End the session
    #[serde(rename = "stop")]
    Stop,
}

/// Session parameters declared by the browser.
///
/// Every field is optional; the server configuration supplies defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BridgeSessionRequest {
    /// Audio codec of the binary frames ("opus" or "pcm16")
    #[serde(default)]
    pub codec: Option<String>,

    /// Codec clock rate (Opus) or sample rate (PCM) in Hz
    #[serde(default)]
    pub sample_rate: Option<u32>,

    /// Channel count
    #[serde(default)]
    pub channels: Option<u16>,

    /// Voice for the assistant's audio
    #[serde(default)]
    pub voice: Option<String>,

    /// System instructions for the assistant
    #[serde(default)]
    pub instructions: Option<String>,
}

/// Reasons a browser request is refused before a session starts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeRequestError {
    #[error("Unknown codec: {0}")]
    UnknownCodec(String),

    #[error("Instructions too large: {size} bytes (max: {max} bytes)")]
    InstructionsTooLarge { size: usize, max: usize },
}

impl BridgeSessionRequest {
    /// Reject oversized user-provided fields.
    pub fn validate_size(&self) -> Result<(), BridgeRequestError> {
        if let Some(instructions) = &self.instructions {
            let size = instructions.len();
            if size > MAX_INSTRUCTIONS_SIZE {
                return Err(BridgeRequestError::InstructionsTooLarge {
                    size,
                    max: MAX_INSTRUCTIONS_SIZE,
                });
            }
        }
        Ok(())
    }

    /// Resolve the declared audio format.
    ///
    /// Missing Opus parameters fall back to `default_opus`; missing PCM
    /// parameters fall back to the speech service format.
    pub fn peer_format(&self, default_opus: AudioFormat) -> Result<AudioFormat, BridgeRequestError> {
        let encoding = match &self.codec {
            Some(codec) => AudioEncoding::parse(codec)
                .ok_or_else(|| BridgeRequestError::UnknownCodec(codec.clone()))?,
            None => AudioEncoding::Opus,
        };

        Ok(match encoding {
            AudioEncoding::Opus => AudioFormat::opus(
                self.sample_rate.unwrap_or(default_opus.sample_rate),
                self.channels.unwrap_or(default_opus.channels),
            ),
            AudioEncoding::Pcm16 => AudioFormat::pcm16(
                self.sample_rate.unwrap_or(SPEECH_SAMPLE_RATE),
                self.channels.unwrap_or(SPEECH_CHANNELS),
            ),
        })
    }
}

// =============================================================================
// Outgoing Messages (Server -> Client)
// =============================================================================

/// Outgoing WebSocket messages to the browser
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum BridgeOutgoingMessage {
    /// Session is running and audio may flow
    #[serde(rename = "session_started")]
    SessionStarted {
        /// Bridge session ID
        session_id: String,
        /// Codec of the binary frames in both directions
        codec: String,
        sample_rate: u32,
        channels: u16,
    },

    /// The speech service assigned its own session ID
    #[serde(rename = "session_created")]
    SessionCreated { session_id: String },

    /// Transcript of the assistant's spoken response
    #[serde(rename = "transcript")]
    Transcript { text: String },

    /// Server VAD event ("started" or "stopped")
    #[serde(rename = "speech_event")]
    SpeechEvent { event: String },

    /// Error message
    #[serde(rename = "error")]
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        message: String,
    },

    /// Session ended; the socket closes next
    #[serde(rename = "closed")]
    Closed { reason: String },
}

impl BridgeOutgoingMessage {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: Some(code.to_string()),
            message: message.into(),
        }
    }

    pub fn closed(reason: EndReason) -> Self {
        let reason = match reason {
            EndReason::PeerClosed => "peer_closed",
            EndReason::TransportClosed => "transport_closed",
            EndReason::Shutdown => "stopped",
        };
        Self::Closed {
            reason: reason.to_string(),
        }
    }
}

impl From<SessionNotice> for BridgeOutgoingMessage {
    fn from(notice: SessionNotice) -> Self {
        match notice {
            SessionNotice::SessionCreated { session_id } => Self::SessionCreated { session_id },
            SessionNotice::Transcript { text } => Self::Transcript { text },
            SessionNotice::SpeechStarted => Self::SpeechEvent {
                event: "started".to_string(),
            },
            SessionNotice::SpeechStopped => Self::SpeechEvent {
                event: "stopped".to_string(),
            },
            SessionNotice::ServiceError { code, message } => Self::Error {
                code: Some(code.unwrap_or_else(|| "service_error".to_string())),
                message,
            },
        }
    }
}

// =============================================================================
// Message Routing
// =============================================================================

/// Frames queued for the socket writer
pub enum BridgeMessageRoute {
    /// JSON text message
    Outgoing(BridgeOutgoingMessage),
    /// Binary audio data
    Audio(Bytes),
    /// Close connection
    Close,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_message_deserialization() {
        let json = r#"{
            "type": "config",
            "codec": "opus",
            "sample_rate": 48000,
            "channels": 2,
            "voice": "alloy"
        }"#;

        let msg: BridgeIncomingMessage = serde_json::from_str(json).expect("Should deserialize");
        match msg {
            BridgeIncomingMessage::Config(request) => {
                assert_eq!(request.codec.as_deref(), Some("opus"));
                assert_eq!(request.voice.as_deref(), Some("alloy"));
                assert_eq!(
                    request.peer_format(AudioFormat::opus(48000, 1)).unwrap(),
                    AudioFormat::opus(48000, 2)
                );
            }
            _ => panic!("Expected Config variant"),
        }
    }

    #[test]
    fn test_stop_message_deserialization() {
        let msg: BridgeIncomingMessage = serde_json::from_str(r#"{"type":"stop"}"#).unwrap();
        assert!(matches!(msg, BridgeIncomingMessage::Stop));
    }

    #[test]
    fn test_peer_format_defaults() {
        let default_opus = AudioFormat::opus(48000, 1);

        let empty = BridgeSessionRequest::default();
        assert_eq!(empty.peer_format(default_opus).unwrap(), default_opus);

        let pcm = BridgeSessionRequest {
            codec: Some("pcm16".into()),
            ..Default::default()
        };
        assert_eq!(pcm.peer_format(default_opus).unwrap(), AudioFormat::SPEECH);

        let unknown = BridgeSessionRequest {
            codec: Some("mp3".into()),
            ..Default::default()
        };
        assert_eq!(
            unknown.peer_format(default_opus),
            Err(BridgeRequestError::UnknownCodec("mp3".into()))
        );
    }

    #[test]
    fn test_validation_instructions_exceeds_limit() {
        let request = BridgeSessionRequest {
            instructions: Some("a".repeat(MAX_INSTRUCTIONS_SIZE + 1)),
            ..Default::default()
        };
        assert!(matches!(
            request.validate_size(),
            Err(BridgeRequestError::InstructionsTooLarge { .. })
        ));

        let request = BridgeSessionRequest {
            instructions: Some("a".repeat(MAX_INSTRUCTIONS_SIZE)),
            ..Default::default()
        };
        assert!(request.validate_size().is_ok());
    }

    #[test]
    fn test_outgoing_serialization() {
        let json = serde_json::to_string(&BridgeOutgoingMessage::SessionStarted {
            session_id: "abc".into(),
            codec: "opus".into(),
            sample_rate: 48000,
            channels: 1,
        })
        .unwrap();
        assert!(json.contains(r#""type":"session_started""#));
        assert!(json.contains(r#""session_id":"abc""#));

        let json = serde_json::to_string(&BridgeOutgoingMessage::error("parse_error", "bad"))
            .unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains(r#""code":"parse_error""#));

        let json =
            serde_json::to_string(&BridgeOutgoingMessage::closed(EndReason::Shutdown)).unwrap();
        assert_eq!(json, r#"{"type":"closed","reason":"stopped"}"#);
    }

    #[test]
    fn test_notice_conversion() {
        assert_eq!(
            BridgeOutgoingMessage::from(SessionNotice::Transcript {
                text: "Hi".into()
            }),
            BridgeOutgoingMessage::Transcript { text: "Hi".into() }
        );
        assert_eq!(
            BridgeOutgoingMessage::from(SessionNotice::SpeechStarted),
            BridgeOutgoingMessage::SpeechEvent {
                event: "started".into()
            }
        );
        assert_eq!(
            BridgeOutgoingMessage::from(SessionNotice::ServiceError {
                code: Some("input_audio_buffer_commit_empty".into()),
                message: "buffer too small".into(),
            }),
            BridgeOutgoingMessage::error("input_audio_buffer_commit_empty", "buffer too small")
        );
        assert_eq!(
            BridgeOutgoingMessage::from(SessionNotice::ServiceError {
                code: None,
                message: "oops".into(),
            }),
            BridgeOutgoingMessage::error("service_error", "oops")
        );
    }
}
