//! OpenAI Realtime API transport.
//!
//! One persistent WebSocket per bridging session. Outbound PCM is sent as
//! `input_audio_buffer.append` events; inbound `response.audio.delta`,
//! `response.audio.done` and `response.audio_transcript.done` events are
//! translated into [`TransportEvent`](crate::core::realtime::TransportEvent)s.
//!
//! # Supported Voices
//!
//! alloy, ash, ballad, coral, echo, sage, shimmer, verse
//!
//! # Audio Format
//!
//! Input and output audio is PCM 16-bit signed little-endian at 24kHz, mono.

mod client;
mod config;
mod messages;

pub use client::{OpenAIRealtime, parse_server_message};
pub use config::{
    OPENAI_BETA_HEADER_VALUE, OPENAI_DEFAULT_MODEL, OPENAI_PCM16_FORMAT,
    OPENAI_REALTIME_SAMPLE_RATE, OPENAI_REALTIME_URL, OpenAIRealtimeVoice,
};
pub use messages::{ApiError, ClientEvent, ServerEvent, SessionConfig, SessionInfo, TurnDetection};
