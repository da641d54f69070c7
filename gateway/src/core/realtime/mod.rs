//! Realtime speech transport.
//!
//! This module provides the abstraction over the persistent bidirectional
//! connection to the remote speech service and its OpenAI Realtime
//! implementation.
//!
//! # Architecture
//!
//! - `RealtimeTransport` trait for the connection abstraction
//! - Inbound events are delivered on an `mpsc` channel as [`TransportEvent`]s
//! - A dropped connection is terminal; there is no reconnection
//!
//! # Audio Format
//!
//! PCM 16-bit signed little-endian at 24kHz, mono, in both directions.

mod base;
pub mod openai;

pub use base::{
    BoxedRealtimeTransport, ConnectionState, ControlEvent, RealtimeConfig, RealtimeError,
    RealtimeResult, RealtimeTransport, TransportEvent, TurnDetectionConfig,
};
pub use openai::{OPENAI_REALTIME_URL, OpenAIRealtime, OpenAIRealtimeVoice};
