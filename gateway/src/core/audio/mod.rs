//! Audio data model.
//!
//! Every stage of the bridge exchanges [`AudioFrame`]s. A frame is an
//! immutable byte payload tagged with the [`AudioFormat`] it is encoded in,
//! so each stage can reject audio it did not declare support for.
//!
//! # Formats
//!
//! - Speech service side: PCM 16-bit signed little-endian, 24kHz, mono
//! - Browser side: Opus packets at the negotiated clock rate (48kHz in WebRTC)

mod format;
mod frame;

pub use format::{
    AudioEncoding, AudioFormat, SPEECH_CHANNELS, SPEECH_SAMPLE_RATE, WEBRTC_OPUS_SAMPLE_RATE,
};
pub use frame::AudioFrame;
