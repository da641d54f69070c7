//! Audio format descriptors shared by every pipeline stage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sample rate of the speech-service side of the bridge.
pub const SPEECH_SAMPLE_RATE: u32 = 24000;

/// Channel count of the speech-service side of the bridge.
pub const SPEECH_CHANNELS: u16 = 1;

/// Default RTP clock rate for Opus in WebRTC.
pub const WEBRTC_OPUS_SAMPLE_RATE: u32 = 48000;

/// Sample encoding of an audio frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioEncoding {
    /// Linear PCM, 16-bit signed little-endian, interleaved
    Pcm16,
    /// Opus packets (one packet per frame)
    Opus,
}

impl AudioEncoding {
    /// Convert to the wire name.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pcm16 => "pcm16",
            Self::Opus => "opus",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pcm16" | "pcm" | "linear16" => Some(Self::Pcm16),
            "opus" => Some(Self::Opus),
            _ => None,
        }
    }

    /// Whether frames of this encoding are compressed.
    #[inline]
    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::Opus)
    }
}

impl fmt::Display for AudioEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Format descriptor carried by every [`AudioFrame`](super::AudioFrame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample encoding
    pub encoding: AudioEncoding,
    /// Sample rate (or codec clock rate) in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
}

impl AudioFormat {
    /// Raw PCM format spoken by the realtime speech service.
    pub const SPEECH: AudioFormat = AudioFormat {
        encoding: AudioEncoding::Pcm16,
        sample_rate: SPEECH_SAMPLE_RATE,
        channels: SPEECH_CHANNELS,
    };

    /// Linear PCM format.
    pub const fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self {
            encoding: AudioEncoding::Pcm16,
            sample_rate,
            channels,
        }
    }

    /// Opus format with the given clock rate.
    pub const fn opus(sample_rate: u32, channels: u16) -> Self {
        Self {
            encoding: AudioEncoding::Opus,
            sample_rate,
            channels,
        }
    }

    /// Bytes per second of playback for PCM formats, `None` for compressed ones.
    pub fn bytes_per_second(&self) -> Option<u64> {
        match self.encoding {
            AudioEncoding::Pcm16 => {
                Some(self.sample_rate as u64 * self.channels as u64 * 2)
            }
            AudioEncoding::Opus => None,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}Hz/{}ch",
            self.encoding, self.sample_rate, self.channels
        )
    }
}
