//! Base traits and types for format bridging.

use thiserror::Error;

use crate::core::audio::{AudioFormat, AudioFrame};

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised while converting between the peer and speech formats.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A frame arrived in a format other than the one declared for the stage
    #[error("Format mismatch: expected {expected}, got {actual}")]
    FormatMismatch {
        expected: AudioFormat,
        actual: AudioFormat,
    },

    /// The declared peer format cannot be bridged
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The codec rejected a packet or failed to initialise
    #[error("Codec error: {0}")]
    Codec(String),
}

impl BridgeError {
    /// Whether this error means the session was set up with formats that
    /// do not fit together.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BridgeError::FormatMismatch { .. } | BridgeError::UnsupportedFormat(_)
        )
    }
}

impl From<audiopus::Error> for BridgeError {
    fn from(err: audiopus::Error) -> Self {
        BridgeError::Codec(err.to_string())
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

// =============================================================================
// Codec Traits
// =============================================================================

/// Decodes peer frames into speech-format PCM.
pub trait AudioDecoder: Send {
    /// Decode one peer frame. The caller has already checked its format.
    fn decode(&mut self, frame: &AudioFrame) -> BridgeResult<AudioFrame>;
}

/// Encodes speech-format PCM into peer frames.
pub trait AudioEncoder: Send {
    /// Encode PCM, returning zero or more complete peer frames in order.
    fn encode(&mut self, frame: &AudioFrame) -> BridgeResult<Vec<AudioFrame>>;

    /// Emit whatever is buffered, padded to a whole codec frame.
    fn flush(&mut self) -> BridgeResult<Vec<AudioFrame>>;
}

// =============================================================================
// Directional Bridges
// =============================================================================

/// Peer → speech direction.
pub struct InboundBridge {
    peer_format: AudioFormat,
    decoder: Box<dyn AudioDecoder>,
}

impl InboundBridge {
    pub(crate) fn new(peer_format: AudioFormat, decoder: Box<dyn AudioDecoder>) -> Self {
        Self {
            peer_format,
            decoder,
        }
    }

    /// Format this bridge accepts.
    pub fn peer_format(&self) -> AudioFormat {
        self.peer_format
    }

    /// Decode a peer frame. The output is always PCM 16-bit, 24kHz, mono.
    pub fn decode(&mut self, frame: &AudioFrame) -> BridgeResult<AudioFrame> {
        if frame.format() != self.peer_format {
            return Err(BridgeError::FormatMismatch {
                expected: self.peer_format,
                actual: frame.format(),
            });
        }

        let decoded = self.decoder.decode(frame)?;
        debug_assert_eq!(decoded.format(), AudioFormat::SPEECH);
        Ok(decoded)
    }
}

/// Speech → peer direction.
pub struct OutboundBridge {
    peer_format: AudioFormat,
    encoder: Box<dyn AudioEncoder>,
}

impl OutboundBridge {
    pub(crate) fn new(peer_format: AudioFormat, encoder: Box<dyn AudioEncoder>) -> Self {
        Self {
            peer_format,
            encoder,
        }
    }

    /// Format of the frames this bridge produces.
    pub fn peer_format(&self) -> AudioFormat {
        self.peer_format
    }

    /// Encode speech-format PCM into peer frames.
    pub fn encode(&mut self, frame: &AudioFrame) -> BridgeResult<Vec<AudioFrame>> {
        if frame.format() != AudioFormat::SPEECH {
            return Err(BridgeError::FormatMismatch {
                expected: AudioFormat::SPEECH,
                actual: frame.format(),
            });
        }
        self.encoder.encode(frame)
    }

    /// Flush buffered PCM as a final, silence-padded frame.
    pub fn flush(&mut self) -> BridgeResult<Vec<AudioFrame>> {
        self.encoder.flush()
    }
}
