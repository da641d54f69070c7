//! Format bridge between the peer codec and the speech format.
//!
//! The inbound half decodes peer frames into PCM 16-bit, 24kHz, mono; the
//! outbound half encodes speech PCM back into the peer codec. Both halves
//! reject frames whose declared format differs from what they were built
//! for.
//!
//! # Supported Peer Formats
//!
//! - `opus` at 8, 12, 16, 24 or 48kHz, 1 or 2 channels
//! - `pcm16` at 24kHz mono (passthrough)

mod base;
mod opus;
mod passthrough;

pub use base::{
    AudioDecoder, AudioEncoder, BridgeError, BridgeResult, InboundBridge, OutboundBridge,
};
pub use opus::{OPUS_FRAME_SAMPLES, OpusDecoder, OpusEncoder, validate_opus_format};
pub use passthrough::PcmPassthrough;

use crate::core::audio::{AudioEncoding, AudioFormat};

/// A decoder/encoder pair for one peer format.
pub struct FormatBridge {
    inbound: InboundBridge,
    outbound: OutboundBridge,
}

impl FormatBridge {
    /// Build the bridge for a declared peer format.
    ///
    /// Fails with a configuration error if the format cannot be bridged.
    pub fn new(peer_format: AudioFormat) -> BridgeResult<Self> {
        match peer_format.encoding {
            AudioEncoding::Opus => Self::opus(peer_format),
            AudioEncoding::Pcm16 if peer_format == AudioFormat::SPEECH => Ok(Self::passthrough()),
            AudioEncoding::Pcm16 => Err(BridgeError::UnsupportedFormat(format!(
                "raw PCM peers must use {}, got {}",
                AudioFormat::SPEECH,
                peer_format
            ))),
        }
    }

    /// Opus peer.
    pub fn opus(peer_format: AudioFormat) -> BridgeResult<Self> {
        validate_opus_format(peer_format)?;
        Ok(Self {
            inbound: InboundBridge::new(peer_format, Box::new(OpusDecoder::new()?)),
            outbound: OutboundBridge::new(peer_format, Box::new(OpusEncoder::new(peer_format)?)),
        })
    }

    /// Peer that already speaks PCM 16-bit, 24kHz, mono.
    pub fn passthrough() -> Self {
        Self {
            inbound: InboundBridge::new(AudioFormat::SPEECH, Box::new(PcmPassthrough)),
            outbound: OutboundBridge::new(AudioFormat::SPEECH, Box::new(PcmPassthrough)),
        }
    }

    /// Declared peer format.
    pub fn peer_format(&self) -> AudioFormat {
        self.inbound.peer_format()
    }

    /// Split into independently owned directions.
    pub fn into_parts(self) -> (InboundBridge, OutboundBridge) {
        (self.inbound, self.outbound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::AudioFrame;

    #[test]
    fn test_new_selects_codec() {
        let bridge = FormatBridge::new(AudioFormat::opus(48000, 2)).unwrap();
        assert_eq!(bridge.peer_format(), AudioFormat::opus(48000, 2));

        let bridge = FormatBridge::new(AudioFormat::SPEECH).unwrap();
        assert_eq!(bridge.peer_format(), AudioFormat::SPEECH);
    }

    #[test]
    fn test_unsupported_formats_are_configuration_errors() {
        for format in [
            AudioFormat::pcm16(16000, 1),
            AudioFormat::pcm16(24000, 2),
            AudioFormat::opus(44100, 1),
            AudioFormat::opus(48000, 6),
        ] {
            match FormatBridge::new(format) {
                Err(e) => assert!(e.is_configuration(), "{} -> {}", format, e),
                Ok(_) => panic!("{} should not be bridgeable", format),
            }
        }
    }

    #[test]
    fn test_inbound_rejects_undeclared_format() {
        let (mut inbound, _) = FormatBridge::new(AudioFormat::opus(48000, 1))
            .unwrap()
            .into_parts();

        let wrong = AudioFrame::new(vec![0xF8, 0xFF, 0xFE], AudioFormat::opus(48000, 2));
        match inbound.decode(&wrong) {
            Err(BridgeError::FormatMismatch { expected, actual }) => {
                assert_eq!(expected, AudioFormat::opus(48000, 1));
                assert_eq!(actual, AudioFormat::opus(48000, 2));
            }
            Err(other) => panic!("Expected FormatMismatch, got {}", other),
            Ok(_) => panic!("Expected FormatMismatch"),
        }
    }

    #[test]
    fn test_outbound_requires_speech_format() {
        let (_, mut outbound) = FormatBridge::passthrough().into_parts();
        let wrong = AudioFrame::new(vec![0u8; 960], AudioFormat::pcm16(48000, 1));
        assert!(matches!(
            outbound.encode(&wrong),
            Err(BridgeError::FormatMismatch { .. })
        ));
    }

    #[test]
    fn test_output_format_is_always_speech() {
        // Opus packets of any peer channel layout decode to 24kHz mono
        for peer in [AudioFormat::opus(48000, 1), AudioFormat::opus(48000, 2)] {
            let (mut inbound, mut outbound) = FormatBridge::opus(peer).unwrap().into_parts();
            let pcm = AudioFrame::from_samples(&[1000i16; OPUS_FRAME_SAMPLES], AudioFormat::SPEECH);
            let packets = outbound.encode(&pcm).unwrap();
            assert_eq!(packets.len(), 1);
            assert_eq!(packets[0].format(), peer);

            let decoded = inbound.decode(&packets[0]).unwrap();
            assert_eq!(decoded.format(), AudioFormat::SPEECH);
            assert_eq!(decoded.samples().len(), OPUS_FRAME_SAMPLES);
        }

        let (mut inbound, _) = FormatBridge::passthrough().into_parts();
        let decoded = inbound.decode(&AudioFrame::speech(vec![1u8, 0, 2, 0])).unwrap();
        assert_eq!(decoded.format(), AudioFormat::SPEECH);
        assert_eq!(&decoded.data()[..], &[1, 0, 2, 0]);
    }
}
