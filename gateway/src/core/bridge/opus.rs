//! Opus codec bridge.
//!
//! Browsers send Opus at the WebRTC clock rate, but Opus packets are
//! rate-agnostic: the decoder is opened directly at 24kHz mono so no
//! separate resampling step is needed, and outbound PCM is encoded at
//! 24kHz mono. Stereo packets are downmixed by the decoder.

use audiopus::coder::{Decoder, Encoder};
use audiopus::packet::Packet;
use audiopus::{Application, Channels, MutSignals, SampleRate};

use super::base::{AudioDecoder, AudioEncoder, BridgeError, BridgeResult};
use crate::core::audio::{AudioEncoding, AudioFormat, AudioFrame, SPEECH_SAMPLE_RATE};

/// Samples in one 20ms codec frame at 24kHz.
pub const OPUS_FRAME_SAMPLES: usize = (SPEECH_SAMPLE_RATE as usize / 1000) * 20;

/// Bytes of PCM in one 20ms codec frame.
const OPUS_FRAME_BYTES: usize = OPUS_FRAME_SAMPLES * 2;

/// Largest Opus frame (120ms) at 24kHz.
const MAX_DECODE_SAMPLES: usize = (SPEECH_SAMPLE_RATE as usize / 1000) * 120;

/// Recommended maximum Opus packet size.
const MAX_PACKET_BYTES: usize = 4000;

/// Check that an Opus peer format can be bridged.
pub fn validate_opus_format(format: AudioFormat) -> BridgeResult<()> {
    if format.encoding != AudioEncoding::Opus {
        return Err(BridgeError::UnsupportedFormat(format!(
            "{} is not an Opus format",
            format
        )));
    }
    if !matches!(format.sample_rate, 8000 | 12000 | 16000 | 24000 | 48000) {
        return Err(BridgeError::UnsupportedFormat(format!(
            "Opus clock rate {}Hz is not supported",
            format.sample_rate
        )));
    }
    if format.channels == 0 || format.channels > 2 {
        return Err(BridgeError::UnsupportedFormat(format!(
            "Opus supports 1 or 2 channels, got {}",
            format.channels
        )));
    }
    Ok(())
}

// =============================================================================
// Decoder
// =============================================================================

/// Decodes Opus packets to PCM 16-bit, 24kHz, mono.
pub struct OpusDecoder {
    decoder: Decoder,
    decode_buffer: Vec<i16>,
}

impl OpusDecoder {
    pub fn new() -> BridgeResult<Self> {
        let decoder = Decoder::new(SampleRate::Hz24000, Channels::Mono)?;
        tracing::debug!("Created Opus decoder (Opus -> 24kHz PCM)");
        Ok(Self {
            decoder,
            decode_buffer: vec![0i16; MAX_DECODE_SAMPLES],
        })
    }
}

impl AudioDecoder for OpusDecoder {
    fn decode(&mut self, frame: &AudioFrame) -> BridgeResult<AudioFrame> {
        let packet = Packet::try_from(&frame.data()[..])?;
        let output = MutSignals::try_from(&mut self.decode_buffer[..])?;
        let samples = self.decoder.decode(Some(packet), output, false)?;

        tracing::trace!(
            "Decoded {} bytes Opus -> {} samples",
            frame.len(),
            samples
        );

        Ok(AudioFrame::from_samples(
            &self.decode_buffer[..samples],
            AudioFormat::SPEECH,
        ))
    }
}

// =============================================================================
// Encoder
// =============================================================================

/// Encodes PCM 16-bit, 24kHz, mono into 20ms Opus packets.
pub struct OpusEncoder {
    encoder: Encoder,
    peer_format: AudioFormat,
    pending: Vec<u8>,
    packet_buffer: Vec<u8>,
}

impl OpusEncoder {
    /// Create an encoder whose packets are tagged with `peer_format`.
    pub fn new(peer_format: AudioFormat) -> BridgeResult<Self> {
        validate_opus_format(peer_format)?;
        let encoder = Encoder::new(SampleRate::Hz24000, Channels::Mono, Application::Voip)?;
        tracing::debug!(%peer_format, "Created Opus encoder (24kHz PCM -> Opus)");
        Ok(Self {
            encoder,
            peer_format,
            pending: Vec::with_capacity(OPUS_FRAME_BYTES * 2),
            packet_buffer: vec![0u8; MAX_PACKET_BYTES],
        })
    }

    fn encode_frame(&mut self, pcm: &[u8]) -> BridgeResult<AudioFrame> {
        let samples: Vec<i16> = pcm
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let len = self.encoder.encode(&samples, &mut self.packet_buffer)?;
        Ok(AudioFrame::new(
            self.packet_buffer[..len].to_vec(),
            self.peer_format,
        ))
    }
}

impl AudioEncoder for OpusEncoder {
    fn encode(&mut self, frame: &AudioFrame) -> BridgeResult<Vec<AudioFrame>> {
        self.pending.extend_from_slice(frame.data());

        let mut packets = Vec::with_capacity(self.pending.len() / OPUS_FRAME_BYTES);
        let mut offset = 0;
        while self.pending.len() - offset >= OPUS_FRAME_BYTES {
            let chunk = self.pending[offset..offset + OPUS_FRAME_BYTES].to_vec();
            packets.push(self.encode_frame(&chunk)?);
            offset += OPUS_FRAME_BYTES;
        }
        self.pending.drain(..offset);

        Ok(packets)
    }

    fn flush(&mut self) -> BridgeResult<Vec<AudioFrame>> {
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }
        let mut chunk = std::mem::take(&mut self.pending);
        chunk.resize(OPUS_FRAME_BYTES, 0);
        Ok(vec![self.encode_frame(&chunk)?])
    }
}
