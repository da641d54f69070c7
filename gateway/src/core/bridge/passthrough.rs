//! Passthrough bridge for peers that already speak the speech format.

use super::base::{AudioDecoder, AudioEncoder, BridgeResult};
use crate::core::audio::{AudioFormat, AudioFrame};

/// Forwards PCM 16-bit, 24kHz, mono unchanged in both directions.
#[derive(Debug, Default, Clone, Copy)]
pub struct PcmPassthrough;

impl AudioDecoder for PcmPassthrough {
    fn decode(&mut self, frame: &AudioFrame) -> BridgeResult<AudioFrame> {
        Ok(AudioFrame::new(frame.data().clone(), AudioFormat::SPEECH))
    }
}

impl AudioEncoder for PcmPassthrough {
    fn encode(&mut self, frame: &AudioFrame) -> BridgeResult<Vec<AudioFrame>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![frame.clone()])
    }

    fn flush(&mut self) -> BridgeResult<Vec<AudioFrame>> {
        Ok(Vec::new())
    }
}
