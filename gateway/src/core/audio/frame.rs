use bytes::{BufMut, Bytes, BytesMut};
use std::time::Duration;

use super::format::{AudioEncoding, AudioFormat};

/// An immutable chunk of audio with its format descriptor.
///
/// Frames move from stage to stage by value; cloning only bumps the
/// reference count of the underlying [`Bytes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    data: Bytes,
    format: AudioFormat,
}

impl AudioFrame {
    /// Create a frame from raw bytes.
    pub fn new(data: impl Into<Bytes>, format: AudioFormat) -> Self {
        Self {
            data: data.into(),
            format,
        }
    }

    /// Create a speech-side frame (PCM 16-bit, 24kHz, mono).
    pub fn speech(data: impl Into<Bytes>) -> Self {
        Self::new(data, AudioFormat::SPEECH)
    }

    /// Create a PCM frame from interleaved samples.
    pub fn from_samples(samples: &[i16], format: AudioFormat) -> Self {
        let mut buf = BytesMut::with_capacity(samples.len() * 2);
        for &sample in samples {
            buf.put_i16_le(sample);
        }
        Self::new(buf.freeze(), format)
    }

    #[inline]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    #[inline]
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume the frame and return its payload.
    pub fn into_data(self) -> Bytes {
        self.data
    }

    /// Decode interleaved PCM samples. A trailing odd byte is ignored.
    ///
    /// Returns an empty vector for compressed frames.
    pub fn samples(&self) -> Vec<i16> {
        if self.format.encoding != AudioEncoding::Pcm16 {
            return Vec::new();
        }
        self.data
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    /// Nominal playback duration of a PCM frame.
    ///
    /// Compressed frames carry no byte-rate and return `None`.
    pub fn duration(&self) -> Option<Duration> {
        let bytes_per_second = self.format.bytes_per_second()?;
        if bytes_per_second == 0 {
            return None;
        }
        let nanos = self.data.len() as u128 * 1_000_000_000 / bytes_per_second as u128;
        Some(Duration::from_nanos(nanos as u64))
    }
}
