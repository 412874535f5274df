// src/core/frame.rs
//
// Raw capture frames and their little-endian PCM decoding.

use crate::config::PcmDecoding;

/// Bytes per mono 16-bit sample
pub const BYTES_PER_SAMPLE: usize = 2;

/// One fixed-size block of little-endian 16-bit mono PCM, as read from the
/// capture device. Immutable once captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    bytes: Vec<u8>,
}

impl AudioFrame {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Encode signed samples as little-endian PCM
    pub fn from_samples(samples: &[i16]) -> Self {
        let bytes = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn sample_len(&self) -> usize {
        self.bytes.len() / BYTES_PER_SAMPLE
    }

    /// Decoded samples in capture order. A trailing odd byte is ignored.
    pub fn samples(&self, decoding: PcmDecoding) -> impl Iterator<Item = f64> + '_ {
        self.bytes
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(move |pair| decode_sample(pair[0], pair[1], decoding))
    }
}

/// Combine a low and a high byte into one sample value
#[inline]
pub fn decode_sample(low: u8, high: u8, decoding: PcmDecoding) -> f64 {
    match decoding {
        PcmDecoding::Signed => i16::from_le_bytes([low, high]) as f64,
        PcmDecoding::Unsigned => u16::from_le_bytes([low, high]) as f64,
    }
}
