//! Capture boundary
//!
//! A [`CaptureDevice`] opens per-session [`CaptureStream`]s that hand out
//! fixed-size [`AudioFrame`]s. Sessions hold their stream through a
//! [`CaptureGuard`], which closes it on every exit path.
//!
//! Implementations:
//! - [`WavCaptureDevice`]: frames read from a 16-bit mono WAV file
//! - `CpalCaptureDevice`: the default input device (`cpal` feature)
//! - [`crate::testgen::ScriptedCaptureDevice`]: synthetic frames for tests

#[cfg(feature = "cpal")]
mod cpal_device;
mod wav;

#[cfg(feature = "cpal")]
pub use cpal_device::CpalCaptureDevice;
pub use wav::WavCaptureDevice;

use std::collections::VecDeque;

use log::debug;

use crate::config::DetectorConfig;
use crate::core::frame::AudioFrame;
use crate::error::CaptureError;

/// Parameters a session opens its capture stream with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureParams {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    /// Bytes per frame handed to the analyzer
    pub frame_bytes: usize,
}

impl CaptureParams {
    pub fn from_config(config: &DetectorConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            channels: 1,
            bits_per_sample: 16,
            frame_bytes: config.frame_bytes(),
        }
    }
}

/// Source of capture streams, shared by all sessions.
pub trait CaptureDevice: Send + Sync {
    /// Open and start a new stream. Each session gets its own stream.
    fn open(&self, params: &CaptureParams) -> Result<Box<dyn CaptureStream>, CaptureError>;

    /// Human readable device name for logs
    fn name(&self) -> String {
        "capture device".to_string()
    }
}

/// One open capture stream. Lives on the session's worker thread.
pub trait CaptureStream {
    /// Block until one frame of exactly `frame_bytes` bytes is available.
    fn read_frame(&mut self, frame_bytes: usize) -> Result<AudioFrame, CaptureError>;

    /// Stop and release the underlying device. Must tolerate repeated calls.
    fn close(&mut self);
}

/// Scoped ownership of a capture stream: the stream is closed when the
/// guard is dropped, whatever path the session leaves by.
pub struct CaptureGuard {
    stream: Option<Box<dyn CaptureStream>>,
    label: String,
}

impl CaptureGuard {
    pub fn open(
        device: &dyn CaptureDevice,
        params: &CaptureParams,
        label: impl Into<String>,
    ) -> Result<Self, CaptureError> {
        let stream = device.open(params)?;
        let label = label.into();
        debug!("[{label}] capture opened on {}", device.name());
        Ok(Self {
            stream: Some(stream),
            label,
        })
    }

    pub fn read_frame(&mut self, frame_bytes: usize) -> Result<AudioFrame, CaptureError> {
        match self.stream.as_mut() {
            Some(stream) => stream.read_frame(frame_bytes),
            None => Err(CaptureError::Closed),
        }
    }

    /// Release the stream now instead of at drop
    pub fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
            debug!("[{}] capture released", self.label);
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.close();
    }
}

/// Sample queue for push-based devices that keeps only the most recent
/// audio. Samples older than one frame are discarded as new ones arrive, so a
/// paced reader always sees what the microphone heard last.
#[derive(Debug, Default)]
pub struct RecentSamples {
    samples: VecDeque<i16>,
}

impl RecentSamples {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a device buffer, keeping at most `keep` of the newest samples
    pub fn push(&mut self, chunk: &[i16], keep: usize) {
        let chunk = &chunk[chunk.len().saturating_sub(keep)..];
        let overflow = (self.samples.len() + chunk.len()).saturating_sub(keep);
        self.samples.drain(..overflow.min(self.samples.len()));
        self.samples.extend(chunk.iter().copied());
    }

    /// The newest `wanted` samples as a frame, once that many are queued.
    /// Taking a frame empties the queue.
    pub fn take_frame(&mut self, wanted: usize) -> Option<AudioFrame> {
        if self.samples.len() < wanted {
            return None;
        }
        let skip = self.samples.len() - wanted;
        let samples: Vec<i16> = self.samples.drain(..).skip(skip).collect();
        Some(AudioFrame::from_samples(&samples))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testgen::{self, ScriptedCaptureDevice};

    #[test]
    fn test_guard_closes_once_on_drop() {
        let config = DetectorConfig::default();
        let device = ScriptedCaptureDevice::new(vec![testgen::silence_frame(&config)]);
        let params = CaptureParams::from_config(&config);

        {
            let mut guard = CaptureGuard::open(&device, &params, "test").unwrap();
            assert!(guard.read_frame(params.frame_bytes).is_ok());
            guard.close();
            assert!(matches!(
                guard.read_frame(params.frame_bytes),
                Err(CaptureError::Closed)
            ));
        }

        assert_eq!(device.opened(), 1);
        assert_eq!(device.closed(), 1);
    }

    #[test]
    fn test_open_failure_leaves_nothing_open() {
        let config = DetectorConfig::default();
        let device = ScriptedCaptureDevice::unavailable();
        let params = CaptureParams::from_config(&config);

        assert!(CaptureGuard::open(&device, &params, "test").is_err());
        assert_eq!(device.open_streams(), 0);
    }

    #[test]
    fn test_recent_samples_keep_newest_frame() {
        let wanted = 1792;
        let mut recent = RecentSamples::new();
        let backlog: Vec<i16> = (0..(10 * wanted) as i32).map(|i| (i % 30_000) as i16).collect();

        for chunk in backlog.chunks(441) {
            recent.push(chunk, wanted);
            assert!(recent.len() <= wanted);
        }

        let frame = recent.take_frame(wanted).unwrap();
        let expected = AudioFrame::from_samples(&backlog[backlog.len() - wanted..]);
        assert_eq!(frame, expected);
        assert!(recent.is_empty());
    }

    #[test]
    fn test_recent_samples_wait_for_whole_frame() {
        let mut recent = RecentSamples::new();
        recent.push(&[1, 2, 3], 4);
        assert!(recent.take_frame(4).is_none());

        recent.push(&[4, 5, 6], 4);
        assert_eq!(recent.take_frame(4), Some(AudioFrame::from_samples(&[3, 4, 5, 6])));

        // a single oversized buffer keeps only its tail
        recent.push(&[7, 8, 9, 10, 11, 12], 4);
        assert_eq!(recent.take_frame(4), Some(AudioFrame::from_samples(&[9, 10, 11, 12])));
    }
}
