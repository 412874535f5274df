// src/core/capture/wav.rs
//
// File-backed capture: replays a 16-bit mono WAV recording frame by frame.
// Uses hound for decoding.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader};

use super::{CaptureDevice, CaptureParams, CaptureStream};
use crate::core::frame::AudioFrame;
use crate::error::CaptureError;

/// Capture device reading frames from a WAV file. Every `open` starts at the
/// beginning of the file.
#[derive(Debug, Clone)]
pub struct WavCaptureDevice {
    path: PathBuf,
}

impl WavCaptureDevice {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CaptureDevice for WavCaptureDevice {
    fn open(&self, params: &CaptureParams) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let file = File::open(&self.path).map_err(|e| {
            CaptureError::Unavailable(format!("{}: {e}", self.path.display()))
        })?;
        let stream = WavCaptureStream::new(BufReader::new(file), params)?;
        Ok(Box::new(stream))
    }

    fn name(&self) -> String {
        format!("wav:{}", self.path.display())
    }
}

/// Stream over any WAV source. Rejects recordings the pipeline cannot use
/// rather than resampling them.
pub struct WavCaptureStream<R: Read> {
    reader: Option<WavReader<R>>,
}

impl<R: Read> WavCaptureStream<R> {
    pub fn new(source: R, params: &CaptureParams) -> Result<Self, CaptureError> {
        let reader = WavReader::new(source)
            .map_err(|e| CaptureError::UnsupportedFormat(e.to_string()))?;

        let spec = reader.spec();
        if spec.channels != params.channels
            || spec.bits_per_sample != params.bits_per_sample
            || spec.sample_format != SampleFormat::Int
        {
            return Err(CaptureError::UnsupportedFormat(format!(
                "need {}-channel {}-bit integer PCM, got {}-channel {}-bit {:?}",
                params.channels,
                params.bits_per_sample,
                spec.channels,
                spec.bits_per_sample,
                spec.sample_format
            )));
        }
        if spec.sample_rate != params.sample_rate {
            return Err(CaptureError::UnsupportedFormat(format!(
                "need {} Hz, got {} Hz",
                params.sample_rate, spec.sample_rate
            )));
        }

        Ok(Self {
            reader: Some(reader),
        })
    }
}

impl<R: Read> CaptureStream for WavCaptureStream<R> {
    fn read_frame(&mut self, frame_bytes: usize) -> Result<AudioFrame, CaptureError> {
        let reader = self.reader.as_mut().ok_or(CaptureError::Closed)?;
        let wanted = frame_bytes / 2;

        let mut samples = Vec::with_capacity(wanted);
        for sample in reader.samples::<i16>().take(wanted) {
            samples.push(sample.map_err(|e| CaptureError::Read(e.to_string()))?);
        }

        // A partial tail is not a frame
        if samples.len() < wanted {
            return Err(CaptureError::EndOfStream);
        }
        Ok(AudioFrame::from_samples(&samples))
    }

    fn close(&mut self) {
        self.reader = None;
    }
}
