// src/error.rs
//
// Error types shared across the detection pipeline, sessions and dispatch.

use std::path::PathBuf;
use thiserror::Error;

/// Rejected configuration. Raised by startup validation, never mid-session.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error(
        "tolerance of {tolerance_hz} Hz is narrower than one frequency bin ({bin_width_hz:.2} Hz)"
    )]
    ToleranceBelowBinWidth { tolerance_hz: f64, bin_width_hz: f64 },

    #[error("target band {low_hz}..={high_hz} Hz does not fit below Nyquist ({nyquist_hz} Hz)")]
    BandAboveNyquist { low_hz: f64, high_hz: f64, nyquist_hz: f64 },

    #[error("no frequency bin falls inside {low_hz}..={high_hz} Hz")]
    EmptyBand { low_hz: f64, high_hz: f64 },

    #[error("history capacity {capacity} must equal the pattern length {pattern_len}")]
    PatternCapacity { capacity: usize, pattern_len: usize },

    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures at the capture boundary.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device unavailable: {0}")]
    Unavailable(String),

    #[error("permission to record audio was denied")]
    PermissionDenied,

    #[error("unsupported capture format: {0}")]
    UnsupportedFormat(String),

    #[error("capture read failed: {0}")]
    Read(String),

    #[error("capture stream reached the end of its data")]
    EndOfStream,

    #[error("capture stream is already closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    /// Errors that mean the device could never be opened, as opposed to a
    /// stream failing after it started.
    pub fn is_device_unavailable(&self) -> bool {
        matches!(
            self,
            CaptureError::Unavailable(_)
                | CaptureError::PermissionDenied
                | CaptureError::UnsupportedFormat(_)
        )
    }
}

/// Failures while turning a frame into a band energy.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("frame has {actual} bytes, expected {expected}")]
    FrameLength { expected: usize, actual: usize },

    #[error("spectral transform failed: {0}")]
    Transform(String),
}

/// Fatal session errors. Cancellation and exhaustion are outcomes, not errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("failed to spawn detection worker for {peer}")]
    Spawn {
        peer: String,
        #[source]
        source: std::io::Error,
    },
}

/// Dispatch-level failure local to a single request.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("descriptor {descriptor} has no owning {missing}")]
    MalformedTopology {
        descriptor: uuid::Uuid,
        missing: &'static str,
    },
}
