//! Signal path: capture, spectral reduction and pattern matching

pub mod capture;
pub mod dsp;
pub mod frame;
pub mod pattern;

pub use capture::{CaptureDevice, CaptureGuard, CaptureParams, CaptureStream, WavCaptureDevice};
pub use dsp::SpectralFrameAnalyzer;
pub use frame::AudioFrame;
pub use pattern::{PatternHistory, PatternShape};
