//! Digital Signal Processing for the carrier band

mod band;

pub use band::SpectralFrameAnalyzer;
