// src/session/replay.rs
//
// Unpaced pass over a finite recording: every frame goes through the
// analyzer and history, with no countdown cut-off.

use log::debug;
use serde::Serialize;

use crate::config::DetectorConfig;
use crate::core::capture::{CaptureDevice, CaptureGuard, CaptureParams};
use crate::core::dsp::SpectralFrameAnalyzer;
use crate::core::pattern::PatternHistory;
use crate::error::{CaptureError, SessionError};

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub source: String,
    pub frames: usize,
    pub energies: Vec<f64>,
    /// Zero-based indices of the frames whose push completed a match
    pub match_frames: Vec<usize>,
    pub success_threshold: u32,
    /// Frame at which the success threshold was reached, if ever
    pub detected_at: Option<usize>,
    /// Whether a live session, bounded by its countdown, would have succeeded
    pub within_countdown: bool,
}

impl ReplayReport {
    pub fn matches(&self) -> usize {
        self.match_frames.len()
    }

    pub fn detected(&self) -> bool {
        self.detected_at.is_some()
    }
}

/// Replay up to `limit` frames from `device` (all of them when `None`).
/// End of stream finishes the pass; any other capture error is returned.
pub fn replay(
    device: &dyn CaptureDevice,
    config: &DetectorConfig,
    limit: Option<usize>,
) -> Result<ReplayReport, SessionError> {
    let mut analyzer = SpectralFrameAnalyzer::new(config)?;
    let mut history = PatternHistory::from_config(config);
    let params = CaptureParams::from_config(config);
    let mut capture = CaptureGuard::open(device, &params, device.name())?;

    let mut report = ReplayReport {
        source: device.name(),
        frames: 0,
        energies: Vec::new(),
        match_frames: Vec::new(),
        success_threshold: config.success_threshold,
        detected_at: None,
        within_countdown: false,
    };

    while limit.map_or(true, |limit| report.frames < limit) {
        let frame = match capture.read_frame(params.frame_bytes) {
            Ok(frame) => frame,
            Err(CaptureError::EndOfStream) => break,
            Err(e) => return Err(e.into()),
        };

        let index = report.frames;
        let energy = analyzer.analyze(&frame)?;
        report.energies.push(energy);
        report.frames += 1;

        if history.push(energy) == Some(true) {
            debug!("{}: match at frame {index}", report.source);
            report.match_frames.push(index);
            let threshold = config.success_threshold as usize;
            if report.detected_at.is_none() && report.matches() >= threshold {
                report.detected_at = Some(index);
            }
        }
    }

    report.within_countdown = report
        .detected_at
        .map_or(false, |frame| frame <= config.countdown as usize);
    Ok(report)
}
