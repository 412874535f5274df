// src/session/detection.rs
//
// One detection run for one peer: capture frames, reduce them to band
// energies, feed the rolling history and stop on success, exhaustion or
// cancellation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, trace, warn};
use serde::Serialize;

use super::cancel::CancelToken;
use super::{PeerId, SessionId};
use crate::config::DetectorConfig;
use crate::core::capture::{CaptureDevice, CaptureGuard, CaptureParams};
use crate::core::dsp::SpectralFrameAnalyzer;
use crate::core::pattern::PatternHistory;
use crate::error::{ConfigError, SessionError};

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Capturing,
    Evaluating,
    Succeeded,
    Exhausted,
    Cancelled,
    Failed,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Success threshold reached
    Succeeded,
    /// Countdown ran out first
    Exhausted,
    /// Stopped from outside; no verdict is delivered
    Cancelled,
    /// The capture device could not be opened
    DeviceUnavailable,
}

impl SessionOutcome {
    /// Verdict to notify peers with. `None` means nothing is sent.
    pub fn verdict(&self) -> Option<bool> {
        match self {
            SessionOutcome::Succeeded => Some(true),
            SessionOutcome::Exhausted | SessionOutcome::DeviceUnavailable => Some(false),
            SessionOutcome::Cancelled => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SessionOutcome::Succeeded => "Pattern detected",
            SessionOutcome::Exhausted => "Pattern not detected",
            SessionOutcome::Cancelled => "Cancelled",
            SessionOutcome::DeviceUnavailable => "Capture device unavailable",
        }
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub peer: PeerId,
    pub session_id: SessionId,
    pub outcome: SessionOutcome,
    pub verdict: Option<bool>,
    pub matches: u32,
    pub iterations: u32,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Band energy of every analysed frame, in capture order
    pub energies: Vec<f64>,
}

impl SessionReport {
    fn start(peer: PeerId, session_id: SessionId, expected_iterations: usize) -> Self {
        Self {
            peer,
            session_id,
            outcome: SessionOutcome::Cancelled,
            verdict: None,
            matches: 0,
            iterations: 0,
            started_at: Utc::now(),
            elapsed_ms: 0,
            energies: Vec::with_capacity(expected_iterations),
        }
    }

    fn finish(mut self, outcome: SessionOutcome, elapsed: Duration) -> Self {
        self.outcome = outcome;
        self.verdict = outcome.verdict();
        self.elapsed_ms = elapsed.as_millis() as u64;
        self
    }
}

/// A single detection attempt. Owns its analyzer and history; the capture
/// stream is opened inside [`DetectionSession::run`] and released on every
/// exit path.
pub struct DetectionSession {
    peer: PeerId,
    id: SessionId,
    config: Arc<DetectorConfig>,
    analyzer: SpectralFrameAnalyzer,
    history: PatternHistory,
    state: SessionState,
}

impl DetectionSession {
    pub fn new(
        peer: PeerId,
        id: SessionId,
        config: Arc<DetectorConfig>,
    ) -> Result<Self, ConfigError> {
        let analyzer = SpectralFrameAnalyzer::new(&config)?;
        let history = PatternHistory::from_config(&config);
        Ok(Self {
            peer,
            id,
            config,
            analyzer,
            history,
            state: SessionState::Idle,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    fn transition(&mut self, next: SessionState) {
        trace!("[{}] {:?} -> {:?}", self.peer, self.state, next);
        self.state = next;
    }

    /// Run to completion on the calling thread.
    ///
    /// Device-unavailable and cancellation are reported as outcomes; read and
    /// analysis failures are fatal and returned as errors.
    pub fn run(
        mut self,
        device: &dyn CaptureDevice,
        cancel: &CancelToken,
    ) -> Result<SessionReport, SessionError> {
        let clock = Instant::now();
        let budget = self.config.countdown as usize + 1;
        let mut report = SessionReport::start(self.peer.clone(), self.id, budget);

        if cancel.is_cancelled() {
            self.transition(SessionState::Cancelled);
            return Ok(report.finish(SessionOutcome::Cancelled, clock.elapsed()));
        }

        let params = CaptureParams::from_config(&self.config);
        let mut capture = match CaptureGuard::open(device, &params, self.peer.to_string()) {
            Ok(capture) => capture,
            Err(e) => {
                warn!("[{}] capture unavailable: {e}", self.peer);
                self.transition(SessionState::Failed);
                return Ok(report.finish(SessionOutcome::DeviceUnavailable, clock.elapsed()));
            }
        };

        info!(
            "[{}] session {} listening for {} Hz (+/- {} Hz)",
            self.peer, self.id, self.config.target_frequency_hz, self.config.tolerance_hz
        );

        let outcome = match self.capture_loop(&mut capture, cancel, &mut report) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.transition(SessionState::Failed);
                return Err(e);
            }
        };
        capture.close();

        self.transition(match outcome {
            SessionOutcome::Succeeded => SessionState::Succeeded,
            SessionOutcome::Exhausted => SessionState::Exhausted,
            SessionOutcome::Cancelled => SessionState::Cancelled,
            SessionOutcome::DeviceUnavailable => SessionState::Failed,
        });

        let report = report.finish(outcome, clock.elapsed());
        info!(
            "[{}] session {} finished: {} ({} matches in {} frames)",
            self.peer,
            self.id,
            outcome.description(),
            report.matches,
            report.iterations
        );
        Ok(report)
    }

    fn capture_loop(
        &mut self,
        capture: &mut CaptureGuard,
        cancel: &CancelToken,
        report: &mut SessionReport,
    ) -> Result<SessionOutcome, SessionError> {
        let interval = self.config.iteration_interval();
        let frame_bytes = self.config.frame_bytes();
        let threshold = self.config.success_threshold;
        let mut countdown = self.config.countdown as i64;

        self.transition(SessionState::Capturing);
        loop {
            if cancel.is_cancelled() {
                return Ok(SessionOutcome::Cancelled);
            }
            if report.matches >= threshold {
                return Ok(SessionOutcome::Succeeded);
            }
            if countdown < 0 {
                return Ok(SessionOutcome::Exhausted);
            }

            let started = Instant::now();
            let frame = capture.read_frame(frame_bytes)?;

            self.transition(SessionState::Evaluating);
            let energy = self.analyzer.analyze(&frame)?;
            debug!("[{}] band energy {energy:.1}", self.peer);
            report.energies.push(energy);

            if self.history.push(energy) == Some(true) {
                report.matches += 1;
                debug!(
                    "[{}] pattern matched ({}/{threshold})",
                    self.peer, report.matches
                );
            }

            countdown -= 1;
            report.iterations += 1;
            self.transition(SessionState::Capturing);

            if report.matches >= threshold || countdown < 0 {
                continue;
            }

            if let Some(rest) = interval.checked_sub(started.elapsed()) {
                if !rest.is_zero() {
                    cancel.wait_timeout(rest);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfigBuilder;
    use crate::testgen::{self, ScriptedCaptureDevice};

    fn fast_config(countdown: u32) -> Arc<DetectorConfig> {
        Arc::new(
            DetectorConfigBuilder::new()
                .iteration_interval(Duration::ZERO)
                .countdown(countdown)
                .build(),
        )
    }

    #[test]
    fn test_outcome_verdicts() {
        assert_eq!(SessionOutcome::Succeeded.verdict(), Some(true));
        assert_eq!(SessionOutcome::Exhausted.verdict(), Some(false));
        assert_eq!(SessionOutcome::DeviceUnavailable.verdict(), Some(false));
        assert_eq!(SessionOutcome::Cancelled.verdict(), None);
    }

    #[test]
    fn test_precancelled_session_never_opens_capture() {
        let config = fast_config(30);
        let device = ScriptedCaptureDevice::new(vec![testgen::silence_frame(&config)]);
        let session = DetectionSession::new(PeerId::from("peer"), SessionId(1), config).unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let report = session.run(&device, &cancel).unwrap();

        assert_eq!(report.outcome, SessionOutcome::Cancelled);
        assert_eq!(device.opened(), 0);
    }

    #[test]
    fn test_unavailable_device_fails_fast() {
        let config = fast_config(30);
        let device = ScriptedCaptureDevice::unavailable();
        let session = DetectionSession::new(PeerId::from("peer"), SessionId(1), config).unwrap();

        let report = session.run(&device, &CancelToken::new()).unwrap();
        assert_eq!(report.outcome, SessionOutcome::DeviceUnavailable);
        assert_eq!(report.verdict, Some(false));
        assert_eq!(report.iterations, 0);
    }

    #[test]
    fn test_misconfigured_frames_are_fatal() {
        let config = fast_config(30);
        let wrong = crate::core::AudioFrame::from_samples(&vec![0i16; 100]);
        let device = ScriptedCaptureDevice::new(vec![wrong]);
        let session = DetectionSession::new(PeerId::from("peer"), SessionId(1), config).unwrap();

        let result = session.run(&device, &CancelToken::new());
        assert!(matches!(result, Err(SessionError::Analysis(_))));
        assert_eq!(device.open_streams(), 0);
    }

    #[test]
    fn test_pacing_pads_each_iteration() {
        let config = Arc::new(
            DetectorConfigBuilder::new()
                .iteration_interval(Duration::from_millis(20))
                .countdown(4)
                .build(),
        );
        let device = ScriptedCaptureDevice::new(vec![testgen::silence_frame(&config)]);
        let session = DetectionSession::new(PeerId::from("peer"), SessionId(1), config).unwrap();

        let report = session.run(&device, &CancelToken::new()).unwrap();
        assert_eq!(report.iterations, 5);
        // the last iteration is not padded
        assert!(report.elapsed_ms >= 80);
    }
}
