//! Command implementations behind the CLI

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::config::DetectorConfig;
use crate::core::capture::{CaptureDevice, WavCaptureDevice};
use crate::gatt::{DispatchResponse, IntervalSensor, PeripheralEvent};
use crate::server::ProximityServer;
use crate::session::{replay, PeerId, ReplayReport, SessionReport};
use crate::testgen::{self, ManualIntervalSensor, RecordingPeripheral, ScriptedCaptureDevice};

/// Amplitude of the synthetic transmitter tone
const SIMULATED_AMPLITUDE: f64 = 8000.0;

// ---------------------------------------------------------------------------
// analyze
// ---------------------------------------------------------------------------

/// Outcome of analysing one recording
#[derive(Debug, Serialize)]
pub struct FileAnalysis {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ReplayReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Expand files and directories into the WAV files they contain
pub fn collect_wav_files(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_file() {
            files.push(input.clone());
        } else if input.is_dir() {
            files.extend(
                WalkDir::new(input)
                    .follow_links(true)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .map(|entry| entry.into_path())
                    .filter(|path| is_wav(path)),
            );
        } else {
            warn!("Skipping {}: not a file or directory", input.display());
        }
    }
    files.sort();
    files
}

fn is_wav(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext.eq_ignore_ascii_case("wav"))
}

/// Replay every file in parallel. Per-file failures are reported, not fatal.
pub fn analyze(files: &[PathBuf], config: &DetectorConfig, progress: bool) -> Vec<FileAnalysis> {
    let bar = if progress {
        ProgressBar::new(files.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}") {
        bar.set_style(style);
    }

    let results: Vec<FileAnalysis> = files
        .par_iter()
        .progress_with(bar.clone())
        .map(|path| {
            let device = WavCaptureDevice::new(path);
            match replay(&device, config, None) {
                Ok(report) => FileAnalysis {
                    path: path.clone(),
                    report: Some(report),
                    error: None,
                },
                Err(e) => FileAnalysis {
                    path: path.clone(),
                    report: None,
                    error: Some(e.to_string()),
                },
            }
        })
        .collect();

    bar.finish_and_clear();
    results
}

// ---------------------------------------------------------------------------
// simulate
// ---------------------------------------------------------------------------

/// One step of an event script
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptStep {
    /// Pause before this event
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(flatten)]
    pub event: PeripheralEvent,
}

#[derive(Debug, Serialize)]
pub struct StepResult {
    pub event: String,
    pub peer: PeerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<DispatchResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SimulationSummary {
    pub transmitter_on: bool,
    pub steps: Vec<StepResult>,
    pub reports: Vec<SessionReport>,
    /// Verdict payload bytes in the order they were notified
    pub verdicts: Vec<u8>,
    pub timed_out: bool,
}

pub fn load_script(path: &Path) -> Result<Vec<ScriptStep>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Reading event script {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Parsing event script {}", path.display()))
}

/// Script connecting `peers` simulated peers at once
pub fn connect_script(peers: usize) -> Vec<ScriptStep> {
    (0..peers)
        .map(|i| ScriptStep {
            delay_ms: 0,
            event: PeripheralEvent::Connected {
                peer: PeerId::new(format!("SIM:00:00:00:00:{:02X}", i + 1)),
            },
        })
        .collect()
}

/// Run a script against a fully wired server with synthetic capture and a
/// recording peripheral, then wait for outstanding sessions.
pub fn simulate(
    config: DetectorConfig,
    transmitter_on: bool,
    script: &[ScriptStep],
    timeout: Duration,
) -> Result<SimulationSummary> {
    let frames = if transmitter_on {
        testgen::pattern_frames(&config, SIMULATED_AMPLITUDE)
    } else {
        vec![testgen::silence_frame(&config)]
    };
    let device: Arc<dyn CaptureDevice> = Arc::new(ScriptedCaptureDevice::new(frames));
    let peripheral = Arc::new(RecordingPeripheral::new());
    let sensor: Arc<dyn IntervalSensor> = Arc::new(ManualIntervalSensor::new());

    let server = ProximityServer::new(config, device, peripheral.clone(), Some(sensor))
        .context("Building proximity server")?;

    let mut steps = Vec::with_capacity(script.len());
    for step in script {
        if step.delay_ms > 0 {
            thread::sleep(Duration::from_millis(step.delay_ms));
        }
        peripheral.observe(&step.event);
        let (response, error) = match server.dispatcher().dispatch(&step.event) {
            Ok(response) => (Some(response), None),
            Err(e) => {
                warn!("Event rejected: {e}");
                (None, Some(e.to_string()))
            }
        };
        steps.push(StepResult {
            event: event_name(&step.event).to_string(),
            peer: step.event.peer().clone(),
            response,
            error,
        });
    }

    let timed_out = !server.registry().wait_idle(timeout);
    if timed_out {
        warn!("Sessions still running after {}s, cancelling", timeout.as_secs());
    }
    server.shutdown();
    info!("Simulation finished");

    Ok(SimulationSummary {
        transmitter_on,
        steps,
        reports: server.registry().take_reports(),
        verdicts: peripheral.verdicts(),
        timed_out,
    })
}

fn event_name(event: &PeripheralEvent) -> &'static str {
    match event {
        PeripheralEvent::Connected { .. } => "connected",
        PeripheralEvent::Disconnected { .. } => "disconnected",
        PeripheralEvent::CharacteristicRead { .. } => "characteristic_read",
        PeripheralEvent::CharacteristicWrite { .. } => "characteristic_write",
        PeripheralEvent::CharacteristicWriteCompleted { .. } => "characteristic_write_completed",
        PeripheralEvent::DescriptorRead { .. } => "descriptor_read",
        PeripheralEvent::DescriptorWrite { .. } => "descriptor_write",
        PeripheralEvent::NotifyingEnabled { .. } => "notifying_enabled",
        PeripheralEvent::NotifyingDisabled { .. } => "notifying_disabled",
        PeripheralEvent::NotificationSent { .. } => "notification_sent",
    }
}

// ---------------------------------------------------------------------------
// listen
// ---------------------------------------------------------------------------

#[cfg(feature = "cpal")]
pub fn listen(config: DetectorConfig) -> Result<SessionReport> {
    use crate::core::capture::CpalCaptureDevice;
    use crate::session::{CancelToken, DetectionSession, SessionId};

    let device = CpalCaptureDevice::new();
    info!("Listening on {}", device.name());

    let session = DetectionSession::new(PeerId::from("local"), SessionId(1), Arc::new(config))
        .context("Building detection session")?;
    session
        .run(&device, &CancelToken::new())
        .context("Detection session failed")
}
