#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ultraprox::config::{DetectorConfig, DetectorConfigBuilder};
use ultraprox::testgen::{ManualIntervalSensor, RecordingPeripheral, ScriptedCaptureDevice};
use ultraprox::ProximityServer;

pub const TONE_AMPLITUDE: f64 = 8000.0;

pub fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ultraprox"))
}

pub fn run_ultraprox() -> Command {
    Command::new(binary())
}

/// Default tuning without pacing
pub fn fast_config(countdown: u32) -> DetectorConfig {
    DetectorConfigBuilder::new()
        .iteration_interval(Duration::ZERO)
        .countdown(countdown)
        .build()
}

pub fn paced_config(interval: Duration, countdown: u32) -> DetectorConfig {
    DetectorConfigBuilder::new()
        .iteration_interval(interval)
        .countdown(countdown)
        .build()
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

pub struct Rig {
    pub server: ProximityServer,
    pub device: Arc<ScriptedCaptureDevice>,
    pub peripheral: Arc<RecordingPeripheral>,
    pub sensor: Arc<ManualIntervalSensor>,
}

/// Server wired to a scripted device, a recording peripheral and a manual
/// interval sensor
pub fn rig(config: DetectorConfig, device: ScriptedCaptureDevice) -> Rig {
    let device = Arc::new(device);
    let peripheral = Arc::new(RecordingPeripheral::new());
    let sensor = Arc::new(ManualIntervalSensor::new());
    let server = ProximityServer::new(
        config,
        device.clone(),
        peripheral.clone(),
        Some(sensor.clone()),
    )
    .expect("valid config");
    Rig {
        server,
        device,
        peripheral,
        sensor,
    }
}

pub fn write_config(dir: &Path, config: &DetectorConfig) -> PathBuf {
    let path = dir.join("detector.json");
    std::fs::write(&path, serde_json::to_string_pretty(config).unwrap()).unwrap();
    path
}
