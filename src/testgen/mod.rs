// src/testgen/mod.rs
//
// Synthetic signals and in-memory fakes for the capture and peripheral
// boundaries. Used by unit tests, the integration tests and `simulate`.

use std::collections::{BTreeSet, HashMap};
use std::f64::consts::PI;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use hound::{SampleFormat, WavSpec, WavWriter};
use uuid::Uuid;

use crate::config::DetectorConfig;
use crate::core::capture::{CaptureDevice, CaptureParams, CaptureStream};
use crate::core::frame::AudioFrame;
use crate::core::pattern::PatternShape;
use crate::error::CaptureError;
use crate::gatt::{
    uuids, IntervalSample, IntervalSensor, NotifyTarget, Peripheral, PeripheralEvent,
    SampleCallback,
};
use crate::session::PeerId;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Sine samples at `frequency` Hz, peak `amplitude`, clamped to i16
pub fn tone_samples(sample_rate: u32, len: usize, frequency: f64, amplitude: f64) -> Vec<i16> {
    (0..len)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            let value = amplitude * (2.0 * PI * frequency * t).sin();
            value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
        })
        .collect()
}

/// One frame of a pure tone, sized for `config`
pub fn tone_frame(config: &DetectorConfig, frequency: f64, amplitude: f64) -> AudioFrame {
    AudioFrame::from_samples(&tone_samples(
        config.sample_rate,
        config.frame_samples,
        frequency,
        amplitude,
    ))
}

pub fn silence_frame(config: &DetectorConfig) -> AudioFrame {
    AudioFrame::from_samples(&vec![0i16; config.frame_samples])
}

/// One period of a continuously repeating transmitter: tone for "on",
/// silence for "off". Looping it matches once per period.
pub fn pattern_frames(config: &DetectorConfig, amplitude: f64) -> Vec<AudioFrame> {
    let shape = PatternShape::new(config.pattern.clone()).unwrap_or_default();
    let tone = tone_frame(config, config.target_frequency_hz, amplitude);
    let silence = silence_frame(config);

    shape
        .expected_states()
        .map(|(_, on)| if on { tone.clone() } else { silence.clone() })
        .collect()
}

/// The pattern once, followed by as many silent frames. Looping it also
/// yields exactly one match per cycle.
pub fn detection_cycle(config: &DetectorConfig, amplitude: f64) -> Vec<AudioFrame> {
    let mut frames = pattern_frames(config, amplitude);
    let gap = frames.len();
    frames.extend(std::iter::repeat(silence_frame(config)).take(gap));
    frames
}

/// Write frames back to back as a 16-bit mono WAV file
pub fn write_wav(
    path: impl AsRef<Path>,
    sample_rate: u32,
    frames: &[AudioFrame],
) -> hound::Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for frame in frames {
        for pair in frame.as_bytes().chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
        }
    }
    writer.finalize()
}

// ---------------------------------------------------------------------------
// Capture fake
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CaptureCounters {
    opened: AtomicUsize,
    closed: AtomicUsize,
    reads: AtomicUsize,
}

/// Capture device replaying a fixed list of frames in a loop. Frames are
/// returned as scripted, whatever size the session asks for.
#[derive(Debug, Clone)]
pub struct ScriptedCaptureDevice {
    frames: Arc<Vec<AudioFrame>>,
    available: bool,
    read_delay: Duration,
    counters: Arc<CaptureCounters>,
}

impl ScriptedCaptureDevice {
    pub fn new(frames: Vec<AudioFrame>) -> Self {
        Self {
            frames: Arc::new(frames),
            available: true,
            read_delay: Duration::ZERO,
            counters: Arc::default(),
        }
    }

    /// A device whose `open` always fails
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(Vec::new())
        }
    }

    /// Make every read block for `delay`, like a real device filling a buffer
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    pub fn open_streams(&self) -> usize {
        self.opened().saturating_sub(self.closed())
    }

    pub fn frames_read(&self) -> usize {
        self.counters.reads.load(Ordering::SeqCst)
    }
}

impl CaptureDevice for ScriptedCaptureDevice {
    fn open(&self, _params: &CaptureParams) -> Result<Box<dyn CaptureStream>, CaptureError> {
        if !self.available {
            return Err(CaptureError::Unavailable("scripted device offline".to_string()));
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedCaptureStream {
            frames: Arc::clone(&self.frames),
            read_delay: self.read_delay,
            next: 0,
            open: true,
            counters: Arc::clone(&self.counters),
        }))
    }

    fn name(&self) -> String {
        "scripted".to_string()
    }
}

struct ScriptedCaptureStream {
    frames: Arc<Vec<AudioFrame>>,
    read_delay: Duration,
    next: usize,
    open: bool,
    counters: Arc<CaptureCounters>,
}

impl CaptureStream for ScriptedCaptureStream {
    fn read_frame(&mut self, _frame_bytes: usize) -> Result<AudioFrame, CaptureError> {
        if !self.open {
            return Err(CaptureError::Closed);
        }
        if self.frames.is_empty() {
            return Err(CaptureError::EndOfStream);
        }
        if !self.read_delay.is_zero() {
            thread::sleep(self.read_delay);
        }
        let frame = self.frames[self.next % self.frames.len()].clone();
        self.next += 1;
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        Ok(frame)
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// ---------------------------------------------------------------------------
// Peripheral fake
// ---------------------------------------------------------------------------

/// One recorded outbound notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub target: NotifyTarget,
    pub characteristic: Uuid,
    pub payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct LinkState {
    connected: BTreeSet<PeerId>,
    subscriptions: HashMap<Uuid, BTreeSet<PeerId>>,
    notifications: Vec<Notification>,
}

/// In-memory peripheral stack: tracks connections and subscriptions and
/// records every notification.
#[derive(Debug, Default)]
pub struct RecordingPeripheral {
    state: Mutex<LinkState>,
    changed: Condvar,
}

impl RecordingPeripheral {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, peer: &PeerId) {
        lock(&self.state).connected.insert(peer.clone());
    }

    /// Drops the peer and all its subscriptions
    pub fn disconnect(&self, peer: &PeerId) {
        let mut state = lock(&self.state);
        state.connected.remove(peer);
        for subscribers in state.subscriptions.values_mut() {
            subscribers.remove(peer);
        }
    }

    pub fn subscribe(&self, peer: &PeerId, characteristic: Uuid) {
        lock(&self.state)
            .subscriptions
            .entry(characteristic)
            .or_default()
            .insert(peer.clone());
    }

    pub fn unsubscribe(&self, peer: &PeerId, characteristic: Uuid) {
        if let Some(subscribers) = lock(&self.state).subscriptions.get_mut(&characteristic) {
            subscribers.remove(peer);
        }
    }

    /// Apply the link-level effect of an event, as the real stack would
    /// before reporting it.
    pub fn observe(&self, event: &PeripheralEvent) {
        match event {
            PeripheralEvent::Connected { peer } => self.connect(peer),
            PeripheralEvent::Disconnected { peer } => self.disconnect(peer),
            PeripheralEvent::NotifyingEnabled { peer, characteristic } => {
                self.subscribe(peer, characteristic.uuid)
            }
            PeripheralEvent::NotifyingDisabled { peer, characteristic } => {
                self.unsubscribe(peer, characteristic.uuid)
            }
            _ => {}
        }
    }

    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.state).notifications.clone()
    }

    pub fn notifications_for(&self, characteristic: Uuid) -> Vec<Notification> {
        lock(&self.state)
            .notifications
            .iter()
            .filter(|n| n.characteristic == characteristic)
            .cloned()
            .collect()
    }

    /// Payload bytes of every verdict sent so far
    pub fn verdicts(&self) -> Vec<u8> {
        self.notifications_for(uuids::ULTRASONIC_DETECTED_CHARACTERISTIC)
            .into_iter()
            .flat_map(|n| n.payload)
            .collect()
    }

    /// Block until at least `count` notifications were recorded
    pub fn wait_for_notifications(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = lock(&self.state);
        while state.notifications.len() < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = match self.changed.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }
}

impl Peripheral for RecordingPeripheral {
    fn notify(&self, target: &NotifyTarget, characteristic: Uuid, payload: &[u8]) {
        lock(&self.state).notifications.push(Notification {
            target: target.clone(),
            characteristic,
            payload: payload.to_vec(),
        });
        self.changed.notify_all();
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        lock(&self.state).connected.iter().cloned().collect()
    }

    fn subscribers(&self, characteristic: Uuid) -> Vec<PeerId> {
        lock(&self.state)
            .subscriptions
            .get(&characteristic)
            .map(|peers| peers.iter().cloned().collect())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Sensor fake
// ---------------------------------------------------------------------------

/// Interval sensor driven by hand through [`ManualIntervalSensor::emit`]
#[derive(Default)]
pub struct ManualIntervalSensor {
    callback: Mutex<Option<SampleCallback>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl ManualIntervalSensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.callback).is_some()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Deliver a sample if the sensor is running
    pub fn emit(&self, sample: IntervalSample) -> bool {
        match lock(&self.callback).as_ref() {
            Some(callback) => {
                callback(sample);
                true
            }
            None => false,
        }
    }
}

impl IntervalSensor for ManualIntervalSensor {
    fn start(&self, on_sample: SampleCallback) {
        *lock(&self.callback) = Some(on_sample);
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop(&self) {
        *lock(&self.callback) = None;
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}
