// src/gatt/hrv.rs
//
// Heart-rate-variability relay. The sensor runs only while at least one peer
// is subscribed to the peak-to-peak interval characteristic.

use std::sync::{Arc, Mutex};

use log::{debug, info};
use uuid::Uuid;

use super::peripheral::{NotifyTarget, Peripheral};
use super::service::GattService;
use super::types::{uuids, CharacteristicRef};
use crate::session::PeerId;

/// One peak-to-peak interval measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalSample {
    pub timestamp_ns: i64,
    pub interval_ms: f32,
}

impl IntervalSample {
    /// Wire layout: little-endian `i64` timestamp then `f32` value
    pub fn to_bytes(&self) -> [u8; 12] {
        let mut bytes = [0u8; 12];
        bytes[..8].copy_from_slice(&self.timestamp_ns.to_le_bytes());
        bytes[8..].copy_from_slice(&self.interval_ms.to_le_bytes());
        bytes
    }
}

pub type SampleCallback = Box<dyn Fn(IntervalSample) + Send + Sync>;

/// Source of interval samples, started and stopped on demand
pub trait IntervalSensor: Send + Sync {
    fn start(&self, on_sample: SampleCallback);
    fn stop(&self);
}

pub struct HrvService {
    sensor: Arc<dyn IntervalSensor>,
    peripheral: Arc<dyn Peripheral>,
    streaming: Mutex<bool>,
}

impl HrvService {
    pub fn new(sensor: Arc<dyn IntervalSensor>, peripheral: Arc<dyn Peripheral>) -> Self {
        Self {
            sensor,
            peripheral,
            streaming: Mutex::new(false),
        }
    }

    pub fn is_streaming(&self) -> bool {
        *self.streaming.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn start_streaming(&self) {
        let mut streaming = self.streaming.lock().unwrap_or_else(|e| e.into_inner());
        if *streaming {
            return;
        }
        let peripheral = Arc::clone(&self.peripheral);
        self.sensor
            .start(Box::new(move |sample| relay_sample(peripheral.as_ref(), sample)));
        *streaming = true;
        info!("HRV sensor started");
    }

    /// Stop the sensor unless a peer other than `leaving` is still subscribed
    fn stop_unless_wanted(&self, leaving: Option<&PeerId>) {
        let mut streaming = self.streaming.lock().unwrap_or_else(|e| e.into_inner());
        if !*streaming {
            return;
        }
        let wanted = self
            .peripheral
            .subscribers(uuids::PP_INTERVAL_CHARACTERISTIC)
            .iter()
            .any(|peer| Some(peer) != leaving);
        if wanted {
            debug!("HRV sensor kept running for remaining subscribers");
            return;
        }
        self.sensor.stop();
        *streaming = false;
        info!("HRV sensor stopped");
    }
}

/// Send one sample to every subscriber of the interval characteristic
pub fn relay_sample(peripheral: &dyn Peripheral, sample: IntervalSample) {
    peripheral.notify(
        &NotifyTarget::Subscribers,
        uuids::PP_INTERVAL_CHARACTERISTIC,
        &sample.to_bytes(),
    );
}

impl GattService for HrvService {
    fn uuid(&self) -> Uuid {
        uuids::HRV_SERVICE
    }

    fn name(&self) -> &'static str {
        "HRV Service"
    }

    fn on_notifying_enabled(&self, _peer: &PeerId, characteristic: &CharacteristicRef) {
        if characteristic.uuid == uuids::PP_INTERVAL_CHARACTERISTIC {
            self.start_streaming();
        }
    }

    fn on_notifying_disabled(&self, _peer: &PeerId, characteristic: &CharacteristicRef) {
        if characteristic.uuid == uuids::PP_INTERVAL_CHARACTERISTIC {
            self.stop_unless_wanted(None);
        }
    }

    // The stack reports the disconnect before dropping the peer's
    // subscriptions, so the leaving peer is ignored here.
    fn on_disconnected(&self, peer: &PeerId) {
        self.stop_unless_wanted(Some(peer));
    }
}
