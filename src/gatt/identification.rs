// src/gatt/identification.rs
//
// Identification service: exposes the device id and the ultrasonic verdict,
// and ties detection sessions to peer connections.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use log::{debug, error, info};
use uuid::Uuid;

use super::peripheral::{NotifyTarget, Peripheral};
use super::service::GattService;
use super::types::{uuids, CharacteristicRef, ReadResponse};
use crate::session::{PeerId, SessionRegistry, StartOutcome, VerdictSink};

/// One-byte verdict payload: `1` detected, `0` not
pub fn verdict_payload(matched: bool) -> [u8; 1] {
    [u8::from(matched)]
}

/// Relays session verdicts over the ultrasonic-detected characteristic.
///
/// A verdict goes only to the peer whose session produced it when that peer
/// has subscribed. Otherwise it falls back to every subscriber, since the
/// one-byte payload carries no peer id and the receiver cannot be certain
/// the verdict is its own.
pub struct PeripheralVerdictSink {
    peripheral: Arc<dyn Peripheral>,
}

impl PeripheralVerdictSink {
    pub fn new(peripheral: Arc<dyn Peripheral>) -> Self {
        Self { peripheral }
    }

    fn target_for(&self, peer: &PeerId) -> NotifyTarget {
        let subscribed = self
            .peripheral
            .subscribers(uuids::ULTRASONIC_DETECTED_CHARACTERISTIC)
            .contains(peer);
        if subscribed {
            NotifyTarget::Peer(peer.clone())
        } else {
            debug!("[{peer}] not subscribed to verdicts, notifying all subscribers");
            NotifyTarget::Subscribers
        }
    }
}

impl VerdictSink for PeripheralVerdictSink {
    fn deliver(&self, peer: &PeerId, matched: bool) {
        info!(
            "[{peer}] ultrasonic pattern {}",
            if matched { "detected" } else { "not detected" }
        );
        self.peripheral.notify(
            &self.target_for(peer),
            uuids::ULTRASONIC_DETECTED_CHARACTERISTIC,
            &verdict_payload(matched),
        );
    }
}

pub struct IdentificationService {
    device_id: AtomicI32,
    registry: Arc<SessionRegistry>,
}

impl IdentificationService {
    pub fn new(device_id: i32, registry: Arc<SessionRegistry>) -> Self {
        Self {
            device_id: AtomicI32::new(device_id),
            registry,
        }
    }

    pub fn device_id(&self) -> i32 {
        self.device_id.load(Ordering::Relaxed)
    }

    pub fn set_device_id(&self, device_id: i32) {
        self.device_id.store(device_id, Ordering::Relaxed);
    }

    /// Device id as sent on the wire (big-endian)
    pub fn device_id_bytes(&self) -> [u8; 4] {
        self.device_id().to_be_bytes()
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }
}

impl GattService for IdentificationService {
    fn uuid(&self) -> Uuid {
        uuids::IDENTIFICATION_SERVICE
    }

    fn name(&self) -> &'static str {
        "Identification Service"
    }

    fn on_characteristic_read(
        &self,
        _peer: &PeerId,
        characteristic: &CharacteristicRef,
    ) -> ReadResponse {
        if characteristic.uuid == uuids::DEVICE_ID_CHARACTERISTIC {
            return ReadResponse::ok(self.device_id_bytes());
        }
        ReadResponse::not_supported()
    }

    fn on_connected(&self, peer: &PeerId) {
        match self.registry.start(peer) {
            Ok(StartOutcome::Started(id)) => debug!("[{peer}] detection session {id} spawned"),
            Ok(StartOutcome::AlreadyRunning(id)) => debug!("[{peer}] keeping session {id}"),
            Err(e) => error!("[{peer}] detection not started: {e}"),
        }
    }

    fn on_disconnected(&self, peer: &PeerId) {
        self.registry.cancel(peer);
    }
}
