// src/gatt/dispatcher.rs
//
// Routes peripheral-stack events to the logical service owning the attribute.
// Connection events go to every service.

use std::collections::HashMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::identification::IdentificationService;
use super::service::{GattService, LogicalService};
use super::types::{CharacteristicRef, DescriptorRef, GattStatus, ReadResponse};
use crate::error::DispatchError;
use crate::session::PeerId;

/// A peripheral-stack event, in the shape used by replayable event scripts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PeripheralEvent {
    Connected {
        peer: PeerId,
    },
    Disconnected {
        peer: PeerId,
    },
    CharacteristicRead {
        peer: PeerId,
        characteristic: CharacteristicRef,
    },
    CharacteristicWrite {
        peer: PeerId,
        characteristic: CharacteristicRef,
        value: Vec<u8>,
    },
    CharacteristicWriteCompleted {
        peer: PeerId,
        characteristic: CharacteristicRef,
        value: Vec<u8>,
    },
    DescriptorRead {
        peer: PeerId,
        descriptor: DescriptorRef,
    },
    DescriptorWrite {
        peer: PeerId,
        descriptor: DescriptorRef,
        value: Vec<u8>,
    },
    NotifyingEnabled {
        peer: PeerId,
        characteristic: CharacteristicRef,
    },
    NotifyingDisabled {
        peer: PeerId,
        characteristic: CharacteristicRef,
    },
    NotificationSent {
        peer: PeerId,
        characteristic: CharacteristicRef,
        value: Vec<u8>,
        status: GattStatus,
    },
}

impl PeripheralEvent {
    pub fn peer(&self) -> &PeerId {
        match self {
            PeripheralEvent::Connected { peer }
            | PeripheralEvent::Disconnected { peer }
            | PeripheralEvent::CharacteristicRead { peer, .. }
            | PeripheralEvent::CharacteristicWrite { peer, .. }
            | PeripheralEvent::CharacteristicWriteCompleted { peer, .. }
            | PeripheralEvent::DescriptorRead { peer, .. }
            | PeripheralEvent::DescriptorWrite { peer, .. }
            | PeripheralEvent::NotifyingEnabled { peer, .. }
            | PeripheralEvent::NotifyingDisabled { peer, .. }
            | PeripheralEvent::NotificationSent { peer, .. } => peer,
        }
    }
}

/// What a dispatched event produced for the remote side
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchResponse {
    Read(ReadResponse),
    Status { status: GattStatus },
    /// Event with no reply
    Handled,
}

#[derive(Default)]
pub struct EventDispatcher {
    services: HashMap<Uuid, LogicalService>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service under its own UUID, returning any service it
    /// replaced.
    pub fn register(&mut self, service: impl Into<LogicalService>) -> Option<LogicalService> {
        let service = service.into();
        info!("Registered {} ({})", service.name(), service.uuid());
        self.services.insert(service.uuid(), service)
    }

    pub fn service(&self, uuid: &Uuid) -> Option<&LogicalService> {
        self.services.get(uuid)
    }

    pub fn service_uuids(&self) -> Vec<Uuid> {
        let mut uuids: Vec<Uuid> = self.services.keys().copied().collect();
        uuids.sort();
        uuids
    }

    pub fn identification(&self) -> Option<&IdentificationService> {
        self.services.values().find_map(|service| match service {
            LogicalService::Identification(identification) => Some(identification),
            _ => None,
        })
    }

    fn owner(&self, characteristic: &CharacteristicRef) -> Option<&dyn GattService> {
        let found = characteristic
            .service
            .and_then(|uuid| self.services.get(&uuid))
            .map(LogicalService::handler);
        if found.is_none() {
            warn!(
                "No service for characteristic {} (service {:?})",
                characteristic.uuid, characteristic.service
            );
        }
        found
    }

    fn descriptor_owner(
        &self,
        descriptor: &DescriptorRef,
    ) -> Result<Option<&dyn GattService>, DispatchError> {
        let characteristic =
            descriptor
                .characteristic
                .as_ref()
                .ok_or(DispatchError::MalformedTopology {
                    descriptor: descriptor.uuid,
                    missing: "characteristic",
                })?;
        let service = characteristic
            .service
            .ok_or(DispatchError::MalformedTopology {
                descriptor: descriptor.uuid,
                missing: "service",
            })?;
        Ok(self.services.get(&service).map(LogicalService::handler))
    }

    pub fn on_characteristic_read(
        &self,
        peer: &PeerId,
        characteristic: &CharacteristicRef,
    ) -> ReadResponse {
        match self.owner(characteristic) {
            Some(service) => service.on_characteristic_read(peer, characteristic),
            None => ReadResponse::not_supported(),
        }
    }

    pub fn on_characteristic_write(
        &self,
        peer: &PeerId,
        characteristic: &CharacteristicRef,
        value: &[u8],
    ) -> GattStatus {
        match self.owner(characteristic) {
            Some(service) => service.on_characteristic_write(peer, characteristic, value),
            None => GattStatus::RequestNotSupported,
        }
    }

    pub fn on_characteristic_write_completed(
        &self,
        peer: &PeerId,
        characteristic: &CharacteristicRef,
        value: &[u8],
    ) {
        if let Some(service) = self.owner(characteristic) {
            service.on_characteristic_write_completed(peer, characteristic, value);
        }
    }

    pub fn on_descriptor_read(
        &self,
        peer: &PeerId,
        descriptor: &DescriptorRef,
    ) -> Result<ReadResponse, DispatchError> {
        Ok(match self.descriptor_owner(descriptor)? {
            Some(service) => service.on_descriptor_read(peer, descriptor),
            None => ReadResponse::not_supported(),
        })
    }

    pub fn on_descriptor_write(
        &self,
        peer: &PeerId,
        descriptor: &DescriptorRef,
        value: &[u8],
    ) -> Result<GattStatus, DispatchError> {
        Ok(match self.descriptor_owner(descriptor)? {
            Some(service) => service.on_descriptor_write(peer, descriptor, value),
            None => GattStatus::RequestNotSupported,
        })
    }

    pub fn on_subscribe(&self, peer: &PeerId, characteristic: &CharacteristicRef) {
        if let Some(service) = self.owner(characteristic) {
            service.on_notifying_enabled(peer, characteristic);
        }
    }

    pub fn on_unsubscribe(&self, peer: &PeerId, characteristic: &CharacteristicRef) {
        if let Some(service) = self.owner(characteristic) {
            service.on_notifying_disabled(peer, characteristic);
        }
    }

    pub fn on_notification_sent(
        &self,
        peer: &PeerId,
        value: &[u8],
        characteristic: &CharacteristicRef,
        status: GattStatus,
    ) {
        if let Some(service) = self.owner(characteristic) {
            service.on_notification_sent(peer, value, characteristic, status);
        }
    }

    pub fn on_connect(&self, peer: &PeerId) {
        info!("[{peer}] connected");
        for service in self.services.values() {
            service.handler().on_connected(peer);
        }
    }

    pub fn on_disconnect(&self, peer: &PeerId) {
        info!("[{peer}] disconnected");
        for service in self.services.values() {
            service.handler().on_disconnected(peer);
        }
    }

    /// Route one event and return what the remote side should get back.
    pub fn dispatch(&self, event: &PeripheralEvent) -> Result<DispatchResponse, DispatchError> {
        let response = match event {
            PeripheralEvent::Connected { peer } => {
                self.on_connect(peer);
                DispatchResponse::Handled
            }
            PeripheralEvent::Disconnected { peer } => {
                self.on_disconnect(peer);
                DispatchResponse::Handled
            }
            PeripheralEvent::CharacteristicRead { peer, characteristic } => {
                DispatchResponse::Read(self.on_characteristic_read(peer, characteristic))
            }
            PeripheralEvent::CharacteristicWrite {
                peer,
                characteristic,
                value,
            } => DispatchResponse::Status {
                status: self.on_characteristic_write(peer, characteristic, value),
            },
            PeripheralEvent::CharacteristicWriteCompleted {
                peer,
                characteristic,
                value,
            } => {
                self.on_characteristic_write_completed(peer, characteristic, value);
                DispatchResponse::Handled
            }
            PeripheralEvent::DescriptorRead { peer, descriptor } => {
                DispatchResponse::Read(self.on_descriptor_read(peer, descriptor)?)
            }
            PeripheralEvent::DescriptorWrite {
                peer,
                descriptor,
                value,
            } => DispatchResponse::Status {
                status: self.on_descriptor_write(peer, descriptor, value)?,
            },
            PeripheralEvent::NotifyingEnabled { peer, characteristic } => {
                self.on_subscribe(peer, characteristic);
                DispatchResponse::Handled
            }
            PeripheralEvent::NotifyingDisabled { peer, characteristic } => {
                self.on_unsubscribe(peer, characteristic);
                DispatchResponse::Handled
            }
            PeripheralEvent::NotificationSent {
                peer,
                characteristic,
                value,
                status,
            } => {
                self.on_notification_sent(peer, value, characteristic, *status);
                DispatchResponse::Handled
            }
        };
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatt::types::uuids;

    #[test]
    fn test_empty_dispatcher_rejects_everything() {
        let dispatcher = EventDispatcher::new();
        let peer = PeerId::from("peer");
        let characteristic =
            CharacteristicRef::new(uuids::IDENTIFICATION_SERVICE, uuids::DEVICE_ID_CHARACTERISTIC);

        assert_eq!(
            dispatcher.on_characteristic_read(&peer, &characteristic).status,
            GattStatus::RequestNotSupported
        );
        assert_eq!(
            dispatcher.on_characteristic_write(&peer, &characteristic, &[1]),
            GattStatus::RequestNotSupported
        );
    }

    #[test]
    fn test_orphan_descriptor_is_malformed() {
        let dispatcher = EventDispatcher::new();
        let peer = PeerId::from("peer");

        let orphan = DescriptorRef::orphan(uuids::CCC_DESCRIPTOR);
        assert!(matches!(
            dispatcher.on_descriptor_read(&peer, &orphan),
            Err(DispatchError::MalformedTopology {
                missing: "characteristic",
                ..
            })
        ));

        let detached = DescriptorRef::new(
            CharacteristicRef::orphan(uuids::PP_INTERVAL_CHARACTERISTIC),
            uuids::CCC_DESCRIPTOR,
        );
        assert!(matches!(
            dispatcher.on_descriptor_write(&peer, &detached, &[1, 0]),
            Err(DispatchError::MalformedTopology {
                missing: "service",
                ..
            })
        ));
    }

    #[test]
    fn test_event_script_parses() {
        let json = format!(
            r#"[
                {{"event": "connected", "peer": "AA:BB"}},
                {{"event": "characteristic_read", "peer": "AA:BB",
                  "characteristic": {{"uuid": "{}", "service": "{}"}}}},
                {{"event": "disconnected", "peer": "AA:BB"}}
            ]"#,
            uuids::DEVICE_ID_CHARACTERISTIC,
            uuids::IDENTIFICATION_SERVICE
        );
        let events: Vec<PeripheralEvent> = serde_json::from_str(&json).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].peer().as_str(), "AA:BB");
        assert!(matches!(events[2], PeripheralEvent::Disconnected { .. }));
    }
}
