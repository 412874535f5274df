// src/gatt/service.rs
//
// Handler interface shared by the logical services. Every handler has a
// default body, so a service only implements the requests it answers.

use uuid::Uuid;

use super::hrv::HrvService;
use super::identification::IdentificationService;
use super::types::{CharacteristicRef, DescriptorRef, GattStatus, ReadResponse};
use crate::session::PeerId;

pub trait GattService: Send + Sync {
    fn uuid(&self) -> Uuid;

    fn name(&self) -> &'static str;

    fn on_characteristic_read(
        &self,
        _peer: &PeerId,
        _characteristic: &CharacteristicRef,
    ) -> ReadResponse {
        ReadResponse::not_supported()
    }

    fn on_characteristic_write(
        &self,
        _peer: &PeerId,
        _characteristic: &CharacteristicRef,
        _value: &[u8],
    ) -> GattStatus {
        GattStatus::WriteNotPermitted
    }

    fn on_characteristic_write_completed(
        &self,
        _peer: &PeerId,
        _characteristic: &CharacteristicRef,
        _value: &[u8],
    ) {
    }

    fn on_descriptor_read(&self, _peer: &PeerId, _descriptor: &DescriptorRef) -> ReadResponse {
        ReadResponse::not_supported()
    }

    fn on_descriptor_write(
        &self,
        _peer: &PeerId,
        _descriptor: &DescriptorRef,
        _value: &[u8],
    ) -> GattStatus {
        GattStatus::WriteNotPermitted
    }

    fn on_notifying_enabled(&self, _peer: &PeerId, _characteristic: &CharacteristicRef) {}

    fn on_notifying_disabled(&self, _peer: &PeerId, _characteristic: &CharacteristicRef) {}

    fn on_notification_sent(
        &self,
        _peer: &PeerId,
        _value: &[u8],
        _characteristic: &CharacteristicRef,
        _status: GattStatus,
    ) {
    }

    fn on_connected(&self, _peer: &PeerId) {}

    fn on_disconnected(&self, _peer: &PeerId) {}
}

/// The closed set of services this peripheral exposes
pub enum LogicalService {
    Identification(IdentificationService),
    Hrv(HrvService),
}

impl LogicalService {
    pub fn handler(&self) -> &dyn GattService {
        match self {
            LogicalService::Identification(service) => service,
            LogicalService::Hrv(service) => service,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.handler().uuid()
    }

    pub fn name(&self) -> &'static str {
        self.handler().name()
    }
}

impl From<IdentificationService> for LogicalService {
    fn from(service: IdentificationService) -> Self {
        LogicalService::Identification(service)
    }
}

impl From<HrvService> for LogicalService {
    fn from(service: HrvService) -> Self {
        LogicalService::Hrv(service)
    }
}
