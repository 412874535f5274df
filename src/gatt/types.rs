// src/gatt/types.rs
//
// Attribute references and response types exchanged with the peripheral stack.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known attribute identifiers
pub mod uuids {
    use uuid::Uuid;

    pub const IDENTIFICATION_SERVICE: Uuid =
        Uuid::from_u128(0x7b3e_1000_6f2a_4c5d_9a1e_2f8b_0c4d_5e61);
    pub const DEVICE_ID_CHARACTERISTIC: Uuid =
        Uuid::from_u128(0x7b3e_1001_6f2a_4c5d_9a1e_2f8b_0c4d_5e61);
    pub const ULTRASONIC_DETECTED_CHARACTERISTIC: Uuid =
        Uuid::from_u128(0x7b3e_1002_6f2a_4c5d_9a1e_2f8b_0c4d_5e61);

    pub const HRV_SERVICE: Uuid = Uuid::from_u128(0x7b3e_2000_6f2a_4c5d_9a1e_2f8b_0c4d_5e61);
    pub const PP_INTERVAL_CHARACTERISTIC: Uuid =
        Uuid::from_u128(0x7b3e_2001_6f2a_4c5d_9a1e_2f8b_0c4d_5e61);

    /// Client Characteristic Configuration (0x2902)
    pub const CCC_DESCRIPTOR: Uuid = Uuid::from_u128(0x0000_2902_0000_1000_8000_0080_5f9b_34fb);
    /// Characteristic User Description (0x2901)
    pub const CUD_DESCRIPTOR: Uuid = Uuid::from_u128(0x0000_2901_0000_1000_8000_0080_5f9b_34fb);
}

/// Status code returned to the remote side of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GattStatus {
    Success,
    RequestNotSupported,
    WriteNotPermitted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadResponse {
    pub status: GattStatus,
    pub value: Vec<u8>,
}

impl ReadResponse {
    pub fn ok(value: impl Into<Vec<u8>>) -> Self {
        Self {
            status: GattStatus::Success,
            value: value.into(),
        }
    }

    pub fn not_supported() -> Self {
        Self {
            status: GattStatus::RequestNotSupported,
            value: Vec::new(),
        }
    }
}

/// A characteristic as reported by the stack. `service` is `None` when the
/// stack could not resolve the owning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacteristicRef {
    pub uuid: Uuid,
    #[serde(default)]
    pub service: Option<Uuid>,
}

impl CharacteristicRef {
    pub fn new(service: Uuid, uuid: Uuid) -> Self {
        Self {
            uuid,
            service: Some(service),
        }
    }

    pub fn orphan(uuid: Uuid) -> Self {
        Self { uuid, service: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorRef {
    pub uuid: Uuid,
    #[serde(default)]
    pub characteristic: Option<CharacteristicRef>,
}

impl DescriptorRef {
    pub fn new(characteristic: CharacteristicRef, uuid: Uuid) -> Self {
        Self {
            uuid,
            characteristic: Some(characteristic),
        }
    }

    pub fn orphan(uuid: Uuid) -> Self {
        Self {
            uuid,
            characteristic: None,
        }
    }
}
