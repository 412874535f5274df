// src/gatt/peripheral.rs
//
// Outbound boundary towards the wireless peripheral stack.

use uuid::Uuid;

use crate::session::PeerId;

/// Who receives a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyTarget {
    Peer(PeerId),
    /// Every peer subscribed to the characteristic
    Subscribers,
}

/// The parts of the peripheral stack the services talk to.
pub trait Peripheral: Send + Sync {
    fn notify(&self, target: &NotifyTarget, characteristic: Uuid, payload: &[u8]);

    fn connected_peers(&self) -> Vec<PeerId>;

    fn subscribers(&self, characteristic: Uuid) -> Vec<PeerId>;
}
