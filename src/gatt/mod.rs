//! Attribute-protocol boundary
//!
//! The wireless stack itself lives outside this crate. It reports events to
//! [`EventDispatcher`], which routes them to the [`LogicalService`] owning the
//! attribute, and services talk back through the [`Peripheral`] trait.

pub mod dispatcher;
pub mod hrv;
pub mod identification;
pub mod peripheral;
pub mod service;
pub mod types;

pub use dispatcher::{DispatchResponse, EventDispatcher, PeripheralEvent};
pub use hrv::{HrvService, IntervalSample, IntervalSensor, SampleCallback};
pub use identification::{verdict_payload, IdentificationService, PeripheralVerdictSink};
pub use peripheral::{NotifyTarget, Peripheral};
pub use service::{GattService, LogicalService};
pub use types::{uuids, CharacteristicRef, DescriptorRef, GattStatus, ReadResponse};
