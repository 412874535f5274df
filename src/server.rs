// src/server.rs
//
// Wires configuration, capture, sessions and services into one peripheral.

use std::sync::Arc;

use log::info;

use crate::config::DetectorConfig;
use crate::core::capture::CaptureDevice;
use crate::error::ConfigError;
use crate::gatt::{
    EventDispatcher, HrvService, IdentificationService, IntervalSensor, Peripheral,
    PeripheralVerdictSink,
};
use crate::session::SessionRegistry;

/// A fully wired proximity peripheral.
///
/// ```rust,ignore
/// let server = ProximityServer::new(config, device, peripheral, None)?;
/// server.dispatcher().on_connect(&PeerId::from("AA:BB:CC:DD:EE:FF"));
/// ```
pub struct ProximityServer {
    config: Arc<DetectorConfig>,
    registry: Arc<SessionRegistry>,
    dispatcher: EventDispatcher,
}

impl ProximityServer {
    /// Validates `config`, then registers the identification service and,
    /// when a sensor is given, the HRV relay.
    pub fn new(
        config: DetectorConfig,
        device: Arc<dyn CaptureDevice>,
        peripheral: Arc<dyn Peripheral>,
        sensor: Option<Arc<dyn IntervalSensor>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let config = Arc::new(config);

        let sink = Arc::new(PeripheralVerdictSink::new(Arc::clone(&peripheral)));
        let registry = Arc::new(SessionRegistry::new(Arc::clone(&config), device, sink));

        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(IdentificationService::new(
            config.device_id,
            Arc::clone(&registry),
        ));
        if let Some(sensor) = sensor {
            dispatcher.register(HrvService::new(sensor, peripheral));
        }

        info!(
            "Proximity server ready: {} Hz target, {} service(s)",
            config.target_frequency_hz,
            dispatcher.service_uuids().len()
        );

        Ok(Self {
            config,
            registry,
            dispatcher,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn device_id(&self) -> Option<i32> {
        self.dispatcher.identification().map(|s| s.device_id())
    }

    pub fn set_device_id(&self, device_id: i32) {
        if let Some(identification) = self.dispatcher.identification() {
            identification.set_device_id(device_id);
        }
    }

    /// Cancel all sessions and wait for their capture streams to close
    pub fn shutdown(&self) {
        info!("Shutting down proximity server");
        self.registry.shutdown();
    }
}
