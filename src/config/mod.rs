//! Configuration module for ultraprox

mod detector;

pub use detector::{
    BandEnergyMethod, DetectorConfig, DetectorConfigBuilder, DetectorPreset, MismatchPolicy,
    PcmDecoding,
};
