//! ultraprox - Ultrasonic proximity pattern detection
//!
//! Listens for a short on/off ultrasonic pattern emitted by a paired
//! transmitter and reports to connected peers whether it was heard.
//!
//! ## Features
//!
//! - **Band energy**: real FFT of each captured frame, reduced to the
//!   strongest response in a narrow band around the carrier
//! - **Pattern matching**: rolling history of band energies matched against
//!   the `{3,1,3}` on/off/on run-lengths, strict or tolerant
//! - **Per-peer sessions**: one worker per connected peer, paced, bounded by a
//!   countdown and cancelled on disconnect
//! - **Event dispatch**: peripheral events routed to logical services,
//!   verdicts sent back as one-byte notifications
//! - **Flexible CLI**: offline WAV analysis, full simulations and live capture
//!
//! ## Module Structure
//!
//! - `core` - Capture boundary, spectral analysis and pattern matching
//! - `session` - Detection sessions and the per-peer registry
//! - `gatt` - Services, dispatcher and the peripheral boundary
//! - `server` - Wiring of all of the above
//! - `config` - Detector presets and configuration
//! - `testgen` - Synthetic signals and in-memory fakes
//! - `cli` - Command-line interface
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ultraprox::config::{DetectorConfig, DetectorPreset};
//! use ultraprox::server::ProximityServer;
//!
//! let config = DetectorConfig::from_preset(DetectorPreset::Standard);
//! let server = ProximityServer::new(config, device, peripheral, None)?;
//!
//! // The peripheral stack reports a connection; a session starts listening
//! server.dispatcher().on_connect(&PeerId::from("AA:BB:CC:DD:EE:FF"));
//! ```
//!
//! ## Detection Presets
//!
//! | Preset   | Use Case                  | Key Adjustments                       |
//! |----------|---------------------------|---------------------------------------|
//! | Standard | Phones                    | 50 Hz band, tolerant, direct magnitude |
//! | Wearable | Watches, noisy mounts     | Strict matching                       |
//! | Model    | Legacy tuning             | 100 Hz band, band-pass envelope       |

// Capture, spectral analysis and pattern matching
pub mod core;

// Command-line interface
pub mod cli;

// Configuration and presets
pub mod config;

pub mod error;

pub mod gatt;

pub mod server;

// Per-peer detection sessions
pub mod session;

// Synthetic signals and fakes
pub mod testgen;

// Re-export commonly used types at crate root for convenience
pub use config::{DetectorConfig, DetectorConfigBuilder, DetectorPreset, MismatchPolicy};
pub use core::{AudioFrame, CaptureDevice, PatternHistory, SpectralFrameAnalyzer};
pub use error::{AnalysisError, CaptureError, ConfigError, DispatchError, SessionError};
pub use gatt::{EventDispatcher, Peripheral, PeripheralEvent};
pub use server::ProximityServer;
pub use session::{PeerId, SessionOutcome, SessionRegistry, SessionReport};
