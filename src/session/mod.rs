//! Per-peer detection sessions
//!
//! - `detection` - one capture/analyse/match run with pacing and countdown
//! - `registry` - peer to running-session bookkeeping, start/cancel/verdict
//! - `cancel` - cooperative cancellation token
//! - `replay` - unpaced pass over a finite recording

mod cancel;
mod detection;
mod registry;
mod replay;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use cancel::CancelToken;
pub use detection::{DetectionSession, SessionOutcome, SessionReport, SessionState};
pub use registry::{SessionRegistry, StartOutcome, VerdictSink};
pub use replay::{replay, ReplayReport};

/// Stable identifier of a connected remote device (its address)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(address: &str) -> Self {
        Self(address.to_string())
    }
}

impl From<String> for PeerId {
    fn from(address: String) -> Self {
        Self(address)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generation number of a session, unique within one registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
