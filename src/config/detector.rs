// src/config/detector.rs
//
// Static detector configuration: presets for the legacy tuning passes, a
// builder for overrides, JSON loading and startup validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How byte pairs of a captured frame become samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PcmDecoding {
    /// Little-endian with the high byte carrying the sign.
    #[default]
    Signed,
    /// Little-endian widened without sign extension.
    Unsigned,
}

/// How the kept spectrum bins collapse into one band energy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandEnergyMethod {
    /// Largest bin magnitude inside the target band.
    #[default]
    DirectMagnitude,
    /// Zero everything outside the band, inverse-transform and take the
    /// largest paired time-domain magnitude.
    BandPassEnvelope,
}

/// How many pattern mismatches a window may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchPolicy {
    /// The first mismatch rejects the window.
    Strict,
    /// One isolated mismatch is forgiven; a matching position resets the budget.
    #[default]
    Tolerant,
}

/// Named starting points for a configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorPreset {
    /// Tolerant matching, direct magnitudes, high peak floor
    Standard,
    /// Wearable tuning: 50 Hz tolerance, floor 5000, strict, 3 matches
    Wearable,
    /// Model tuning: 100 Hz tolerance, floor 100, tolerant, 5 matches, envelope
    Model,
}

impl DetectorPreset {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "standard" | "default" => Some(Self::Standard),
            "wearable" | "watch" => Some(Self::Wearable),
            "model" | "phone" => Some(Self::Model),
            _ => None,
        }
    }

    pub fn all() -> Vec<Self> {
        vec![Self::Standard, Self::Wearable, Self::Model]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Wearable => "wearable",
            Self::Model => "model",
        }
    }
}

/// Complete detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Carrier frequency of the transmitter (Hz)
    pub target_frequency_hz: f64,
    /// Half-width of the kept band around the carrier (Hz)
    pub tolerance_hz: f64,
    pub sample_rate: u32,
    /// Samples per captured frame (mono, 16-bit)
    pub frame_samples: usize,
    /// Minimum wall-clock duration of one capture iteration
    pub iteration_interval_ms: u64,
    /// Countdown budget; the loop runs while the countdown is >= 0
    pub countdown: u32,
    /// Pattern matches needed to end a session successfully
    pub success_threshold: u32,
    /// Rolling history size, must equal the sum of `pattern`
    pub history_capacity: usize,
    /// Alternating run-lengths, the first run being "on"
    pub pattern: Vec<usize>,
    /// Lower bound for the peak threshold
    pub peak_floor: f64,
    pub mismatch_policy: MismatchPolicy,
    pub band_method: BandEnergyMethod,
    pub pcm_decoding: PcmDecoding,
    /// Value exposed through the device-id characteristic
    pub device_id: i32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::from_preset(DetectorPreset::Standard)
    }
}

impl DetectorConfig {
    /// Create configuration from preset
    pub fn from_preset(preset: DetectorPreset) -> Self {
        match preset {
            DetectorPreset::Standard => Self::standard(),
            DetectorPreset::Wearable => Self::wearable(),
            DetectorPreset::Model => Self::model(),
        }
    }

    fn standard() -> Self {
        Self {
            target_frequency_hz: 20_000.0,
            tolerance_hz: 50.0,
            sample_rate: 44_100,
            frame_samples: 1792,
            iteration_interval_ms: 450,
            countdown: 30,
            success_threshold: 3,
            history_capacity: 7,
            pattern: vec![3, 1, 3],
            peak_floor: 5000.0,
            mismatch_policy: MismatchPolicy::Tolerant,
            band_method: BandEnergyMethod::DirectMagnitude,
            pcm_decoding: PcmDecoding::Signed,
            device_id: -1,
        }
    }

    fn wearable() -> Self {
        Self {
            mismatch_policy: MismatchPolicy::Strict,
            ..Self::standard()
        }
    }

    fn model() -> Self {
        Self {
            tolerance_hz: 100.0,
            success_threshold: 5,
            peak_floor: 100.0,
            mismatch_policy: MismatchPolicy::Tolerant,
            band_method: BandEnergyMethod::BandPassEnvelope,
            ..Self::standard()
        }
    }

    /// Default location of the JSON config file, if the platform has one
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ultraprox").join("detector.json"))
    }

    /// Load a JSON config file. Missing fields fall back to the defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn iteration_interval(&self) -> Duration {
        Duration::from_millis(self.iteration_interval_ms)
    }

    /// Byte length of one captured frame
    pub fn frame_bytes(&self) -> usize {
        self.frame_samples * 2
    }

    /// Frequency resolution of one spectrum bin
    pub fn bin_width_hz(&self) -> f64 {
        self.sample_rate as f64 / self.frame_samples as f64
    }

    pub fn band_low_hz(&self) -> f64 {
        self.target_frequency_hz - self.tolerance_hz
    }

    pub fn band_high_hz(&self) -> f64 {
        self.target_frequency_hz + self.tolerance_hz
    }

    /// Indices of the spectrum bins whose centre lies inside the target band
    pub fn band_bins(&self) -> std::ops::RangeInclusive<usize> {
        let width = self.bin_width_hz();
        let half = self.frame_samples / 2;
        let low = (self.band_low_hz() / width).ceil().max(0.0) as usize;
        let mut high = (self.band_high_hz() / width).floor().max(0.0) as usize;
        if half > 0 && high >= half {
            high = half - 1;
        }
        low..=high
    }

    /// Reject configurations that would only fail mid-session
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(invalid("sample_rate", "must be positive"));
        }
        if self.frame_samples < 2 || self.frame_samples % 2 != 0 {
            return Err(invalid("frame_samples", "must be an even number of at least 2"));
        }
        if !self.target_frequency_hz.is_finite() || self.target_frequency_hz <= 0.0 {
            return Err(invalid("target_frequency_hz", "must be a positive frequency"));
        }
        if !self.tolerance_hz.is_finite() || self.tolerance_hz < 0.0 {
            return Err(invalid("tolerance_hz", "must be a non-negative frequency"));
        }
        if !self.peak_floor.is_finite() || self.peak_floor < 0.0 {
            return Err(invalid("peak_floor", "must be a non-negative number"));
        }
        if self.success_threshold == 0 {
            return Err(invalid("success_threshold", "must be at least 1"));
        }
        if self.pattern.is_empty() || self.pattern.iter().any(|&run| run == 0) {
            return Err(invalid("pattern", "needs at least one run and no empty runs"));
        }

        let pattern_len: usize = self.pattern.iter().sum();
        if self.history_capacity != pattern_len {
            return Err(ConfigError::PatternCapacity {
                capacity: self.history_capacity,
                pattern_len,
            });
        }

        let bin_width_hz = self.bin_width_hz();
        if self.tolerance_hz < bin_width_hz {
            return Err(ConfigError::ToleranceBelowBinWidth {
                tolerance_hz: self.tolerance_hz,
                bin_width_hz,
            });
        }

        let nyquist_hz = self.sample_rate as f64 / 2.0;
        if self.band_high_hz() >= nyquist_hz || self.band_low_hz() <= 0.0 {
            return Err(ConfigError::BandAboveNyquist {
                low_hz: self.band_low_hz(),
                high_hz: self.band_high_hz(),
                nyquist_hz,
            });
        }

        if self.band_bins().is_empty() {
            return Err(ConfigError::EmptyBand {
                low_hz: self.band_low_hz(),
                high_hz: self.band_high_hz(),
            });
        }

        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

/// Builder for configurations that start from a preset
pub struct DetectorConfigBuilder {
    config: DetectorConfig,
}

impl DetectorConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: DetectorConfig::default(),
        }
    }

    pub fn from_preset(preset: DetectorPreset) -> Self {
        Self {
            config: DetectorConfig::from_preset(preset),
        }
    }

    pub fn from_config(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn target_frequency(mut self, hz: f64) -> Self {
        self.config.target_frequency_hz = hz;
        self
    }

    pub fn tolerance(mut self, hz: f64) -> Self {
        self.config.tolerance_hz = hz;
        self
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.config.sample_rate = rate;
        self
    }

    pub fn frame_samples(mut self, samples: usize) -> Self {
        self.config.frame_samples = samples;
        self
    }

    pub fn iteration_interval(mut self, interval: Duration) -> Self {
        self.config.iteration_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn countdown(mut self, countdown: u32) -> Self {
        self.config.countdown = countdown;
        self
    }

    pub fn success_threshold(mut self, matches: u32) -> Self {
        self.config.success_threshold = matches;
        self
    }

    /// Replace the pattern; the history capacity follows it
    pub fn pattern(mut self, runs: Vec<usize>) -> Self {
        self.config.history_capacity = runs.iter().sum();
        self.config.pattern = runs;
        self
    }

    pub fn peak_floor(mut self, floor: f64) -> Self {
        self.config.peak_floor = floor;
        self
    }

    pub fn mismatch_policy(mut self, policy: MismatchPolicy) -> Self {
        self.config.mismatch_policy = policy;
        self
    }

    pub fn band_method(mut self, method: BandEnergyMethod) -> Self {
        self.config.band_method = method;
        self
    }

    pub fn pcm_decoding(mut self, decoding: PcmDecoding) -> Self {
        self.config.pcm_decoding = decoding;
        self
    }

    pub fn device_id(mut self, id: i32) -> Self {
        self.config.device_id = id;
        self
    }

    pub fn build(self) -> DetectorConfig {
        self.config
    }
}

impl Default for DetectorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
