//! CLI argument parsing with preset and config-file support

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{debug, LevelFilter};

use crate::config::{DetectorConfig, DetectorConfigBuilder, DetectorPreset};

#[derive(Parser, Debug)]
#[command(name = "ultraprox")]
#[command(version, about = "Detect the ultrasonic proximity pattern and serve verdicts to peers")]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Detector configuration file (JSON)
    #[arg(long, global = true, env = "ULTRAPROX_CONFIG", conflicts_with = "preset")]
    pub config: Option<PathBuf>,

    /// Built-in tuning preset (standard, wearable, model)
    #[arg(long, global = true)]
    pub preset: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run WAV recordings through the analyzer and pattern matcher
    Analyze {
        /// WAV files or directories containing them
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Drive the full peripheral against synthetic capture and peers
    Simulate(SimulateArgs),

    /// Run one detection session against the default microphone
    #[cfg(feature = "cpal")]
    Listen {
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Number of peers that connect at once
    #[arg(long, default_value_t = 1)]
    pub peers: usize,

    /// Capture hears only silence instead of the transmitter pattern
    #[arg(long)]
    pub silent: bool,

    /// Replay a JSON event script instead of connecting `--peers` peers
    #[arg(long)]
    pub events: Option<PathBuf>,

    /// Override the pacing interval in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Give up waiting for verdicts after this many seconds
    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,

    #[arg(long)]
    pub json: bool,
}

impl SimulateArgs {
    pub fn transmitter_on(&self) -> bool {
        !self.silent
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    /// Resolve the configuration: an explicit file, else a preset, else the
    /// default config file when present, else built-in defaults.
    pub fn resolve_config(&self) -> Result<DetectorConfig> {
        let config = if let Some(path) = &self.config {
            DetectorConfig::from_json_file(path)
                .with_context(|| format!("Loading config {}", path.display()))?
        } else if let Some(name) = &self.preset {
            let Some(preset) = DetectorPreset::from_name(name) else {
                let known: Vec<&str> = DetectorPreset::all().iter().map(|p| p.name()).collect();
                bail!("Unknown preset '{}'. Available: {}", name, known.join(", "));
            };
            DetectorConfig::from_preset(preset)
        } else {
            match DetectorConfig::default_path().filter(|path| path.is_file()) {
                Some(path) => {
                    debug!("Using config {}", path.display());
                    DetectorConfig::from_json_file(&path)
                        .with_context(|| format!("Loading config {}", path.display()))?
                }
                None => DetectorConfig::default(),
            }
        };

        config.validate().context("Invalid detector configuration")?;
        Ok(config)
    }

    /// Configuration for `simulate`, with its pacing override applied
    pub fn simulate_config(&self, args: &SimulateArgs) -> Result<DetectorConfig> {
        let config = self.resolve_config()?;
        Ok(match args.interval_ms {
            Some(ms) => DetectorConfigBuilder::from_config(config)
                .iteration_interval(Duration::from_millis(ms))
                .build(),
            None => config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simulate() {
        let cli = Cli::try_parse_from([
            "ultraprox",
            "-vv",
            "simulate",
            "--peers",
            "3",
            "--silent",
            "--interval-ms",
            "0",
        ])
        .unwrap();

        assert_eq!(cli.log_level(), LevelFilter::Trace);
        match cli.command {
            Command::Simulate(args) => {
                assert_eq!(args.peers, 3);
                assert!(!args.transmitter_on());
                assert_eq!(args.interval_ms, Some(0));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_transmitter_on_unless_silent() {
        let cli = Cli::try_parse_from(["ultraprox", "simulate"]).unwrap();
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert!(args.transmitter_on());

        // the old explicit switch is gone
        assert!(Cli::try_parse_from(["ultraprox", "simulate", "--detect"]).is_err());
    }

    #[test]
    fn test_preset_resolves() {
        let cli = Cli::try_parse_from(["ultraprox", "--preset", "model", "config"]).unwrap();
        let config = cli.resolve_config().unwrap();
        assert_eq!(config, DetectorConfig::from_preset(DetectorPreset::Model));
    }

    #[test]
    fn test_unknown_preset_is_rejected() {
        let cli = Cli::try_parse_from(["ultraprox", "--preset", "loud", "config"]).unwrap();
        assert!(cli.resolve_config().is_err());
    }
}
