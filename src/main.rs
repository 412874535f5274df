// src/main.rs
use anyhow::Result;
use clap::Parser;

use ultraprox::cli::{self, Cli};

fn main() -> Result<()> {
    let args = Cli::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level())
        .parse_default_env()
        .format_timestamp_millis()
        .init();

    cli::run(&args)
}
