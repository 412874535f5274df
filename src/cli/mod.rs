// src/cli/mod.rs
//
// Command-line interface module

mod args;
mod commands;
mod output;

pub use args::{Cli, Command, SimulateArgs};
pub use commands::{
    analyze, collect_wav_files, connect_script, load_script, simulate, FileAnalysis, ScriptStep,
    SimulationSummary,
};
pub use output::{
    format_analysis, format_analysis_summary, format_config, format_session_report,
    format_simulation, print_json,
};

use anyhow::{bail, Result};
use colorful::Colorful;

/// Run the parsed command. Logging must already be initialised.
pub fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Analyze { inputs, json } => {
            let config = cli.resolve_config()?;
            let files = collect_wav_files(inputs);
            if files.is_empty() {
                println!("{}", "No WAV files found!".red());
                return Ok(());
            }

            let results = analyze(&files, &config, !json);
            if *json {
                print_json(&results)?;
            } else {
                for result in &results {
                    print!("{}", format_analysis(result, cli.verbose > 0));
                }
                if results.len() > 1 {
                    print!("{}", format_analysis_summary(&results));
                }
            }
            Ok(())
        }

        Command::Simulate(args) => {
            let config = cli.simulate_config(args)?;
            let script = match &args.events {
                Some(path) => load_script(path)?,
                None => connect_script(args.peers),
            };
            if script.is_empty() {
                bail!("Nothing to simulate: no peers and no events");
            }

            let summary = simulate(config, args.transmitter_on(), &script, args.timeout())?;
            if args.json {
                print_json(&summary)
            } else {
                print!("{}", format_simulation(&summary));
                Ok(())
            }
        }

        #[cfg(feature = "cpal")]
        Command::Listen { json } => {
            let report = commands::listen(cli.resolve_config()?)?;
            if *json {
                print_json(&report)
            } else {
                print!("{}", format_session_report(&report));
                Ok(())
            }
        }

        Command::Config { json } => {
            let config = cli.resolve_config()?;
            if *json {
                print_json(&config)
            } else {
                print!("{}", format_config(&config));
                Ok(())
            }
        }
    }
}
