//! Output formatting for CLI results

use anyhow::Result;
use colorful::Colorful;
use serde::Serialize;

use super::commands::{FileAnalysis, SimulationSummary};
use crate::config::DetectorConfig;
use crate::session::{SessionOutcome, SessionReport};

/// Print any result as pretty JSON on stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Format one analysed recording for terminal output
pub fn format_analysis(analysis: &FileAnalysis, verbose: bool) -> String {
    let mut output = format!("{}\n", analysis.path.display().to_string().cyan());

    let report = match (&analysis.report, &analysis.error) {
        (Some(report), _) => report,
        (None, Some(error)) => {
            output.push_str(&format!("  {}\n", format!("✗ {error}").red()));
            return output;
        }
        (None, None) => return output,
    };

    let status = match report.detected_at {
        Some(frame) if report.within_countdown => {
            format!("✓ DETECTED at frame {frame}").green().to_string()
        }
        Some(frame) => format!("✓ DETECTED at frame {frame} (after countdown)")
            .yellow()
            .to_string(),
        None => "✗ NOT DETECTED".red().to_string(),
    };
    output.push_str(&format!("  Status: {status}\n"));
    output.push_str(&format!(
        "  Frames: {}  Matches: {} (threshold {})\n",
        report.frames,
        report.matches(),
        report.success_threshold
    ));

    if !report.match_frames.is_empty() {
        let frames: Vec<String> = report.match_frames.iter().map(|f| f.to_string()).collect();
        output.push_str(&format!("  Match windows end at: {}\n", frames.join(", ")));
    }

    if verbose {
        output.push_str("\n  Band energy per frame:\n");
        for (index, energy) in report.energies.iter().enumerate() {
            output.push_str(&format!("    {index:>5}  {energy:>14.1}\n"));
        }
    }

    output
}

/// Format a summary for multiple recordings
pub fn format_analysis_summary(results: &[FileAnalysis]) -> String {
    let detected = results
        .iter()
        .filter(|r| r.report.as_ref().map_or(false, |report| report.detected()))
        .count();
    let failed = results.iter().filter(|r| r.error.is_some()).count();
    let missed = results.len() - detected - failed;

    let mut output = format!("\n{}\n", "Summary:".bold());
    output.push_str(&format!("  {} file(s) analyzed\n", results.len()));
    if detected > 0 {
        output.push_str(&format!("  {}\n", format!("✓ {detected} detected").green()));
    }
    if missed > 0 {
        output.push_str(&format!("  {}\n", format!("✗ {missed} not detected").red()));
    }
    if failed > 0 {
        output.push_str(&format!("  {}\n", format!("! {failed} unreadable").yellow()));
    }
    output
}

/// Format one finished session
pub fn format_session_report(report: &SessionReport) -> String {
    let line = format!("{} {}", report.peer, report.session_id);
    let outcome = match report.outcome {
        SessionOutcome::Succeeded => format!("✓ {}", report.outcome.description()).green(),
        SessionOutcome::Exhausted => format!("✗ {}", report.outcome.description()).red(),
        SessionOutcome::Cancelled => format!("- {}", report.outcome.description()).yellow(),
        SessionOutcome::DeviceUnavailable => format!("! {}", report.outcome.description()).red(),
    };
    format!(
        "{}  {}\n  {} match(es) in {} frame(s), {} ms, started {}\n",
        line.cyan(),
        outcome,
        report.matches,
        report.iterations,
        report.elapsed_ms,
        report.started_at.format("%H:%M:%S%.3f")
    )
}

pub fn format_simulation(summary: &SimulationSummary) -> String {
    let mut output = format!(
        "{} (transmitter {})\n\n",
        "Simulation".bold(),
        if summary.transmitter_on { "on" } else { "off" }
    );

    for step in &summary.steps {
        let detail = match (&step.response, &step.error) {
            (_, Some(error)) => format!("error: {error}").red().to_string(),
            (Some(response), None) => format!("{response:?}"),
            (None, None) => String::new(),
        };
        output.push_str(&format!(
            "  {:<32} {:<24} {}\n",
            step.event,
            step.peer.to_string(),
            detail
        ));
    }
    if !summary.steps.is_empty() {
        output.push('\n');
    }

    for report in &summary.reports {
        output.push_str(&format_session_report(report));
    }

    let verdicts: Vec<String> = summary.verdicts.iter().map(|v| v.to_string()).collect();
    output.push_str(&format!("\nVerdict notifications: [{}]\n", verdicts.join(", ")));
    if summary.timed_out {
        output.push_str(&format!("{}\n", "Timed out waiting for sessions".yellow()));
    }
    output
}

pub fn format_config(config: &DetectorConfig) -> String {
    let pattern: Vec<String> = config.pattern.iter().map(|r| r.to_string()).collect();
    let mut output = format!("{}\n", "Detector configuration".bold());
    output.push_str(&format!(
        "  Target:        {} Hz +/- {} Hz (bins {:?}, {:.2} Hz wide)\n",
        config.target_frequency_hz,
        config.tolerance_hz,
        config.band_bins(),
        config.bin_width_hz()
    ));
    output.push_str(&format!(
        "  Capture:       {} Hz, {} samples/frame\n",
        config.sample_rate, config.frame_samples
    ));
    output.push_str(&format!(
        "  Pacing:        {} ms, countdown {}\n",
        config.iteration_interval_ms, config.countdown
    ));
    output.push_str(&format!(
        "  Pattern:       {{{}}} starting on, {} matches to succeed\n",
        pattern.join(","),
        config.success_threshold
    ));
    output.push_str(&format!(
        "  Peak floor:    {}  Policy: {:?}  Band method: {:?}  Decoding: {:?}\n",
        config.peak_floor, config.mismatch_policy, config.band_method, config.pcm_decoding
    ));
    output.push_str(&format!("  Device id:     {}\n", config.device_id));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{PeerId, ReplayReport, SessionId};
    use chrono::Utc;
    use std::path::PathBuf;

    fn replay_report(detected_at: Option<usize>) -> ReplayReport {
        ReplayReport {
            source: "test.wav".to_string(),
            frames: 42,
            energies: vec![0.0; 42],
            match_frames: vec![6, 13, 20],
            success_threshold: 3,
            detected_at,
            within_countdown: detected_at.is_some(),
        }
    }

    #[test]
    fn test_format_analysis() {
        let analysis = FileAnalysis {
            path: PathBuf::from("capture.wav"),
            report: Some(replay_report(Some(20))),
            error: None,
        };
        let output = format_analysis(&analysis, false);
        assert!(output.contains("capture.wav"));
        assert!(output.contains("DETECTED at frame 20"));
        assert!(output.contains("6, 13, 20"));
    }

    #[test]
    fn test_summary_counts() {
        let results = vec![
            FileAnalysis {
                path: PathBuf::from("a.wav"),
                report: Some(replay_report(Some(20))),
                error: None,
            },
            FileAnalysis {
                path: PathBuf::from("b.wav"),
                report: Some(replay_report(None)),
                error: None,
            },
            FileAnalysis {
                path: PathBuf::from("c.wav"),
                report: None,
                error: Some("unsupported".to_string()),
            },
        ];
        let output = format_analysis_summary(&results);
        assert!(output.contains("3 file(s) analyzed"));
        assert!(output.contains("1 detected"));
        assert!(output.contains("1 not detected"));
        assert!(output.contains("1 unreadable"));
    }

    #[test]
    fn test_format_session_report() {
        let report = SessionReport {
            peer: PeerId::from("AA:BB"),
            session_id: SessionId(4),
            outcome: SessionOutcome::Exhausted,
            verdict: Some(false),
            matches: 1,
            iterations: 31,
            started_at: Utc::now(),
            elapsed_ms: 14_000,
            energies: Vec::new(),
        };
        let output = format_session_report(&report);
        assert!(output.contains("AA:BB #4"));
        assert!(output.contains("Pattern not detected"));
        assert!(output.contains("31 frame(s)"));
    }
}
