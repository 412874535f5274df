// tests/cli_test.rs
//
// End-to-end runs of the ultraprox binary.

mod test_utils;

use std::process::Output;

use serde_json::Value;
use ultraprox::config::DetectorConfig;
use ultraprox::testgen;

use test_utils::{fast_config, run_ultraprox, write_config, TONE_AMPLITUDE};

fn run(args: &[&str]) -> Output {
    run_ultraprox()
        .args(args)
        .env_remove("ULTRAPROX_CONFIG")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run ultraprox")
}

fn json_stdout(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn test_config_prints_preset() {
    let value = json_stdout(&run(&["config", "--json", "--preset", "wearable"]));
    assert_eq!(value["mismatch_policy"], "strict");
    assert_eq!(value["target_frequency_hz"], 20_000.0);
    assert_eq!(value["pattern"], serde_json::json!([3, 1, 3]));
}

#[test]
fn test_unknown_preset_fails() {
    let output = run(&["config", "--preset", "loudspeaker"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown preset"));
}

#[test]
fn test_invalid_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = DetectorConfig::default();
    config.pattern = vec![3, 1];
    let path = write_config(dir.path(), &config);

    let output = run(&["config", "--config", path.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn test_simulate_silent_reports_not_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), &fast_config(3));

    let value = json_stdout(&run(&[
        "simulate",
        "--silent",
        "--peers",
        "2",
        "--json",
        "--config",
        path.to_str().unwrap(),
    ]));
    assert_eq!(value["transmitter_on"], false);
    assert_eq!(value["verdicts"], serde_json::json!([0, 0]));
    assert_eq!(value["timed_out"], false);
    assert_eq!(value["reports"].as_array().unwrap().len(), 2);
}

#[test]
fn test_simulate_transmitter_is_detected() {
    let value = json_stdout(&run(&["simulate", "--interval-ms", "0", "--json"]));
    assert_eq!(value["transmitter_on"], true);
    assert_eq!(value["verdicts"], serde_json::json!([1]));
    assert_eq!(value["reports"][0]["outcome"], "succeeded");
}

#[test]
fn test_analyze_directory_of_recordings() {
    let dir = tempfile::tempdir().unwrap();
    let config = DetectorConfig::default();
    let cycle = testgen::detection_cycle(&config, TONE_AMPLITUDE);
    let frames: Vec<_> = cycle.iter().cycle().take(cycle.len() * 3).cloned().collect();
    testgen::write_wav(dir.path().join("near.wav"), config.sample_rate, &frames).unwrap();
    testgen::write_wav(
        dir.path().join("quiet.wav"),
        config.sample_rate,
        &vec![testgen::silence_frame(&config); 10],
    )
    .unwrap();

    let value = json_stdout(&run(&["analyze", "--json", dir.path().to_str().unwrap()]));
    let results = value.as_array().unwrap();
    assert_eq!(results.len(), 2);

    let near = results
        .iter()
        .find(|r| r["path"].as_str().unwrap().ends_with("near.wav"))
        .unwrap();
    assert_eq!(near["report"]["match_frames"], serde_json::json!([6, 20, 34]));

    let quiet = results
        .iter()
        .find(|r| r["path"].as_str().unwrap().ends_with("quiet.wav"))
        .unwrap();
    assert_eq!(quiet["report"]["match_frames"], serde_json::json!([]));
}
