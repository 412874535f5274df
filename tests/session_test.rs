// tests/session_test.rs
//
// Session lifecycle through the registry and the wired server: idempotent
// start, cancellation latency, exhaustion, early success and device failure.

mod test_utils;

use std::time::{Duration, Instant};

use ultraprox::session::{SessionOutcome, StartOutcome};
use ultraprox::testgen::{self, ScriptedCaptureDevice};
use ultraprox::PeerId;

use test_utils::{fast_config, paced_config, rig, wait_until, TONE_AMPLITUDE};

const WAIT: Duration = Duration::from_secs(10);

#[test]
fn test_start_is_idempotent_while_running() {
    let config = paced_config(Duration::from_millis(50), 1000);
    let silence = testgen::silence_frame(&config);
    let rig = rig(config, ScriptedCaptureDevice::new(vec![silence]));
    let registry = rig.server.registry();
    let peer = PeerId::from("AA:BB:CC:DD:EE:01");

    let first = registry.start(&peer).unwrap();
    let second = registry.start(&peer).unwrap();

    let StartOutcome::Started(id) = first else {
        panic!("first start did not spawn: {first:?}");
    };
    assert_eq!(second, StartOutcome::AlreadyRunning(id));

    assert!(wait_until(WAIT, || rig.device.opened() == 1));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(rig.device.opened(), 1);
    assert_eq!(registry.active_peers(), vec![peer]);

    rig.server.shutdown();
    assert_eq!(rig.device.open_streams(), 0);
}

#[test]
fn test_cancel_releases_capture_within_one_interval() {
    let interval = Duration::from_millis(300);
    let config = paced_config(interval, 1000);
    let silence = testgen::silence_frame(&config);
    let rig = rig(config, ScriptedCaptureDevice::new(vec![silence]));
    let registry = rig.server.registry();
    let peer = PeerId::from("AA:BB:CC:DD:EE:02");

    registry.start(&peer).unwrap();
    assert!(wait_until(WAIT, || rig.device.frames_read() >= 2));

    let cancelled_at = Instant::now();
    assert!(registry.cancel(&peer));
    assert!(!registry.is_active(&peer));

    assert!(wait_until(interval + Duration::from_millis(200), || {
        rig.device.closed() == 1
    }));
    assert!(cancelled_at.elapsed() < interval + Duration::from_millis(200));

    // a cancelled session notifies nobody
    std::thread::sleep(Duration::from_millis(50));
    assert!(rig.peripheral.verdicts().is_empty());

    rig.server.shutdown();
    let reports = registry.take_reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outcome, SessionOutcome::Cancelled);
}

#[test]
fn test_countdown_exhaustion_reports_not_detected() {
    let config = fast_config(30);
    let silence = testgen::silence_frame(&config);
    let rig = rig(config, ScriptedCaptureDevice::new(vec![silence]));
    let registry = rig.server.registry();
    let peer = PeerId::from("AA:BB:CC:DD:EE:03");

    registry.start(&peer).unwrap();
    assert!(registry.wait_idle(WAIT));

    assert_eq!(rig.peripheral.verdicts(), vec![0]);
    let reports = registry.take_reports();
    assert_eq!(reports[0].outcome, SessionOutcome::Exhausted);
    assert_eq!(reports[0].iterations, 31);
    assert_eq!(reports[0].matches, 0);
    assert_eq!(rig.device.frames_read(), 31);
    assert_eq!(rig.device.open_streams(), 0);
}

#[test]
fn test_success_threshold_stops_early() {
    let config = fast_config(60);
    let cycle = testgen::detection_cycle(&config, TONE_AMPLITUDE);
    let rig = rig(config, ScriptedCaptureDevice::new(cycle));
    let registry = rig.server.registry();
    let peer = PeerId::from("AA:BB:CC:DD:EE:04");

    registry.start(&peer).unwrap();
    assert!(registry.wait_idle(WAIT));

    assert_eq!(rig.peripheral.verdicts(), vec![1]);
    let reports = registry.take_reports();
    assert_eq!(reports[0].outcome, SessionOutcome::Succeeded);
    assert_eq!(reports[0].matches, 3);
    // third match lands on the 35th frame; the remaining budget is not used
    assert_eq!(reports[0].iterations, 35);
    assert_eq!(rig.device.frames_read(), 35);
}

#[test]
fn test_unavailable_device_fails_promptly() {
    let rig = rig(fast_config(30), ScriptedCaptureDevice::unavailable());
    let registry = rig.server.registry();
    let peer = PeerId::from("AA:BB:CC:DD:EE:05");

    let started = Instant::now();
    registry.start(&peer).unwrap();
    assert!(registry.wait_idle(WAIT));
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(rig.peripheral.verdicts(), vec![0]);
    let reports = registry.take_reports();
    assert_eq!(reports[0].outcome, SessionOutcome::DeviceUnavailable);
}

#[test]
fn test_peers_are_independent() {
    let config = paced_config(Duration::from_millis(5), 40);
    let silence = testgen::silence_frame(&config);
    let rig = rig(config, ScriptedCaptureDevice::new(vec![silence]));
    let registry = rig.server.registry();
    let stays = PeerId::from("AA:BB:CC:DD:EE:06");
    let leaves = PeerId::from("AA:BB:CC:DD:EE:07");

    registry.start(&stays).unwrap();
    registry.start(&leaves).unwrap();
    assert!(wait_until(WAIT, || rig.device.opened() == 2));

    registry.cancel(&leaves);
    assert!(registry.wait_idle(WAIT));
    // joins the cancelled worker so its report is in
    rig.server.shutdown();

    // only the remaining peer's session delivers a verdict
    assert_eq!(rig.peripheral.verdicts(), vec![0]);
    let mut reports = registry.take_reports();
    reports.sort_by(|a, b| a.peer.cmp(&b.peer));
    assert_eq!(reports[0].peer, stays);
    assert_eq!(reports[0].outcome, SessionOutcome::Exhausted);
    assert_eq!(reports[1].peer, leaves);
    assert_eq!(reports[1].outcome, SessionOutcome::Cancelled);
}

#[test]
fn test_restart_after_completion_starts_new_session() {
    let config = fast_config(5);
    let silence = testgen::silence_frame(&config);
    let rig = rig(config, ScriptedCaptureDevice::new(vec![silence]));
    let registry = rig.server.registry();
    let peer = PeerId::from("AA:BB:CC:DD:EE:08");

    let StartOutcome::Started(first) = registry.start(&peer).unwrap() else {
        panic!("first start did not spawn");
    };
    assert!(registry.wait_idle(WAIT));

    let StartOutcome::Started(second) = registry.start(&peer).unwrap() else {
        panic!("second start did not spawn");
    };
    assert_ne!(first, second);
    assert!(registry.wait_idle(WAIT));
    assert_eq!(rig.peripheral.verdicts(), vec![0, 0]);
}

#[test]
fn test_shutdown_releases_every_stream() {
    let config = paced_config(Duration::from_millis(100), 1000);
    let silence = testgen::silence_frame(&config);
    let rig = rig(config, ScriptedCaptureDevice::new(vec![silence]));
    let registry = rig.server.registry();

    for i in 0..4 {
        registry.start(&PeerId::new(format!("PEER:{i}"))).unwrap();
    }
    assert!(wait_until(WAIT, || rig.device.opened() == 4));

    rig.server.shutdown();
    assert_eq!(rig.device.closed(), 4);
    assert_eq!(registry.active_count(), 0);
    assert!(rig.peripheral.verdicts().is_empty());
}

#[test]
fn test_continuous_transmitter_detected_within_countdown() {
    let config = fast_config(30);
    let frames = testgen::pattern_frames(&config, TONE_AMPLITUDE);
    let rig = rig(config, ScriptedCaptureDevice::new(frames));
    let registry = rig.server.registry();

    registry.start(&PeerId::from("AA:BB:CC:DD:EE:09")).unwrap();
    assert!(registry.wait_idle(WAIT));

    assert_eq!(rig.peripheral.verdicts(), vec![1]);
    assert_eq!(registry.take_reports()[0].iterations, 21);
}
