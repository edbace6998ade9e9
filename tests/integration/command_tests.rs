//! Integration tests: command frames end to end through `handle_frame`.

use std::time::Duration;

use cycleoptima::app::events::{CycleEvent, PhaseEnd};
use cycleoptima::pins::{Actuator, Level};

use super::mock_hw::{rig, wait_until};

const CYCLE: &str = r#"{"action":"write_json","data":{"phases":[
    {"id":"fill","components":[{"compId":"Cold Valve","start":0,"duration":10000}]},
    {"id":"drain","components":[{"compId":"Drain Pump","start":0,"duration":10}]}
]}}"#;

fn send(r: &super::mock_hw::Rig, frame: &str) -> String {
    r.service.handle_frame(frame.as_bytes()).to_string()
}

#[test]
fn full_session_over_frames() {
    let r = rig();
    assert_eq!(send(&r, CYCLE), "ok: json loaded");
    assert_eq!(r.service.total_phases(), 2);

    assert_eq!(send(&r, r#"{"action":"start_cycle"}"#), "ok: starting cycle");
    assert_eq!(send(&r, r#"{"action":"start_cycle"}"#), "error: cycle already running");
    assert!(wait_until(Duration::from_secs(2), || r.sink.started_phases() == [0]));
    std::thread::sleep(Duration::from_millis(20));

    assert_eq!(send(&r, r#"{"action":"skip_phase"}"#), "ok: phase skipped");
    assert!(wait_until(Duration::from_secs(2), || !r.service.is_running()));
    r.service.join_runner();
    assert!(r.sink.contains(&CycleEvent::PhaseEnded { index: 0, cause: PhaseEnd::Skipped }));
    assert_eq!(r.sink.events().last(), Some(&CycleEvent::CycleFinished));
}

#[test]
fn stop_and_skip_reply_ok_when_idle() {
    let r = rig();
    assert_eq!(send(&r, r#"{"action":"stop_cycle"}"#), "ok: cycle stopped");
    assert_eq!(send(&r, r#"{"action":"skip_phase"}"#), "ok: phase skipped");
    assert_eq!(send(&r, r#"{"action":"skip_to_phase","index":1}"#), "ok: skipping to phase");
}

#[test]
fn start_without_cycle_is_an_error() {
    let r = rig();
    assert_eq!(send(&r, r#"{"action":"start_cycle"}"#), "error: no cycle loaded");
    assert_eq!(send(&r, r#"{"action":"write_json","data":{"phases":[]}}"#), "ok: json loaded");
    assert_eq!(send(&r, r#"{"action":"start_cycle"}"#), "error: no cycle loaded");
}

#[test]
fn write_json_with_bad_document_is_rejected() {
    let r = rig();
    let reply = send(&r, r#"{"action":"write_json","data":{"steps":[]}}"#);
    assert!(reply.starts_with("error: json failed to load"), "{reply}");
    assert!(!r.sink.events().iter().any(|e| matches!(e, CycleEvent::Loaded { .. })));
}

#[test]
fn write_json_while_running_replaces_the_cycle() {
    let r = rig();
    send(&r, CYCLE);
    send(&r, r#"{"action":"start_cycle"}"#);
    assert!(wait_until(Duration::from_secs(2), || r.sink.started_phases() == [0]));

    let reply = send(&r, r#"{"action":"write_json","data":{"phases":[{"id":"x"}]}}"#);
    assert_eq!(reply, "ok: json loaded");
    assert!(!r.service.is_running());
    assert_eq!(r.service.total_phases(), 1);
    assert_eq!(r.outputs.last(Actuator::ColdValve), Some(Level::High));
}

#[test]
fn bad_write_json_while_running_keeps_the_phase() {
    let r = rig();
    send(&r, CYCLE);
    send(&r, r#"{"action":"start_cycle"}"#);
    assert!(wait_until(Duration::from_secs(2), || r.sink.started_phases() == [0]));
    assert!(wait_until(Duration::from_secs(2), || r.service.output_level(Actuator::ColdValve) == Level::Low));

    let reply = send(&r, r#"{"action":"write_json","data":{"phases":"fill"}}"#);
    assert!(reply.starts_with("error: json failed to load"), "{reply}");
    assert!(r.service.is_running());
    assert_eq!(r.service.total_phases(), 2);
    assert!(!r.sink.events().iter().any(|e| matches!(e, CycleEvent::PhaseEnded { .. })));
    assert_eq!(r.outputs.last(Actuator::ColdValve), Some(Level::Low));

    send(&r, r#"{"action":"stop_cycle"}"#);
    assert!(wait_until(Duration::from_secs(2), || !r.service.is_running()));
    r.service.join_runner();
}

#[test]
fn toggle_gpio_drives_output_and_shadow() {
    let r = rig();
    assert_eq!(send(&r, r#"{"action":"toggle_gpio","pin":5,"state":0}"#), "ok: GPIO 5 set to 0");
    assert_eq!(r.service.output_level(Actuator::ColdValve), Level::Low);
    assert_eq!(send(&r, r#"{"action":"toggle_gpio","pin":5,"state":1}"#), "ok: GPIO 5 set to 1");
    assert_eq!(r.outputs.writes_to(Actuator::ColdValve), [Level::Low, Level::High]);

    assert_eq!(
        send(&r, r#"{"action":"toggle_gpio","pin":3,"state":0}"#),
        "error: GPIO 3 is not an actuator output"
    );
    assert_eq!(
        send(&r, r#"{"action":"toggle_gpio","pin":5,"state":2}"#),
        "error: missing or invalid state (0 or 1)"
    );
}

#[test]
fn garbage_frames_get_replies() {
    let r = rig();
    assert_eq!(send(&r, "]]"), "error: invalid json");
    assert_eq!(send(&r, r#"{"action":"reboot"}"#), "error: unknown action");
}
