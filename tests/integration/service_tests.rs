//! Integration tests: CycleService ↔ runner ↔ scheduler.
//!
//! Real-time scenarios on the thread-backed timer service with the short
//! intervals from [`fast_config`](super::mock_hw::fast_config).

use std::time::Duration;

use serde_json::{Value, json};

use cycleoptima::app::events::{CycleEvent, PhaseEnd};
use cycleoptima::error::ControlError;
use cycleoptima::pins::{Actuator, Level};

use super::mock_hw::{Rig, rig, wait_until};

const SETTLE: Duration = Duration::from_secs(3);

fn simple(comp_id: &str, start: u32, duration: u32) -> Value {
    json!({"compId": comp_id, "start": start, "duration": duration})
}

fn phase(id: &str, components: Vec<Value>) -> Value {
    json!({"id": id, "startTime": 0, "components": components})
}

fn load(r: &Rig, phases: Vec<Value>) -> usize {
    r.service.load_cycle_value(&json!({ "phases": phases })).unwrap()
}

/// Wait for phase `index` to be armed and published.
fn wait_phase_running(r: &Rig, index: usize) {
    assert!(wait_until(SETTLE, || r.sink.started_phases().contains(&index)));
    std::thread::sleep(Duration::from_millis(20));
}

fn wait_idle(r: &Rig) {
    assert!(wait_until(SETTLE, || !r.service.is_running()), "cycle did not end");
    r.service.join_runner();
}

// ── Run to completion ─────────────────────────────────────────

#[test]
fn two_event_phase_runs_to_completion() {
    let r = rig();
    assert_eq!(load(&r, vec![phase("fill", vec![simple("Cold Valve", 0, 50)])]), 1);

    r.service.run_loaded_cycle().unwrap();
    assert!(r.service.is_running());
    wait_idle(&r);

    assert_eq!(r.outputs.writes(), vec![(Actuator::ColdValve, Level::Low), (Actuator::ColdValve, Level::High)]);
    assert_eq!(r.service.output_level(Actuator::ColdValve), Level::High);
    assert_eq!(r.service.current_phase_index(), 0);
    assert!(r.sink.contains(&CycleEvent::PhaseEnded { index: 0, cause: PhaseEnd::Completed }));
    assert_eq!(r.sink.events().last(), Some(&CycleEvent::CycleFinished));
    assert_eq!(r.timers.live(), 0);
    assert_eq!(r.sensors.resets(), 1);
}

#[test]
fn motor_pattern_alternates_drive_and_direction() {
    let r = rig();
    load(&r, vec![json!({"id": "wash", "components": [{
        "compId": "Motor", "start": 0, "duration": 99999,
        "motorConfig": {"repeatTimes": 2, "pattern": [
            {"stepTime": 20, "pauseTime": 10, "direction": "cw"},
            {"stepTime": 20, "pauseTime": 10, "direction": "ccw"}
        ]}
    }]})]);

    r.service.run_loaded_cycle().unwrap();
    wait_idle(&r);

    assert_eq!(r.outputs.writes().len(), 12);
    assert_eq!(
        r.outputs.writes_to(Actuator::MotorOn),
        [Level::Low, Level::High, Level::Low, Level::High, Level::Low, Level::High, Level::Low, Level::High]
    );
    assert_eq!(r.outputs.writes_to(Actuator::MotorDirection), [Level::Low, Level::High, Level::Low, Level::High]);
    assert_eq!(r.service.output_level(Actuator::MotorOn), Level::High);
}

#[test]
fn phases_run_in_order() {
    let r = rig();
    load(&r, vec![
        phase("a", vec![simple("Cold Valve", 0, 10)]),
        phase("b", vec![]),
        phase("c", vec![simple("Drain Pump", 0, 10)]),
    ]);
    r.service.run_loaded_cycle().unwrap();
    wait_idle(&r);

    assert_eq!(r.sink.started_phases(), [0, 1, 2]);
    assert!(r.sink.contains(&CycleEvent::PhaseEnded { index: 1, cause: PhaseEnd::Completed }));
    assert_eq!(r.outputs.last(Actuator::DrainPump), Some(Level::High));
}

// ── Stop ──────────────────────────────────────────────────────

#[test]
fn stop_mid_phase_releases_everything() {
    let r = rig();
    load(&r, vec![
        phase("long", vec![simple("Cold Valve", 0, 10_000), simple("Hot Valve", 0, 10_000)]),
        phase("never", vec![simple("Drain Pump", 0, 10)]),
    ]);
    r.service.run_loaded_cycle().unwrap();
    wait_phase_running(&r, 0);
    assert!(wait_until(SETTLE, || r.service.output_level(Actuator::HotValve) == Level::Low));
    assert_eq!(r.service.current_phase_index(), 1);

    r.service.stop().unwrap();
    // Within a few poll intervals.
    assert!(wait_until(Duration::from_millis(500), || !r.service.is_running()));
    r.service.join_runner();

    assert_eq!(r.service.current_phase_index(), 0);
    assert!(r.service.shadow().all_released());
    for actuator in Actuator::ALL {
        assert_eq!(r.outputs.last(actuator), Some(Level::High), "{actuator} left engaged");
    }
    assert_eq!(r.sink.started_phases(), [0]);
    assert!(r.sink.contains(&CycleEvent::PhaseEnded { index: 0, cause: PhaseEnd::Stopped }));
    assert_eq!(r.sink.events().last(), Some(&CycleEvent::CycleStopped));
    assert_eq!(r.timers.live(), 0);
}

// ── Skip ──────────────────────────────────────────────────────

#[test]
fn skip_moves_to_next_phase() {
    let r = rig();
    load(&r, vec![
        phase("long", vec![simple("Cold Valve", 0, 10_000)]),
        phase("short", vec![simple("Soft Valve", 0, 10)]),
    ]);
    r.service.run_loaded_cycle().unwrap();
    wait_phase_running(&r, 0);

    r.service.skip_current_phase(true).unwrap();
    wait_idle(&r);

    assert_eq!(r.sink.started_phases(), [0, 1]);
    assert!(r.sink.contains(&CycleEvent::PhaseEnded { index: 0, cause: PhaseEnd::Skipped }));
    assert!(r.sink.contains(&CycleEvent::PhaseEnded { index: 1, cause: PhaseEnd::Completed }));
    assert_eq!(r.sink.events().last(), Some(&CycleEvent::CycleFinished));
    // force_off released the valve that was still open.
    assert_eq!(r.outputs.last(Actuator::ColdValve), Some(Level::High));
}

#[test]
fn skip_to_jumps_and_out_of_range_is_ignored() {
    let r = rig();
    load(&r, vec![
        phase("p1", vec![simple("Cold Valve", 0, 10_000)]),
        phase("p2", vec![simple("Hot Valve", 0, 10_000)]),
        phase("p3", vec![simple("Drain Pump", 0, 10)]),
    ]);
    r.service.run_loaded_cycle().unwrap();
    wait_phase_running(&r, 0);

    assert_eq!(r.service.skip_to_phase(7), Err(ControlError::OutOfRange { index: 7, total: 3 }));
    std::thread::sleep(Duration::from_millis(30));
    assert!(r.service.is_running());
    assert_eq!(r.service.current_phase_index(), 1);

    r.service.skip_to_phase(2).unwrap();
    wait_idle(&r);

    assert_eq!(r.sink.started_phases(), [0, 2]);
    assert!(!r.outputs.writes_to(Actuator::HotValve).contains(&Level::Low));
    assert_eq!(r.outputs.last(Actuator::DrainPump), Some(Level::High));
}

#[test]
fn skip_to_earlier_phase_repeats_it() {
    let r = rig();
    load(&r, vec![
        phase("p1", vec![simple("Cold Valve", 0, 10)]),
        phase("p2", vec![simple("Hot Valve", 0, 10_000)]),
    ]);
    r.service.run_loaded_cycle().unwrap();
    wait_phase_running(&r, 1);
    r.service.skip_to_phase(0).unwrap();
    wait_phase_running(&r, 0);
    assert!(wait_until(SETTLE, || r.sink.started_phases() == [0, 1, 0, 1]));
    r.service.stop().unwrap();
    wait_idle(&r);
}

// ── Sensor trigger ────────────────────────────────────────────

#[test]
fn rpm_trigger_ends_phase_after_cooldown() {
    let r = rig();
    load(&r, vec![
        json!({"id": "spin", "components": [simple("Motor", 0, 10_000)],
               "sensorTrigger": {"type": "RPM", "threshold": 500, "triggerAbove": true}}),
        phase("rinse", vec![simple("Cold Valve", 0, 10)]),
    ]);
    r.sensors.set_rpm(800.0);

    let started = std::time::Instant::now();
    r.service.run_loaded_cycle().unwrap();
    wait_idle(&r);

    // Never before the 40 ms cooldown, well before the 10 s timeline.
    assert!(started.elapsed() >= Duration::from_millis(40));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(r.sink.contains(&CycleEvent::PhaseEnded { index: 0, cause: PhaseEnd::SensorTriggered }));
    assert!(r.sink.contains(&CycleEvent::PhaseEnded { index: 1, cause: PhaseEnd::Completed }));
    assert_eq!(r.outputs.last(Actuator::MotorOn), Some(Level::High));
}

#[test]
fn trigger_below_threshold_does_not_fire() {
    let r = rig();
    load(&r, vec![json!({"id": "spin", "components": [simple("Motor", 0, 120)],
        "sensorTrigger": {"type": "RPM", "threshold": 500}})]);
    r.sensors.set_rpm(499.0);
    r.service.run_loaded_cycle().unwrap();
    wait_idle(&r);
    assert!(r.sink.contains(&CycleEvent::PhaseEnded { index: 0, cause: PhaseEnd::Completed }));
}

// ── Lifecycle ─────────────────────────────────────────────────

#[test]
fn run_requires_loaded_cycle_and_rejects_double_start() {
    let r = rig();
    assert_eq!(r.service.run_loaded_cycle(), Err(ControlError::NothingLoaded));

    load(&r, vec![phase("long", vec![simple("Cold Valve", 0, 10_000)])]);
    r.service.run_loaded_cycle().unwrap();
    assert_eq!(r.service.run_loaded_cycle(), Err(ControlError::AlreadyRunning));
    r.service.stop().unwrap();
    wait_idle(&r);
    assert_eq!(r.service.stop(), Err(ControlError::NotRunning));
}

#[test]
fn loading_while_running_stops_the_cycle() {
    let r = rig();
    load(&r, vec![phase("long", vec![simple("Cold Valve", 0, 10_000)])]);
    r.service.run_loaded_cycle().unwrap();
    wait_phase_running(&r, 0);

    let doc = br#"{"phases":[{"id":"a"},{"id":"b"}]}"#;
    assert_eq!(r.service.load_cycle_bytes(doc), Ok(2));
    assert!(!r.service.is_running());
    assert_eq!(r.service.total_phases(), 2);
    assert!(r.sink.contains(&CycleEvent::CycleStopped));
    assert_eq!(r.outputs.last(Actuator::ColdValve), Some(Level::High));
}

#[test]
fn failed_load_keeps_previous_cycle() {
    let r = rig();
    load(&r, vec![phase("only", vec![])]);
    assert!(r.service.load_cycle_bytes(b"{\"phases\": 3}").is_err());
    assert!(r.service.load_cycle_bytes(b"not json").is_err());
    assert_eq!(r.service.total_phases(), 1);
    r.service.run_loaded_cycle().unwrap();
    wait_idle(&r);
    assert_eq!(r.sink.started_phases(), [0]);
}

#[test]
fn rejected_load_leaves_running_cycle_alone() {
    let r = rig();
    load(&r, vec![phase("long", vec![simple("Cold Valve", 0, 10_000)])]);
    r.service.run_loaded_cycle().unwrap();
    wait_phase_running(&r, 0);
    assert!(wait_until(SETTLE, || r.service.output_level(Actuator::ColdValve) == Level::Low));

    assert!(r.service.load_cycle_bytes(b"{\"phases\": 3}").is_err());
    assert!(r.service.load_cycle_bytes(b"not json").is_err());
    assert!(r.service.load_cycle_value(&json!({"steps": []})).is_err());

    assert!(r.service.is_running());
    assert_eq!(r.service.current_phase_index(), 1);
    assert!(!r.sink.contains(&CycleEvent::CycleStopped));
    assert!(!r.sink.events().iter().any(|e| matches!(e, CycleEvent::PhaseEnded { .. })));
    assert_eq!(r.outputs.last(Actuator::ColdValve), Some(Level::Low));
    assert_eq!(r.service.total_phases(), 1);

    r.service.stop().unwrap();
    wait_idle(&r);
}

#[test]
fn unload_resets_usage() {
    let r = rig();
    load(&r, vec![json!({"id": "p", "components": [{
        "compId": "Motor", "motorConfig": {"pattern": [{"stepTime": 5}]}
    }], "sensorTrigger": {"threshold": 1}})]);
    assert!(!r.service.usage().is_empty());
    r.service.unload_cycle();
    assert!(r.service.usage().is_empty());
    assert_eq!(r.service.total_phases(), 0);
    assert_eq!(r.service.run_loaded_cycle(), Err(ControlError::NothingLoaded));
}

// ── Observers ─────────────────────────────────────────────────

#[test]
fn telemetry_tracks_active_phase() {
    let r = rig();
    load(&r, vec![
        phase("prewash", vec![simple("Cold Valve", 0, 10)]),
        phase("main-wash", vec![simple("Hot Valve", 100, 4_900)]),
    ]);
    r.service.run_loaded_cycle().unwrap();
    wait_phase_running(&r, 1);
    std::thread::sleep(Duration::from_millis(30));

    let t = r.service.telemetry();
    assert!(t.cycle_running);
    assert_eq!(t.current_phase_index, 2);
    assert_eq!(t.current_phase_name.as_str(), "main-wash");
    assert_eq!(t.total_phases, 2);
    assert_eq!(t.phase_total_duration_ms, 5_000);
    assert!(t.phase_elapsed_ms >= 20 && t.phase_elapsed_ms < 5_000);

    r.service.stop().unwrap();
    wait_idle(&r);
    let t = r.service.telemetry();
    assert!(!t.cycle_running);
    assert_eq!(t.current_phase_index, 0);
    assert_eq!(t.phase_elapsed_ms, 0);
    assert!(t.pins.iter().all(|p| p.state == 1));
}

#[test]
fn manual_override_updates_shadow() {
    let r = rig();
    assert_eq!(r.service.set_output(19, Level::Low), Ok(Actuator::DrainPump));
    assert_eq!(r.service.output_level(Actuator::DrainPump), Level::Low);
    assert_eq!(r.outputs.last(Actuator::DrainPump), Some(Level::Low));
    assert_eq!(r.service.set_output(2, Level::Low), Err(ControlError::UnknownPin(2)));
}
