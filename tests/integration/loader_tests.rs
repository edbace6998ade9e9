//! Integration tests: document loading through the public loader API.

use serde_json::json;

use cycleoptima::cycle::loader::CycleLoader;
use cycleoptima::cycle::{MAX_COMPONENTS_PER_PHASE, MAX_PHASES, SensorKind};
use cycleoptima::error::LoadError;

fn doc_with_phases(n: usize) -> serde_json::Value {
    let phases: Vec<_> = (0..n).map(|i| json!({"id": format!("p{i}"), "startTime": i * 10})).collect();
    json!({ "phases": phases })
}

#[test]
fn bytes_and_value_paths_agree() {
    let doc = json!({"phases": [
        {"id": "wash", "startTime": 5, "components": [
            {"id": "c1", "compId": "Hot Valve", "start": 10, "duration": 20},
            {"id": "m", "compId": "Motor", "motorConfig": {"repeatTimes": 3, "pattern": [{"stepTime": 100}, {}]}}
        ], "sensorTrigger": {"type": "Pressure", "threshold": 27000, "triggerAbove": false}}
    ]});
    let mut a = CycleLoader::new();
    let mut b = CycleLoader::new();
    let from_value = a.load_value(&doc).unwrap();
    let from_bytes = b.load_bytes(doc.to_string().as_bytes()).unwrap();
    assert_eq!(from_value.usage(), from_bytes.usage());

    let phase = from_bytes.phase(0).unwrap();
    assert_eq!(phase.id(), Some("wash"));
    assert_eq!(phase.start_time_ms(), 5);
    assert_eq!(phase.components().len(), 2);
    let motor = phase.motor(&phase.components()[1]).unwrap();
    assert_eq!(motor.repeat_times, 3);
    assert_eq!(motor.pattern.len(), 2);
    assert_eq!(motor.pattern[1].step_time_ms, 1000);
    assert_eq!(motor.pattern[1].pause_time_ms, 0);
    let trigger = phase.sensor_trigger().unwrap();
    assert_eq!(trigger.kind, SensorKind::Pressure);
    assert_eq!(trigger.threshold, 27_000);
    assert!(!trigger.trigger_above);
    assert!(!trigger.has_triggered());
}

#[test]
fn phase_and_component_counts_are_capped() {
    let mut loader = CycleLoader::new();
    let cycle = loader.load_value(&doc_with_phases(MAX_PHASES + 5)).unwrap();
    assert_eq!(cycle.phase_count(), MAX_PHASES);

    let components: Vec<_> = (0..40).map(|_| json!({"compId": "Cold Valve", "duration": 1})).collect();
    let cycle = loader.load_value(&json!({"phases": [{"components": components}]})).unwrap();
    assert_eq!(cycle.phase(0).unwrap().components().len(), MAX_COMPONENTS_PER_PHASE);
}

#[test]
fn rejected_document_keeps_previous_cycle() {
    let mut loader = CycleLoader::new();
    loader.load_value(&doc_with_phases(3)).unwrap();

    assert!(matches!(loader.load_value(&json!({"phases": {}})), Err(LoadError::MalformedDocument(_))));
    assert!(matches!(loader.load_bytes(b"{\"phases\": [}"), Err(LoadError::Syntax { .. })));
    assert_eq!(loader.current().unwrap().phase_count(), 3);
}

#[test]
fn unload_releases_every_pool() {
    let mut loader = CycleLoader::new();
    loader
        .load_value(&json!({"phases": [{"components": [
            {"compId": "Motor", "motorConfig": {"pattern": [{"stepTime": 1}, {"stepTime": 2}]}}
        ], "sensorTrigger": {}}]}))
        .unwrap();
    let usage = loader.usage();
    assert_eq!((usage.phases, usage.components, usage.motor_configs), (1, 1, 1));
    assert_eq!((usage.motor_steps, usage.sensor_triggers), (2, 1));

    loader.unload();
    assert!(loader.usage().is_empty());
    assert!(!loader.is_loaded());
    // Second unload is harmless.
    loader.unload();
    assert!(loader.usage().is_empty());
}

#[test]
fn running_copy_survives_replacement() {
    let mut loader = CycleLoader::new();
    let first = loader.load_value(&doc_with_phases(2)).unwrap();
    loader.load_value(&doc_with_phases(4)).unwrap();
    assert_eq!(first.phase_count(), 2);
    assert_eq!(loader.current().unwrap().phase_count(), 4);
}
