//! Fuzz target: `CycleLoader::load_bytes` + `timeline::build`
//!
//! Feeds arbitrary bytes to the loader.  Whatever loads must expand into a
//! bounded timeline for every phase, and unloading must empty every pool.
//!
//! cargo fuzz run fuzz_cycle_loader

#![no_main]

use cycleoptima::cycle::MAX_EVENTS_PER_PHASE;
use cycleoptima::cycle::loader::CycleLoader;
use cycleoptima::timeline::{self, TimelineEvent};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut loader = CycleLoader::new();
    if let Ok(cycle) = loader.load_bytes(data) {
        let mut buf = vec![TimelineEvent::EMPTY; MAX_EVENTS_PER_PHASE];
        for phase in cycle.phases() {
            let stats = timeline::build(phase, &mut buf);
            assert!(stats.events <= MAX_EVENTS_PER_PHASE);
        }
    }
    loader.unload();
    assert!(loader.usage().is_empty());
});
