//! CycleOptima firmware entry point
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  PinBank          SensorHub       EspTimerAdapter  LogEventSink│
//! │  (OutputPort)     (SensorPort)    (TimerPort)      (EventSink) │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              CycleService                              │    │
//! │  │  Loader · Timeline · Scheduler · Runner · Monitor      │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Command frames arrive one JSON object per line on the console; the
//! network transport that normally carries them is a separate component.
#![deny(unused_must_use)]

use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use esp_idf_svc::hal::gpio::{AnyOutputPin, Output, OutputPin, PinDriver};
use esp_idf_svc::hal::peripherals::Peripherals;
use log::{error, info, warn};

use cycleoptima::adapters::hardware::monotonic_clock;
use cycleoptima::adapters::log_sink::LogEventSink;
use cycleoptima::adapters::outputs::PinBank;
use cycleoptima::adapters::timer::EspTimerAdapter;
use cycleoptima::app::service::CycleService;
use cycleoptima::config::ControllerConfig;
use cycleoptima::drivers::hw_init;
use cycleoptima::drivers::task_pin::{self, Core};
use cycleoptima::drivers::watchdog::Watchdog;
use cycleoptima::sensors::SensorHub;
use cycleoptima::sensors::rpm::RPM_SENSOR;

const WATCHDOG_TIMEOUT_MS: u32 = 10_000;
const SUPERVISOR_TICK_MS: u64 = 100;

type OutputDriver = PinDriver<'static, AnyOutputPin, Output>;

fn output(pin: impl OutputPin + 'static) -> Result<OutputDriver> {
    Ok(PinDriver::output(pin.downgrade_output())?)
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("CycleOptima v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. Peripherals ────────────────────────────────────────
    // Latch outputs released before PinDriver takes the pads.
    hw_init::init_peripherals()?;

    let config = ControllerConfig::default();
    RPM_SENSOR.configure(config.rpm_debounce_us, config.rpm_timeout_ms);
    RPM_SENSOR.set_pulses_per_rev(config.rpm_pulses_per_rev);

    let p = Peripherals::take()?;
    let pins = p.pins;
    // Actuator::ALL order.
    let bank = PinBank::new([
        output(pins.gpio7)?,
        output(pins.gpio8)?,
        output(pins.gpio5)?,
        output(pins.gpio19)?,
        output(pins.gpio9)?,
        output(pins.gpio18)?,
        output(pins.gpio4)?,
        output(pins.gpio10)?,
    ]);
    let outputs = Arc::new(bank);

    let sensors = Arc::new(SensorHub::new(&RPM_SENSOR, monotonic_clock()));
    let timers = Arc::new(EspTimerAdapter::new()?);

    // ── 3. Service ────────────────────────────────────────────
    let service = Arc::new(CycleService::new(
        config,
        timers,
        outputs.clone(),
        sensors,
        Box::new(LogEventSink::new()),
    )?);

    // ── 4. Console command reader ─────────────────────────────
    let console = Arc::clone(&service);
    task_pin::spawn_on_core(Core::Any, 1, 8, "console\0", move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) if line.trim().is_empty() => {}
                Ok(line) => info!("console: {}", console.handle_frame(line.as_bytes())),
                Err(e) => {
                    warn!("console: read failed ({})", e);
                    std::thread::sleep(Duration::from_millis(500));
                }
            }
        }
    })?;

    // ── 5. Supervision loop ───────────────────────────────────
    let watchdog = Watchdog::new(WATCHDOG_TIMEOUT_MS);
    let telemetry_every = u64::from(service.config().telemetry_interval_ms).max(SUPERVISOR_TICK_MS);
    let mut since_telemetry = 0u64;
    let mut reported_errors = 0u32;

    loop {
        watchdog.feed();
        std::thread::sleep(Duration::from_millis(SUPERVISOR_TICK_MS));
        since_telemetry += SUPERVISOR_TICK_MS;

        let errors = outputs.write_errors();
        if errors != reported_errors {
            error!("outputs: {} failed pin writes", errors - reported_errors);
            reported_errors = errors;
        }

        if since_telemetry >= telemetry_every {
            since_telemetry = 0;
            match service.telemetry().to_json() {
                Ok(json) => info!("telemetry: {}", json),
                Err(e) => warn!("telemetry: encode failed ({})", e),
            }
        }
    }
}
