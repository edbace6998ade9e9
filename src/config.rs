//! Controller configuration parameters
//!
//! All tunable timing parameters for the cycle controller.  Defaults match
//! the deployed firmware; tests shrink the intervals so real-time scenarios
//! finish quickly.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Core controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    // --- Driving loop ---
    /// How often the driving loop checks phase activity and sensor triggers
    pub poll_interval_ms: u32,
    /// Pause between two phases so other tasks get CPU time
    pub inter_phase_pause_ms: u32,
    /// Runner task stack size (KiB)
    pub runner_stack_kb: usize,
    /// Runner task FreeRTOS priority
    pub runner_priority: u8,

    // --- Scheduler ---
    /// Delay used for events whose nominal fire time already passed (µs)
    pub min_timer_delay_us: u64,
    /// Gap between a batch's latest event and its boundary signal (µs)
    pub batch_boundary_slack_us: u64,

    // --- Sensor triggers ---
    /// Grace period after phase start during which triggers are ignored
    pub sensor_cooldown_ms: u64,

    // --- RPM sensor ---
    pub rpm_pulses_per_rev: f32,
    /// Edges closer than this are contact bounce (µs)
    pub rpm_debounce_us: u64,
    /// No edge for this long means the drum is stopped
    pub rpm_timeout_ms: u64,

    // --- Telemetry ---
    pub telemetry_interval_ms: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            inter_phase_pause_ms: 10,
            runner_stack_kb: 8,
            runner_priority: 2,

            min_timer_delay_us: 1_000,
            batch_boundary_slack_us: 1_000,

            sensor_cooldown_ms: 15_000,

            rpm_pulses_per_rev: 1.0,
            rpm_debounce_us: 2_000,
            rpm_timeout_ms: 2_000,

            telemetry_interval_ms: 1_000,
        }
    }
}

impl ControllerConfig {
    /// Reject values that would stall the runner or divide by zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed("poll_interval_ms"));
        }
        if self.min_timer_delay_us == 0 {
            return Err(ConfigError::ValidationFailed("min_timer_delay_us"));
        }
        if self.rpm_pulses_per_rev.is_nan() || self.rpm_pulses_per_rev <= 0.0 {
            return Err(ConfigError::ValidationFailed("rpm_pulses_per_rev"));
        }
        if self.runner_stack_kb < 4 {
            return Err(ConfigError::ValidationFailed("runner_stack_kb"));
        }
        if self.telemetry_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed("telemetry_interval_ms"));
        }
        Ok(())
    }

    /// Decode and validate a JSON config blob.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_slice(bytes).map_err(|_| ConfigError::Deserialize)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let c = ControllerConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.poll_interval_ms, 100);
        assert_eq!(c.sensor_cooldown_ms, 15_000);
    }

    #[test]
    fn serde_roundtrip() {
        let c = ControllerConfig::default();
        let json = serde_json::to_string(&c).unwrap();
        let c2 = ControllerConfig::from_json(json.as_bytes()).unwrap();
        assert_eq!(c, c2);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c = ControllerConfig::from_json(br#"{"poll_interval_ms": 20}"#).unwrap();
        assert_eq!(c.poll_interval_ms, 20);
        assert_eq!(c.sensor_cooldown_ms, 15_000);
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let c = ControllerConfig { poll_interval_ms: 0, ..ControllerConfig::default() };
        assert_eq!(c.validate(), Err(ConfigError::ValidationFailed("poll_interval_ms")));
    }

    #[test]
    fn rejects_non_positive_pulses_per_rev() {
        let c = ControllerConfig { rpm_pulses_per_rev: 0.0, ..ControllerConfig::default() };
        assert!(c.validate().is_err());
        assert_eq!(
            ControllerConfig::from_json(br#"{"rpm_pulses_per_rev": -2.0}"#),
            Err(ConfigError::ValidationFailed("rpm_pulses_per_rev"))
        );
    }

    #[test]
    fn garbage_is_a_deserialize_error() {
        assert_eq!(ControllerConfig::from_json(b"{nope"), Err(ConfigError::Deserialize));
    }
}
