//! One-shot hardware peripheral initialization.
//!
//! Latches every actuator output RELEASED before its direction is set, so
//! no relay clicks at boot, and installs the drum-speed edge ISR.  Called
//! once from `main()` before any pin driver is created.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    GpioConfigFailed(i32),
    IsrInstallFailed(i32),
    IsrHandlerFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
            Self::IsrHandlerFailed(rc) => write!(f, "RPM ISR handler add failed (rc={})", rc),
        }
    }
}

impl std::error::Error for HwInitError {}

#[cfg(target_os = "espidf")]
use log::info;

#[cfg(target_os = "espidf")]
use crate::pins::{self, Actuator};

#[cfg(target_os = "espidf")]
pub fn init_peripherals() -> Result<(), HwInitError> {
    // SAFETY: Called once from main() before any task is spawned.
    unsafe {
        preset_outputs_released()?;
        init_rpm_input()?;
    }
    info!("hw_init: outputs latched released, rpm ISR armed");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_peripherals() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): peripheral init skipped");
    Ok(())
}

// ── Actuator outputs ──────────────────────────────────────────

/// Active-low drivers: the output latch must read HIGH before the pad
/// becomes an output.
#[cfg(target_os = "espidf")]
unsafe fn preset_outputs_released() -> Result<(), HwInitError> {
    for actuator in Actuator::ALL {
        let pin = actuator.gpio();
        // SAFETY: pin numbers come from the board map.
        let ret = unsafe { gpio_set_level(pin, u32::from(pins::Level::RELEASED.raw())) };
        if ret != ESP_OK as i32 {
            return Err(HwInitError::GpioConfigFailed(ret));
        }
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode_t_GPIO_MODE_OUTPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
            ..Default::default()
        };
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            return Err(HwInitError::GpioConfigFailed(ret));
        }
    }
    Ok(())
}

// ── Drum speed input ──────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe extern "C" fn rpm_edge_isr(_arg: *mut core::ffi::c_void) {
    // SAFETY: esp_timer_get_time is ISR-safe.
    let now = unsafe { esp_timer_get_time() } as u64;
    crate::sensors::rpm::RPM_SENSOR.on_pulse(now);
}

#[cfg(target_os = "espidf")]
unsafe fn init_rpm_input() -> Result<(), HwInitError> {
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pins::RPM_PULSE_GPIO,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_POSEDGE,
        ..Default::default()
    };
    let ret = unsafe { gpio_config(&cfg) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::GpioConfigFailed(ret));
    }

    // INVALID_STATE: another driver already installed the service.
    let ret = unsafe { gpio_install_isr_service(0) };
    if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
        return Err(HwInitError::IsrInstallFailed(ret));
    }

    let ret = unsafe { gpio_isr_handler_add(pins::RPM_PULSE_GPIO, Some(rpm_edge_isr), core::ptr::null_mut()) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::IsrHandlerFailed(ret));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_return_code() {
        assert_eq!(HwInitError::IsrInstallFailed(-1).to_string(), "GPIO ISR service install failed (rc=-1)");
    }

    #[cfg(not(target_os = "espidf"))]
    #[test]
    fn sim_init_is_noop() {
        assert_eq!(init_peripherals(), Ok(()));
    }
}
