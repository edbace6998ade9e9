//! Inbound commands to the cycle service.
//!
//! A transport (WebSocket, serial console) hands over one JSON text frame
//! per command, shaped `{"action": "...", ...}`.  [`parse_command`] turns
//! it into a [`CycleCommand`] which the
//! [`CycleService`](super::service::CycleService) executes; every frame
//! gets exactly one [`CommandReply`].

use core::fmt;

use serde_json::Value;

/// Commands that external adapters can send into the controller core.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleCommand {
    /// Cancel the current phase, then load `data` as the new cycle.
    WriteJson { data: Value },
    StartCycle,
    StopCycle,
    SkipPhase,
    /// Zero-based phase index.
    SkipToPhase { index: usize },
    /// Manual output override on one of the actuator GPIOs.
    ToggleGpio { pin: i32, state: u8 },
}

/// Short `ok: ...` / `error: ...` text sent back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub ok: bool,
    pub message: String,
}

impl CommandReply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { ok: true, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { ok: false, message: message.into() }
    }
}

impl fmt::Display for CommandReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", if self.ok { "ok" } else { "error" }, self.message)
    }
}

/// Parse one command frame.  On failure the error is the reply to send.
pub fn parse_command(frame: &[u8]) -> Result<CycleCommand, CommandReply> {
    let Ok(root) = serde_json::from_slice::<Value>(frame) else {
        return Err(CommandReply::error("invalid json"));
    };
    let Some(action) = root.get("action").and_then(Value::as_str) else {
        return Err(CommandReply::error("missing action"));
    };

    match action {
        "write_json" => match root.get("data") {
            Some(data) => Ok(CycleCommand::WriteJson { data: data.clone() }),
            None => Err(CommandReply::error("missing data for write_json")),
        },
        "start_cycle" => Ok(CycleCommand::StartCycle),
        "stop_cycle" => Ok(CycleCommand::StopCycle),
        "skip_phase" => Ok(CycleCommand::SkipPhase),
        "skip_to_phase" => match root.get("index").and_then(as_index) {
            Some(index) => Ok(CycleCommand::SkipToPhase { index }),
            None => Err(CommandReply::error("missing or invalid index for skip_to_phase")),
        },
        "toggle_gpio" => {
            let Some(pin) = root.get("pin").and_then(Value::as_i64).and_then(|p| i32::try_from(p).ok()) else {
                return Err(CommandReply::error("missing or invalid pin number"));
            };
            let Some(state) = root.get("state").and_then(Value::as_u64).filter(|s| *s <= 1) else {
                return Err(CommandReply::error("missing or invalid state (0 or 1)"));
            };
            Ok(CycleCommand::ToggleGpio { pin, state: state as u8 })
        }
        _ => Err(CommandReply::error("unknown action")),
    }
}

/// Non-negative integral index; floats are truncated.
fn as_index(v: &Value) -> Option<usize> {
    if let Some(n) = v.as_u64() {
        return usize::try_from(n).ok();
    }
    v.as_f64().filter(|f| *f >= 0.0).map(|f| f as usize)
}
