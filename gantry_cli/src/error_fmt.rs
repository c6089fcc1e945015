//! Human-readable error descriptions, stable exit codes, and structured
//! JSON error formatting.

use gantry_core::error::{AbortReason, BuildError, MotionError};

pub fn abort_reason_name(r: &AbortReason) -> &'static str {
    match r {
        AbortReason::MaxRuntime => "MaxRuntime",
        AbortReason::SensorStall => "SensorStall",
        AbortReason::Halt => "Halt",
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes
/// and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingMotor(name) => format!(
                "What happened: No {name} motor was provided to the gantry.\nLikely causes: The driver failed to initialize or was not wired into the builder.\nHow to fix: Check the [pins] section and the motor wiring, then retry."
            ),
            BuildError::MissingGripper => {
                "What happened: No gripper was provided to the gantry.\nLikely causes: Servo init failed or the builder was not given a gripper.\nHow to fix: Check the gripper pin and [gripper] settings.".to_string()
            }
            BuildError::MissingSampler => {
                "What happened: No pose sampler was provided to the gantry.\nLikely causes: Encoder chain bring-up failed before the sampler could start.\nHow to fix: Check the I2C bus and the [channels] addresses.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(me) = err.downcast_ref::<MotionError>() {
        if matches!(me, MotionError::Timeout) {
            return "What happened: A sensor read timed out.\nLikely causes: Encoder chain unpowered or mis-addressed, or the timeout is too low.\nHow to fix: Verify bus wiring and raise [timeouts].sample_ms.".to_string();
        }
        if let MotionError::Abort(reason) = me {
            return match reason {
                AbortReason::MaxRuntime => "What happened: A move exceeded its runtime cap.\nLikely causes: Stalled carriage, unreachable target, or speeds tuned too low.\nHow to fix: Check the mechanics; adjust [safety].max_move_ms or the axis tuning.".to_string(),
                AbortReason::SensorStall => "What happened: Position feedback stopped updating mid-move.\nLikely causes: Encoder chain or ADC fault, loose wiring, bus contention.\nHow to fix: Check the sampler fault in the log and the [channels] wiring; adjust [safety].sensor_stall_ms if the bus is merely slow.".to_string(),
                AbortReason::Halt => "What happened: The operator halted the move.\nLikely causes: Ctrl-C or the halt input.\nHow to fix: Nothing to fix; start a new move when ready.".to_string(),
            };
        }
        if let MotionError::Protocol(msg) = me {
            return format!(
                "What happened: Command session desynced ({msg}).\nLikely causes: Host or voice peripheral not responding, or baud mismatch.\nHow to fix: Check both serial links and the [session] settings, then retry the request."
            );
        }
        return format!(
            "What happened: {me}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    // String-based heuristics for errors coming from init or config; scan
    // the whole chain so wrap_err context doesn't hide the root cause.
    let msg = err
        .chain()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(": ");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("i2c") || lower.contains("encoder") {
        return "What happened: Encoder chain bring-up failed.\nLikely causes: Bus unpowered, wrong addresses in [channels], or another process holding the bus.\nHow to fix: Check wiring and addresses, then rerun.".to_string();
    }

    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration CSV. Expected 'raw,height'.".to_string();
    }

    format!(
        "Something went wrong.\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Map AbortReason (if present) to stable exit codes; non-abort errors
/// return 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(MotionError::Abort(reason)) = err.downcast_ref::<MotionError>() {
        return match reason {
            AbortReason::Halt => 2,
            AbortReason::MaxRuntime => 3,
            AbortReason::SensorStall => 4,
        };
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    if let Some(MotionError::Abort(reason)) = err.downcast_ref::<MotionError>() {
        return json!({
            "reason": abort_reason_name(reason),
            "message": humanize(err),
        })
        .to_string();
    }
    json!({ "reason": "Error", "message": humanize(err) }).to_string()
}
