//! `From` implementations bridging `gantry_config` types to `gantry_core` types.
//!
//! These eliminate manual field-by-field mapping in the CLI. Loop pacing and
//! the per-move runtime cap are not part of the TOML tuning schema; pacing
//! keeps the core defaults and callers merge `[safety].max_move_ms` after
//! conversion.

use crate::channel::HeightScale;
use crate::config::{
    AxisCfg, DualAxisCfg, GeometryCfg, GripperTiming, SafetyCfg, SessionCfg, Timeouts,
    VerticalCfg,
};

/// Full-scale count of the 10-bit height ADC, whose driver normalizes raw
/// counts to [0, 1] before calibration applies.
const ADC_FULL_SCALE: f32 = 1023.0;

// ── AxisCfg ──────────────────────────────────────────────────────────────────

impl From<&gantry_config::AxisTuning> for AxisCfg {
    fn from(c: &gantry_config::AxisTuning) -> Self {
        Self {
            proportional_divisor: c.proportional_divisor,
            integral_gain: c.integral_gain,
            lower_speed_bound: c.lower_speed_bound,
            upper_speed_bound: c.upper_speed_bound,
            coarse_tolerance: i32::from(c.coarse_tolerance_ticks),
            fine_tolerance: i32::from(c.fine_tolerance_ticks),
            fine_speed: c.fine_speed,
            coarse_settle_ms: c.coarse_settle_ms,
            fine_settle_ms: c.fine_settle_ms,
            ..Self::default()
        }
    }
}

impl From<&gantry_config::AxisTuning> for DualAxisCfg {
    fn from(c: &gantry_config::AxisTuning) -> Self {
        let dual_pacing = Self::default().axis;
        Self {
            axis: AxisCfg {
                coarse_period_us: dual_pacing.coarse_period_us,
                fine_period_us: dual_pacing.fine_period_us,
                ..AxisCfg::from(c)
            },
            sync_window: i32::from(c.sync_window_ticks),
        }
    }
}

// ── VerticalCfg ──────────────────────────────────────────────────────────────

impl From<&gantry_config::VerticalTuning> for VerticalCfg {
    fn from(c: &gantry_config::VerticalTuning) -> Self {
        Self {
            up_height: c.up_height,
            down_height: c.down_height,
            intermediate_down_height: c.intermediate_down_height,
            tolerance: c.tolerance,
            approach_descend_fast: c.approach_descend_fast,
            approach_descend_slow: c.approach_descend_slow,
            approach_ascend_fast: c.approach_ascend_fast,
            approach_ascend_slow: c.approach_ascend_slow,
            refine_descend_fast: c.refine_descend_fast,
            refine_descend_slow: c.refine_descend_slow,
            refine_ascend_fast: c.refine_ascend_fast,
            refine_ascend_slow: c.refine_ascend_slow,
            pulse_ms: c.pulse_ms,
            settle_ms: c.settle_ms,
            ..Self::default()
        }
    }
}

// ── GeometryCfg ──────────────────────────────────────────────────────────────

impl From<&gantry_config::Geometry> for GeometryCfg {
    fn from(c: &gantry_config::Geometry) -> Self {
        Self {
            column_pitch_ticks: c.column_pitch_ticks,
            row_pitch_ticks: c.row_pitch_ticks,
        }
    }
}

// ── GripperTiming ────────────────────────────────────────────────────────────

impl From<&gantry_config::GripperCfg> for GripperTiming {
    fn from(c: &gantry_config::GripperCfg) -> Self {
        Self {
            lower_dwell_ms: c.lower_dwell_ms,
            grip_settle_ms: c.grip_settle_ms,
        }
    }
}

// ── SafetyCfg ────────────────────────────────────────────────────────────────

impl From<&gantry_config::Safety> for SafetyCfg {
    fn from(c: &gantry_config::Safety) -> Self {
        Self {
            sensor_stall_ms: c.sensor_stall_ms,
        }
    }
}

// ── Timeouts ─────────────────────────────────────────────────────────────────

impl From<&gantry_config::Timeouts> for Timeouts {
    fn from(c: &gantry_config::Timeouts) -> Self {
        Self {
            sensor_ms: c.sample_ms,
        }
    }
}

// ── SessionCfg ───────────────────────────────────────────────────────────────

impl From<&gantry_config::SessionCfg> for SessionCfg {
    fn from(c: &gantry_config::SessionCfg) -> Self {
        Self {
            wake_retry_ms: c.wake_retry_ms,
            token_timeout_ms: c.token_timeout_ms,
            max_token_retries: c.max_token_retries,
            word_set: c.word_set,
            number_set: c.number_set,
        }
    }
}

// ── HeightScale ──────────────────────────────────────────────────────────────

impl From<&gantry_config::PersistedCalibration> for HeightScale {
    fn from(c: &gantry_config::PersistedCalibration) -> Self {
        Self {
            gain: c.gain_per_count * ADC_FULL_SCALE,
            offset: c.zero_counts as f32 / ADC_FULL_SCALE,
        }
    }
}

impl From<&gantry_config::HeightCalibration> for HeightScale {
    fn from(c: &gantry_config::HeightCalibration) -> Self {
        Self {
            gain: c.gain_per_count * ADC_FULL_SCALE,
            offset: c.zero_counts as f32 / ADC_FULL_SCALE,
        }
    }
}
