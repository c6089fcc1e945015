//! Runtime configuration structs for the motion controllers.
//!
//! These are the in-memory tuning structs consumed by the controllers. They
//! are separate from the TOML-deserialized schema in `gantry_config`; the
//! `conversions` module bridges the two. Every magic number from the tuning
//! sessions lives here under a name.

/// PI tuning and phase tolerances for one horizontal axis.
#[derive(Debug, Clone)]
pub struct AxisCfg {
    /// Divisor applied to the tick error for the proportional term.
    pub proportional_divisor: f32,
    /// Integral gain (per accumulated tick-millisecond of error).
    pub integral_gain: f32,
    /// Static-friction floor: smaller magnitudes snap up to this.
    pub lower_speed_bound: f32,
    /// Overshoot ceiling: larger magnitudes clamp down to this.
    pub upper_speed_bound: f32,
    /// Coarse phase exits once |error| falls inside this band.
    pub coarse_tolerance: i32,
    /// Fine phase exits (move complete) inside this band.
    pub fine_tolerance: i32,
    /// Fixed nudge magnitude for the fine phase.
    pub fine_speed: f32,
    /// Pacing sleep per coarse iteration (bounds the sampler's relative
    /// refresh rate; not needed for correctness).
    pub coarse_period_us: u64,
    /// Pacing sleep per fine iteration.
    pub fine_period_us: u64,
    pub coarse_settle_ms: u64,
    pub fine_settle_ms: u64,
    /// Hard cap on one move (0 disables).
    pub max_move_ms: u64,
}

impl Default for AxisCfg {
    /// Single-motor Y axis tuning.
    fn default() -> Self {
        Self {
            proportional_divisor: 6500.0,
            integral_gain: 0.001,
            lower_speed_bound: 0.09,
            upper_speed_bound: 0.10,
            coarse_tolerance: 20,
            fine_tolerance: 10,
            fine_speed: 0.04,
            coarse_period_us: 1_000,
            fine_period_us: 1_000,
            coarse_settle_ms: 500,
            fine_settle_ms: 800,
            max_move_ms: 60_000,
        }
    }
}

/// Dual-motor axis tuning: per-motor PI plus the synchronization window.
#[derive(Debug, Clone)]
pub struct DualAxisCfg {
    pub axis: AxisCfg,
    /// Positions within this many ticks of each other need no lag
    /// compensation; beyond it the leading motor runs at half speed.
    pub sync_window: i32,
}

impl Default for DualAxisCfg {
    fn default() -> Self {
        Self {
            axis: AxisCfg {
                proportional_divisor: 2000.0,
                integral_gain: 0.001,
                lower_speed_bound: 0.06,
                upper_speed_bound: 0.8,
                coarse_tolerance: 9,
                fine_tolerance: 6,
                fine_speed: 0.05,
                coarse_period_us: 1_000,
                fine_period_us: 5_000,
                coarse_settle_ms: 500,
                fine_settle_ms: 500,
                max_move_ms: 60_000,
            },
            sync_window: 10,
        }
    }
}

/// Vertical axis bang-bang tuning. The height sensor reads larger as the
/// carriage descends, so positive speeds descend and negative speeds ascend.
/// Ascent magnitudes are larger because lifting fights gravity.
#[derive(Debug, Clone)]
pub struct VerticalCfg {
    pub up_height: f32,
    pub down_height: f32,
    /// Down moves converge here first, then retarget the true height; this
    /// compensates a sensor/actuator asymmetry in the downward direction.
    pub intermediate_down_height: f32,
    pub tolerance: f32,
    pub approach_descend_fast: f32,
    pub approach_descend_slow: f32,
    pub approach_ascend_fast: f32,
    pub approach_ascend_slow: f32,
    pub refine_descend_fast: f32,
    pub refine_descend_slow: f32,
    pub refine_ascend_fast: f32,
    pub refine_ascend_slow: f32,
    /// Dwell at the fast speed before dropping to the slow speed.
    pub pulse_ms: u64,
    /// Settle between the approach and refine passes.
    pub settle_ms: u64,
    /// Hard cap on one vertical move (0 disables).
    pub max_move_ms: u64,
}

impl Default for VerticalCfg {
    fn default() -> Self {
        Self {
            up_height: 0.36,
            down_height: 0.512,
            intermediate_down_height: 0.47,
            tolerance: 0.01,
            approach_descend_fast: 0.025,
            approach_descend_slow: 0.015,
            approach_ascend_fast: -0.16,
            approach_ascend_slow: -0.08,
            refine_descend_fast: 0.02,
            refine_descend_slow: 0.01,
            refine_ascend_fast: -0.10,
            refine_ascend_slow: -0.05,
            pulse_ms: 20,
            settle_ms: 500,
            max_move_ms: 60_000,
        }
    }
}

/// Grid-to-tick conversion pitches.
#[derive(Debug, Clone, Copy)]
pub struct GeometryCfg {
    /// Ticks of Y travel per column letter.
    pub column_pitch_ticks: i32,
    /// Ticks of X travel per row digit.
    pub row_pitch_ticks: i32,
}

impl Default for GeometryCfg {
    fn default() -> Self {
        Self {
            column_pitch_ticks: 554,
            row_pitch_ticks: 208,
        }
    }
}

/// Dwell times bracketing gripper actuation during a transfer.
#[derive(Debug, Clone, Copy)]
pub struct GripperTiming {
    /// After reaching the lowered height, before actuating the jaw.
    pub lower_dwell_ms: u64,
    /// After actuating the jaw, before raising.
    pub grip_settle_ms: u64,
}

impl Default for GripperTiming {
    fn default() -> Self {
        Self {
            lower_dwell_ms: 700,
            grip_settle_ms: 500,
        }
    }
}

/// Watchdogs applied by the orchestrator around the controllers.
#[derive(Debug, Clone, Copy)]
pub struct SafetyCfg {
    /// Abort a move when the sampler produces no fresh pose for this long.
    pub sensor_stall_ms: u64,
}

impl Default for SafetyCfg {
    fn default() -> Self {
        Self {
            sensor_stall_ms: 500,
        }
    }
}

/// Timeouts for individual sensor transactions.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Max wait per bus read (ms).
    pub sensor_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { sensor_ms: 50 }
    }
}

/// Command-session protocol knobs.
#[derive(Debug, Clone)]
pub struct SessionCfg {
    pub wake_retry_ms: u64,
    /// Bound on every acknowledgment wait; expiry is a protocol error.
    pub token_timeout_ms: u64,
    /// Recognition retries per token before giving up.
    pub max_token_retries: u32,
    /// Wordset selector byte for column-letter recognition.
    pub word_set: u8,
    /// Wordset selector byte for row-number recognition.
    pub number_set: u8,
}

impl Default for SessionCfg {
    fn default() -> Self {
        Self {
            wake_retry_ms: 200,
            token_timeout_ms: 10_000,
            max_token_retries: 8,
            word_set: b'C',
            number_set: b'D',
        }
    }
}
