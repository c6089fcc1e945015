#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and height calibration parsing for the gantry.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The height calibration CSV loader enforces headers and performs a robust
//!   refit to reduce outlier influence before slope/intercept estimation.
use serde::Deserialize;

/// Height calibration CSV schema.
///
/// Expected headers:
/// raw,height
///
/// Example:
/// raw,height
/// 120,0.360
/// 512,0.512
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CalibrationRow {
    pub raw: i64,
    pub height: f32,
}

/// Bus addresses and channel orientation for the encoder chain, plus the
/// ADC channel for the height sensor. Addresses are assigned at bring-up;
/// `*_terminates_chain` marks the last device so address propagation stops.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Channels {
    pub x1_address: u16,
    pub x2_address: u16,
    pub y_address: u16,
    pub x1_reversed: bool,
    pub x2_reversed: bool,
    pub y_reversed: bool,
    pub y_terminates_chain: bool,
    pub height_adc_channel: u8,
    /// Raw tick values above this are treated as zero-overshoot wraparound.
    pub overflow_limit: u16,
}

impl Default for Channels {
    fn default() -> Self {
        Self {
            x1_address: 0x20,
            x2_address: 0x22,
            y_address: 0x24,
            x1_reversed: false,
            x2_reversed: true,
            y_reversed: false,
            y_terminates_chain: true,
            height_adc_channel: 0,
            overflow_limit: 50_000,
        }
    }
}

/// BCM GPIO assignments for the drive outputs (hardware builds).
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Pins {
    pub x1_forward: u8,
    pub x1_reverse: u8,
    pub x2_forward: u8,
    pub x2_reverse: u8,
    pub y_forward: u8,
    pub y_reverse: u8,
    pub z_forward: u8,
    pub z_reverse: u8,
    /// Servo signal pin for the gripper.
    pub gripper: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            x1_forward: 5,
            x1_reverse: 6,
            x2_forward: 12,
            x2_reverse: 13,
            y_forward: 16,
            y_reverse: 19,
            z_forward: 20,
            z_reverse: 21,
            gripper: 18,
        }
    }
}

/// Grid-to-tick conversion pitches.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Geometry {
    /// Ticks of Y travel per column letter.
    pub column_pitch_ticks: i32,
    /// Ticks of X travel per row digit.
    pub row_pitch_ticks: i32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            column_pitch_ticks: 554,
            row_pitch_ticks: 208,
        }
    }
}

/// Per-axis PI tuning. Defaults are the single-motor Y axis values; the TOML
/// `[x_axis]` section overrides with the dual-motor tuning.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AxisTuning {
    /// Divisor applied to the tick error for the proportional term.
    pub proportional_divisor: f32,
    pub integral_gain: f32,
    /// Magnitudes below this snap up to it (static friction floor).
    pub lower_speed_bound: f32,
    /// Magnitudes above this clamp down to it (overshoot ceiling).
    pub upper_speed_bound: f32,
    pub coarse_tolerance_ticks: u16,
    pub fine_tolerance_ticks: u16,
    /// Fixed nudge speed for the fine phase.
    pub fine_speed: f32,
    pub coarse_settle_ms: u64,
    pub fine_settle_ms: u64,
    /// Dual-axis only: positions within this of each other need no
    /// lag compensation. Ignored for single-motor axes.
    pub sync_window_ticks: u16,
}

impl Default for AxisTuning {
    fn default() -> Self {
        Self {
            proportional_divisor: 6500.0,
            integral_gain: 0.001,
            lower_speed_bound: 0.09,
            upper_speed_bound: 0.10,
            coarse_tolerance_ticks: 20,
            fine_tolerance_ticks: 10,
            fine_speed: 0.04,
            coarse_settle_ms: 500,
            fine_settle_ms: 800,
            sync_window_ticks: 10,
        }
    }
}

impl AxisTuning {
    /// Dual-motor X axis defaults (two motors on a shared frame).
    pub fn dual_default() -> Self {
        Self {
            proportional_divisor: 2000.0,
            integral_gain: 0.001,
            lower_speed_bound: 0.06,
            upper_speed_bound: 0.8,
            coarse_tolerance_ticks: 9,
            fine_tolerance_ticks: 6,
            fine_speed: 0.05,
            coarse_settle_ms: 500,
            fine_settle_ms: 500,
            sync_window_ticks: 10,
        }
    }
}

/// Vertical axis bang-bang tuning. The height reading grows as the carriage
/// descends, so positive speeds descend and negative speeds ascend. Ascent
/// magnitudes are larger because lifting fights gravity.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VerticalTuning {
    pub up_height: f32,
    pub down_height: f32,
    /// Down moves converge here first before retargeting the true height.
    pub intermediate_down_height: f32,
    pub tolerance: f32,
    /// Fast/slow pulse pair while descending (positive), approach pass.
    pub approach_descend_fast: f32,
    pub approach_descend_slow: f32,
    /// Fast/slow pulse pair while ascending (negative), approach pass.
    pub approach_ascend_fast: f32,
    pub approach_ascend_slow: f32,
    pub refine_descend_fast: f32,
    pub refine_descend_slow: f32,
    pub refine_ascend_fast: f32,
    pub refine_ascend_slow: f32,
    /// Dwell at the fast speed before dropping to the slow speed.
    pub pulse_ms: u64,
    pub settle_ms: u64,
}

impl Default for VerticalTuning {
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
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GripperCfg {
    /// Servo travel fractions.
    pub open_fraction: f32,
    pub closed_fraction: f32,
    /// Dwell after reaching the lowered height before actuating the jaw.
    pub lower_dwell_ms: u64,
    /// Dwell after actuating the jaw before raising.
    pub grip_settle_ms: u64,
}

impl Default for GripperCfg {
    fn default() -> Self {
        Self {
            open_fraction: 0.43,
            closed_fraction: 0.87,
            lower_dwell_ms: 700,
            grip_settle_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SamplerCfg {
    /// Refresh period for the encoder/height sampler.
    pub period_ms: u64,
}

impl Default for SamplerCfg {
    fn default() -> Self {
        Self { period_ms: 3 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Max sensor wait per bus read (ms).
    #[serde(alias = "sensor_ms")]
    pub sample_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { sample_ms: 50 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Safety {
    /// Hard cap on a single axis move in milliseconds (0 disables).
    pub max_move_ms: u64,
    /// Abort if the sampler produces no fresh reading for this long.
    pub sensor_stall_ms: u64,
}

impl Default for Safety {
    fn default() -> Self {
        Self {
            max_move_ms: 60_000,
            sensor_stall_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Command-session protocol knobs (voice peripheral + host link).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionCfg {
    /// Interval between wake bytes while waiting for the peripheral.
    pub wake_retry_ms: u64,
    /// Bound on every acknowledgment wait; expiry yields a protocol error.
    pub token_timeout_ms: u64,
    /// Recognition retries per token before giving up.
    pub max_token_retries: u32,
    /// Wordset selector for column-letter recognition.
    pub word_set: u8,
    /// Wordset selector for row-number recognition.
    pub number_set: u8,
    /// Serial device for the host link (hardware builds).
    pub host_device: Option<String>,
    /// Serial device for the voice peripheral (hardware builds).
    pub voice_device: Option<String>,
    /// Baud rate for both serial links.
    pub baud_rate: u32,
}

impl Default for SessionCfg {
    fn default() -> Self {
        Self {
            wake_retry_ms: 200,
            token_timeout_ms: 10_000,
            max_token_retries: 8,
            word_set: b'C',
            number_set: b'D',
            host_device: None,
            voice_device: None,
            baud_rate: 9_600,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub channels: Channels,
    pub pins: Pins,
    pub geometry: Geometry,
    #[serde(default = "AxisTuning::dual_default")]
    pub x_axis: AxisTuning,
    pub y_axis: AxisTuning,
    pub vertical: VerticalTuning,
    pub gripper: GripperCfg,
    pub sampler: SamplerCfg,
    pub timeouts: Timeouts,
    pub safety: Safety,
    pub logging: Logging,
    pub session: SessionCfg,
    /// Optional persisted height calibration; a CSV passed on the command
    /// line takes precedence.
    pub calibration: Option<PersistedCalibration>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct PersistedCalibration {
    /// Height units per raw ADC count.
    pub gain_per_count: f32,
    /// Raw count at height zero.
    pub zero_counts: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channels: Channels::default(),
            pins: Pins::default(),
            geometry: Geometry::default(),
            x_axis: AxisTuning::dual_default(),
            y_axis: AxisTuning::default(),
            vertical: VerticalTuning::default(),
            gripper: GripperCfg::default(),
            sampler: SamplerCfg::default(),
            timeouts: Timeouts::default(),
            safety: Safety::default(),
            logging: Logging::default(),
            session: SessionCfg::default(),
            calibration: None,
        }
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        for (name, axis) in [("x_axis", &self.x_axis), ("y_axis", &self.y_axis)] {
            if axis.proportional_divisor <= 0.0 {
                eyre::bail!("{name}.proportional_divisor must be > 0");
            }
            if axis.integral_gain < 0.0 {
                eyre::bail!("{name}.integral_gain must be >= 0");
            }
            if !(axis.lower_speed_bound > 0.0 && axis.lower_speed_bound <= 1.0) {
                eyre::bail!("{name}.lower_speed_bound must be in (0, 1]");
            }
            if !(axis.upper_speed_bound > 0.0 && axis.upper_speed_bound <= 1.0) {
                eyre::bail!("{name}.upper_speed_bound must be in (0, 1]");
            }
            if axis.lower_speed_bound > axis.upper_speed_bound {
                eyre::bail!("{name}.lower_speed_bound must not exceed upper_speed_bound");
            }
            if axis.fine_tolerance_ticks == 0 {
                eyre::bail!("{name}.fine_tolerance_ticks must be >= 1");
            }
            if axis.fine_tolerance_ticks > axis.coarse_tolerance_ticks {
                eyre::bail!("{name}.fine_tolerance_ticks must not exceed coarse_tolerance_ticks");
            }
            if !(axis.fine_speed > 0.0 && axis.fine_speed <= 1.0) {
                eyre::bail!("{name}.fine_speed must be in (0, 1]");
            }
        }

        if self.geometry.column_pitch_ticks <= 0 {
            eyre::bail!("geometry.column_pitch_ticks must be > 0");
        }
        if self.geometry.row_pitch_ticks <= 0 {
            eyre::bail!("geometry.row_pitch_ticks must be > 0");
        }

        let v = &self.vertical;
        if !(v.tolerance > 0.0) {
            eyre::bail!("vertical.tolerance must be > 0");
        }
        if v.up_height >= v.down_height {
            eyre::bail!("vertical.up_height must be below down_height (sensor grows downward)");
        }
        if !(v.intermediate_down_height > v.up_height && v.intermediate_down_height < v.down_height)
        {
            eyre::bail!("vertical.intermediate_down_height must lie between up and down heights");
        }
        for (name, s) in [
            ("approach_descend_fast", v.approach_descend_fast),
            ("approach_descend_slow", v.approach_descend_slow),
            ("refine_descend_fast", v.refine_descend_fast),
            ("refine_descend_slow", v.refine_descend_slow),
        ] {
            if !(s > 0.0 && s <= 1.0) {
                eyre::bail!("vertical.{name} must be in (0, 1]");
            }
        }
        for (name, s) in [
            ("approach_ascend_fast", v.approach_ascend_fast),
            ("approach_ascend_slow", v.approach_ascend_slow),
            ("refine_ascend_fast", v.refine_ascend_fast),
            ("refine_ascend_slow", v.refine_ascend_slow),
        ] {
            if !(s < 0.0 && s >= -1.0) {
                eyre::bail!("vertical.{name} must be in [-1, 0)");
            }
        }
        if v.pulse_ms == 0 {
            eyre::bail!("vertical.pulse_ms must be >= 1");
        }

        let g = &self.gripper;
        if !(0.0..=1.0).contains(&g.open_fraction) || !(0.0..=1.0).contains(&g.closed_fraction) {
            eyre::bail!("gripper fractions must be in [0, 1]");
        }

        if self.sampler.period_ms == 0 {
            eyre::bail!("sampler.period_ms must be >= 1");
        }
        if self.timeouts.sample_ms == 0 {
            eyre::bail!("timeouts.sample_ms must be >= 1");
        }
        if self.safety.sensor_stall_ms == 0 {
            eyre::bail!("safety.sensor_stall_ms must be >= 1");
        }
        if self.channels.overflow_limit == 0 {
            eyre::bail!("channels.overflow_limit must be >= 1");
        }

        let s = &self.session;
        if s.token_timeout_ms == 0 {
            eyre::bail!("session.token_timeout_ms must be >= 1");
        }
        if s.max_token_retries == 0 {
            eyre::bail!("session.max_token_retries must be >= 1");
        }

        Ok(())
    }
}

// ── Height calibration ───────────────────────────────────────────────────────

/// Linear model mapping raw ADC counts to normalized height.
#[derive(Debug)]
pub struct HeightCalibration {
    pub zero_counts: i32,
    pub gain_per_count: f32,
}

impl HeightCalibration {
    /// Fit `height = a*raw + b` by ordinary least squares, reject residual
    /// outliers beyond 2 sigma, refit over the inliers, then convert to the
    /// core form `height = a * (raw - zero_counts)`.
    pub fn from_rows(rows: Vec<CalibrationRow>) -> eyre::Result<Self> {
        if rows.len() < 2 {
            eyre::bail!("calibration requires at least two rows, got {}", rows.len());
        }
        for i in 1..rows.len() {
            if rows[i].raw == rows[i - 1].raw {
                eyre::bail!("calibration rows have duplicate raw values at index {}", i);
            }
        }

        let pts: Vec<(i64, f32)> = rows.iter().map(|r| (r.raw, r.height)).collect();
        let (a0, b0) = ols_fit(&pts)?;

        let mut sumsq = 0.0f64;
        for (x, y) in &pts {
            let r = f64::from(*y) - (a0 * (*x as f64) + b0);
            sumsq += r * r;
        }
        let rms = (sumsq / pts.len() as f64).sqrt();
        let (a, b) = refit_without_outliers(&pts, a0, b0, rms, 2.0).unwrap_or((a0, b0));

        let zero = -b / a;
        if !zero.is_finite() {
            eyre::bail!("calibration produced invalid zero baseline");
        }
        Ok(Self {
            zero_counts: zero.round() as i32,
            gain_per_count: a as f32,
        })
    }
}

fn ols_fit(pts: &[(i64, f32)]) -> eyre::Result<(f64, f64)> {
    let n = pts.len() as f64;
    let mean_x: f64 = pts.iter().map(|p| p.0 as f64).sum::<f64>() / n;
    let mean_y: f64 = pts.iter().map(|p| f64::from(p.1)).sum::<f64>() / n;
    let mut sxx = 0.0f64;
    let mut sxy = 0.0f64;
    for (rx, hy) in pts {
        let x = *rx as f64 - mean_x;
        let y = f64::from(*hy) - mean_y;
        sxx += x * x;
        sxy += x * y;
    }
    if !sxx.is_finite() || sxx == 0.0 {
        eyre::bail!("calibration cannot determine slope (degenerate X variance)");
    }
    let a = sxy / sxx;
    if !a.is_finite() || a == 0.0 {
        eyre::bail!("calibration produced an unusable slope");
    }
    Ok((a, mean_y - a * mean_x))
}

/// Refit over inliers only (|residual| <= k*rms around the initial line).
/// Returns None when the refit is not applicable; callers keep (a0, b0).
fn refit_without_outliers(
    pts: &[(i64, f32)],
    a0: f64,
    b0: f64,
    rms: f64,
    k: f64,
) -> Option<(f64, f64)> {
    if !(rms.is_finite() && rms > 0.0) || pts.len() < 2 {
        return None;
    }
    let thr = k * rms;
    let inliers: Vec<(i64, f32)> = pts
        .iter()
        .copied()
        .filter(|(x, y)| (f64::from(*y) - (a0 * (*x as f64) + b0)).abs() <= thr)
        .collect();
    if inliers.len() < 2 || inliers.len() == pts.len() {
        return None;
    }
    ols_fit(&inliers).ok()
}

pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<HeightCalibration> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != ["raw", "height"] {
        eyre::bail!(
            "calibration CSV must have headers 'raw,height', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        }
    }
    HeightCalibration::from_rows(rows)
}
