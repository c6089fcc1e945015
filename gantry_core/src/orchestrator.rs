//! Move orchestration: sequencing axes, gripper, and watchdogs into whole
//! pick-and-place transfers.
//!
//! A transfer is strictly sequential: the dual X axis positions first, then
//! Y, then the vertical drop, the jaw, and the lift. Only one controller is
//! ever stepping at a time, which is what lets the per-field pose snapshots
//! get away without cross-field consistency.

use std::sync::Arc;
use std::time::Duration;

use gantry_traits::clock::{Clock, MonotonicClock};
use gantry_traits::{Gripper, GripperState, Motor};

use crate::axis::AxisController;
use crate::config::{
    AxisCfg, DualAxisCfg, GeometryCfg, GripperTiming, SafetyCfg, VerticalCfg,
};
use crate::dual::DualAxisController;
use crate::error::{AbortReason, BuildError, MotionError, Result};
use crate::grid::{GridCoordinate, MoveCommand};
use crate::sampler::PoseSampler;
use crate::status::MotionStatus;
use crate::vertical::VerticalController;

type BoxMotor = Box<dyn Motor + Send>;

/// The assembled machine. Owns every actuator and the pose sampler.
pub struct Gantry {
    x: DualAxisController<BoxMotor, BoxMotor>,
    y: AxisController<BoxMotor>,
    z: VerticalController<BoxMotor>,
    gripper: Box<dyn Gripper + Send>,
    sampler: PoseSampler,
    geometry: GeometryCfg,
    vertical: VerticalCfg,
    timing: GripperTiming,
    safety: SafetyCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    halt_check: Option<Box<dyn Fn() -> bool + Send + Sync>>,
}

impl Gantry {
    pub fn builder() -> GantryBuilder {
        GantryBuilder::default()
    }

    /// Raise the carriage and open the jaw so the workspace is clear.
    pub fn home(&mut self) -> Result<()> {
        tracing::info!("homing: raising carriage, opening jaw");
        self.run_vertical(self.vertical.up_height)?;
        self.set_jaw(GripperState::Open)?;
        Ok(())
    }

    /// Execute one full transfer: position over the source square, pick,
    /// position over the destination, place.
    pub fn transfer(&mut self, mv: &MoveCommand) -> Result<()> {
        tracing::info!(%mv, "transfer start");
        self.goto_square(&mv.from)?;
        self.pick()?;
        self.goto_square(&mv.to)?;
        self.place()?;
        tracing::info!(%mv, "transfer complete");
        Ok(())
    }

    /// Latest pose, straight from the sampler.
    pub fn pose(&self) -> crate::sampler::PoseSnapshot {
        self.sampler.snapshot()
    }

    /// Best-effort stop of every motor.
    pub fn stop_all(&mut self) {
        if let Err(e) = self.x.motors_stop() {
            tracing::warn!(error = %e, "x motors failed to stop");
        }
        if let Err(e) = self.y.motor_stop() {
            tracing::warn!(error = %e, "y motor failed to stop");
        }
        if let Err(e) = self.z.motor_stop() {
            tracing::warn!(error = %e, "z motor failed to stop");
        }
    }

    fn goto_square(&mut self, square: &GridCoordinate) -> Result<()> {
        let x_target = square.x_ticks(&self.geometry);
        let y_target = square.y_ticks(&self.geometry);
        tracing::debug!(%square, x_target, y_target, "positioning");
        self.run_x(x_target)?;
        self.run_y(y_target)?;
        Ok(())
    }

    /// Lower, grab, lift.
    fn pick(&mut self) -> Result<()> {
        self.run_vertical(self.vertical.down_height)?;
        self.dwell(self.timing.lower_dwell_ms);
        self.set_jaw(GripperState::Closed)?;
        self.dwell(self.timing.grip_settle_ms);
        self.run_vertical(self.vertical.up_height)
    }

    /// Lower, release, lift.
    fn place(&mut self) -> Result<()> {
        self.run_vertical(self.vertical.down_height)?;
        self.dwell(self.timing.lower_dwell_ms);
        self.set_jaw(GripperState::Open)?;
        self.dwell(self.timing.grip_settle_ms);
        self.run_vertical(self.vertical.up_height)
    }

    fn run_x(&mut self, target: i32) -> Result<()> {
        self.x.begin(target);
        let start = self.clock.now();
        loop {
            self.check_guards(start)?;
            let pose = self.sampler.snapshot();
            match self.x.step_from_ticks(pose.x1, pose.x2)? {
                MotionStatus::Running => continue,
                MotionStatus::Complete => return Ok(()),
                MotionStatus::Aborted(e) => {
                    self.stop_all();
                    return Err(eyre::Report::new(e));
                }
            }
        }
    }

    fn run_y(&mut self, target: i32) -> Result<()> {
        self.y.begin(target);
        let start = self.clock.now();
        loop {
            self.check_guards(start)?;
            let pose = self.sampler.snapshot();
            match self.y.step_from_ticks(pose.y)? {
                MotionStatus::Running => continue,
                MotionStatus::Complete => return Ok(()),
                MotionStatus::Aborted(e) => {
                    self.stop_all();
                    return Err(eyre::Report::new(e));
                }
            }
        }
    }

    fn run_vertical(&mut self, target: f32) -> Result<()> {
        self.z.begin(target);
        let start = self.clock.now();
        loop {
            self.check_guards(start)?;
            let pose = self.sampler.snapshot();
            match self.z.step_from_height(pose.height)? {
                MotionStatus::Running => continue,
                MotionStatus::Complete => return Ok(()),
                MotionStatus::Aborted(e) => {
                    self.stop_all();
                    return Err(eyre::Report::new(e));
                }
            }
        }
    }

    /// Shared per-iteration guards: operator halt and stalled feedback. The
    /// stall check arms only once the move has run past the threshold so a
    /// sampler that has not completed its first pass cannot trip it.
    fn check_guards(&mut self, move_start: std::time::Instant) -> Result<()> {
        let halted = self.halt_check.as_ref().is_some_and(|chk| chk());
        if halted {
            self.stop_all();
            return Err(eyre::Report::new(MotionError::Abort(AbortReason::Halt)));
        }

        if let Some(fault) = self.sampler.take_fault() {
            tracing::warn!(source = fault.source, message = %fault.message, "sensor fault");
        }

        let elapsed = self.clock.ms_since(move_start);
        if elapsed >= self.safety.sensor_stall_ms
            && self.sampler.staleness_ms() > self.safety.sensor_stall_ms
        {
            self.stop_all();
            return Err(eyre::Report::new(MotionError::Abort(
                AbortReason::SensorStall,
            )));
        }
        Ok(())
    }

    fn set_jaw(&mut self, state: GripperState) -> Result<()> {
        tracing::debug!(?state, "jaw");
        self.gripper
            .set_state(state)
            .map_err(|e| eyre::Report::new(MotionError::Hardware(e.to_string())))
    }

    fn dwell(&self, ms: u64) {
        self.clock.sleep(Duration::from_millis(ms));
    }
}

/// Builder for `Gantry`. All devices are required; configs fall back to
/// defaults. `try_build` reports the first missing piece.
#[derive(Default)]
pub struct GantryBuilder {
    x1: Option<BoxMotor>,
    x2: Option<BoxMotor>,
    y: Option<BoxMotor>,
    z: Option<BoxMotor>,
    gripper: Option<Box<dyn Gripper + Send>>,
    sampler: Option<PoseSampler>,
    x_cfg: Option<DualAxisCfg>,
    y_cfg: Option<AxisCfg>,
    vertical_cfg: Option<VerticalCfg>,
    geometry: Option<GeometryCfg>,
    timing: Option<GripperTiming>,
    safety: Option<SafetyCfg>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    halt_check: Option<Box<dyn Fn() -> bool + Send + Sync>>,
}

impl GantryBuilder {
    pub fn with_x_motors(
        mut self,
        left: impl Motor + Send + 'static,
        right: impl Motor + Send + 'static,
    ) -> Self {
        self.x1 = Some(Box::new(left));
        self.x2 = Some(Box::new(right));
        self
    }

    pub fn with_y_motor(mut self, motor: impl Motor + Send + 'static) -> Self {
        self.y = Some(Box::new(motor));
        self
    }

    pub fn with_z_motor(mut self, motor: impl Motor + Send + 'static) -> Self {
        self.z = Some(Box::new(motor));
        self
    }

    pub fn with_gripper(mut self, gripper: impl Gripper + Send + 'static) -> Self {
        self.gripper = Some(Box::new(gripper));
        self
    }

    pub fn with_sampler(mut self, sampler: PoseSampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn with_x_cfg(mut self, cfg: DualAxisCfg) -> Self {
        self.x_cfg = Some(cfg);
        self
    }

    pub fn with_y_cfg(mut self, cfg: AxisCfg) -> Self {
        self.y_cfg = Some(cfg);
        self
    }

    pub fn with_vertical_cfg(mut self, cfg: VerticalCfg) -> Self {
        self.vertical_cfg = Some(cfg);
        self
    }

    pub fn with_geometry(mut self, geometry: GeometryCfg) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_gripper_timing(mut self, timing: GripperTiming) -> Self {
        self.timing = Some(timing);
        self
    }

    pub fn with_safety(mut self, safety: SafetyCfg) -> Self {
        self.safety = Some(safety);
        self
    }

    /// Custom clock; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Polled before every controller step; `true` aborts the move.
    pub fn with_halt_check<F>(mut self, f: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.halt_check = Some(Box::new(f));
        self
    }

    pub fn try_build(self) -> Result<Gantry> {
        let x1 = self
            .x1
            .ok_or_else(|| eyre::Report::new(BuildError::MissingMotor("x1")))?;
        let x2 = self
            .x2
            .ok_or_else(|| eyre::Report::new(BuildError::MissingMotor("x2")))?;
        let y = self
            .y
            .ok_or_else(|| eyre::Report::new(BuildError::MissingMotor("y")))?;
        let z = self
            .z
            .ok_or_else(|| eyre::Report::new(BuildError::MissingMotor("z")))?;
        let gripper = self
            .gripper
            .ok_or_else(|| eyre::Report::new(BuildError::MissingGripper))?;
        let sampler = self
            .sampler
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSampler))?;

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let vertical = self.vertical_cfg.unwrap_or_default();

        Ok(Gantry {
            x: DualAxisController::new(x1, x2, self.x_cfg.unwrap_or_default(), clock.clone()),
            y: AxisController::new(y, self.y_cfg.unwrap_or_default(), clock.clone()),
            z: VerticalController::new(z, vertical.clone(), clock.clone()),
            gripper,
            sampler,
            geometry: self.geometry.unwrap_or_default(),
            vertical,
            timing: self.timing.unwrap_or_default(),
            safety: self.safety.unwrap_or_default(),
            clock,
            halt_check: self.halt_check,
        })
    }
}
