//! Vertical axis controller (analog height feedback, no encoder).
//!
//! Two-speed bang-bang rather than PI: each iteration commands a fast pulse
//! in the direction of the target, then immediately drops to a slow speed,
//! which keeps approach momentum low without a tuned loop. Down moves first
//! converge on an intermediate height before retargeting the requested one,
//! compensating the sensor/actuator asymmetry in the downward direction; the
//! second (refine) pass uses gentler speed constants.

use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::WrapErr;
use gantry_traits::Motor;
use gantry_traits::clock::Clock;

use crate::config::VerticalCfg;
use crate::error::{AbortReason, MotionError, Result};
use crate::hw_error::map_hw_error;
use crate::status::MotionStatus;

/// Externally observable stage, mostly for tests and telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalStage {
    Approach,
    Settle,
    Refine,
    Done,
}

pub struct VerticalController<M: Motor> {
    motor: M,
    cfg: VerticalCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
    /// Target for the approach pass (intermediate height on down moves).
    approach_target: f32,
    /// True requested height, used by the refine pass.
    final_target: f32,
    stage: VerticalStage,
    settle_until_ms: u64,
    start_ms: u64,
    last_height: f32,
}

impl<M: Motor> VerticalController<M> {
    pub fn new(motor: M, cfg: VerticalCfg, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let epoch = clock.now();
        Self {
            motor,
            cfg,
            clock,
            epoch,
            approach_target: 0.0,
            final_target: 0.0,
            stage: VerticalStage::Done,
            settle_until_ms: 0,
            start_ms: 0,
            last_height: 0.0,
        }
    }

    /// Arm a move to `target` height. Requests for the nominal down height
    /// substitute the intermediate target for the approach pass.
    pub fn begin(&mut self, target: f32) {
        self.final_target = target;
        self.approach_target = if (target - self.cfg.down_height).abs() < f32::EPSILON {
            self.cfg.intermediate_down_height
        } else {
            target
        };
        self.stage = VerticalStage::Approach;
        self.start_ms = self.clock.ms_since(self.epoch);
        tracing::debug!(
            target,
            approach_target = self.approach_target,
            "vertical move start"
        );
    }

    pub fn stage(&self) -> VerticalStage {
        self.stage
    }

    pub fn last_height(&self) -> f32 {
        self.last_height
    }

    pub fn motor_stop(&mut self) -> Result<()> {
        self.motor
            .stop()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("vertical motor stop")
    }

    /// One control iteration from a pre-sampled height reading.
    pub fn step_from_height(&mut self, height: f32) -> Result<MotionStatus> {
        self.last_height = height;
        let now = self.clock.ms_since(self.epoch);

        if self.cfg.max_move_ms > 0
            && self.stage != VerticalStage::Done
            && now.saturating_sub(self.start_ms) >= self.cfg.max_move_ms
        {
            if let Err(e) = self.motor_stop() {
                tracing::warn!(error = %e, "motor stop failed on max-move cap");
            }
            return Ok(MotionStatus::Aborted(MotionError::Abort(
                AbortReason::MaxRuntime,
            )));
        }

        match self.stage {
            VerticalStage::Approach => {
                if (height - self.approach_target).abs() < self.cfg.tolerance {
                    // The motor is left at its last slow speed through the
                    // settle, matching the observed plant behavior; only the
                    // refine pass commands zero at the end.
                    self.stage = VerticalStage::Settle;
                    self.settle_until_ms = now + self.cfg.settle_ms;
                    tracing::debug!(height, "vertical approach converged");
                } else {
                    self.pulse(
                        height < self.approach_target,
                        self.cfg.approach_descend_fast,
                        self.cfg.approach_descend_slow,
                        self.cfg.approach_ascend_fast,
                        self.cfg.approach_ascend_slow,
                    )?;
                }
                Ok(MotionStatus::Running)
            }
            VerticalStage::Settle => {
                if now >= self.settle_until_ms {
                    self.stage = VerticalStage::Refine;
                } else {
                    self.clock.sleep(Duration::from_millis(1));
                }
                Ok(MotionStatus::Running)
            }
            VerticalStage::Refine => {
                if (height - self.final_target).abs() < self.cfg.tolerance {
                    self.motor_stop()?;
                    self.stage = VerticalStage::Done;
                    tracing::info!(height, target = self.final_target, "vertical move complete");
                    return Ok(MotionStatus::Complete);
                }
                self.pulse(
                    height < self.final_target,
                    self.cfg.refine_descend_fast,
                    self.cfg.refine_descend_slow,
                    self.cfg.refine_ascend_fast,
                    self.cfg.refine_ascend_slow,
                )?;
                Ok(MotionStatus::Running)
            }
            VerticalStage::Done => Ok(MotionStatus::Complete),
        }
    }

    /// Fast pulse toward the target, then drop to the slow speed.
    fn pulse(
        &mut self,
        below: bool,
        descend_fast: f32,
        descend_slow: f32,
        ascend_fast: f32,
        ascend_slow: f32,
    ) -> Result<()> {
        let (fast, slow) = if below {
            (descend_fast, descend_slow)
        } else {
            (ascend_fast, ascend_slow)
        };
        self.set_speed(fast)?;
        self.clock.sleep(Duration::from_millis(self.cfg.pulse_ms));
        self.set_speed(slow)
    }

    fn set_speed(&mut self, speed: f32) -> Result<()> {
        self.motor
            .set_speed(speed)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("vertical set_speed")
    }
}
