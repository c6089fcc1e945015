//! Single-motor axis position controller.
//!
//! Two-phase convergence per move: a bounded-output PI coarse phase tuned to
//! avoid motor stall (speed floor) and overshoot (speed ceiling), then a
//! fixed-speed fine phase that walks out the residual error the coarse
//! saturation bounds cannot resolve. Each phase exits into a timed settle.
//!
//! The controller is a state machine stepped from pre-sampled readings:
//! `begin(target)` resets per-move state, `step_from_ticks(ticks)` performs
//! one iteration and reports `Running | Complete | Aborted`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::WrapErr;
use gantry_traits::Motor;
use gantry_traits::clock::Clock;

use crate::config::AxisCfg;
use crate::error::{AbortReason, MotionError, Result};
use crate::hw_error::map_hw_error;
use crate::speed::{clamp_asymmetric, nudge};
use crate::status::MotionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AxisPhase {
    Coarse,
    CoarseSettle { until_ms: u64 },
    Fine,
    FineSettle { until_ms: u64 },
    Complete,
}

pub struct AxisController<M: Motor> {
    motor: M,
    cfg: AxisCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
    target: i32,
    integral: f32,
    phase: AxisPhase,
    start_ms: u64,
    last_position: i32,
}

impl<M: Motor> AxisController<M> {
    pub fn new(motor: M, cfg: AxisCfg, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let epoch = clock.now();
        Self {
            motor,
            cfg,
            clock,
            epoch,
            target: 0,
            integral: 0.0,
            phase: AxisPhase::Complete,
            start_ms: 0,
            last_position: 0,
        }
    }

    /// Reset per-move state and arm the controller for a new target.
    pub fn begin(&mut self, target: i32) {
        self.target = target;
        self.integral = 0.0;
        self.phase = AxisPhase::Coarse;
        self.start_ms = self.clock.ms_since(self.epoch);
        tracing::debug!(target, "axis move start");
    }

    /// Last position fed to the controller, for telemetry.
    pub fn last_position(&self) -> i32 {
        self.last_position
    }

    pub fn target(&self) -> i32 {
        self.target
    }

    /// Stop the motor (best-effort).
    pub fn motor_stop(&mut self) -> Result<()> {
        self.motor
            .stop()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("motor stop")
    }

    /// One control iteration from a pre-sampled decoded tick reading.
    pub fn step_from_ticks(&mut self, ticks: u16) -> Result<MotionStatus> {
        let position = i32::from(ticks);
        self.last_position = position;
        let now = self.clock.ms_since(self.epoch);

        if self.cfg.max_move_ms > 0
            && !matches!(self.phase, AxisPhase::Complete)
            && now.saturating_sub(self.start_ms) >= self.cfg.max_move_ms
        {
            if let Err(e) = self.motor_stop() {
                tracing::warn!(error = %e, "motor stop failed on max-move cap");
            }
            return Ok(MotionStatus::Aborted(MotionError::Abort(
                AbortReason::MaxRuntime,
            )));
        }

        let error = self.target - position;
        match self.phase {
            AxisPhase::Coarse => {
                if error.abs() <= self.cfg.coarse_tolerance {
                    self.motor_stop()?;
                    self.phase = AxisPhase::CoarseSettle {
                        until_ms: now + self.cfg.coarse_settle_ms,
                    };
                    tracing::debug!(position, "axis coarse phase converged");
                } else {
                    // dt is the nominal 1 ms iteration period.
                    self.integral += error as f32 * 0.001;
                    let raw_speed = error as f32 / self.cfg.proportional_divisor
                        + self.cfg.integral_gain * self.integral;
                    let speed = clamp_asymmetric(
                        raw_speed,
                        self.cfg.lower_speed_bound,
                        self.cfg.upper_speed_bound,
                    );
                    self.set_speed(speed)?;
                    self.clock
                        .sleep(Duration::from_micros(self.cfg.coarse_period_us));
                }
                Ok(MotionStatus::Running)
            }
            AxisPhase::CoarseSettle { until_ms } => {
                if now >= until_ms {
                    self.phase = AxisPhase::Fine;
                } else {
                    self.clock
                        .sleep(Duration::from_micros(self.cfg.coarse_period_us));
                }
                Ok(MotionStatus::Running)
            }
            AxisPhase::Fine => {
                if error.abs() <= self.cfg.fine_tolerance {
                    self.motor_stop()?;
                    self.phase = AxisPhase::FineSettle {
                        until_ms: now + self.cfg.fine_settle_ms,
                    };
                    tracing::debug!(position, "axis fine phase converged");
                } else {
                    self.set_speed(nudge(error, self.cfg.fine_speed))?;
                    self.clock
                        .sleep(Duration::from_micros(self.cfg.fine_period_us));
                }
                Ok(MotionStatus::Running)
            }
            AxisPhase::FineSettle { until_ms } => {
                if now >= until_ms {
                    self.phase = AxisPhase::Complete;
                    tracing::info!(position, target = self.target, "axis move complete");
                    return Ok(MotionStatus::Complete);
                }
                self.clock
                    .sleep(Duration::from_micros(self.cfg.fine_period_us));
                Ok(MotionStatus::Running)
            }
            AxisPhase::Complete => Ok(MotionStatus::Complete),
        }
    }

    fn set_speed(&mut self, speed: f32) -> Result<()> {
        self.motor
            .set_speed(speed)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("set_speed")
    }
}
