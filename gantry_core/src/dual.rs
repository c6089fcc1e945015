//! Dual-motor synchronized axis controller.
//!
//! Two motors share one physical degree of freedom; letting them drift apart
//! racks the frame. The coarse phase computes an independent PI speed per
//! motor, then applies a lag-compensation rule before actuating: if the
//! positions are within the sync window both run at their computed speeds;
//! otherwise whichever motor is ahead (smaller remaining error) is halved so
//! the lagging one catches up. The fine phase nudges each motor independently,
//! the tolerance there being tight enough that skew risk is negligible.

use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::WrapErr;
use gantry_traits::Motor;
use gantry_traits::clock::Clock;

use crate::config::DualAxisCfg;
use crate::error::{AbortReason, MotionError, Result};
use crate::hw_error::map_hw_error;
use crate::speed::{clamp_asymmetric, nudge};
use crate::status::MotionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DualPhase {
    Coarse,
    CoarseSettle { until_ms: u64 },
    Fine,
    FineSettle { until_ms: u64 },
    Complete,
}

pub struct DualAxisController<A: Motor, B: Motor> {
    motor_a: A,
    motor_b: B,
    cfg: DualAxisCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
    target: i32,
    integral_a: f32,
    integral_b: f32,
    phase: DualPhase,
    start_ms: u64,
    last_skew: i32,
}

impl<A: Motor, B: Motor> DualAxisController<A, B> {
    pub fn new(motor_a: A, motor_b: B, cfg: DualAxisCfg, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let epoch = clock.now();
        Self {
            motor_a,
            motor_b,
            cfg,
            clock,
            epoch,
            target: 0,
            integral_a: 0.0,
            integral_b: 0.0,
            phase: DualPhase::Complete,
            start_ms: 0,
            last_skew: 0,
        }
    }

    pub fn begin(&mut self, target: i32) {
        self.target = target;
        self.integral_a = 0.0;
        self.integral_b = 0.0;
        self.phase = DualPhase::Coarse;
        self.start_ms = self.clock.ms_since(self.epoch);
        tracing::debug!(target, "dual axis move start");
    }

    /// Inter-motor position difference at the last step, for telemetry.
    pub fn last_skew(&self) -> i32 {
        self.last_skew
    }

    pub fn target(&self) -> i32 {
        self.target
    }

    /// Stop both motors (best-effort; tries the second even if the first fails).
    pub fn motors_stop(&mut self) -> Result<()> {
        let ra = self.motor_a.stop();
        let rb = self.motor_b.stop();
        ra.map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("motor A stop")?;
        rb.map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("motor B stop")
    }

    /// One control iteration from pre-sampled decoded tick readings.
    ///
    /// The two readings come from the shared pose cells and may straddle a
    /// sampler refresh; a transient skew reading is possible and tolerated.
    pub fn step_from_ticks(&mut self, ticks_a: u16, ticks_b: u16) -> Result<MotionStatus> {
        let pos_a = i32::from(ticks_a);
        let pos_b = i32::from(ticks_b);
        self.last_skew = pos_a - pos_b;
        let now = self.clock.ms_since(self.epoch);

        if self.cfg.axis.max_move_ms > 0
            && !matches!(self.phase, DualPhase::Complete)
            && now.saturating_sub(self.start_ms) >= self.cfg.axis.max_move_ms
        {
            if let Err(e) = self.motors_stop() {
                tracing::warn!(error = %e, "motor stop failed on max-move cap");
            }
            return Ok(MotionStatus::Aborted(MotionError::Abort(
                AbortReason::MaxRuntime,
            )));
        }

        let err_a = self.target - pos_a;
        let err_b = self.target - pos_b;
        // Cloned so the motor calls below can borrow `self` mutably.
        let cfg = self.cfg.axis.clone();
        match self.phase {
            DualPhase::Coarse => {
                if err_a.abs() <= cfg.coarse_tolerance && err_b.abs() <= cfg.coarse_tolerance {
                    self.motors_stop()?;
                    self.phase = DualPhase::CoarseSettle {
                        until_ms: now + cfg.coarse_settle_ms,
                    };
                    tracing::debug!(pos_a, pos_b, "dual coarse phase converged");
                    return Ok(MotionStatus::Running);
                }

                self.integral_a += err_a as f32 * 0.001;
                self.integral_b += err_b as f32 * 0.001;
                let speed_a = clamp_asymmetric(
                    err_a as f32 / cfg.proportional_divisor + cfg.integral_gain * self.integral_a,
                    cfg.lower_speed_bound,
                    cfg.upper_speed_bound,
                );
                let speed_b = clamp_asymmetric(
                    err_b as f32 / cfg.proportional_divisor + cfg.integral_gain * self.integral_b,
                    cfg.lower_speed_bound,
                    cfg.upper_speed_bound,
                );

                // Lag compensation: beyond the sync window, halve whichever
                // motor is ahead so the lagging one closes the gap.
                let skew = (pos_a - pos_b).abs();
                let (speed_a, speed_b) = if skew <= self.cfg.sync_window {
                    (speed_a, speed_b)
                } else if err_a.abs() > err_b.abs() {
                    tracing::trace!(skew, "motor B leading, halving");
                    (speed_a, speed_b / 2.0)
                } else {
                    tracing::trace!(skew, "motor A leading, halving");
                    (speed_a / 2.0, speed_b)
                };

                self.set_speeds(speed_a, speed_b)?;
                self.clock.sleep(Duration::from_micros(cfg.coarse_period_us));
                Ok(MotionStatus::Running)
            }
            DualPhase::CoarseSettle { until_ms } => {
                if now >= until_ms {
                    self.phase = DualPhase::Fine;
                } else {
                    self.clock.sleep(Duration::from_micros(cfg.coarse_period_us));
                }
                Ok(MotionStatus::Running)
            }
            DualPhase::Fine => {
                if err_a.abs() <= cfg.fine_tolerance && err_b.abs() <= cfg.fine_tolerance {
                    self.motors_stop()?;
                    self.phase = DualPhase::FineSettle {
                        until_ms: now + cfg.fine_settle_ms,
                    };
                    tracing::debug!(pos_a, pos_b, "dual fine phase converged");
                } else {
                    self.set_speeds(nudge(err_a, cfg.fine_speed), nudge(err_b, cfg.fine_speed))?;
                    self.clock.sleep(Duration::from_micros(cfg.fine_period_us));
                }
                Ok(MotionStatus::Running)
            }
            DualPhase::FineSettle { until_ms } => {
                if now >= until_ms {
                    self.phase = DualPhase::Complete;
                    tracing::info!(pos_a, pos_b, target = self.target, "dual axis move complete");
                    return Ok(MotionStatus::Complete);
                }
                self.clock.sleep(Duration::from_micros(cfg.fine_period_us));
                Ok(MotionStatus::Running)
            }
            DualPhase::Complete => Ok(MotionStatus::Complete),
        }
    }

    fn set_speeds(&mut self, speed_a: f32, speed_b: f32) -> Result<()> {
        self.motor_a
            .set_speed(speed_a)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("motor A set_speed")?;
        self.motor_b
            .set_speed(speed_b)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("motor B set_speed")
    }
}
