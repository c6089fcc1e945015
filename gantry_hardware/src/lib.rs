#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Device implementations behind the `gantry_traits` seams.
//!
//! The simulated devices here model a first-order plant: each motor stores its
//! commanded speed, and the paired sensor integrates that speed on every read.
//! They back the CLI's simulation mode and let the control loops run without
//! real hardware. The `hardware` feature adds rppal-based drivers for the I2C
//! encoder chain, H-bridge motors, the ADC height sensor, and the servo claw.

pub mod drive;
pub mod error;

pub use error::HwError;

#[cfg(feature = "hardware")]
pub mod encoder_bus;
#[cfg(feature = "hardware")]
pub mod hbridge;
#[cfg(feature = "hardware")]
pub mod serial;

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::time::Duration;

use gantry_traits::{Encoder, Gripper, GripperState, HeightSensor, Indicator, Motor, SessionPhase};

use crate::drive::DriveCommand;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

// ── Simulated horizontal axis (motor + encoder pair) ─────────────────────────

/// Speed is shared between the motor and its encoder as milli-duty
/// (f32 speed × 1000, rounded). Position lives in the encoder as signed ticks
/// so that overshoot below zero reproduces the 16-bit wraparound artifact.
pub struct SimMotor {
    speed_milli: Arc<AtomicI32>,
}

impl Motor for SimMotor {
    fn set_speed(&mut self, speed: f32) -> Result<(), BoxError> {
        let cmd = DriveCommand::from_speed(speed);
        tracing::trace!(fwd = cmd.forward, rev = cmd.reverse, duty = cmd.duty, "sim drive");
        self.speed_milli
            .store((speed * 1000.0).round() as i32, Ordering::Relaxed);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BoxError> {
        self.speed_milli.store(0, Ordering::Relaxed);
        Ok(())
    }
}

pub struct SimEncoder {
    speed_milli: Arc<AtomicI32>,
    position: Arc<AtomicI32>,
    /// Ticks of travel per read at full duty.
    gain: f32,
}

impl Encoder for SimEncoder {
    fn read_raw(&mut self, _timeout: Duration) -> Result<u16, BoxError> {
        let speed = self.speed_milli.load(Ordering::Relaxed) as f32 / 1000.0;
        let delta = (speed * self.gain).round() as i32;
        let pos = self.position.fetch_add(delta, Ordering::Relaxed) + delta;
        // Hardware counter is 16-bit; running past zero wraps to 65535.
        Ok((pos.rem_euclid(65536)) as u16)
    }

    fn reset(&mut self) -> Result<(), BoxError> {
        self.position.store(0, Ordering::Relaxed);
        Ok(())
    }
}

/// Build a coupled motor/encoder pair for one simulated horizontal motor.
pub fn sim_axis(gain_ticks_per_read: f32) -> (SimMotor, SimEncoder) {
    let speed = Arc::new(AtomicI32::new(0));
    let position = Arc::new(AtomicI32::new(0));
    (
        SimMotor {
            speed_milli: speed.clone(),
        },
        SimEncoder {
            speed_milli: speed,
            position,
            gain: gain_ticks_per_read,
        },
    )
}

// ── Simulated vertical axis (motor + analog height pair) ─────────────────────

pub struct SimHeightSensor {
    speed_milli: Arc<AtomicI32>,
    height_bits: Arc<AtomicU32>,
    /// Height units of travel per read at full duty. Positive commanded speed
    /// raises the reading (the sensor value grows as the carriage descends on
    /// the real rig, but the controllers only care about monotonicity).
    gain: f32,
}

impl HeightSensor for SimHeightSensor {
    fn read(&mut self, _timeout: Duration) -> Result<f32, BoxError> {
        let speed = self.speed_milli.load(Ordering::Relaxed) as f32 / 1000.0;
        let h = f32::from_bits(self.height_bits.load(Ordering::Relaxed)) + speed * self.gain;
        self.height_bits.store(h.to_bits(), Ordering::Relaxed);
        Ok(h)
    }
}

/// Build a coupled motor/height-sensor pair for the simulated vertical axis.
pub fn sim_vertical(start_height: f32, gain_per_read: f32) -> (SimMotor, SimHeightSensor) {
    let speed = Arc::new(AtomicI32::new(0));
    (
        SimMotor {
            speed_milli: speed.clone(),
        },
        SimHeightSensor {
            speed_milli: speed,
            height_bits: Arc::new(AtomicU32::new(start_height.to_bits())),
            gain: gain_per_read,
        },
    )
}

// ── Simulated gripper and indicator ──────────────────────────────────────────

#[derive(Default)]
pub struct SimGripper {
    pub state: Option<GripperState>,
}

impl Gripper for SimGripper {
    fn set_state(&mut self, state: GripperState) -> Result<(), BoxError> {
        tracing::info!(?state, "sim gripper");
        self.state = Some(state);
        Ok(())
    }
}

/// Logs session phases instead of driving LEDs.
#[derive(Default)]
pub struct LogIndicator;

impl Indicator for LogIndicator {
    fn show(&mut self, phase: SessionPhase) {
        tracing::info!(?phase, "session phase");
    }
}
