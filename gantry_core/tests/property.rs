//! Property tests: speed shaping and tick decoding invariants, plus a
//! closed-loop axis convergence invariant over randomized plants.

use std::sync::{Arc, Mutex};

use gantry_core::axis::AxisController;
use gantry_core::config::AxisCfg;
use gantry_core::speed::{clamp_asymmetric, nudge};
use gantry_core::status::MotionStatus;
use gantry_core::ticks::{apply_reversal, logical_ticks};
use gantry_hardware::drive::DriveCommand;
use gantry_traits::Motor;
use gantry_traits::clock::SimClock;
use proptest::prelude::*;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Motor whose last commanded speed is shared with the test harness, so the
/// plant can be integrated outside the controller.
#[derive(Clone, Default)]
struct SharedSpeedMotor {
    speed: Arc<Mutex<f32>>,
}

impl Motor for SharedSpeedMotor {
    fn set_speed(&mut self, speed: f32) -> Result<(), BoxError> {
        *self.speed.lock().unwrap() = speed;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BoxError> {
        *self.speed.lock().unwrap() = 0.0;
        Ok(())
    }
}

proptest! {
    #[test]
    fn clamp_output_stays_in_the_band_and_keeps_the_sign(
        speed in -2.0f32..2.0,
        lower in 0.01f32..0.2,
        width in 0.01f32..0.5,
    ) {
        let upper = lower + width;
        let out = clamp_asymmetric(speed, lower, upper);
        if speed == 0.0 {
            prop_assert_eq!(out, 0.0);
        } else {
            prop_assert_eq!(out.signum(), speed.signum());
            prop_assert!(out.abs() >= lower && out.abs() <= upper);
            if speed.abs() >= lower && speed.abs() <= upper {
                prop_assert_eq!(out, speed);
            }
        }
    }

    #[test]
    fn nudge_magnitude_is_fixed_and_signed_by_the_error(
        error in i32::MIN..i32::MAX,
        magnitude in 0.0f32..1.0,
    ) {
        let out = nudge(error, magnitude);
        match error.signum() {
            0 => prop_assert_eq!(out, 0.0),
            s => {
                prop_assert_eq!(out.abs(), magnitude);
                prop_assert_eq!(out.signum() as i32, s);
            }
        }
    }

    #[test]
    fn drive_decomposition_selects_one_enable(speed in -1.0f32..1.0) {
        let cmd = DriveCommand::from_speed(speed);
        prop_assert!(!(cmd.forward && cmd.reverse));
        prop_assert_eq!(cmd.duty, speed.abs());
        if speed == 0.0 {
            prop_assert!(!cmd.forward && !cmd.reverse);
        }
    }

    #[test]
    fn reversal_is_an_involution(ticks in any::<u16>()) {
        prop_assert_eq!(apply_reversal(apply_reversal(ticks)), ticks);
    }

    #[test]
    fn decoded_ticks_never_exceed_the_overflow_limit(
        raw in any::<u16>(),
        reversed in any::<bool>(),
        limit in 1_000u16..60_000,
    ) {
        prop_assert!(logical_ticks(raw, reversed, limit) <= limit);
    }

    #[test]
    fn axis_converges_inside_the_fine_band_on_randomized_plants(
        target in 100i32..2_000,
        gain in 5.0f32..80.0,
    ) {
        let motor = SharedSpeedMotor::default();
        let speed = motor.speed.clone();
        let clock = Arc::new(SimClock::new());
        let cfg = AxisCfg::default();
        let fine_tolerance = cfg.fine_tolerance;
        let mut axis = AxisController::new(motor, cfg, clock);

        axis.begin(target);
        let mut position = 0.0f32;
        let mut done = false;
        for _ in 0..30_000 {
            match axis.step_from_ticks(position.round() as u16).unwrap() {
                MotionStatus::Running => {
                    position += *speed.lock().unwrap() * gain;
                    position = position.max(0.0);
                }
                MotionStatus::Complete => {
                    done = true;
                    break;
                }
                MotionStatus::Aborted(e) => prop_assert!(false, "aborted: {e}"),
            }
        }
        prop_assert!(done, "never converged on target {} with gain {}", target, gain);
        prop_assert!(
            (axis.last_position() - target).abs() <= fine_tolerance,
            "finished at {} for target {}",
            axis.last_position(),
            target
        );
    }
}
