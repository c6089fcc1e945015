//! Dual-motor axis tests: convergence of both carriages and the lag
//! compensation rule that keeps the mechanically linked frame square.

use std::sync::Arc;
use std::time::Duration;

use gantry_core::{DualAxisCfg, DualAxisController, EncoderChannel, MotionStatus};
use gantry_hardware::sim_axis;
use gantry_traits::clock::SimClock;

const READ_TIMEOUT: Duration = Duration::from_millis(5);

#[test]
fn both_motors_converge_with_matched_plants() {
    let (motor_a, enc_a) = sim_axis(50.0);
    let (motor_b, enc_b) = sim_axis(50.0);
    let mut ch_a = EncoderChannel::new(enc_a, false, 50_000);
    let mut ch_b = EncoderChannel::new(enc_b, false, 50_000);
    let cfg = DualAxisCfg::default();
    let fine_tolerance = cfg.axis.fine_tolerance;
    let mut dual = DualAxisController::new(motor_a, motor_b, cfg, Arc::new(SimClock::new()));

    dual.begin(400);
    for _ in 0..20_000 {
        let a = ch_a.read(READ_TIMEOUT).expect("sim read a");
        let b = ch_b.read(READ_TIMEOUT).expect("sim read b");
        match dual.step_from_ticks(a, b).expect("step") {
            MotionStatus::Running => {}
            MotionStatus::Complete => {
                assert!((400 - i32::from(a)).abs() <= fine_tolerance);
                assert!((400 - i32::from(b)).abs() <= fine_tolerance);
                return;
            }
            MotionStatus::Aborted(e) => panic!("unexpected abort: {e}"),
        }
    }
    panic!("no convergence");
}

#[test]
fn mismatched_plants_converge_with_bounded_skew() {
    // The right carriage responds 40% weaker; without the lag rule it would
    // fall behind the whole move.
    let (motor_a, enc_a) = sim_axis(50.0);
    let (motor_b, enc_b) = sim_axis(30.0);
    let mut ch_a = EncoderChannel::new(enc_a, false, 50_000);
    let mut ch_b = EncoderChannel::new(enc_b, false, 50_000);
    let cfg = DualAxisCfg::default();
    let sync_window = cfg.sync_window;
    let fine_tolerance = cfg.axis.fine_tolerance;
    let mut dual = DualAxisController::new(motor_a, motor_b, cfg, Arc::new(SimClock::new()));

    // A full-duty read moves the faster plant 50 ticks; once compensation
    // kicks in the gap per iteration is bounded by one such step.
    let skew_bound = sync_window + 50;

    dual.begin(400);
    for _ in 0..20_000 {
        let a = ch_a.read(READ_TIMEOUT).expect("sim read a");
        let b = ch_b.read(READ_TIMEOUT).expect("sim read b");
        match dual.step_from_ticks(a, b).expect("step") {
            MotionStatus::Running => {
                assert!(
                    dual.last_skew().abs() <= skew_bound,
                    "skew {} exceeded bound {skew_bound}",
                    dual.last_skew()
                );
            }
            MotionStatus::Complete => {
                assert!((400 - i32::from(a)).abs() <= fine_tolerance);
                assert!((400 - i32::from(b)).abs() <= fine_tolerance);
                return;
            }
            MotionStatus::Aborted(e) => panic!("unexpected abort: {e}"),
        }
    }
    panic!("no convergence");
}

#[test]
fn mirrored_right_carriage_converges_through_reversed_channel() {
    // The right motor is mounted mirrored: positive drive runs its counter
    // backward, and the reversed channel decodes the travel back to forward
    // ticks. The move must converge like the straight-mounted case.
    let (motor_a, enc_a) = sim_axis(50.0);
    let (motor_b, enc_b) = sim_axis(-50.0);
    let mut ch_a = EncoderChannel::new(enc_a, false, 50_000);
    let mut ch_b = EncoderChannel::new(enc_b, true, 50_000);
    let cfg = DualAxisCfg::default();
    let fine_tolerance = cfg.axis.fine_tolerance;
    let mut dual = DualAxisController::new(motor_a, motor_b, cfg, Arc::new(SimClock::new()));

    dual.begin(208);
    for _ in 0..20_000 {
        let a = ch_a.read(READ_TIMEOUT).expect("sim read a");
        let b = ch_b.read(READ_TIMEOUT).expect("sim read b");
        match dual.step_from_ticks(a, b).expect("step") {
            MotionStatus::Running => {}
            MotionStatus::Complete => {
                assert!((208 - i32::from(a)).abs() <= fine_tolerance);
                assert!((208 - i32::from(b)).abs() <= fine_tolerance);
                return;
            }
            MotionStatus::Aborted(e) => panic!("unexpected abort: {e}"),
        }
    }
    panic!("no convergence");
}

#[test]
fn zero_length_move_completes_immediately() {
    let (motor_a, enc_a) = sim_axis(50.0);
    let (motor_b, enc_b) = sim_axis(50.0);
    let mut ch_a = EncoderChannel::new(enc_a, false, 50_000);
    let mut ch_b = EncoderChannel::new(enc_b, false, 50_000);
    let mut dual = DualAxisController::new(
        motor_a,
        motor_b,
        DualAxisCfg::default(),
        Arc::new(SimClock::new()),
    );

    dual.begin(0);
    for _ in 0..5_000 {
        let a = ch_a.read(READ_TIMEOUT).expect("sim read a");
        let b = ch_b.read(READ_TIMEOUT).expect("sim read b");
        match dual.step_from_ticks(a, b).expect("step") {
            MotionStatus::Running => {}
            MotionStatus::Complete => {
                assert_eq!(a, 0);
                assert_eq!(b, 0);
                return;
            }
            MotionStatus::Aborted(e) => panic!("unexpected abort: {e}"),
        }
    }
    panic!("settles never elapsed");
}
