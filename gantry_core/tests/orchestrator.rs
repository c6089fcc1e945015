//! End-to-end transfers against the simulated rig, plus the orchestrator's
//! watchdogs and builder validation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use gantry_core::channel::EncoderChannel;
use gantry_core::config::{
    AxisCfg, DualAxisCfg, GripperTiming, SafetyCfg, VerticalCfg,
};
use gantry_core::error::{AbortReason, BuildError, MotionError};
use gantry_core::grid::MoveCommand;
use gantry_core::mocks::{NoopEncoder, NoopMotor};
use gantry_core::orchestrator::Gantry;
use gantry_core::sampler::PoseSampler;
use gantry_hardware::{SimGripper, sim_axis, sim_vertical};
use gantry_traits::clock::MonotonicClock;
use gantry_traits::{Gripper, GripperState, HeightSensor};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Records every jaw command; clones share the log.
#[derive(Clone, Default)]
struct JawLog {
    states: Arc<Mutex<Vec<GripperState>>>,
}

impl JawLog {
    fn states(&self) -> Vec<GripperState> {
        self.states.lock().unwrap().clone()
    }
}

impl Gripper for JawLog {
    fn set_state(&mut self, state: GripperState) -> Result<(), BoxError> {
        self.states.lock().unwrap().push(state);
        Ok(())
    }
}

struct FailingHeight;

impl HeightSensor for FailingHeight {
    fn read(&mut self, _timeout: Duration) -> Result<f32, BoxError> {
        Err(Box::new(std::io::Error::other("height sensor offline")))
    }
}

/// Axis tuning with the settles and pacing shrunk so moves run against the
/// real clock in milliseconds instead of seconds.
fn fast_axis_cfg(base: AxisCfg) -> AxisCfg {
    AxisCfg {
        coarse_period_us: 200,
        fine_period_us: 200,
        coarse_settle_ms: 5,
        fine_settle_ms: 5,
        max_move_ms: 5_000,
        ..base
    }
}

fn fast_vertical_cfg() -> VerticalCfg {
    VerticalCfg {
        pulse_ms: 1,
        settle_ms: 2,
        max_move_ms: 5_000,
        ..VerticalCfg::default()
    }
}

fn fast_gripper_timing() -> GripperTiming {
    GripperTiming {
        lower_dwell_ms: 2,
        grip_settle_ms: 2,
    }
}

fn sim_sampler<E1, E2, E3, H>(x1: E1, x2: E2, y: E3, height: H) -> PoseSampler
where
    E1: gantry_traits::Encoder + Send + 'static,
    E2: gantry_traits::Encoder + Send + 'static,
    E3: gantry_traits::Encoder + Send + 'static,
    H: HeightSensor + Send + 'static,
{
    PoseSampler::spawn(
        EncoderChannel::new(x1, false, 50_000),
        EncoderChannel::new(x2, false, 50_000),
        EncoderChannel::new(y, false, 50_000),
        height,
        Duration::from_millis(1),
        Duration::from_millis(10),
        Arc::new(MonotonicClock::new()),
    )
}

fn abort_reason(err: &eyre::Report) -> Option<AbortReason> {
    match err.downcast_ref::<MotionError>() {
        Some(MotionError::Abort(reason)) => Some(*reason),
        _ => None,
    }
}

#[test]
fn full_transfer_positions_and_cycles_the_jaw() {
    let vertical = fast_vertical_cfg();
    let (x1_motor, x1_enc) = sim_axis(30.0);
    let (x2_motor, x2_enc) = sim_axis(30.0);
    let (y_motor, y_enc) = sim_axis(80.0);
    let (z_motor, z_sensor) = sim_vertical(vertical.up_height, 0.1);
    let jaw = JawLog::default();

    let mut gantry = Gantry::builder()
        .with_x_motors(x1_motor, x2_motor)
        .with_y_motor(y_motor)
        .with_z_motor(z_motor)
        .with_gripper(jaw.clone())
        .with_sampler(sim_sampler(x1_enc, x2_enc, y_enc, z_sensor))
        .with_x_cfg(DualAxisCfg {
            axis: fast_axis_cfg(DualAxisCfg::default().axis),
            sync_window: 10,
        })
        .with_y_cfg(fast_axis_cfg(AxisCfg::default()))
        .with_vertical_cfg(vertical.clone())
        .with_gripper_timing(fast_gripper_timing())
        .try_build()
        .unwrap();

    gantry.home().unwrap();
    let mv: MoveCommand = "a1b2".parse().unwrap();
    gantry.transfer(&mv).unwrap();

    // Pick closed the jaw after homing opened it; place reopened it.
    assert_eq!(
        jaw.states(),
        vec![GripperState::Open, GripperState::Closed, GripperState::Open]
    );

    // Ended over b2 with the carriage raised. The pose may drift by a
    // sampler pass or two after the controllers stop, hence the slack.
    let pose = gantry.pose();
    assert!((i32::from(pose.x1) - 208).abs() <= 20, "x1 = {}", pose.x1);
    assert!((i32::from(pose.x2) - 208).abs() <= 20, "x2 = {}", pose.x2);
    assert!((i32::from(pose.y) - 554).abs() <= 25, "y = {}", pose.y);
    assert!(
        (pose.height - vertical.up_height).abs() < 0.05,
        "height = {}",
        pose.height
    );
}

#[test]
fn halt_check_aborts_before_any_motion() {
    let vertical = fast_vertical_cfg();
    let (x1_motor, x1_enc) = sim_axis(30.0);
    let (x2_motor, x2_enc) = sim_axis(30.0);
    let (y_motor, y_enc) = sim_axis(80.0);
    let (z_motor, z_sensor) = sim_vertical(vertical.up_height, 0.1);

    let mut gantry = Gantry::builder()
        .with_x_motors(x1_motor, x2_motor)
        .with_y_motor(y_motor)
        .with_z_motor(z_motor)
        .with_gripper(SimGripper::default())
        .with_sampler(sim_sampler(x1_enc, x2_enc, y_enc, z_sensor))
        .with_vertical_cfg(vertical)
        .with_halt_check(|| true)
        .try_build()
        .unwrap();

    let err = gantry.home().unwrap_err();
    assert_eq!(abort_reason(&err), Some(AbortReason::Halt));
}

#[test]
fn stalled_feedback_aborts_the_move() {
    let mut gantry = Gantry::builder()
        .with_x_motors(NoopMotor::default(), NoopMotor::default())
        .with_y_motor(NoopMotor::default())
        .with_z_motor(NoopMotor::default())
        .with_gripper(SimGripper::default())
        .with_sampler(sim_sampler(
            NoopEncoder,
            NoopEncoder,
            NoopEncoder,
            FailingHeight,
        ))
        .with_vertical_cfg(fast_vertical_cfg())
        .with_safety(SafetyCfg { sensor_stall_ms: 50 })
        .try_build()
        .unwrap();

    // Every sampler pass fails, so no fresh pose ever lands and the stall
    // watchdog fires once the move has run past the threshold.
    let err = gantry.home().unwrap_err();
    assert_eq!(abort_reason(&err), Some(AbortReason::SensorStall));
}

#[test]
fn builder_reports_the_first_missing_piece() {
    let err = match Gantry::builder().try_build() {
        Ok(_) => panic!("bare builder should not produce a gantry"),
        Err(e) => e,
    };
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingMotor(name)) => assert_eq!(*name, "x1"),
        other => panic!("unexpected build error: {other:?}"),
    }
}
