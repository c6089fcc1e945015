//! Vertical controller: stage machine, speed selection, and closed-loop
//! convergence against the simulated analog plant.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gantry_core::config::VerticalCfg;
use gantry_core::error::{AbortReason, MotionError};
use gantry_core::status::MotionStatus;
use gantry_core::vertical::{VerticalController, VerticalStage};
use gantry_hardware::sim_vertical;
use gantry_traits::{HeightSensor, Motor};
use gantry_traits::clock::SimClock;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Records every commanded speed; clones share the log so the test can keep
/// a handle after the controller takes ownership.
#[derive(Clone, Default)]
struct SpeedLog {
    speeds: Arc<Mutex<Vec<f32>>>,
    stops: Arc<AtomicUsize>,
}

impl SpeedLog {
    fn speeds(&self) -> Vec<f32> {
        self.speeds.lock().unwrap().clone()
    }

    fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl Motor for SpeedLog {
    fn set_speed(&mut self, speed: f32) -> Result<(), BoxError> {
        self.speeds.lock().unwrap().push(speed);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BoxError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn short_settle_cfg() -> VerticalCfg {
    VerticalCfg {
        settle_ms: 5,
        ..VerticalCfg::default()
    }
}

#[test]
fn down_move_approaches_the_intermediate_height_first() {
    let log = SpeedLog::default();
    let cfg = short_settle_cfg();
    let clock = Arc::new(SimClock::new());
    let mut ctl = VerticalController::new(log.clone(), cfg.clone(), clock);

    ctl.begin(cfg.down_height);

    // Well below the intermediate target: expect a fast descend pulse that
    // drops to the slow descend speed.
    assert!(matches!(
        ctl.step_from_height(0.40).unwrap(),
        MotionStatus::Running
    ));
    assert_eq!(ctl.stage(), VerticalStage::Approach);
    assert_eq!(
        log.speeds(),
        vec![cfg.approach_descend_fast, cfg.approach_descend_slow]
    );

    // Within tolerance of the intermediate height, not of the final one:
    // the approach pass converges here and the settle begins.
    assert!((0.465 - cfg.intermediate_down_height).abs() < cfg.tolerance);
    assert!((0.465 - cfg.down_height).abs() >= cfg.tolerance);
    ctl.step_from_height(0.465).unwrap();
    assert_eq!(ctl.stage(), VerticalStage::Settle);

    // No speed commanded during the settle; the motor keeps drifting at the
    // last slow speed until the refine pass takes over.
    let commanded_before = log.speeds().len();
    let mut guard = 0;
    while ctl.stage() == VerticalStage::Settle {
        ctl.step_from_height(0.465).unwrap();
        guard += 1;
        assert!(guard < 100, "settle never elapsed");
    }
    assert_eq!(log.speeds().len(), commanded_before);
    assert_eq!(ctl.stage(), VerticalStage::Refine);

    // The refine pass retargets the true down height with the gentler pair.
    ctl.step_from_height(0.47).unwrap();
    let speeds = log.speeds();
    assert_eq!(
        &speeds[speeds.len() - 2..],
        &[cfg.refine_descend_fast, cfg.refine_descend_slow]
    );

    // Within tolerance of the final target: stop once and report complete.
    assert!(matches!(
        ctl.step_from_height(0.5115).unwrap(),
        MotionStatus::Complete
    ));
    assert_eq!(ctl.stage(), VerticalStage::Done);
    assert_eq!(log.stops(), 1);
}

#[test]
fn raise_move_targets_the_requested_height_directly() {
    let log = SpeedLog::default();
    let cfg = short_settle_cfg();
    let clock = Arc::new(SimClock::new());
    let mut ctl = VerticalController::new(log.clone(), cfg.clone(), clock);

    ctl.begin(cfg.up_height);

    // Above the target: ascend pulse, both speeds negative.
    ctl.step_from_height(0.45).unwrap();
    assert_eq!(
        log.speeds(),
        vec![cfg.approach_ascend_fast, cfg.approach_ascend_slow]
    );

    // No intermediate substitution on a raise: tolerance of the requested
    // height itself ends the approach.
    ctl.step_from_height(cfg.up_height + 0.005).unwrap();
    assert_eq!(ctl.stage(), VerticalStage::Settle);
}

#[test]
fn stalled_plant_trips_the_runtime_cap() {
    let log = SpeedLog::default();
    let cfg = VerticalCfg {
        max_move_ms: 50,
        ..VerticalCfg::default()
    };
    let clock = Arc::new(SimClock::new());
    let mut ctl = VerticalController::new(log.clone(), cfg.clone(), clock);

    ctl.begin(cfg.down_height);
    // Each pulse advances simulated time by pulse_ms; the height never moves.
    for _ in 0..100 {
        match ctl.step_from_height(0.0).unwrap() {
            MotionStatus::Running => continue,
            MotionStatus::Aborted(MotionError::Abort(AbortReason::MaxRuntime)) => {
                assert_eq!(log.stops(), 1, "abort must stop the motor");
                return;
            }
            other => panic!("unexpected status {other:?}"),
        }
    }
    panic!("runtime cap never tripped");
}

#[test]
fn closed_loop_descend_converges_on_the_down_height() {
    let cfg = short_settle_cfg();
    let (motor, mut sensor) = sim_vertical(cfg.up_height, 0.05);
    let clock = Arc::new(SimClock::new());
    let mut ctl = VerticalController::new(motor, cfg.clone(), clock);

    ctl.begin(cfg.down_height);
    let mut saw_settle = false;
    for _ in 0..10_000 {
        let h = sensor.read(Duration::from_millis(1)).unwrap();
        saw_settle |= ctl.stage() == VerticalStage::Settle;
        match ctl.step_from_height(h).unwrap() {
            MotionStatus::Running => continue,
            MotionStatus::Complete => {
                assert!(saw_settle, "approach pass should settle before refining");
                assert!(
                    (ctl.last_height() - cfg.down_height).abs() < cfg.tolerance,
                    "finished at {} instead of {}",
                    ctl.last_height(),
                    cfg.down_height
                );
                return;
            }
            MotionStatus::Aborted(e) => panic!("aborted: {e}"),
        }
    }
    panic!("vertical move never completed");
}

#[test]
fn closed_loop_raise_converges_on_the_up_height() {
    let cfg = short_settle_cfg();
    let (motor, mut sensor) = sim_vertical(cfg.down_height, 0.05);
    let clock = Arc::new(SimClock::new());
    let mut ctl = VerticalController::new(motor, cfg.clone(), clock);

    ctl.begin(cfg.up_height);
    for _ in 0..10_000 {
        let h = sensor.read(Duration::from_millis(1)).unwrap();
        match ctl.step_from_height(h).unwrap() {
            MotionStatus::Running => continue,
            MotionStatus::Complete => {
                assert!(
                    (ctl.last_height() - cfg.up_height).abs() < cfg.tolerance,
                    "finished at {} instead of {}",
                    ctl.last_height(),
                    cfg.up_height
                );
                return;
            }
            MotionStatus::Aborted(e) => panic!("aborted: {e}"),
        }
    }
    panic!("vertical move never completed");
}
