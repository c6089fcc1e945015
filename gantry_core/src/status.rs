//! Motion status returned from each control loop iteration.

use crate::error::MotionError;

/// Public status of a single step of an axis or vertical control loop.
#[derive(Debug)]
pub enum MotionStatus {
    /// Keep going; not converged yet.
    Running,
    /// Target reached and settled; motor already stopped.
    Complete,
    /// Aborted with a typed error; motor has been asked to stop.
    Aborted(MotionError),
}
