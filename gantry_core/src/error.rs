use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum MotionError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timeout waiting for sensor")]
    Timeout,
    #[error("move aborted: {0}")]
    Abort(AbortReason),
    #[error("session protocol error: {0}")]
    Protocol(String),
    #[error("invalid state: {0}")]
    State(String),
}

/// Why an in-flight move was given up on.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    #[error("max move time exceeded")]
    MaxRuntime,
    #[error("position feedback stalled")]
    SensorStall,
    #[error("operator halt")]
    Halt,
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing motor: {0}")]
    MissingMotor(&'static str),
    #[error("missing gripper")]
    MissingGripper,
    #[error("missing pose sampler")]
    MissingSampler,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
