#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Closed-loop motion control for a multi-axis pick-and-place gantry.
//!
//! The horizontal axes run a two-phase PI loop over quadrature tick
//! feedback (the X axis with two mechanically linked motors kept in sync),
//! the vertical axis a two-pass bang-bang loop over analog height feedback.
//! A background sampler owns the sensor bus and publishes the latest pose
//! through lock-free cells; controllers are pure `step` state machines fed
//! from snapshots. The orchestrator sequences axes, jaw, and watchdogs into
//! whole transfers addressed by board-grid coordinates, and the session
//! module speaks the host and voice-recognizer serial protocols.

pub mod axis;
pub mod channel;
pub mod config;
pub mod conversions;
pub mod dual;
pub mod error;
pub mod grid;
pub mod hw_error;
pub mod mocks;
pub mod orchestrator;
pub mod sampler;
pub mod session;
pub mod speed;
pub mod status;
pub mod ticks;
pub mod vertical;

pub use axis::AxisController;
pub use channel::{EncoderChannel, HeightChannel, HeightScale};
pub use config::{
    AxisCfg, DualAxisCfg, GeometryCfg, GripperTiming, SafetyCfg, SessionCfg, Timeouts,
    VerticalCfg,
};
pub use dual::DualAxisController;
pub use error::{AbortReason, BuildError, MotionError, Report, Result};
pub use grid::{GridCoordinate, GridError, MoveCommand};
pub use orchestrator::{Gantry, GantryBuilder};
pub use sampler::{PoseSampler, PoseSnapshot, SampleFault};
pub use session::{HostSession, SessionRequest, VoiceLink};
pub use status::MotionStatus;
pub use vertical::{VerticalController, VerticalStage};
