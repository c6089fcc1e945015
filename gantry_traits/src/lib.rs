pub mod clock;

pub use clock::{Clock, MonotonicClock, SimClock};

use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A single DC motor behind an H-bridge style drive.
///
/// `speed` is a signed duty fraction, conceptually in [-1, 1]; the sign
/// selects the direction enable and the magnitude becomes the duty cycle.
/// Callers are expected to pre-clamp; implementations do not range-check.
pub trait Motor {
    fn set_speed(&mut self, speed: f32) -> Result<(), BoxError>;

    /// Disable both direction enables and zero the duty cycle.
    fn stop(&mut self) -> Result<(), BoxError>;
}

/// An incremental encoder channel on the shared sensor bus.
///
/// `read_raw` returns the raw 16-bit tick register (high byte, low byte
/// combined). Direction reversal and overflow rejection are applied by the
/// core's `EncoderChannel`, not here.
pub trait Encoder {
    fn read_raw(&mut self, timeout: Duration) -> Result<u16, BoxError>;

    /// Zero the channel's tick counter. No acknowledgment is verified.
    fn reset(&mut self) -> Result<(), BoxError>;
}

/// Continuous analog height feedback for the vertical axis.
/// Readings are normalized sensor units, a fraction of full scale;
/// larger means lower carriage.
pub trait HeightSensor {
    fn read(&mut self, timeout: Duration) -> Result<f32, BoxError>;
}

/// Jaw state of the gripping actuator. Set directly; there is no feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GripperState {
    Open,
    Closed,
}

pub trait Gripper {
    fn set_state(&mut self, state: GripperState) -> Result<(), BoxError>;
}

/// Half-duplex byte link (host serial, voice-recognition peripheral).
pub trait ByteLink {
    /// Blocking read of the next byte, bounded by `timeout`.
    fn read_byte(&mut self, timeout: Duration) -> Result<u8, BoxError>;
    fn write_byte(&mut self, byte: u8) -> Result<(), BoxError>;
}

// Boxed devices forward to the inner implementation so controllers can be
// built over `Box<dyn Motor>` and friends.
impl<T: Motor + ?Sized> Motor for Box<T> {
    fn set_speed(&mut self, speed: f32) -> Result<(), BoxError> {
        (**self).set_speed(speed)
    }

    fn stop(&mut self) -> Result<(), BoxError> {
        (**self).stop()
    }
}

impl<T: Encoder + ?Sized> Encoder for Box<T> {
    fn read_raw(&mut self, timeout: Duration) -> Result<u16, BoxError> {
        (**self).read_raw(timeout)
    }

    fn reset(&mut self) -> Result<(), BoxError> {
        (**self).reset()
    }
}

impl<T: HeightSensor + ?Sized> HeightSensor for Box<T> {
    fn read(&mut self, timeout: Duration) -> Result<f32, BoxError> {
        (**self).read(timeout)
    }
}

impl<T: Gripper + ?Sized> Gripper for Box<T> {
    fn set_state(&mut self, state: GripperState) -> Result<(), BoxError> {
        (**self).set_state(state)
    }
}

impl<T: ByteLink + ?Sized> ByteLink for Box<T> {
    fn read_byte(&mut self, timeout: Duration) -> Result<u8, BoxError> {
        (**self).read_byte(timeout)
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), BoxError> {
        (**self).write_byte(byte)
    }
}

/// Coarse session state lamps. The reference rig drives four LEDs;
/// implementations map `SessionPhase` onto whatever indicators exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for a host request.
    Idle,
    /// Voice recognition in progress; `tokens` counts confirmed tokens (0..=4).
    Listening { tokens: u8 },
    /// Descriptor acquired, handing back to the host.
    AwaitingHost,
    /// A transfer is executing.
    Moving,
}

pub trait Indicator {
    fn show(&mut self, phase: SessionPhase);
}

impl<T: Indicator + ?Sized> Indicator for Box<T> {
    fn show(&mut self, phase: SessionPhase) {
        (**self).show(phase)
    }
}
