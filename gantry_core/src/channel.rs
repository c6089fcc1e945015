//! Logical sensor channels: a raw bus encoder plus its decode parameters,
//! and a height sensor with a linear calibration applied.

use std::time::Duration;

use gantry_traits::{Encoder, HeightSensor};

use crate::ticks::logical_ticks;

/// Wraps one bus encoder with its direction orientation and overflow limit.
/// Reads go through the full decode pipeline in `ticks`.
pub struct EncoderChannel<E: Encoder> {
    encoder: E,
    reversed: bool,
    overflow_limit: u16,
}

impl<E: Encoder> EncoderChannel<E> {
    pub fn new(encoder: E, reversed: bool, overflow_limit: u16) -> Self {
        Self {
            encoder,
            reversed,
            overflow_limit,
        }
    }

    /// One decoded position read. Non-reentrant with respect to the shared
    /// bus; the sampler is the only caller at runtime.
    pub fn read(
        &mut self,
        timeout: Duration,
    ) -> Result<u16, Box<dyn std::error::Error + Send + Sync>> {
        let raw = self.encoder.read_raw(timeout)?;
        Ok(logical_ticks(raw, self.reversed, self.overflow_limit))
    }

    pub fn reset(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.encoder.reset()
    }
}

/// Linear map from a raw height reading to calibrated height units:
/// `height = gain * (reading - offset)`.
#[derive(Debug, Clone, Copy)]
pub struct HeightScale {
    pub gain: f32,
    pub offset: f32,
}

impl Default for HeightScale {
    /// Identity: the reading already is the height.
    fn default() -> Self {
        Self {
            gain: 1.0,
            offset: 0.0,
        }
    }
}

/// A height sensor with its calibration applied on every read.
pub struct HeightChannel<H: HeightSensor> {
    sensor: H,
    scale: HeightScale,
}

impl<H: HeightSensor> HeightChannel<H> {
    pub fn new(sensor: H, scale: HeightScale) -> Self {
        Self { sensor, scale }
    }
}

impl<H: HeightSensor> HeightSensor for HeightChannel<H> {
    fn read(&mut self, timeout: Duration) -> Result<f32, Box<dyn std::error::Error + Send + Sync>> {
        let raw = self.sensor.read(timeout)?;
        Ok(self.scale.gain * (raw - self.scale.offset))
    }
}
