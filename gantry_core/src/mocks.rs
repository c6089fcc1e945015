//! Test and helper mocks for gantry_core

use std::collections::VecDeque;
use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An encoder that always errors on read; useful when driving a controller
/// with externally sampled tick values via `step_from_ticks`.
pub struct NoopEncoder;

impl gantry_traits::Encoder for NoopEncoder {
    fn read_raw(&mut self, _timeout: Duration) -> Result<u16, BoxError> {
        Err(Box::new(std::io::Error::other("noop encoder")))
    }

    fn reset(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// A motor that accepts every command and records the last speed.
#[derive(Default)]
pub struct NoopMotor {
    pub last_speed: f32,
    pub stopped: bool,
}

impl gantry_traits::Motor for NoopMotor {
    fn set_speed(&mut self, speed: f32) -> Result<(), BoxError> {
        self.last_speed = speed;
        self.stopped = false;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BoxError> {
        self.last_speed = 0.0;
        self.stopped = true;
        Ok(())
    }
}

/// A byte link fed from a canned script of incoming bytes, recording every
/// byte written to it. Reading past the script times out.
#[derive(Default)]
pub struct ScriptedLink {
    pub incoming: VecDeque<u8>,
    pub written: Vec<u8>,
}

impl ScriptedLink {
    pub fn with_incoming(bytes: &[u8]) -> Self {
        Self {
            incoming: bytes.iter().copied().collect(),
            written: Vec::new(),
        }
    }
}

impl gantry_traits::ByteLink for ScriptedLink {
    fn read_byte(&mut self, _timeout: Duration) -> Result<u8, BoxError> {
        self.incoming.pop_front().ok_or_else(|| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "script exhausted",
            )) as BoxError
        })
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), BoxError> {
        self.written.push(byte);
        Ok(())
    }
}
