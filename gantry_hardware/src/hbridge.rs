//! rppal-backed drive outputs: H-bridge motors, the servo claw, and the
//! SPI ADC used for vertical height feedback.
//!
//! Duty cycles use rppal's software PWM on the direction pins; the rig has
//! four motors plus a servo, which is more channels than the Pi's hardware
//! PWM peripheral offers.

use std::time::Duration;

use rppal::gpio::OutputPin;
use rppal::spi::Spi;
use tracing::trace;

use crate::drive::DriveCommand;
use crate::error::HwError;
use gantry_traits::{Gripper, GripperState, HeightSensor, Motor};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Software PWM frequency for the H-bridge enables.
const DRIVE_PWM_HZ: f64 = 1_000.0;
/// Hobby-servo frame period.
const SERVO_PERIOD: Duration = Duration::from_millis(20);

fn gpio_err(e: rppal::gpio::Error) -> BoxError {
    Box::new(HwError::Gpio(e.to_string()))
}

/// One DC motor: two direction pins, the active one PWM-ed at the duty.
pub struct HBridgeMotor {
    forward: OutputPin,
    reverse: OutputPin,
}

impl HBridgeMotor {
    pub fn new(forward: OutputPin, reverse: OutputPin) -> Self {
        Self { forward, reverse }
    }

    fn apply(&mut self, cmd: DriveCommand) -> Result<(), BoxError> {
        let duty = f64::from(cmd.duty).clamp(0.0, 1.0);
        if cmd.forward {
            self.reverse.clear_pwm().map_err(gpio_err)?;
            self.reverse.set_low();
            self.forward
                .set_pwm_frequency(DRIVE_PWM_HZ, duty)
                .map_err(gpio_err)?;
        } else if cmd.reverse {
            self.forward.clear_pwm().map_err(gpio_err)?;
            self.forward.set_low();
            self.reverse
                .set_pwm_frequency(DRIVE_PWM_HZ, duty)
                .map_err(gpio_err)?;
        } else {
            self.forward.clear_pwm().map_err(gpio_err)?;
            self.reverse.clear_pwm().map_err(gpio_err)?;
            self.forward.set_low();
            self.reverse.set_low();
        }
        trace!(fwd = cmd.forward, rev = cmd.reverse, duty = cmd.duty, "drive applied");
        Ok(())
    }
}

impl Motor for HBridgeMotor {
    fn set_speed(&mut self, speed: f32) -> Result<(), BoxError> {
        self.apply(DriveCommand::from_speed(speed))
    }

    fn stop(&mut self) -> Result<(), BoxError> {
        self.apply(DriveCommand::STOP)
    }
}

/// Hobby-servo claw. Positions are fractions of the servo's travel; the
/// usable range stops short of full close to avoid stalling the horn
/// against the jaw.
pub struct ServoGripper {
    pin: OutputPin,
    open_fraction: f64,
    closed_fraction: f64,
}

impl ServoGripper {
    pub fn new(pin: OutputPin, open_fraction: f64, closed_fraction: f64) -> Self {
        Self {
            pin,
            open_fraction,
            closed_fraction,
        }
    }

    fn set_fraction(&mut self, fraction: f64) -> Result<(), BoxError> {
        // Standard servo pulse: 1.0 ms..2.0 ms within a 20 ms frame.
        let pulse_us = 1000.0 + fraction.clamp(0.0, 1.0) * 1000.0;
        self.pin
            .set_pwm(SERVO_PERIOD, Duration::from_micros(pulse_us as u64))
            .map_err(gpio_err)?;
        Ok(())
    }
}

impl Gripper for ServoGripper {
    fn set_state(&mut self, state: GripperState) -> Result<(), BoxError> {
        let fraction = match state {
            GripperState::Open => self.open_fraction,
            GripperState::Closed => self.closed_fraction,
        };
        trace!(?state, fraction, "gripper set");
        self.set_fraction(fraction)
    }
}

/// MCP3008 channel read over SPI, normalized to [0, 1].
pub struct AdcHeightSensor {
    spi: Spi,
    channel: u8,
}

impl AdcHeightSensor {
    pub fn new(spi: Spi, channel: u8) -> Self {
        Self { spi, channel }
    }
}

impl HeightSensor for AdcHeightSensor {
    fn read(&mut self, _timeout: Duration) -> Result<f32, BoxError> {
        // Single-ended conversion: start bit, mode+channel, clock filler.
        let tx = [0x01, 0x80 | (self.channel << 4), 0x00];
        let mut rx = [0u8; 3];
        self.spi
            .transfer(&mut rx, &tx)
            .map_err(|e| Box::new(HwError::Bus(e.to_string())) as BoxError)?;
        let raw = (u16::from(rx[1] & 0x03) << 8) | u16::from(rx[2]);
        let h = f32::from(raw) / 1023.0;
        trace!(channel = self.channel, raw, height = h, "adc height read");
        Ok(h)
    }
}
