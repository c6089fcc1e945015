//! UART byte link for the host and voice-peripheral serial lines.

use std::time::Duration;

use rppal::uart::{Parity, Uart};

use crate::error::HwError;
use gantry_traits::ByteLink;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub struct UartLink {
    uart: Uart,
}

impl UartLink {
    /// Open `device` in 8N1 framing at `baud_rate`.
    pub fn open(device: &str, baud_rate: u32) -> Result<Self, HwError> {
        let mut uart = Uart::with_path(device, baud_rate, Parity::None, 8, 1)
            .map_err(|e| HwError::Bus(e.to_string()))?;
        uart.set_write_mode(true)
            .map_err(|e| HwError::Bus(e.to_string()))?;
        Ok(Self { uart })
    }
}

impl ByteLink for UartLink {
    fn read_byte(&mut self, timeout: Duration) -> Result<u8, BoxError> {
        self.uart
            .set_read_mode(1, timeout)
            .map_err(|e| Box::new(HwError::Bus(e.to_string())) as BoxError)?;
        let mut buf = [0u8; 1];
        let n = self
            .uart
            .read(&mut buf)
            .map_err(|e| Box::new(HwError::Bus(e.to_string())) as BoxError)?;
        if n == 0 {
            return Err(Box::new(HwError::Timeout));
        }
        Ok(buf[0])
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), BoxError> {
        self.uart
            .write(&[byte])
            .map_err(|e| Box::new(HwError::Bus(e.to_string())) as BoxError)?;
        Ok(())
    }
}
