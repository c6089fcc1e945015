//! I2C quadrature-counter chain driver.
//!
//! The counters are daisy-chained on one bus. At power-on every device answers
//! at the factory address; bring-up walks the chain, assigning each counter a
//! distinct address and telling every device except the last that another
//! follows it. A single reserved byte written to the broadcast address resets
//! the whole chain at once.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rppal::i2c::I2c;
use tracing::{debug, trace};

use crate::error::{HwError, Result};
use gantry_traits::Encoder;

/// Tick register, high byte.
pub const REG_TICKS_HIGH: u8 = 0x40;
/// Tick register, low byte.
pub const REG_TICKS_LOW: u8 = 0x41;
/// Writing this byte zeroes the counter.
pub const CMD_RESET_TICKS: u8 = 0x4A;
/// Writing this byte tells the device another counter follows in the chain.
pub const CMD_CHAIN_CONTINUES: u8 = 0x4B;
/// Register for assigning a new bus address.
pub const REG_SET_ADDRESS: u8 = 0x4D;
/// Byte written to the broadcast address to reset every device on the bus.
pub const CMD_BROADCAST_RESET: u8 = 0x4E;
/// Address every counter answers at before assignment.
pub const FACTORY_ADDRESS: u16 = 0x60;
/// All-call address.
pub const BROADCAST_ADDRESS: u16 = 0x00;

/// Shared handle to the one physical bus. Transactions are serialized through
/// the mutex; the bus is not reentrant.
pub type SharedBus = Arc<Mutex<I2c>>;

/// Reset every counter on the bus in one transaction.
pub fn broadcast_reset(bus: &SharedBus) -> Result<()> {
    let mut i2c = bus.lock().map_err(|_| HwError::Bus("bus lock poisoned".into()))?;
    i2c.set_slave_address(BROADCAST_ADDRESS)
        .map_err(|e| HwError::Bus(e.to_string()))?;
    i2c.write(&[CMD_BROADCAST_RESET])
        .map_err(|e| HwError::Bus(e.to_string()))?;
    debug!("broadcast reset issued");
    Ok(())
}

pub struct BusEncoder {
    bus: SharedBus,
    address: u16,
}

impl BusEncoder {
    /// Claim the next unassigned counter: move it from the factory address to
    /// `address`, and unless `last_in_chain`, signal it to keep propagating
    /// bus traffic to the device behind it.
    pub fn init(bus: SharedBus, address: u16, last_in_chain: bool) -> Result<Self> {
        {
            let mut i2c = bus.lock().map_err(|_| HwError::Bus("bus lock poisoned".into()))?;
            i2c.set_slave_address(FACTORY_ADDRESS)
                .map_err(|e| HwError::Bus(e.to_string()))?;
            i2c.write(&[REG_SET_ADDRESS, address as u8])
                .map_err(|e| HwError::Bus(e.to_string()))?;
            std::thread::sleep(Duration::from_millis(10));

            if !last_in_chain {
                i2c.set_slave_address(address)
                    .map_err(|e| HwError::Bus(e.to_string()))?;
                i2c.write(&[CMD_CHAIN_CONTINUES])
                    .map_err(|e| HwError::Bus(e.to_string()))?;
                std::thread::sleep(Duration::from_millis(10));
            }
        }
        debug!(address, last_in_chain, "encoder channel assigned");
        let mut enc = Self { bus, address };
        Encoder::reset(&mut enc).map_err(|e| HwError::Bus(e.to_string()))?;
        std::thread::sleep(Duration::from_millis(10));
        Ok(enc)
    }

    fn transact(
        &mut self,
        f: impl FnOnce(&mut I2c) -> std::result::Result<(), rppal::i2c::Error>,
    ) -> Result<()> {
        let mut i2c = self
            .bus
            .lock()
            .map_err(|_| HwError::Bus("bus lock poisoned".into()))?;
        i2c.set_slave_address(self.address)
            .map_err(|e| HwError::Bus(e.to_string()))?;
        f(&mut i2c).map_err(|e| HwError::Bus(e.to_string()))
    }
}

impl Encoder for BusEncoder {
    fn read_raw(
        &mut self,
        _timeout: Duration,
    ) -> std::result::Result<u16, Box<dyn std::error::Error + Send + Sync>> {
        let mut msb = [0u8; 1];
        let mut lsb = [0u8; 1];
        self.transact(|i2c| {
            i2c.write(&[REG_TICKS_HIGH])?;
            i2c.read(&mut msb)?;
            i2c.write(&[REG_TICKS_LOW])?;
            i2c.read(&mut lsb)?;
            Ok(())
        })?;
        let raw = u16::from_be_bytes([msb[0], lsb[0]]);
        trace!(address = self.address, raw, "encoder read");
        Ok(raw)
    }

    fn reset(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.transact(|i2c| i2c.write(&[CMD_RESET_TICKS]).map(|_| ()))?;
        Ok(())
    }
}
