use embedded_hal::i2c::Error as _;
use embedded_hal_async::i2c::I2c;
use log::error;

use super::Error;
use super::registers::Register;

/// Byte-level access to the VCNL4010 register file.
///
/// Failures are returned as [`Error::Bus`] and never retried here.
pub struct RegisterInterface<I> {
    i2c: I,
    address: u8,
}

impl<I: I2c> RegisterInterface<I> {
    pub fn new(i2c: I, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Read a single byte from a register
    pub async fn read_byte(&mut self, reg: Register) -> Result<u8, Error<I::Error>> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[reg.addr()], &mut buf)
            .await
            .map_err(|e| self.bus_error("read", reg, e))?;
        Ok(buf[0])
    }

    /// Write a single byte to a register
    pub async fn write_byte(&mut self, reg: Register, val: u8) -> Result<(), Error<I::Error>> {
        self.i2c
            .write(self.address, &[reg.addr(), val])
            .await
            .map_err(|e| self.bus_error("write", reg, e))
    }

    /// Read two consecutive registers as one big-endian value, MSB at `reg`.
    pub async fn read_u16_be(&mut self, reg: Register) -> Result<u16, Error<I::Error>> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.address, &[reg.addr()], &mut buf)
            .await
            .map_err(|e| self.bus_error("read", reg, e))?;
        Ok(u16::from_be_bytes(buf))
    }

    /// Give back the bus handle
    pub fn release(self) -> I {
        self.i2c
    }

    fn bus_error(&self, op: &str, reg: Register, e: I::Error) -> Error<I::Error> {
        error!(
            "VCNL4010 @0x{:02X}: {} of {:?} (0x{:02X}) failed: {:?}",
            self.address,
            op,
            reg,
            reg.addr(),
            e.kind()
        );
        Error::Bus(e)
    }
}
