//! Shared async I2C bus
//!
//! The driver and its interrupt listener both talk to the sensor. Each gets
//! its own [`SharedI2cDevice`] over one bus; a transaction holds the bus lock
//! for its whole duration, so a status read/clear from the listener can never
//! interleave with a polling sequence from the driver at byte level.

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::mutex::Mutex;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};

/// Bus type most callers want: lockable from tasks and interrupt context.
pub type SharedI2cBus<T> = Mutex<CriticalSectionRawMutex, T>;

/// One device handle on a bus shared through an embassy async `Mutex`.
///
/// ```ignore
/// let bus: SharedI2cBus<_> = Mutex::new(i2c);
/// let driver_i2c = SharedI2cDevice::new(&bus);
/// let listener_i2c = SharedI2cDevice::new(&bus);
/// ```
pub struct SharedI2cDevice<'a, M: RawMutex, T> {
    bus: &'a Mutex<M, T>,
}

impl<'a, M: RawMutex, T> SharedI2cDevice<'a, M, T> {
    #[inline]
    pub const fn new(bus: &'a Mutex<M, T>) -> Self {
        Self { bus }
    }
}

impl<M: RawMutex, T> Clone for SharedI2cDevice<'_, M, T> {
    fn clone(&self) -> Self {
        Self { bus: self.bus }
    }
}

impl<M, T> ErrorType for SharedI2cDevice<'_, M, T>
where
    M: RawMutex,
    T: ErrorType,
{
    type Error = T::Error;
}

impl<M, T> I2c for SharedI2cDevice<'_, M, T>
where
    M: RawMutex,
    T: I2c,
{
    #[inline]
    async fn read(&mut self, address: u8, read: &mut [u8]) -> Result<(), Self::Error> {
        let mut bus = self.bus.lock().await;
        bus.read(address, read).await
    }

    #[inline]
    async fn write(&mut self, address: u8, write: &[u8]) -> Result<(), Self::Error> {
        let mut bus = self.bus.lock().await;
        bus.write(address, write).await
    }

    /// Register address write and data read under a single lock
    #[inline]
    async fn write_read(
        &mut self,
        address: u8,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Self::Error> {
        let mut bus = self.bus.lock().await;
        bus.write_read(address, write, read).await
    }

    #[inline]
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut bus = self.bus.lock().await;
        bus.transaction(address, operations).await
    }
}
