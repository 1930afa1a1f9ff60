//! Vishay VCNL4010 proximity and ambient light sensor driver
//!
//! The device has two measurement channels that run either self-timed (the
//! sensor repeats measurements at the configured rates) or on demand (one
//! triggered conversion, completion polled through the command register).
//!
//! ```text
//! Disabled ──reset──▶ SelfTimed ──on demand──▶ OnDemandProximity ──▶ SelfTimed
//!                         │
//!                         └──────on demand──▶ OnDemandAmbient (stays)
//! ```
//!
//! Threshold interrupts are delivered by a separate [`InterruptListener`]
//! task through an [`InterruptQueue`]. See the [`interrupt`] module.

pub mod interface;
pub mod interrupt;
pub mod registers;

pub use interface::RegisterInterface;
pub use interrupt::{
    DEFAULT_INTERRUPT_PIN, InterruptEvent, InterruptListener, InterruptOutcome, InterruptQueue,
    WaitMode,
};
pub use registers::*;

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::digital::Wait;
use embedded_hal_async::i2c::I2c;
use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use super::{Sensor, SensorError, SensorReadings};
use crate::config::{CalibrationConfig, DeviceConfig, PollConfig};

const SENSOR_NAME: &str = "VCNL4010";

/// Proximity rate written by [`Vcnl4010::reset`]
const BASELINE_PROXIMITY: ProximityConfig = ProximityConfig {
    rate: ProximityRate::Rate31,
    led_current: LedCurrent::saturating(16),
};

/// Errors that can occur during VCNL4010 operations
#[derive(Debug, Error)]
pub enum Error<E: core::fmt::Debug> {
    /// I2C transport failure. Never retried by the driver.
    #[error("I2C bus error: {0:?}")]
    Bus(E),
    /// A data-ready bit did not appear within the polling budget
    #[error("{operation} not ready after {polls} polls")]
    Timeout {
        operation: &'static str,
        polls: u32,
    },
}

impl<E: core::fmt::Debug> Error<E> {
    /// Context-carrying error for the [`Sensor`] boundary
    pub fn into_sensor_error(self, operation: &'static str) -> SensorError {
        match self {
            Self::Bus(_) => SensorError::ReadFailed {
                sensor: SENSOR_NAME,
                operation,
                details: "I2C communication error",
            },
            Self::Timeout { .. } => SensorError::Timeout {
                sensor: SENSOR_NAME,
                operation,
            },
        }
    }
}

/// Pin and bus device returned by a refused
/// [`Vcnl4010::setup_interrupt_handler`]
pub struct InterruptBusy<P, I> {
    pub pin: P,
    pub i2c: I,
}

/// Measurement mode as last written to the command register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    Disabled,
    SelfTimed,
    OnDemandProximity,
    OnDemandAmbient,
}

impl DeviceMode {
    fn from_command(cmd: Command) -> Self {
        if cmd.contains(Command::PROX_ON_DEMAND) {
            Self::OnDemandProximity
        } else if cmd.contains(Command::AMBI_ON_DEMAND) {
            Self::OnDemandAmbient
        } else if cmd.contains(Command::SELFTIMED_ENABLE) {
            Self::SelfTimed
        } else {
            Self::Disabled
        }
    }
}

/// Raw 16-bit counts from both channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Vcnl4010Readings {
    pub ambient: u16,
    pub proximity: u16,
}

impl SensorReadings<2> for Vcnl4010Readings {
    fn to_array(self) -> [i32; 2] {
        [self.ambient as i32, self.proximity as i32]
    }
}

/// Result of [`Vcnl4010::calibrate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    /// Number of on-demand proximity samples taken
    pub samples: u16,
    /// Rounded mean of the samples
    pub baseline: u16,
    /// High threshold now active on the device
    pub high_threshold: u16,
}

/// VCNL4010 driver with async I2C interface
pub struct Vcnl4010<'q, I, D> {
    regs: RegisterInterface<I>,
    delay: D,
    config: DeviceConfig,
    polling: PollConfig,
    calibration: CalibrationConfig,
    queue: &'q InterruptQueue,
    mode: DeviceMode,
    readings: Vcnl4010Readings,
    thresholds: Thresholds,
    initialized: bool,
    interrupt_bound: bool,
}

impl<'q, I, D> Vcnl4010<'q, I, D>
where
    I: I2c,
    D: DelayNs,
{
    /// Create a driver. Nothing is written until [`Vcnl4010::reset`].
    ///
    /// # Arguments
    /// * `i2c` - bus device for the sensor
    /// * `delay` - used between completion polls of on-demand measurements
    /// * `config` - address, bus and interrupt pin
    /// * `queue` - where the interrupt listener delivers events
    pub fn new(i2c: I, delay: D, config: DeviceConfig, queue: &'q InterruptQueue) -> Self {
        Self {
            regs: RegisterInterface::new(i2c, config.address()),
            delay,
            config,
            polling: PollConfig::default(),
            calibration: CalibrationConfig::default(),
            queue,
            mode: DeviceMode::Disabled,
            readings: Vcnl4010Readings::default(),
            thresholds: Thresholds::default(),
            initialized: false,
            interrupt_bound: false,
        }
    }

    pub fn with_polling(mut self, polling: PollConfig) -> Self {
        self.polling = polling;
        self
    }

    pub fn with_calibration(mut self, calibration: CalibrationConfig) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn mode(&self) -> DeviceMode {
        self.mode
    }

    /// Last values read from either channel. Zeroed by [`Vcnl4010::reset`].
    pub fn readings(&self) -> Vcnl4010Readings {
        self.readings
    }

    /// Thresholds written through this driver since the last calibration
    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Give back the bus device and the delay
    pub fn release(self) -> (I, D) {
        (self.regs.release(), self.delay)
    }

    // =========================================================================
    // Setup
    // =========================================================================

    /// Put the device into its baseline configuration.
    ///
    /// Logs the product ID register. A mismatching ID is reported but not
    /// rejected. Thresholds are not written.
    pub async fn reset(&mut self) -> Result<(), Error<I::Error>> {
        let id = self.product_id().await?;
        if !id.is_vcnl4010() {
            warn!(
                "{}: unexpected product ID {} (revision {}), continuing",
                SENSOR_NAME, id.product, id.revision
            );
        }

        self.apply_baseline().await?;
        self.readings = Vcnl4010Readings::default();
        self.initialized = true;
        Ok(())
    }

    /// Write the baseline configuration, leaving the device self-timed.
    ///
    /// Proximity at 31.25/s with 160 mA LED current, proximity threshold
    /// interrupt after one crossing, ambient at 2/s averaging 32 conversions
    /// with auto offset. Safe to repeat.
    pub async fn apply_baseline(&mut self) -> Result<(), Error<I::Error>> {
        self.set_command(Command::ALL_DISABLE).await?;
        self.set_proximity_config(BASELINE_PROXIMITY).await?;
        self.set_command(Command::SELF_TIMED).await?;
        self.set_interrupt_control(InterruptConfig::proximity_threshold())
            .await?;
        self.set_ambient_config(AmbientConfig::default()).await?;
        debug!("{}: baseline configuration applied", SENSOR_NAME);
        Ok(())
    }

    /// Write whichever thresholds are set. Safe to repeat.
    pub async fn apply_thresholds(&mut self, thresholds: Thresholds) -> Result<(), Error<I::Error>> {
        if let Some(low) = thresholds.low {
            self.set_low_threshold(low).await?;
        }
        if let Some(high) = thresholds.high {
            self.set_high_threshold(high).await?;
        }
        Ok(())
    }

    /// Derive the high threshold from the proximity noise floor.
    ///
    /// Takes `samples` on-demand proximity readings, rounds their mean and
    /// adds `margin`. The device is then reset, the threshold written and
    /// self-timed mode enabled, in that order.
    pub async fn calibrate(&mut self) -> Result<Calibration, Error<I::Error>> {
        let samples = self.calibration.samples.max(1);

        let mut sum: u32 = 0;
        for _ in 0..samples {
            sum += u32::from(self.proximity_on_demand().await?);
        }

        let n = u32::from(samples);
        let baseline = ((sum + n / 2) / n) as u16;
        let high_threshold = baseline.saturating_add(self.calibration.margin);

        self.reset().await?;
        self.apply_thresholds(Thresholds {
            low: None,
            high: Some(high_threshold),
        })
        .await?;
        self.set_command(Command::SELF_TIMED).await?;

        info!(
            "{}: calibrated over {} samples, baseline {}, high threshold {}",
            SENSOR_NAME, samples, baseline, high_threshold
        );

        Ok(Calibration {
            samples,
            baseline,
            high_threshold,
        })
    }

    // =========================================================================
    // Measurements
    // =========================================================================

    /// Trigger one proximity conversion and return to self-timed mode.
    ///
    /// Self-timed mode is restored even when the conversion times out.
    pub async fn proximity_on_demand(&mut self) -> Result<u16, Error<I::Error>> {
        self.set_command(Command::ON_DEMAND_PROXIMITY).await?;

        let ready = self
            .poll_until(Command::PROX_DATA_READY, "proximity on-demand measurement")
            .await;
        if let Err(e) = ready {
            self.set_command(Command::SELF_TIMED).await?;
            return Err(e);
        }

        let value = self.regs.read_u16_be(Register::ProximityValueHigh).await?;
        self.readings.proximity = value;
        self.set_command(Command::SELF_TIMED).await?;
        Ok(value)
    }

    /// Trigger one ambient light conversion.
    ///
    /// Unlike [`Vcnl4010::proximity_on_demand`] this leaves the device in
    /// on-demand ambient mode. Self-timed values stop updating until the
    /// command register is rewritten.
    pub async fn ambient_on_demand(&mut self) -> Result<u16, Error<I::Error>> {
        self.set_command(Command::ON_DEMAND_AMBIENT).await?;
        self.poll_until(Command::AMBI_DATA_READY, "ambient on-demand measurement")
            .await?;

        let value = self.regs.read_u16_be(Register::AmbientValueHigh).await?;
        self.readings.ambient = value;
        debug!("{}: left in on-demand ambient mode", SENSOR_NAME);
        Ok(value)
    }

    /// Latest self-timed proximity result
    pub async fn proximity_value(&mut self) -> Result<u16, Error<I::Error>> {
        let value = self.regs.read_u16_be(Register::ProximityValueHigh).await?;
        self.readings.proximity = value;
        Ok(value)
    }

    /// Latest self-timed ambient light result
    pub async fn ambient_value(&mut self) -> Result<u16, Error<I::Error>> {
        let value = self.regs.read_u16_be(Register::AmbientValueHigh).await?;
        self.readings.ambient = value;
        Ok(value)
    }

    /// Read the command register until `ready` is set or the budget runs out.
    ///
    /// # Returns
    /// Number of command register reads, including the one that saw `ready`.
    async fn poll_until(
        &mut self,
        ready: Command,
        operation: &'static str,
    ) -> Result<u32, Error<I::Error>> {
        let max_polls = self.polling.max_polls.max(1);

        for poll in 1..=max_polls {
            let cmd = self.command().await?;
            if cmd.contains(ready) {
                debug!("{}: {} ready after {} polls", SENSOR_NAME, operation, poll);
                return Ok(poll);
            }
            if poll < max_polls && self.polling.poll_interval_us > 0 {
                self.delay.delay_us(self.polling.poll_interval_us).await;
            }
        }

        error!(
            "{}: {} not ready after {} polls",
            SENSOR_NAME, operation, max_polls
        );
        Err(Error::Timeout {
            operation,
            polls: max_polls,
        })
    }

    // =========================================================================
    // Register Accessors
    // =========================================================================

    /// Read and log the product ID / revision register
    pub async fn product_id(&mut self) -> Result<ProductId, Error<I::Error>> {
        let raw = self.regs.read_byte(Register::ProductId).await?;
        let id = ProductId::from_register(raw);
        info!(
            "{}: product ID register 0x{:02X} (product {}, revision {})",
            SENSOR_NAME, raw, id.product, id.revision
        );
        Ok(id)
    }

    pub async fn command(&mut self) -> Result<Command, Error<I::Error>> {
        let val = self.regs.read_byte(Register::Command).await?;
        Ok(Command::from_bits(val))
    }

    pub async fn set_command(&mut self, cmd: Command) -> Result<(), Error<I::Error>> {
        self.regs
            .write_byte(Register::Command, cmd.to_register())
            .await?;

        let mode = DeviceMode::from_command(cmd);
        if mode != self.mode {
            debug!("{}: {:?} -> {:?}", SENSOR_NAME, self.mode, mode);
            self.mode = mode;
        }
        Ok(())
    }

    pub async fn set_proximity_rate(&mut self, rate: ProximityRate) -> Result<(), Error<I::Error>> {
        self.regs
            .write_byte(Register::ProximityRate, rate.to_register())
            .await
    }

    pub async fn set_led_current(&mut self, current: LedCurrent) -> Result<(), Error<I::Error>> {
        self.regs
            .write_byte(Register::LedCurrent, current.to_register())
            .await
    }

    /// Rate first, then LED current
    pub async fn set_proximity_config(
        &mut self,
        config: ProximityConfig,
    ) -> Result<(), Error<I::Error>> {
        self.set_proximity_rate(config.rate).await?;
        self.set_led_current(config.led_current).await
    }

    pub async fn set_ambient_config(&mut self, config: AmbientConfig) -> Result<(), Error<I::Error>> {
        self.regs
            .write_byte(Register::AmbientParameter, config.to_register())
            .await
    }

    pub async fn interrupt_control(&mut self) -> Result<InterruptConfig, Error<I::Error>> {
        let val = self.regs.read_byte(Register::InterruptControl).await?;
        Ok(InterruptConfig::from_register(val))
    }

    pub async fn set_interrupt_control(
        &mut self,
        config: InterruptConfig,
    ) -> Result<(), Error<I::Error>> {
        self.regs
            .write_byte(Register::InterruptControl, config.to_register())
            .await
    }

    pub async fn interrupt_status(&mut self) -> Result<InterruptStatus, Error<I::Error>> {
        let val = self.regs.read_byte(Register::InterruptStatus).await?;
        Ok(InterruptStatus::from_register(val))
    }

    /// Clear the given status bits (write-one-to-clear)
    pub async fn clear_interrupt_status(
        &mut self,
        status: InterruptStatus,
    ) -> Result<(), Error<I::Error>> {
        self.regs
            .write_byte(Register::InterruptStatus, status.bits())
            .await
    }

    /// Proximity modulator timing adjustment register (0x8F), written verbatim
    pub async fn set_modulator_timing(&mut self, val: u8) -> Result<(), Error<I::Error>> {
        self.regs.write_byte(Register::ModulatorTiming, val).await
    }

    pub async fn set_low_threshold(&mut self, value: u16) -> Result<(), Error<I::Error>> {
        self.write_threshold(Threshold::Low, value).await?;
        self.thresholds.low = Some(value);
        Ok(())
    }

    pub async fn set_high_threshold(&mut self, value: u16) -> Result<(), Error<I::Error>> {
        self.write_threshold(Threshold::High, value).await?;
        self.thresholds.high = Some(value);
        Ok(())
    }

    /// MSB to the base register, then LSB to base + 1
    async fn write_threshold(
        &mut self,
        threshold: Threshold,
        value: u16,
    ) -> Result<(), Error<I::Error>> {
        let (msb_reg, lsb_reg) = threshold.registers();
        let [msb, lsb] = value.to_be_bytes();
        self.regs.write_byte(msb_reg, msb).await?;
        self.regs.write_byte(lsb_reg, lsb).await
    }

    // =========================================================================
    // Interrupts
    // =========================================================================

    /// Bind the interrupt pin and build the listener task.
    ///
    /// Any event still queued from an earlier binding is discarded. The
    /// listener gets its own bus device `i2c`, which must reach the same
    /// sensor; share the bus with [`crate::async_i2c_bus::SharedI2cDevice`].
    ///
    /// Only one listener can be attached. While an earlier one has not
    /// returned from `run` (or been dropped), the pin and bus device are
    /// handed back in [`InterruptBusy`]; call [`Vcnl4010::exit_clean_up`] and
    /// let the old listener finish first.
    pub fn setup_interrupt_handler<P, I2>(
        &mut self,
        pin: P,
        i2c: I2,
    ) -> Result<InterruptListener<'q, P, I2>, InterruptBusy<P, I2>>
    where
        P: Wait,
        I2: I2c,
    {
        let pin_number = self.config.interrupt_pin_or_default();
        let Some(claim) = self.queue.claim() else {
            warn!(
                "{}: interrupt pin {} still held by a running listener",
                SENSOR_NAME, pin_number
            );
            return Err(InterruptBusy { pin, i2c });
        };

        self.interrupt_bound = true;
        info!(
            "{}: falling-edge interrupt bound to pin {}",
            SENSOR_NAME, pin_number
        );

        Ok(InterruptListener::new(
            pin,
            pin_number,
            RegisterInterface::new(i2c, self.config.address()),
            claim,
        ))
    }

    /// Next queued interrupt event.
    ///
    /// With [`WaitMode::Blocking`] this suspends until one arrives; with
    /// [`WaitMode::NonBlocking`] it returns `None` when the queue is empty.
    pub async fn wait(&self, mode: WaitMode) -> Option<InterruptEvent> {
        self.queue.wait(mode).await
    }

    /// Release the interrupt binding. Safe to call more than once.
    pub fn exit_clean_up(&mut self) {
        if self.interrupt_bound {
            self.queue.request_release();
            self.interrupt_bound = false;
            info!(
                "{}: releasing interrupt pin {}",
                SENSOR_NAME,
                self.config.interrupt_pin_or_default()
            );
        } else {
            debug!("{}: no interrupt binding to release", SENSOR_NAME);
        }
    }
}

impl<I, D> Sensor<2> for Vcnl4010<'_, I, D>
where
    I: I2c,
    D: DelayNs,
{
    type Readings = Vcnl4010Readings;

    async fn read(&mut self) -> Result<Vcnl4010Readings, SensorError> {
        if !self.initialized {
            self.reset().await.map_err(|e| {
                error!("{} reset failed: {}", SENSOR_NAME, e);
                SensorError::InitializationFailed {
                    sensor: SENSOR_NAME,
                    details: "Failed to apply baseline configuration",
                }
            })?;
        }

        let ambient = self.ambient_value().await.map_err(|e| {
            error!("{} ambient read failed: {}", SENSOR_NAME, e);
            e.into_sensor_error("read ambient value")
        })?;

        let proximity = self.proximity_value().await.map_err(|e| {
            error!("{} proximity read failed: {}", SENSOR_NAME, e);
            e.into_sensor_error("read proximity value")
        })?;

        Ok(Vcnl4010Readings { ambient, proximity })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_time::Instant;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};
    extern crate std;
    use std::vec;
    use std::vec::Vec;

    const ADDR: u8 = DEFAULT_ADDRESS;

    fn write(reg: u8, val: u8) -> I2cTransaction {
        I2cTransaction::write(ADDR, vec![reg, val])
    }

    fn read(reg: u8, val: u8) -> I2cTransaction {
        I2cTransaction::write_read(ADDR, vec![reg], vec![val])
    }

    fn read_u16(reg: u8, val: u16) -> I2cTransaction {
        I2cTransaction::write_read(ADDR, vec![reg], val.to_be_bytes().to_vec())
    }

    fn reset_sequence(product_id: u8) -> Vec<I2cTransaction> {
        vec![
            read(0x81, product_id),
            write(0x80, 0x00),
            write(0x82, 0x04),
            write(0x83, 0x10),
            write(0x80, 0x07),
            write(0x89, 0x02),
            write(0x84, 0x1D),
        ]
    }

    fn proximity_on_demand_sequence(not_ready_polls: usize, value: u16) -> Vec<I2cTransaction> {
        let mut seq = vec![write(0x80, 0x0A)];
        seq.extend((0..not_ready_polls).map(|_| read(0x80, 0x0A)));
        seq.push(read(0x80, 0x2A));
        seq.push(read_u16(0x87, value));
        seq.push(write(0x80, 0x07));
        seq
    }

    fn driver<'q>(
        expectations: &[I2cTransaction],
        queue: &'q InterruptQueue,
    ) -> Vcnl4010<'q, I2cMock, NoopDelay> {
        Vcnl4010::new(
            I2cMock::new(expectations),
            NoopDelay::new(),
            DeviceConfig::default(),
            queue,
        )
    }

    fn finish(driver: Vcnl4010<'_, I2cMock, NoopDelay>) {
        let (mut i2c, _) = driver.release();
        i2c.done();
    }

    #[test]
    fn test_reset_writes_baseline() {
        let queue = InterruptQueue::new();
        let mut sensor = driver(&reset_sequence(0x21), &queue);

        block_on(sensor.reset()).unwrap();

        assert_eq!(sensor.mode(), DeviceMode::SelfTimed);
        assert_eq!(sensor.readings(), Vcnl4010Readings::default());
        finish(sensor);
    }

    #[test]
    fn test_reset_tolerates_unexpected_product_id() {
        let queue = InterruptQueue::new();
        let mut sensor = driver(&reset_sequence(0x31), &queue);

        block_on(sensor.reset()).unwrap();

        assert_eq!(sensor.mode(), DeviceMode::SelfTimed);
        finish(sensor);
    }

    #[test]
    fn test_threshold_writes_msb_first() {
        let expectations = [
            write(0x8C, 0x12),
            write(0x8D, 0x34),
            write(0x8A, 0x00),
            write(0x8B, 0xFF),
        ];
        let queue = InterruptQueue::new();
        let mut sensor = driver(&expectations, &queue);

        block_on(sensor.set_high_threshold(0x1234)).unwrap();
        block_on(sensor.set_low_threshold(0x00FF)).unwrap();

        assert_eq!(
            sensor.thresholds(),
            Thresholds {
                low: Some(0x00FF),
                high: Some(0x1234)
            }
        );
        finish(sensor);
    }

    #[test]
    fn test_proximity_on_demand_polls_until_ready() {
        let queue = InterruptQueue::new();
        let mut sensor = driver(&proximity_on_demand_sequence(3, 2345), &queue);

        let value = block_on(sensor.proximity_on_demand()).unwrap();

        assert_eq!(value, 2345);
        assert_eq!(sensor.readings().proximity, 2345);
        assert_eq!(sensor.mode(), DeviceMode::SelfTimed);
        finish(sensor);
    }

    #[test]
    fn test_proximity_on_demand_times_out() {
        let mut expectations = vec![write(0x80, 0x0A)];
        expectations.extend((0..5).map(|_| read(0x80, 0x0A)));
        expectations.push(write(0x80, 0x07));

        let queue = InterruptQueue::new();
        let mut sensor = driver(&expectations, &queue).with_polling(PollConfig {
            max_polls: 5,
            poll_interval_us: 10,
        });

        let result = block_on(sensor.proximity_on_demand());

        assert!(matches!(result, Err(Error::Timeout { polls: 5, .. })));
        assert_eq!(sensor.mode(), DeviceMode::SelfTimed);
        finish(sensor);
    }

    #[test]
    fn test_ambient_on_demand_stays_on_demand() {
        let expectations = [
            write(0x80, 0x14),
            read(0x80, 0x14),
            read(0x80, 0x54),
            read_u16(0x85, 0x0102),
        ];
        let queue = InterruptQueue::new();
        let mut sensor = driver(&expectations, &queue);

        let value = block_on(sensor.ambient_on_demand()).unwrap();

        assert_eq!(value, 0x0102);
        assert_eq!(sensor.mode(), DeviceMode::OnDemandAmbient);
        finish(sensor);
    }

    #[test]
    fn test_ambient_on_demand_times_out() {
        let mut expectations = vec![write(0x80, 0x14)];
        expectations.extend((0..5).map(|_| read(0x80, 0x14)));

        let queue = InterruptQueue::new();
        let mut sensor = driver(&expectations, &queue).with_polling(PollConfig {
            max_polls: 5,
            poll_interval_us: 10,
        });

        let result = block_on(sensor.ambient_on_demand());

        assert!(matches!(result, Err(Error::Timeout { polls: 5, .. })));
        assert_eq!(sensor.mode(), DeviceMode::OnDemandAmbient);
        assert_eq!(sensor.readings().ambient, 0);
        finish(sensor);
    }

    #[test]
    fn test_apply_thresholds_writes_low_then_high() {
        let expectations = [
            write(0x8A, 0x01),
            write(0x8B, 0x90),
            write(0x8C, 0x09),
            write(0x8D, 0xC4),
        ];
        let queue = InterruptQueue::new();
        let mut sensor = driver(&expectations, &queue);
        let thresholds = Thresholds {
            low: Some(400),
            high: Some(2500),
        };

        block_on(sensor.apply_thresholds(thresholds)).unwrap();
        block_on(sensor.apply_thresholds(Thresholds::default())).unwrap();

        assert_eq!(sensor.thresholds(), thresholds);
        finish(sensor);
    }

    #[test]
    fn test_timeout_maps_to_sensor_timeout() {
        let timeout: Error<ErrorKind> = Error::Timeout {
            operation: "ambient on-demand measurement",
            polls: 5,
        };
        let bus: Error<ErrorKind> = Error::Bus(ErrorKind::Other);

        assert_eq!(
            timeout.into_sensor_error("read ambient value"),
            SensorError::Timeout {
                sensor: SENSOR_NAME,
                operation: "read ambient value",
            }
        );
        assert!(matches!(
            bus.into_sensor_error("read proximity value"),
            SensorError::ReadFailed {
                operation: "read proximity value",
                ..
            }
        ));
    }

    #[test]
    fn test_calibrate_sets_rounded_threshold() {
        // Alternating 100/101 averages to 100.5, which rounds to 101.
        let mut expectations = Vec::new();
        for i in 0..30 {
            expectations.extend(proximity_on_demand_sequence(0, 100 + (i % 2) as u16));
        }
        expectations.extend(reset_sequence(0x21));
        expectations.push(write(0x8C, 0x00));
        expectations.push(write(0x8D, 0xFB));
        expectations.push(write(0x80, 0x07));

        let queue = InterruptQueue::new();
        let mut sensor = driver(&expectations, &queue);

        let calibration = block_on(sensor.calibrate()).unwrap();

        assert_eq!(
            calibration,
            Calibration {
                samples: 30,
                baseline: 101,
                high_threshold: 251,
            }
        );
        assert_eq!(sensor.thresholds().high, Some(251));
        assert_eq!(sensor.mode(), DeviceMode::SelfTimed);
        finish(sensor);
    }

    #[test]
    fn test_calibrate_stops_on_bus_error() {
        let mut expectations = proximity_on_demand_sequence(0, 90);
        expectations.push(I2cTransaction::write(ADDR, vec![0x80, 0x0A]).with_error(ErrorKind::Other));

        let queue = InterruptQueue::new();
        let mut sensor = driver(&expectations, &queue);

        let result = block_on(sensor.calibrate());

        assert!(matches!(result, Err(Error::Bus(ErrorKind::Other))));
        assert_eq!(sensor.thresholds().high, None);
        finish(sensor);
    }

    #[test]
    fn test_sensor_read_initializes_once() {
        let mut expectations = reset_sequence(0x21);
        expectations.push(read_u16(0x85, 812));
        expectations.push(read_u16(0x87, 2200));
        expectations.push(read_u16(0x85, 815));
        expectations.push(read_u16(0x87, 2210));

        let queue = InterruptQueue::new();
        let mut sensor = driver(&expectations, &queue);

        let first = block_on(sensor.read()).unwrap();
        let second = block_on(sensor.read()).unwrap();

        assert_eq!(first.to_array(), [812, 2200]);
        assert_eq!(second, Vcnl4010Readings { ambient: 815, proximity: 2210 });
        finish(sensor);
    }

    #[test]
    fn test_interrupt_control_readback() {
        let queue = InterruptQueue::new();
        let mut sensor = driver(&[read(0x89, 0x02)], &queue);

        let control = block_on(sensor.interrupt_control()).unwrap();

        assert_eq!(control, InterruptConfig::proximity_threshold());
        finish(sensor);
    }

    #[test]
    fn test_status_clear_and_modulator_timing() {
        let expectations = [read(0x8E, 0x03), write(0x8E, 0x03), write(0x8F, 0x01)];
        let queue = InterruptQueue::new();
        let mut sensor = driver(&expectations, &queue);

        let status = block_on(sensor.interrupt_status()).unwrap();
        assert!(status.contains(InterruptStatus::THRESHOLD_HIGH));
        assert!(status.contains(InterruptStatus::THRESHOLD_LOW));

        block_on(sensor.clear_interrupt_status(status)).unwrap();
        block_on(sensor.set_modulator_timing(0x01)).unwrap();
        finish(sensor);
    }

    #[test]
    fn test_setup_discards_stale_event() {
        let queue = InterruptQueue::new();
        queue.offer(InterruptEvent::new(
            InterruptStatus::THRESHOLD_HIGH,
            Instant::from_ticks(0),
        ));
        let mut sensor = driver(&[], &queue);

        let Ok(listener) = sensor.setup_interrupt_handler(NeverPin, I2cMock::new(&[])) else {
            panic!("first binding refused");
        };

        assert_eq!(listener.pin_number(), DEFAULT_INTERRUPT_PIN);
        assert_eq!(block_on(sensor.wait(WaitMode::NonBlocking)), None);

        let event = InterruptEvent::new(InterruptStatus::THRESHOLD_LOW, Instant::from_ticks(5));
        assert!(queue.offer(event));
        assert_eq!(block_on(sensor.wait(WaitMode::NonBlocking)), Some(event));

        sensor.exit_clean_up();
        let (_, mut listener_i2c) = block_on(listener.run());
        listener_i2c.done();
        finish(sensor);
    }

    #[test]
    fn test_exit_clean_up_is_idempotent() {
        let queue = InterruptQueue::new();
        let config = DeviceConfig::default().with_interrupt_pin(17);
        let mut sensor = Vcnl4010::new(I2cMock::new(&[]), NoopDelay::new(), config, &queue);

        sensor.exit_clean_up();
        let Ok(listener) = sensor.setup_interrupt_handler(NeverPin, I2cMock::new(&[])) else {
            panic!("first binding refused");
        };
        assert_eq!(listener.pin_number(), 17);

        sensor.exit_clean_up();
        sensor.exit_clean_up();

        let (_, mut listener_i2c) = block_on(listener.run());
        listener_i2c.done();
        finish(sensor);
    }

    #[test]
    fn test_second_binding_refused_while_listener_attached() {
        let queue = InterruptQueue::new();
        let mut sensor = driver(&[], &queue);

        let Ok(first) = sensor.setup_interrupt_handler(NeverPin, I2cMock::new(&[])) else {
            panic!("first binding refused");
        };
        let Err(busy) = sensor.setup_interrupt_handler(NeverPin, I2cMock::new(&[])) else {
            panic!("second binding accepted");
        };
        let mut refused_i2c = busy.i2c;
        refused_i2c.done();
        assert!(queue.has_listener());

        sensor.exit_clean_up();
        let (_, mut first_i2c) = block_on(first.run());
        first_i2c.done();

        assert!(!queue.has_listener());
        finish(sensor);
    }

    #[test]
    fn test_rebind_after_clean_up_waits_for_old_listener() {
        let queue = InterruptQueue::new();
        let mut sensor = driver(&[], &queue);

        let Ok(old) = sensor.setup_interrupt_handler(NeverPin, I2cMock::new(&[])) else {
            panic!("first binding refused");
        };
        sensor.exit_clean_up();

        let Err(busy) = sensor.setup_interrupt_handler(NeverPin, I2cMock::new(&[])) else {
            panic!("rebound before the old listener returned");
        };
        let mut refused_i2c = busy.i2c;
        refused_i2c.done();

        let (_, mut old_i2c) = block_on(old.run());
        old_i2c.done();
        assert!(!queue.has_listener());

        let Ok(new) = sensor.setup_interrupt_handler(NeverPin, I2cMock::new(&[])) else {
            panic!("rebinding refused after the old listener returned");
        };
        assert!(queue.has_listener());

        sensor.exit_clean_up();
        let (_, mut new_i2c) = block_on(new.run());
        new_i2c.done();
        assert!(!queue.has_listener());
        finish(sensor);
    }

    /// Interrupt line that never goes low
    struct NeverPin;

    impl embedded_hal::digital::ErrorType for NeverPin {
        type Error = core::convert::Infallible;
    }

    impl Wait for NeverPin {
        async fn wait_for_high(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        async fn wait_for_low(&mut self) -> Result<(), Self::Error> {
            core::future::pending().await
        }

        async fn wait_for_rising_edge(&mut self) -> Result<(), Self::Error> {
            core::future::pending().await
        }

        async fn wait_for_falling_edge(&mut self) -> Result<(), Self::Error> {
            core::future::pending().await
        }

        async fn wait_for_any_edge(&mut self) -> Result<(), Self::Error> {
            core::future::pending().await
        }
    }
}
