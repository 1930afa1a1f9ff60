//! Simulated VCNL4010 register file and interrupt line.
//!
//! The register file answers the same I2C transactions as the real part:
//! a one-byte write selects a register, further written bytes land in
//! consecutive registers, and reads auto-increment from the selected one.
//! Measurements advance on every read of a value register.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embedded_hal::digital::ErrorType as PinErrorType;
use embedded_hal::i2c::ErrorKind;
use embedded_hal_async::digital::Wait;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};
use log::{debug, trace};

use sharktank_core::sensors::vcnl4010::{
    Command, InterruptConfig, InterruptStatus, Register, ThresholdSource,
};

/// Product ID register contents: product 2, revision 1.
pub const SIMULATED_PRODUCT_ID: u8 = 0x21;

const FIRST_REGISTER: u8 = 0x80;
const LAST_REGISTER: u8 = 0x90;
const REGISTER_COUNT: usize = (LAST_REGISTER - FIRST_REGISTER + 1) as usize;

/// Falling edges on the simulated INT line
pub type InterruptLine = Signal<CriticalSectionRawMutex, ()>;

// ---------------------------------------------------------------------------
// Scene
// ---------------------------------------------------------------------------

/// What the sensor "sees".
///
/// Ambient light follows a slow sinusoid. Proximity is a noise floor around
/// `proximity_floor`, unless a fixed script is set, in which case samples
/// cycle through it.
pub struct Scene {
    elapsed: f64,
    noise: u32,
    pub proximity_floor: u16,
    script: Vec<u16>,
    cursor: usize,
}

impl Scene {
    pub fn new(proximity_floor: u16) -> Self {
        Self {
            elapsed: 0.0,
            noise: 0x2545_F491,
            proximity_floor,
            script: Vec::new(),
            cursor: 0,
        }
    }

    pub fn scripted(samples: &[u16]) -> Self {
        Self {
            script: samples.to_vec(),
            ..Self::new(0)
        }
    }

    fn next_proximity(&mut self) -> u16 {
        if !self.script.is_empty() {
            let value = self.script[self.cursor % self.script.len()];
            self.cursor += 1;
            return value;
        }

        // xorshift32
        self.noise ^= self.noise << 13;
        self.noise ^= self.noise >> 17;
        self.noise ^= self.noise << 5;
        let jitter = (self.noise % 41) as u16;

        // Every 16th sample something passes in front of the sensor.
        self.cursor += 1;
        let object = if self.cursor % 16 == 0 { 900 } else { 0 };

        self.proximity_floor.saturating_add(jitter).saturating_add(object)
    }

    fn next_ambient(&mut self) -> u16 {
        self.elapsed += 1.0;
        let t = self.elapsed;
        let lux = 800.0 + 300.0 * (t / 40.0).sin() + 25.0 * (t / 7.0).cos();
        lux.clamp(0.0, u16::MAX as f64) as u16
    }
}

// ---------------------------------------------------------------------------
// Register file
// ---------------------------------------------------------------------------

pub struct SimulatedVcnl4010<'a> {
    address: u8,
    regs: [u8; REGISTER_COUNT],
    pointer: u8,
    scene: Scene,
    line: &'a InterruptLine,
}

impl<'a> SimulatedVcnl4010<'a> {
    pub fn new(address: u8, scene: Scene, line: &'a InterruptLine) -> Self {
        let mut sim = Self {
            address,
            regs: [0; REGISTER_COUNT],
            pointer: FIRST_REGISTER,
            scene,
            line,
        };
        sim.set(Register::ProductId, SIMULATED_PRODUCT_ID);
        sim
    }

    /// Current register contents, for inspection
    pub fn register(&self, reg: Register) -> u8 {
        self.regs[Self::index(reg.addr())]
    }

    pub fn high_threshold(&self) -> u16 {
        u16::from_be_bytes([
            self.register(Register::HighThresholdHigh),
            self.register(Register::HighThresholdLow),
        ])
    }

    fn index(addr: u8) -> usize {
        (addr - FIRST_REGISTER) as usize
    }

    fn set(&mut self, reg: Register, val: u8) {
        self.regs[Self::index(reg.addr())] = val;
    }

    fn set_u16(&mut self, msb: Register, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        self.regs[Self::index(msb.addr())] = hi;
        self.regs[Self::index(msb.addr()) + 1] = lo;
    }

    fn command(&self) -> Command {
        Command::from_bits(self.register(Register::Command))
    }

    fn in_range(addr: u8) -> bool {
        (FIRST_REGISTER..=LAST_REGISTER).contains(&addr)
    }

    fn write_register(&mut self, addr: u8, val: u8) {
        match addr {
            a if a == Register::Command.addr() => self.write_command(val),
            a if a == Register::ProductId.addr() => {}
            a if a == Register::InterruptStatus.addr() => {
                let status = self.register(Register::InterruptStatus) & !val;
                self.set(Register::InterruptStatus, status);
                trace!("sim: interrupt status cleared to 0x{:02X}", status);
            }
            _ => self.regs[Self::index(addr)] = val,
        }
    }

    /// Control bits are stored, the read-only status bits are recomputed.
    fn write_command(&mut self, val: u8) {
        let mut cmd = Command::from_bits(val & 0x1F);

        // On-demand conversions finish within one transaction here.
        if cmd.contains(Command::PROX_ON_DEMAND) {
            let value = self.scene.next_proximity();
            self.set_u16(Register::ProximityValueHigh, value);
            cmd = Command::from_bits(cmd.bits() & !Command::PROX_ON_DEMAND.bits())
                | Command::PROX_DATA_READY;
            debug!("sim: on-demand proximity {}", value);
        }
        if cmd.contains(Command::AMBI_ON_DEMAND) {
            let value = self.scene.next_ambient();
            self.set_u16(Register::AmbientValueHigh, value);
            cmd = Command::from_bits(cmd.bits() & !Command::AMBI_ON_DEMAND.bits())
                | Command::AMBI_DATA_READY;
            debug!("sim: on-demand ambient {}", value);
        }

        self.set(Register::Command, cmd.bits());
    }

    fn read_register(&mut self, addr: u8) -> u8 {
        let self_timed = self.command().contains(Command::SELFTIMED_ENABLE);

        if self_timed && addr == Register::ProximityValueHigh.addr() {
            let value = self.scene.next_proximity();
            self.set_u16(Register::ProximityValueHigh, value);
            self.check_proximity_threshold(value);
        } else if self_timed && addr == Register::AmbientValueHigh.addr() {
            let value = self.scene.next_ambient();
            self.set_u16(Register::AmbientValueHigh, value);
        }

        self.regs[Self::index(addr)]
    }

    fn check_proximity_threshold(&mut self, value: u16) {
        let control = InterruptConfig::from_register(self.register(Register::InterruptControl));
        if !(control.threshold_enable && control.source == ThresholdSource::Proximity) {
            return;
        }

        let low = u16::from_be_bytes([
            self.register(Register::LowThresholdHigh),
            self.register(Register::LowThresholdLow),
        ]);
        let mut status = InterruptStatus::from_register(self.register(Register::InterruptStatus));
        let was_idle = status.is_empty();

        let raised = if value > self.high_threshold() {
            InterruptStatus::THRESHOLD_HIGH
        } else if value < low {
            InterruptStatus::THRESHOLD_LOW
        } else {
            return;
        };

        status = InterruptStatus::from_register(status.bits() | raised.bits());
        self.set(Register::InterruptStatus, status.bits());

        // The INT line is low while any status bit is set; only the first
        // bit produces an edge.
        if was_idle {
            debug!("sim: proximity {} crossed threshold, INT low", value);
            self.line.signal(());
        }
    }
}

impl ErrorType for SimulatedVcnl4010<'_> {
    type Error = ErrorKind;
}

impl I2c for SimulatedVcnl4010<'_> {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != self.address {
            return Err(ErrorKind::NoAcknowledge(
                embedded_hal::i2c::NoAcknowledgeSource::Address,
            ));
        }

        for op in operations {
            match op {
                Operation::Write(bytes) => {
                    let Some((&reg, data)) = bytes.split_first() else {
                        continue;
                    };
                    if !Self::in_range(reg) {
                        return Err(ErrorKind::NoAcknowledge(
                            embedded_hal::i2c::NoAcknowledgeSource::Data,
                        ));
                    }
                    self.pointer = reg;
                    for &val in data {
                        if Self::in_range(self.pointer) {
                            self.write_register(self.pointer, val);
                        }
                        self.pointer = self.pointer.wrapping_add(1);
                    }
                }
                Operation::Read(buf) => {
                    for byte in buf.iter_mut() {
                        *byte = if Self::in_range(self.pointer) {
                            self.read_register(self.pointer)
                        } else {
                            0
                        };
                        self.pointer = self.pointer.wrapping_add(1);
                    }
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Interrupt pin
// ---------------------------------------------------------------------------

/// GPIO input wired to the simulated INT line
pub struct SimulatedInterruptPin<'a> {
    line: &'a InterruptLine,
}

impl<'a> SimulatedInterruptPin<'a> {
    pub fn new(line: &'a InterruptLine) -> Self {
        Self { line }
    }
}

impl PinErrorType for SimulatedInterruptPin<'_> {
    type Error = core::convert::Infallible;
}

impl Wait for SimulatedInterruptPin<'_> {
    async fn wait_for_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn wait_for_low(&mut self) -> Result<(), Self::Error> {
        self.line.wait().await;
        Ok(())
    }

    async fn wait_for_rising_edge(&mut self) -> Result<(), Self::Error> {
        core::future::pending().await
    }

    async fn wait_for_falling_edge(&mut self) -> Result<(), Self::Error> {
        self.line.wait().await;
        Ok(())
    }

    async fn wait_for_any_edge(&mut self) -> Result<(), Self::Error> {
        self.line.wait().await;
        Ok(())
    }
}
