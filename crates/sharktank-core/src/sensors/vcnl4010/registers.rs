//! VCNL4010 register map and bit-field encodings.
//!
//! Every value written to the device is composed from the types in this
//! module. Each register gets its own type so a proximity rate can never be
//! written into the ambient parameter register by accident.

use core::ops::{BitOr, BitOrAssign};

// =============================================================================
// I2C Address
// =============================================================================

/// Default 7-bit I2C address of the VCNL4010.
pub const DEFAULT_ADDRESS: u8 = 0x13;

/// Product ID nibble reported in the upper half of [`Register::ProductId`].
pub const EXPECTED_PRODUCT_ID: u8 = 0x2;

// =============================================================================
// Register Addresses
// =============================================================================

/// Register addresses, 0x80 through 0x90.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Register {
    Command = 0x80,
    ProductId = 0x81,
    ProximityRate = 0x82,
    LedCurrent = 0x83,
    AmbientParameter = 0x84,
    AmbientValueHigh = 0x85,
    AmbientValueLow = 0x86,
    ProximityValueHigh = 0x87,
    ProximityValueLow = 0x88,
    InterruptControl = 0x89,
    LowThresholdHigh = 0x8A,
    LowThresholdLow = 0x8B,
    HighThresholdHigh = 0x8C,
    HighThresholdLow = 0x8D,
    InterruptStatus = 0x8E,
    ModulatorTiming = 0x8F,
    /// Ambient IR light level. Not intended for customer use.
    AmbientIrLevel = 0x90,
}

impl Register {
    /// Register address on the bus
    pub const fn addr(self) -> u8 {
        self as u8
    }
}

// =============================================================================
// Command Register (0x80)
// =============================================================================

/// Contents of the command register.
///
/// The low five bits are control bits. `PROX_DATA_READY`, `AMBI_DATA_READY`
/// and `LOCK` are status bits set by the device and are only meaningful on
/// a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Command(u8);

impl Command {
    pub const ALL_DISABLE: Self = Self(0x00);
    pub const SELFTIMED_ENABLE: Self = Self(0x01);
    pub const PROX_ENABLE: Self = Self(0x02);
    pub const AMBI_ENABLE: Self = Self(0x04);
    pub const PROX_ON_DEMAND: Self = Self(0x08);
    pub const AMBI_ON_DEMAND: Self = Self(0x10);
    pub const PROX_DATA_READY: Self = Self(0x20);
    pub const AMBI_DATA_READY: Self = Self(0x40);
    pub const LOCK: Self = Self(0x80);

    /// Proximity and ambient measurements repeated by the device itself.
    pub const SELF_TIMED: Self =
        Self(Self::PROX_ENABLE.0 | Self::AMBI_ENABLE.0 | Self::SELFTIMED_ENABLE.0);
    /// Trigger a single proximity measurement.
    pub const ON_DEMAND_PROXIMITY: Self = Self(Self::PROX_ENABLE.0 | Self::PROX_ON_DEMAND.0);
    /// Trigger a single ambient light measurement.
    pub const ON_DEMAND_AMBIENT: Self = Self(Self::AMBI_ENABLE.0 | Self::AMBI_ON_DEMAND.0);

    const WRITABLE_MASK: u8 = 0x1F;

    /// Decode a value read back from the device.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Byte to write. Read-only status bits are masked off.
    pub const fn to_register(self) -> u8 {
        self.0 & Self::WRITABLE_MASK
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn proximity_ready(self) -> bool {
        self.contains(Self::PROX_DATA_READY)
    }

    pub const fn ambient_ready(self) -> bool {
        self.contains(Self::AMBI_DATA_READY)
    }
}

impl BitOr for Command {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Command {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// =============================================================================
// Product ID Register (0x81)
// =============================================================================

/// Decoded product ID / revision register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductId {
    pub product: u8,
    pub revision: u8,
}

impl ProductId {
    const PRODUCT_MASK: u8 = 0xF0;
    const REVISION_MASK: u8 = 0x0F;

    pub const fn from_register(val: u8) -> Self {
        Self {
            product: (val & Self::PRODUCT_MASK) >> 4,
            revision: val & Self::REVISION_MASK,
        }
    }

    pub const fn is_vcnl4010(self) -> bool {
        self.product == EXPECTED_PRODUCT_ID
    }
}

// =============================================================================
// Proximity Rate (0x82) and LED Current (0x83)
// =============================================================================

/// Proximity measurements per second in self-timed mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ProximityRate {
    /// 1.95 measurements/s
    #[default]
    Rate2 = 0x00,
    /// 3.90625 measurements/s
    Rate4 = 0x01,
    /// 7.8125 measurements/s
    Rate8 = 0x02,
    /// 16.625 measurements/s
    Rate16 = 0x03,
    /// 31.25 measurements/s
    Rate31 = 0x04,
    /// 62.5 measurements/s
    Rate62 = 0x05,
    /// 125 measurements/s
    Rate125 = 0x06,
    /// 250 measurements/s
    Rate250 = 0x07,
}

impl ProximityRate {
    const MASK: u8 = 0x07;

    pub const fn to_register(self) -> u8 {
        self as u8 & Self::MASK
    }

    pub const fn from_register(val: u8) -> Self {
        match val & Self::MASK {
            0x00 => Self::Rate2,
            0x01 => Self::Rate4,
            0x02 => Self::Rate8,
            0x03 => Self::Rate16,
            0x04 => Self::Rate31,
            0x05 => Self::Rate62,
            0x06 => Self::Rate125,
            _ => Self::Rate250,
        }
    }
}

/// IR LED current in steps of 10 mA, 0 to 63 (0 mA to 200 mA).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedCurrent(u8);

impl LedCurrent {
    const MASK: u8 = 0x3F;
    pub const MAX: u8 = 63;

    /// Returns `None` when `steps` does not fit the six current bits.
    pub const fn new(steps: u8) -> Option<Self> {
        if steps > Self::MAX {
            None
        } else {
            Some(Self(steps))
        }
    }

    /// Clamp to the 63-step maximum.
    pub const fn saturating(steps: u8) -> Self {
        if steps > Self::MAX {
            Self(Self::MAX)
        } else {
            Self(steps)
        }
    }

    pub const fn steps(self) -> u8 {
        self.0
    }

    pub const fn to_register(self) -> u8 {
        self.0 & Self::MASK
    }
}

impl Default for LedCurrent {
    /// Power-on default of 20 mA
    fn default() -> Self {
        Self(2)
    }
}

/// Settings for the proximity channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProximityConfig {
    pub rate: ProximityRate,
    pub led_current: LedCurrent,
}

// =============================================================================
// Ambient Light Parameter Register (0x84)
// =============================================================================

/// Number of conversions averaged into one ambient result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum AmbientAveraging {
    Avg1 = 0x00,
    Avg2 = 0x01,
    Avg4 = 0x02,
    Avg8 = 0x03,
    Avg16 = 0x04,
    #[default]
    Avg32 = 0x05,
    Avg64 = 0x06,
    Avg128 = 0x07,
}

/// Ambient light samples per second in self-timed mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum AmbientRate {
    Rate1 = 0x00,
    #[default]
    Rate2 = 0x10,
    Rate3 = 0x20,
    Rate4 = 0x30,
    Rate5 = 0x40,
    Rate6 = 0x50,
    Rate8 = 0x60,
    Rate10 = 0x70,
}

/// Ambient light parameter register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmbientConfig {
    pub averaging: AmbientAveraging,
    pub auto_offset: bool,
    pub rate: AmbientRate,
    pub continuous_conversion: bool,
}

impl AmbientConfig {
    const AVERAGING_MASK: u8 = 0x07;
    const AUTO_OFFSET: u8 = 0x08;
    const RATE_MASK: u8 = 0x70;
    const CONTINUOUS_CONVERSION: u8 = 0x80;

    pub const fn to_register(self) -> u8 {
        let mut val = (self.averaging as u8 & Self::AVERAGING_MASK)
            | (self.rate as u8 & Self::RATE_MASK);
        if self.auto_offset {
            val |= Self::AUTO_OFFSET;
        }
        if self.continuous_conversion {
            val |= Self::CONTINUOUS_CONVERSION;
        }
        val
    }
}

impl Default for AmbientConfig {
    /// Power-on defaults: 32 averages, auto offset on, 2 samples/s
    fn default() -> Self {
        Self {
            averaging: AmbientAveraging::Avg32,
            auto_offset: true,
            rate: AmbientRate::Rate2,
            continuous_conversion: false,
        }
    }
}

// =============================================================================
// Interrupt Control Register (0x89)
// =============================================================================

/// Which measurement the low/high thresholds are compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ThresholdSource {
    #[default]
    Proximity = 0x00,
    Ambient = 0x01,
}

/// Consecutive out-of-window measurements needed before a threshold interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ExceedCount {
    #[default]
    Count1 = 0x00,
    Count2 = 0x20,
    Count4 = 0x40,
    Count8 = 0x60,
    Count16 = 0x80,
    Count32 = 0xA0,
    Count64 = 0xC0,
    Count128 = 0xE0,
}

impl ExceedCount {
    const MASK: u8 = 0xE0;

    pub const fn from_register(val: u8) -> Self {
        match val & Self::MASK {
            0x00 => Self::Count1,
            0x20 => Self::Count2,
            0x40 => Self::Count4,
            0x60 => Self::Count8,
            0x80 => Self::Count16,
            0xA0 => Self::Count32,
            0xC0 => Self::Count64,
            _ => Self::Count128,
        }
    }
}

/// Interrupt control register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterruptConfig {
    pub source: ThresholdSource,
    pub threshold_enable: bool,
    pub ambient_ready_enable: bool,
    pub proximity_ready_enable: bool,
    pub exceed_count: ExceedCount,
}

impl InterruptConfig {
    const THRESHOLD_SELECT: u8 = 0x01;
    const THRESHOLD_ENABLE: u8 = 0x02;
    const AMBIENT_READY_ENABLE: u8 = 0x04;
    const PROXIMITY_READY_ENABLE: u8 = 0x08;

    /// Threshold interrupt on proximity, firing after a single crossing.
    pub const fn proximity_threshold() -> Self {
        Self {
            source: ThresholdSource::Proximity,
            threshold_enable: true,
            ambient_ready_enable: false,
            proximity_ready_enable: false,
            exceed_count: ExceedCount::Count1,
        }
    }

    pub const fn to_register(self) -> u8 {
        let mut val = (self.source as u8 & Self::THRESHOLD_SELECT) | self.exceed_count as u8;
        if self.threshold_enable {
            val |= Self::THRESHOLD_ENABLE;
        }
        if self.ambient_ready_enable {
            val |= Self::AMBIENT_READY_ENABLE;
        }
        if self.proximity_ready_enable {
            val |= Self::PROXIMITY_READY_ENABLE;
        }
        val
    }

    pub const fn from_register(val: u8) -> Self {
        Self {
            source: if val & Self::THRESHOLD_SELECT != 0 {
                ThresholdSource::Ambient
            } else {
                ThresholdSource::Proximity
            },
            threshold_enable: val & Self::THRESHOLD_ENABLE != 0,
            ambient_ready_enable: val & Self::AMBIENT_READY_ENABLE != 0,
            proximity_ready_enable: val & Self::PROXIMITY_READY_ENABLE != 0,
            exceed_count: ExceedCount::from_register(val),
        }
    }
}

// =============================================================================
// Thresholds (0x8A-0x8D)
// =============================================================================

/// The two threshold register pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    Low,
    High,
}

impl Threshold {
    /// (MSB register, LSB register). The LSB register is always base + 1.
    pub const fn registers(self) -> (Register, Register) {
        match self {
            Self::Low => (Register::LowThresholdHigh, Register::LowThresholdLow),
            Self::High => (Register::HighThresholdHigh, Register::HighThresholdLow),
        }
    }
}

/// Low and high threshold values. `None` leaves the device register untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Thresholds {
    pub low: Option<u16>,
    pub high: Option<u16>,
}

// =============================================================================
// Interrupt Status Register (0x8E)
// =============================================================================

/// Interrupt status flags. Writing a set bit back clears it on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterruptStatus(u8);

impl InterruptStatus {
    pub const THRESHOLD_HIGH: Self = Self(0x01);
    pub const THRESHOLD_LOW: Self = Self(0x02);
    pub const AMBIENT_READY: Self = Self(0x04);
    pub const PROXIMITY_READY: Self = Self(0x08);

    pub const fn from_register(val: u8) -> Self {
        Self(val)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_timed_command() {
        assert_eq!(Command::SELF_TIMED.to_register(), 0x07);
        assert_eq!(
            (Command::PROX_ENABLE | Command::AMBI_ENABLE | Command::SELFTIMED_ENABLE).to_register(),
            0x07
        );
    }

    #[test]
    fn test_on_demand_commands() {
        assert_eq!(Command::ON_DEMAND_PROXIMITY.to_register(), 0x0A);
        assert_eq!(Command::ON_DEMAND_AMBIENT.to_register(), 0x14);
    }

    #[test]
    fn test_command_masks_status_bits_on_write() {
        let readback = Command::from_bits(0xE7);
        assert!(readback.proximity_ready());
        assert!(readback.ambient_ready());
        assert!(readback.contains(Command::LOCK));
        assert_eq!(readback.to_register(), 0x07);
    }

    #[test]
    fn test_product_id_nibbles() {
        let id = ProductId::from_register(0x21);
        assert_eq!(id.product, 2);
        assert_eq!(id.revision, 1);
        assert!(id.is_vcnl4010());
        assert!(!ProductId::from_register(0x31).is_vcnl4010());
    }

    #[test]
    fn test_led_current_range() {
        assert_eq!(LedCurrent::new(16).map(LedCurrent::to_register), Some(16));
        assert_eq!(LedCurrent::new(63).map(LedCurrent::to_register), Some(0x3F));
        assert!(LedCurrent::new(64).is_none());
    }

    #[test]
    fn test_proximity_rate_register() {
        assert_eq!(ProximityRate::Rate31.to_register(), 0x04);
        assert_eq!(ProximityRate::from_register(0xFC), ProximityRate::Rate31);
    }

    #[test]
    fn test_ambient_config_register() {
        assert_eq!(AmbientConfig::default().to_register(), 0x05 | 0x08 | 0x10);

        let config = AmbientConfig {
            averaging: AmbientAveraging::Avg128,
            auto_offset: false,
            rate: AmbientRate::Rate10,
            continuous_conversion: true,
        };
        assert_eq!(config.to_register(), 0x07 | 0x70 | 0x80);
    }

    #[test]
    fn test_interrupt_control_register() {
        assert_eq!(InterruptConfig::proximity_threshold().to_register(), 0x02);

        let config = InterruptConfig {
            source: ThresholdSource::Ambient,
            threshold_enable: true,
            ambient_ready_enable: true,
            proximity_ready_enable: true,
            exceed_count: ExceedCount::Count128,
        };
        assert_eq!(config.to_register(), 0xEF);
        assert_eq!(InterruptConfig::from_register(0xEF), config);
    }

    #[test]
    fn test_threshold_registers_are_consecutive() {
        for threshold in [Threshold::Low, Threshold::High] {
            let (msb, lsb) = threshold.registers();
            assert_eq!(msb.addr() + 1, lsb.addr());
        }
        assert_eq!(Threshold::Low.registers().0.addr(), 0x8A);
        assert_eq!(Threshold::High.registers().0.addr(), 0x8C);
    }

    #[test]
    fn test_interrupt_status_flags() {
        let status = InterruptStatus::from_register(0x09);
        assert!(status.contains(InterruptStatus::THRESHOLD_HIGH));
        assert!(status.contains(InterruptStatus::PROXIMITY_READY));
        assert!(!status.contains(InterruptStatus::THRESHOLD_LOW));
        assert!(InterruptStatus::default().is_empty());
    }
}
