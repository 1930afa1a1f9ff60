use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::app_state::AppError;
use crate::sensors::vcnl4010::{DEFAULT_ADDRESS, DEFAULT_INTERRUPT_PIN};

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct AppConfig<'a> {
    pub device: DeviceConfig,
    pub polling: PollConfig,
    pub calibration: CalibrationConfig,
    pub telemetry: TelemetryConfig<'a>,
}

impl<'a> AppConfig<'a> {
    /// Encode with postcard for persistence
    pub fn to_bytes(&self) -> Result<Vec<u8>, AppError> {
        postcard::to_allocvec(self).map_err(AppError::config)
    }

    /// Decode a configuration produced by [`AppConfig::to_bytes`].
    /// String fields borrow from `bytes`.
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, AppError> {
        postcard::from_bytes(bytes).map_err(AppError::config)
    }
}

/// Where the sensor lives. Fixed once the driver is built.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    address: u8,
    bus: u8,
    interrupt_pin: Option<u8>,
}

impl DeviceConfig {
    pub const fn new(address: u8, bus: u8, interrupt_pin: Option<u8>) -> Self {
        Self {
            address,
            bus,
            interrupt_pin,
        }
    }

    pub const fn with_interrupt_pin(self, pin: u8) -> Self {
        Self {
            interrupt_pin: Some(pin),
            ..self
        }
    }

    pub const fn address(&self) -> u8 {
        self.address
    }

    pub const fn bus(&self) -> u8 {
        self.bus
    }

    pub const fn interrupt_pin(&self) -> Option<u8> {
        self.interrupt_pin
    }

    /// Configured interrupt pin, or BCM 24
    pub const fn interrupt_pin_or_default(&self) -> u8 {
        match self.interrupt_pin {
            Some(pin) => pin,
            None => DEFAULT_INTERRUPT_PIN,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS, 1, None)
    }
}

/// Budget for on-demand measurement completion polling
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Command register reads before giving up
    pub max_polls: u32,
    /// Pause between reads
    pub poll_interval_us: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_polls: 1000,
            poll_interval_us: 100,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationConfig {
    /// On-demand proximity samples averaged for the baseline
    pub samples: u16,
    /// Added to the baseline to form the high threshold
    pub margin: u16,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            samples: 30,
            margin: 150,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryConfig<'a> {
    /// Host identity, the feed name prefix
    pub host: &'a str,
    pub feed_suffix: &'a str,
    /// Wait before each measurement
    pub upload_interval_secs: u32,
    /// How long the status lines stay up after an upload
    pub hold_secs: u32,
}

impl Default for TelemetryConfig<'_> {
    fn default() -> Self {
        Self {
            host: "sharktank",
            feed_suffix: "light",
            upload_interval_secs: 30,
            hold_secs: 30,
        }
    }
}
