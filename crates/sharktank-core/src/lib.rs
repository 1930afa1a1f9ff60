//! Hardware-independent core library for the sharktank light monitor
//!
//! Holds the VCNL4010 proximity/ambient light driver with its interrupt
//! delivery path, the shared I2C bus device, configuration, and the monitor
//! loop that uploads ambient readings.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on embedded
//! targets and on desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod app_state;
pub mod async_i2c_bus;
pub mod config;
pub mod monitor;
pub mod sensors;
