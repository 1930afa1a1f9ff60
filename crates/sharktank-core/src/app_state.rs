//! Application-wide error type for the sharktank monitor

use core::fmt::{self, Write};

use heapless::String;
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("Sensor error: {0}")]
    Sensor(String<64>),
    #[error("Display error: {0}")]
    Display(String<64>),
    #[error("Telemetry error: {0}")]
    Telemetry(String<64>),
    #[error("Configuration error: {0}")]
    Config(String<64>),
}

impl AppError {
    pub fn sensor(details: impl fmt::Display) -> Self {
        Self::Sensor(truncated(details))
    }

    pub fn display(details: impl fmt::Display) -> Self {
        Self::Display(truncated(details))
    }

    pub fn telemetry(details: impl fmt::Display) -> Self {
        Self::Telemetry(truncated(details))
    }

    pub fn config(details: impl fmt::Display) -> Self {
        Self::Config(truncated(details))
    }
}

/// Format into a fixed buffer, keeping whatever fits
fn truncated<const N: usize>(details: impl fmt::Display) -> String<N> {
    let mut out = Truncating(String::new());
    let _ = write!(out, "{}", details);
    out.0
}

struct Truncating<const N: usize>(String<N>);

impl<const N: usize> Write for Truncating<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                return Err(fmt::Error);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    extern crate std;
    use std::format;

    #[test]
    fn test_message_is_kept() {
        let err = AppError::telemetry("feed lookup failed");

        assert_eq!(format!("{}", err), "Telemetry error: feed lookup failed");
    }

    #[test]
    fn test_long_message_is_truncated() {
        let long = "x".repeat(100);

        let AppError::Sensor(details) = AppError::sensor(long.as_str()) else {
            panic!("wrong variant");
        };

        assert_eq!(details.len(), 64);
    }
}
