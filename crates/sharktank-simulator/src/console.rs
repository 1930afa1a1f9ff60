//! Host stand-ins for the monitor's collaborators.

use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;

use sharktank_core::app_state::AppError;
use sharktank_core::monitor::{Clock, StatusDisplay, TelemetrySink, TimeOfDay};

const LINES: usize = 2;

/// Two-line display printed to stdout on `show`
#[derive(Default)]
pub struct ConsoleDisplay {
    lines: [String; LINES],
}

impl StatusDisplay for ConsoleDisplay {
    async fn set_line(&mut self, line: usize, text: &str) -> Result<(), AppError> {
        let slot = self
            .lines
            .get_mut(line)
            .ok_or_else(|| AppError::display(format_args!("no line {}", line)))?;
        *slot = text.to_owned();
        Ok(())
    }

    async fn show(&mut self) -> Result<(), AppError> {
        println!("+----------------------+");
        for line in &self.lines {
            println!("| {:<20} |", line);
        }
        println!("+----------------------+");
        Ok(())
    }

    async fn clear(&mut self) -> Result<(), AppError> {
        self.lines = Default::default();
        Ok(())
    }
}

/// Feed store that only logs what it is sent
#[derive(Default)]
pub struct LoggingSink {
    feeds: BTreeSet<String>,
    uploads: usize,
}

impl LoggingSink {
    pub fn uploads(&self) -> usize {
        self.uploads
    }
}

impl TelemetrySink for LoggingSink {
    async fn has_feed(&mut self, feed: &str) -> Result<bool, AppError> {
        Ok(self.feeds.contains(feed))
    }

    async fn create_feed(&mut self, feed: &str) -> Result<(), AppError> {
        self.feeds.insert(feed.to_owned());
        Ok(())
    }

    async fn send(&mut self, feed: &str, value: f32) -> Result<(), AppError> {
        if !self.feeds.contains(feed) {
            return Err(AppError::telemetry(format_args!("unknown feed {}", feed)));
        }
        self.uploads += 1;
        info!("telemetry: {} <- {:.1}", feed, value);
        Ok(())
    }
}

/// Wall clock in UTC
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimeOfDay {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let minutes_today = (secs / 60) % (24 * 60);
        TimeOfDay {
            hour: (minutes_today / 60) as u8,
            minute: (minutes_today % 60) as u8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn test_send_to_unknown_feed_fails() {
        let mut sink = LoggingSink::default();

        let result = block_on(sink.send("sharktanklight", 1.0));

        assert!(matches!(result, Err(AppError::Telemetry(_))));
        assert_eq!(sink.uploads(), 0);
    }

    #[test]
    fn test_display_rejects_third_line() {
        let mut display = ConsoleDisplay::default();

        assert!(block_on(display.set_line(1, "Time Stamp:   10:00")).is_ok());
        assert!(matches!(
            block_on(display.set_line(2, "overflow")),
            Err(AppError::Display(_))
        ));
    }

    #[test]
    fn test_clock_in_range() {
        let now = SystemClock.now();

        assert!(now.hour < 24);
        assert!(now.minute < 60);
    }
}
