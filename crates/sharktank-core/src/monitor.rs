//! Periodic ambient light monitor
//!
//! Each cycle waits the upload interval, reads the sensor, puts two status
//! lines on the display, uploads the ambient value and clears the display
//! after the hold time. Display, telemetry and wall clock are collaborators
//! behind the traits below.

use core::fmt::Write;

use embedded_hal_async::delay::DelayNs;
use heapless::String;
use log::{error, info};

use crate::app_state::AppError;
use crate::config::TelemetryConfig;
use crate::sensors::{Sensor, Vcnl4010Readings};

pub type Line = String<32>;
pub type FeedName = String<64>;

/// Two-line text display
pub trait StatusDisplay {
    /// Replace the text of `line` (0 or 1) without redrawing
    fn set_line(&mut self, line: usize, text: &str) -> impl Future<Output = Result<(), AppError>>;

    /// Push the buffered lines to the panel
    fn show(&mut self) -> impl Future<Output = Result<(), AppError>>;

    fn clear(&mut self) -> impl Future<Output = Result<(), AppError>>;
}

/// Remote store of numeric samples grouped into named feeds
pub trait TelemetrySink {
    fn has_feed(&mut self, feed: &str) -> impl Future<Output = Result<bool, AppError>>;

    fn create_feed(&mut self, feed: &str) -> impl Future<Output = Result<(), AppError>>;

    fn send(&mut self, feed: &str, value: f32) -> impl Future<Output = Result<(), AppError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

pub trait Clock {
    fn now(&self) -> TimeOfDay;
}

/// `<host><suffix>`, e.g. `sharktanklight`
pub fn feed_name(config: &TelemetryConfig<'_>) -> Result<FeedName, AppError> {
    let mut name = FeedName::new();
    name.push_str(config.host)
        .and_then(|_| name.push_str(config.feed_suffix))
        .map_err(|_| AppError::config("feed name longer than 64 bytes"))?;
    Ok(name)
}

pub fn measurement_line(value: f32) -> Result<Line, AppError> {
    let mut line = Line::new();
    write!(line, "Measurement: {:.1}", value)
        .map_err(|_| AppError::display("measurement line overflow"))?;
    Ok(line)
}

pub fn timestamp_line(time: TimeOfDay) -> Result<Line, AppError> {
    let mut line = Line::new();
    write!(line, "Time Stamp:   {:02}:{:02}", time.hour, time.minute)
        .map_err(|_| AppError::display("timestamp line overflow"))?;
    Ok(line)
}

pub struct Monitor<Disp, T, C, D> {
    display: Disp,
    sink: T,
    clock: C,
    delay: D,
    feed: FeedName,
    upload_interval_secs: u32,
    hold_secs: u32,
}

impl<Disp, T, C, D> Monitor<Disp, T, C, D>
where
    Disp: StatusDisplay,
    T: TelemetrySink,
    C: Clock,
    D: DelayNs,
{
    pub fn new(
        config: &TelemetryConfig<'_>,
        display: Disp,
        sink: T,
        clock: C,
        delay: D,
    ) -> Result<Self, AppError> {
        Ok(Self {
            display,
            sink,
            clock,
            delay,
            feed: feed_name(config)?,
            upload_interval_secs: config.upload_interval_secs,
            hold_secs: config.hold_secs,
        })
    }

    pub fn feed(&self) -> &str {
        &self.feed
    }

    pub fn display_mut(&mut self) -> &mut Disp {
        &mut self.display
    }

    /// Look the feed up and create it when missing
    pub async fn ensure_feed(&mut self) -> Result<(), AppError> {
        if self.sink.has_feed(&self.feed).await? {
            info!("Using existing feed {}", self.feed);
        } else {
            self.sink.create_feed(&self.feed).await?;
            info!("Created feed {}", self.feed);
        }
        Ok(())
    }

    /// One wait / measure / show / upload / hold / clear cycle.
    ///
    /// # Returns
    /// The uploaded ambient value.
    pub async fn run_cycle<S>(&mut self, sensor: &mut S) -> Result<f32, AppError>
    where
        S: Sensor<2, Readings = Vcnl4010Readings>,
    {
        self.delay
            .delay_ms(self.upload_interval_secs.saturating_mul(1000))
            .await;

        let readings = sensor.read().await.map_err(|e| {
            error!("Ambient read failed: {}", e);
            AppError::sensor(e)
        })?;
        let value = f32::from(readings.ambient);

        self.display
            .set_line(0, &measurement_line(value)?)
            .await?;
        self.display
            .set_line(1, &timestamp_line(self.clock.now())?)
            .await?;
        self.display.show().await?;

        self.sink.send(&self.feed, value).await?;
        info!("Uploaded {:.1} to {}", value, self.feed);

        self.delay.delay_ms(self.hold_secs.saturating_mul(1000)).await;
        self.display.clear().await?;

        Ok(value)
    }

    pub fn release(self) -> (Disp, T, C, D) {
        (self.display, self.sink, self.clock, self.delay)
    }
}
