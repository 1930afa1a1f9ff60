//! Desktop simulator for the sharktank light monitor.
//!
//! Runs the VCNL4010 driver, its interrupt listener and the monitor loop
//! against a simulated register file. Status lines are printed to stdout and
//! uploads are logged.
//!
//! # Environment
//!
//! | Variable                 | Default     | Meaning                           |
//! |--------------------------|-------------|-----------------------------------|
//! | `SHARKTANK_HOST`         | `sharktank` | Feed name prefix                  |
//! | `SHARKTANK_INTERVAL_SECS`| `30`        | Upload interval and hold time     |
//! | `SHARKTANK_CYCLES`       | `3`         | Monitor cycles before shutting down |
//! | `RUST_LOG`               | `info`      | Log filter                        |

mod console;
mod sim_device;

use std::env;
use std::str::FromStr;

use embassy_futures::join::join;
use embassy_sync::mutex::Mutex;
use embassy_time::Delay;
use log::{error, info, warn};

use sharktank_core::app_state::AppError;
use sharktank_core::async_i2c_bus::{SharedI2cBus, SharedI2cDevice};
use sharktank_core::config::{AppConfig, TelemetryConfig};
use sharktank_core::monitor::{Monitor, StatusDisplay};
use sharktank_core::sensors::vcnl4010::{InterruptQueue, Vcnl4010, WaitMode};

use console::{ConsoleDisplay, LoggingSink, SystemClock};
use sim_device::{InterruptLine, Scene, SimulatedInterruptPin, SimulatedVcnl4010};

const DEFAULT_CYCLES: u32 = 3;

/// Proximity noise floor of the simulated scene
const PROXIMITY_FLOOR: u16 = 2100;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

struct Settings {
    host: String,
    interval_secs: Option<u32>,
    cycles: u32,
}

impl Settings {
    fn from_env() -> Self {
        Self {
            host: env::var("SHARKTANK_HOST").unwrap_or_else(|_| "sharktank".to_owned()),
            interval_secs: parse_var("SHARKTANK_INTERVAL_SECS"),
            cycles: parse_var("SHARKTANK_CYCLES").unwrap_or(DEFAULT_CYCLES),
        }
    }

    fn app_config(&self) -> AppConfig<'_> {
        let defaults = TelemetryConfig::default();
        let interval = self.interval_secs.unwrap_or(defaults.upload_interval_secs);

        AppConfig {
            telemetry: TelemetryConfig {
                host: &self.host,
                upload_interval_secs: interval,
                hold_secs: interval,
                ..defaults
            },
            ..Default::default()
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a number", name, raw);
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::from_env();
    let config = settings.app_config();

    info!(
        "Starting sharktank simulator: feed host {}, interval {} s, {} cycles",
        config.telemetry.host, config.telemetry.upload_interval_secs, settings.cycles
    );

    if let Err(e) = embassy_futures::block_on(run(&config, settings.cycles)) {
        error!("Simulator stopped: {}", e);
        std::process::exit(1);
    }
}

/// Startup, monitor cycles and shutdown against one simulated sensor
async fn run(config: &AppConfig<'_>, cycles: u32) -> Result<(), AppError> {
    let line = InterruptLine::new();
    let bus: SharedI2cBus<_> = Mutex::new(SimulatedVcnl4010::new(
        config.device.address(),
        Scene::new(PROXIMITY_FLOOR),
        &line,
    ));
    let queue = InterruptQueue::new();

    let mut sensor = Vcnl4010::new(SharedI2cDevice::new(&bus), Delay, config.device, &queue)
        .with_polling(config.polling)
        .with_calibration(config.calibration);

    let mut monitor = Monitor::new(
        &config.telemetry,
        ConsoleDisplay::default(),
        LoggingSink::default(),
        SystemClock,
        Delay,
    )?;

    monitor.display_mut().show().await?;
    sensor.reset().await.map_err(AppError::sensor)?;
    sensor.calibrate().await.map_err(AppError::sensor)?;

    let listener = sensor
        .setup_interrupt_handler(SimulatedInterruptPin::new(&line), SharedI2cDevice::new(&bus))
        .map_err(|_| AppError::sensor("interrupt pin already bound"))?;

    let app = async {
        let result = async {
            monitor.ensure_feed().await?;
            for cycle in 1..=cycles {
                let value = monitor.run_cycle(&mut sensor).await?;
                info!("Cycle {}/{}: ambient {:.1}", cycle, cycles, value);

                while let Some(event) = sensor.wait(WaitMode::NonBlocking).await {
                    info!(
                        "Proximity threshold interrupt, status {} at {} ms",
                        event,
                        event.timestamp().as_millis()
                    );
                }
            }
            Ok::<(), AppError>(())
        }
        .await;

        sensor.exit_clean_up();
        result
    };

    let (_, result) = join(listener.run(), app).await;
    result
}
