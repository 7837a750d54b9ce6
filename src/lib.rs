/*!
 # Solar power-cycling scheduler

 A Rust library for keeping a battery powered single-board computer switched off
 for most of the day. The device wakes for two short windows, one around midday
 and one around 18:00, captures a single dated artifact per day, arms the
 hardware RTC wake alarm for the next window and powers itself off.

 ## Features

 * Classification of an instant into the midday window, the evening window or off
 * Next wake deadline calculation in a fixed UTC offset (no daylight saving)
 * Once per day capture trigger
 * Sysfs RTC wake alarm and `shutdown` adapters
 * Injectable clock, so a full day can be simulated in milliseconds

 ## Example

 ```rust,no_run
 use suncycle::*;

 #[tokio::main]
 async fn main() -> Result<()> {
     let schedule = Schedule::new(WindowConfig::default(), 12)?;
     let clock = SystemClock::utc();

     let mut scheduler = Scheduler::new(
         schedule,
         SchedulerConfig::default(),
         clock,
         FileCapture::new("/home/pi/timelapse/images"),
         SysfsWakeAlarm::default(),
         SystemShutdown::default(),
     )?;

     let outcome = scheduler.run().await?;
     println!("next wake at {}", outcome.deadline);
     Ok(())
 }
 ```
*/

use std::path::PathBuf;

use thiserror::Error;

/// Error types for the scheduler library
#[derive(Error, Debug)]
pub enum Error {
    /// The time source could not provide a trustworthy instant
    #[error("Could not read the clock: {0}")]
    ClockRead(String),

    /// The capture collaborator failed; the scheduling loop carries on
    #[error("Capture failed: {0}")]
    Capture(String),

    /// Writing the RTC wake alarm failed, the device must stay powered
    #[error("Could not write wake alarm {path}: {source}")]
    WakeTimerWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The host refused or failed the shutdown request
    #[error("Shutdown request failed: {0}")]
    ShutdownRequest(String),

    /// Window boundaries that would not partition the day
    #[error("Invalid window configuration: {0}")]
    InvalidWindows(String),

    /// Scheduler settings out of range
    #[error("Invalid scheduler configuration: {0}")]
    InvalidConfig(String),

    /// Other I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error must end the current wake cycle.
    ///
    /// Only capture failures are recovered locally; everything else aborts
    /// the process without requesting a shutdown, leaving the device running.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Capture(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod capture;
pub mod cli;
pub mod clock;
pub mod device;
pub mod schedule;
pub mod scheduler;

// Re-export key types
pub use capture::{Capture, CaptureOutcome, FileCapture};
pub use cli::WindowArgs;
pub use clock::{Clock, ManualClock, SystemClock};
pub use device::{
    DryRunShutdown, DryRunWakeTimer, PowerControl, SysfsWakeAlarm, SystemShutdown, WakeTimer,
    DEFAULT_WAKEALARM_PATH,
};
pub use schedule::{Schedule, WakeDeadline, WindowConfig, WindowState};
pub use scheduler::{CapturePolicy, Outcome, Scheduler, SchedulerConfig, SchedulerState};
