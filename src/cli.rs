/*!
 # Shared command line arguments

 The window table and offset flags understood by every binary, so
 `suncycle` and `suncycle-plan` always classify with the same timetable.
*/

use chrono::{DateTime, FixedOffset, NaiveTime};
use clap::Args;

use crate::schedule::{Schedule, WindowConfig};
use crate::Result;

/// Window boundaries, capture hour and the fixed offset they are expressed in
#[derive(Args, Debug, Clone)]
pub struct WindowArgs {
    /// Fixed UTC offset all window times are expressed in (e.g. +00:00)
    #[arg(long, global = true, default_value = "+00:00", value_parser = parse_offset)]
    pub utc_offset: FixedOffset,

    /// Hour (0-23) in which the daily capture fires
    #[arg(long, global = true, default_value_t = 12)]
    pub capture_hour: u32,

    /// Open the midday window proper at 12:05 instead of 12:00
    #[arg(long, global = true)]
    pub strict: bool,

    /// Start of the grace band before midday (HH:MM)
    #[arg(long, global = true, value_parser = parse_time_of_day)]
    pub pre_wake_start: Option<NaiveTime>,

    /// Start of the midday window (HH:MM)
    #[arg(long, global = true, value_parser = parse_time_of_day)]
    pub midday_start: Option<NaiveTime>,

    /// End of the midday window (HH:MM)
    #[arg(long, global = true, value_parser = parse_time_of_day)]
    pub midday_end: Option<NaiveTime>,

    /// Start of the evening window, also the evening wake time (HH:MM)
    #[arg(long, global = true, value_parser = parse_time_of_day)]
    pub evening_start: Option<NaiveTime>,

    /// End of the evening window (HH:MM)
    #[arg(long, global = true, value_parser = parse_time_of_day)]
    pub evening_end: Option<NaiveTime>,

    /// Alarm time for the midday wake (HH:MM)
    #[arg(long, global = true, value_parser = parse_time_of_day)]
    pub midday_wake: Option<NaiveTime>,
}

impl WindowArgs {
    /// The default or strict table with every override applied
    pub fn windows(&self) -> WindowConfig {
        let mut windows = if self.strict {
            WindowConfig::strict()
        } else {
            WindowConfig::default()
        };
        if let Some(t) = self.pre_wake_start {
            windows.pre_wake_start = t;
        }
        if let Some(t) = self.midday_start {
            windows.midday_start = t;
        }
        if let Some(t) = self.midday_end {
            windows.midday_end = t;
        }
        if let Some(t) = self.evening_start {
            windows.evening_start = t;
            windows.evening_wake = t;
        }
        if let Some(t) = self.evening_end {
            windows.evening_end = t;
        }
        if let Some(t) = self.midday_wake {
            windows.midday_wake = t;
        }
        windows
    }

    /// Validated schedule built from the flags
    pub fn schedule(&self) -> Result<Schedule> {
        Schedule::new(self.windows(), self.capture_hour)
    }

    /// Re-expresses an instant in the configured offset
    pub fn localize(&self, instant: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.utc_offset)
    }
}

pub fn parse_offset(s: &str) -> std::result::Result<FixedOffset, String> {
    s.parse::<FixedOffset>()
        .map_err(|e| format!("expected an offset like +00:00: {e}"))
}

pub fn parse_time_of_day(s: &str) -> std::result::Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|e| format!("expected HH:MM: {e}"))
}

pub fn parse_instant(s: &str) -> std::result::Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_rfc3339(s).map_err(|e| format!("expected an RFC 3339 instant: {e}"))
}
