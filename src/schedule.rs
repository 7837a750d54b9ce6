/*!
 # Window classification and wake deadlines

 This module decides, for a sampled instant, whether the device sits inside one
 of its two daily on-windows, whether the instant falls in the capture hour and
 which absolute instant the RTC alarm must be armed for before powering off.

 All times live in a fixed UTC offset. There is no daylight saving adjustment:
 midday is always the offset's midday.
*/

use std::fmt;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use tracing::{debug, instrument, trace};

use crate::{Error, Result};

/// Classification of a sampled instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowState {
    /// Inside the midday window or its pre-wake grace band
    MiddayWindow,
    /// Inside the evening window
    EveningWindow,
    /// Outside both windows; the device should arm its alarm and power off
    Off,
}

impl WindowState {
    pub fn is_on(self) -> bool {
        !matches!(self, WindowState::Off)
    }
}

impl fmt::Display for WindowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowState::MiddayWindow => write!(f, "midday"),
            WindowState::EveningWindow => write!(f, "evening"),
            WindowState::Off => write!(f, "off"),
        }
    }
}

/// Time-of-day boundaries of the two on-windows.
///
/// Every interval is half-open: an instant equal to a lower bound is inside,
/// an instant equal to an upper bound is outside. With the defaults the day
/// splits into
///
/// | from  | to    | state   |
/// |-------|-------|---------|
/// | 00:00 | 11:50 | off     |
/// | 11:50 | 17:55 | midday  |
/// | 17:55 | 18:00 | off     |
/// | 18:00 | 18:10 | evening |
/// | 18:10 | 24:00 | off     |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Start of the grace band ahead of the midday window
    pub pre_wake_start: NaiveTime,
    /// Start of the midday window proper
    pub midday_start: NaiveTime,
    /// End of the midday window, the device powers off until evening
    pub midday_end: NaiveTime,
    /// Start of the evening window
    pub evening_start: NaiveTime,
    /// End of the evening window, the device powers off until next midday
    pub evening_end: NaiveTime,
    /// Alarm time for the midday wake, inside the pre-wake grace band
    pub midday_wake: NaiveTime,
    /// Alarm time for the evening wake
    pub evening_wake: NaiveTime,
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default()
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            pre_wake_start: hm(11, 50),
            midday_start: hm(12, 0),
            midday_end: hm(17, 55),
            evening_start: hm(18, 0),
            evening_end: hm(18, 10),
            midday_wake: hm(11, 55),
            evening_wake: hm(18, 0),
        }
    }
}

impl WindowConfig {
    /// The stricter variant: the midday window proper opens at 12:05, which
    /// widens the pre-wake grace band to fifteen minutes.
    ///
    /// Classification is unchanged since the grace band counts as midday; only
    /// [`Schedule::in_grace_band`] differs.
    pub fn strict() -> Self {
        Self {
            midday_start: hm(12, 5),
            ..Self::default()
        }
    }

    /// Checks that the windows partition the day without overlap and that each
    /// wake time lands inside the window it is meant to open.
    pub fn validate(&self) -> Result<()> {
        let ordered = [
            ("pre_wake_start", self.pre_wake_start),
            ("midday_start", self.midday_start),
            ("midday_end", self.midday_end),
            ("evening_start", self.evening_start),
        ];
        for pair in ordered.windows(2) {
            let ((a_name, a), (b_name, b)) = (pair[0], pair[1]);
            if a > b {
                return Err(Error::InvalidWindows(format!(
                    "{a_name} ({}) is after {b_name} ({})",
                    a.format("%H:%M"),
                    b.format("%H:%M")
                )));
            }
        }
        if self.evening_start >= self.evening_end {
            return Err(Error::InvalidWindows(format!(
                "evening window {}..{} is empty",
                self.evening_start.format("%H:%M"),
                self.evening_end.format("%H:%M")
            )));
        }
        if self.pre_wake_start >= self.midday_end {
            return Err(Error::InvalidWindows("midday window is empty".into()));
        }
        if self.midday_wake < self.pre_wake_start || self.midday_wake >= self.midday_end {
            return Err(Error::InvalidWindows(format!(
                "midday wake {} is outside {}..{}",
                self.midday_wake.format("%H:%M"),
                self.pre_wake_start.format("%H:%M"),
                self.midday_end.format("%H:%M")
            )));
        }
        if self.evening_wake < self.evening_start || self.evening_wake >= self.evening_end {
            return Err(Error::InvalidWindows(format!(
                "evening wake {} is outside {}..{}",
                self.evening_wake.format("%H:%M"),
                self.evening_start.format("%H:%M"),
                self.evening_end.format("%H:%M")
            )));
        }
        Ok(())
    }
}

/// An absolute instant at which the RTC alarm should power the device on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WakeDeadline(DateTime<FixedOffset>);

impl WakeDeadline {
    pub fn at(&self) -> DateTime<FixedOffset> {
        self.0
    }

    /// Seconds since the Unix epoch, the format the RTC wake alarm expects
    pub fn epoch_seconds(&self) -> i64 {
        self.0.timestamp()
    }
}

impl fmt::Display for WakeDeadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl From<WakeDeadline> for DateTime<FixedOffset> {
    fn from(deadline: WakeDeadline) -> Self {
        deadline.0
    }
}

/// The daily timetable: on-windows plus the hour in which the capture fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    windows: WindowConfig,
    capture_hour: u32,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            windows: WindowConfig::default(),
            capture_hour: 12,
        }
    }
}

impl Schedule {
    pub fn new(windows: WindowConfig, capture_hour: u32) -> Result<Self> {
        windows.validate()?;
        if capture_hour > 23 {
            return Err(Error::InvalidWindows(format!(
                "capture hour {capture_hour} out of range (0..24)"
            )));
        }
        Ok(Self {
            windows,
            capture_hour,
        })
    }

    pub fn windows(&self) -> &WindowConfig {
        &self.windows
    }

    pub fn capture_hour(&self) -> u32 {
        self.capture_hour
    }

    /// Classifies an instant by its time of day
    pub fn classify(&self, instant: &DateTime<FixedOffset>) -> WindowState {
        let t = instant.time();
        let w = &self.windows;

        let state = if t >= w.pre_wake_start && t < w.midday_end {
            WindowState::MiddayWindow
        } else if t >= w.evening_start && t < w.evening_end {
            WindowState::EveningWindow
        } else {
            WindowState::Off
        };

        trace!("{} classified as {}", instant.format("%H:%M:%S%.3f"), state);
        state
    }

    /// Whether the instant is in the short band before the midday window
    /// proper, during which an operator can still cancel the coming shutdown
    pub fn in_grace_band(&self, instant: &DateTime<FixedOffset>) -> bool {
        let t = instant.time();
        t >= self.windows.pre_wake_start && t < self.windows.midday_start
    }

    /// Whether the instant falls in the designated capture hour
    pub fn is_capture_hour(&self, instant: &DateTime<FixedOffset>) -> bool {
        instant.hour() == self.capture_hour
    }

    /// Computes when the device should next be powered on.
    ///
    /// The result is the first wake time strictly after `instant`, skipping the
    /// wake that opened the window the device is currently in: from inside the
    /// midday window the next wake is the evening one, from inside the evening
    /// window it is the next day's midday wake.
    #[instrument(skip(self, instant), fields(at = %instant.to_rfc3339()))]
    pub fn next_wake(&self, instant: &DateTime<FixedOffset>, state: WindowState) -> WakeDeadline {
        let offset = *instant.offset();
        let today = instant.date_naive();
        let tomorrow = today.succ_opt().unwrap_or(today);
        let w = &self.windows;

        let tomorrow_midday = local(today_at(tomorrow, w.midday_wake), offset);
        let candidates = [
            (WindowState::MiddayWindow, today_at(today, w.midday_wake)),
            (WindowState::EveningWindow, today_at(today, w.evening_wake)),
        ];

        let deadline = candidates
            .into_iter()
            .filter(|(opens, _)| match state {
                WindowState::Off => true,
                WindowState::MiddayWindow => *opens == WindowState::EveningWindow,
                WindowState::EveningWindow => false,
            })
            .map(|(_, naive)| local(naive, offset))
            .find(|candidate| candidate > instant)
            .unwrap_or(tomorrow_midday);

        debug!(
            "Next wake from {} ({}) is {}",
            instant.format("%Y-%m-%d %H:%M:%S"),
            state,
            deadline.format("%Y-%m-%d %H:%M:%S")
        );
        WakeDeadline(deadline)
    }
}

fn today_at(date: NaiveDate, time: NaiveTime) -> NaiveDateTime {
    date.and_time(time)
}

/// Interprets a naive local date-time in a fixed offset. A fixed offset has no
/// gaps or folds, so the mapping is always unique.
fn local(naive: NaiveDateTime, offset: FixedOffset) -> DateTime<FixedOffset> {
    let utc = naive - Duration::seconds(i64::from(offset.local_minus_utc()));
    DateTime::from_naive_utc_and_offset(utc, offset)
}
