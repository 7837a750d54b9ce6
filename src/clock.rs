/*!
 # Time sources

 The scheduler never calls the wall clock or sleeps directly. It goes through
 [`Clock`], so a whole day can be replayed against a [`ManualClock`] whose
 sleeps only move its own hands forward.
*/

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, Offset, Utc};
use parking_lot::Mutex;
use tracing::{error, trace};

use crate::{Error, Result};

/// Earliest year the wall clock is trusted. An RTC that lost its backup
/// battery comes up in 1970.
pub const MIN_PLAUSIBLE_YEAR: i32 = 2024;

/// Source of the current instant plus the ability to wait
pub trait Clock {
    /// Samples the current instant in the clock's fixed offset
    fn now(&self) -> Result<DateTime<FixedOffset>>;

    /// Blocks the current task for `duration`
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()>;
}

/// The host wall clock, reported in a fixed UTC offset
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Result<DateTime<FixedOffset>> {
        let now = Utc::now().with_timezone(&self.offset);
        if now.year() < MIN_PLAUSIBLE_YEAR {
            error!("System clock reads {}, refusing to schedule from it", now);
            return Err(Error::ClockRead(format!(
                "system clock reads {} which is before {MIN_PLAUSIBLE_YEAR}; is the RTC set?",
                now.to_rfc3339()
            )));
        }
        Ok(now)
    }

    async fn sleep(&self, duration: Duration) {
        trace!("Sleeping for {:?}", duration);
        tokio::time::sleep(duration).await;
    }
}

/// A simulated clock. Sleeping advances the clock by exactly the requested
/// duration and returns immediately.
///
/// Clones share the same hands, so a test can keep one copy to inspect or move
/// the time while the scheduler owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<FixedOffset>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<FixedOffset>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, instant: DateTime<FixedOffset>) {
        *self.now.lock() = instant;
    }

    pub fn advance(&self, duration: Duration) {
        let step = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
        let mut now = self.now.lock();
        *now = now.checked_add_signed(step).unwrap_or(*now);
    }

    pub fn current(&self) -> DateTime<FixedOffset> {
        *self.now.lock()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Result<DateTime<FixedOffset>> {
        Ok(self.current())
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn system_clock_reports_its_offset() {
        let offset = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
        let now = SystemClock::new(offset).now().unwrap();
        assert_eq!(*now.offset(), offset);
        assert!(now.year() >= MIN_PLAUSIBLE_YEAR);
    }

    #[tokio::test]
    async fn manual_clock_sleep_advances_time() {
        let start = Utc.fix().with_ymd_and_hms(2026, 6, 15, 11, 59, 58).unwrap();
        let clock = ManualClock::new(start);
        let observer = clock.clone();

        clock.sleep(Duration::from_secs(5)).await;
        assert_eq!(observer.current(), start + chrono::Duration::seconds(5));

        observer.set(start);
        assert_eq!(clock.now().unwrap(), start);
    }
}
