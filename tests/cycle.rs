use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeZone};
use parking_lot::Mutex;
use suncycle::*;

/// Ordered record of every external call the scheduler makes
type Journal = Arc<Mutex<Vec<String>>>;

struct RecordingCapture {
    journal: Journal,
    fail: bool,
}

impl Capture for RecordingCapture {
    async fn capture(&mut self, instant: DateTime<FixedOffset>) -> Result<CaptureOutcome> {
        self.journal
            .lock()
            .push(format!("capture {}", instant.format("%H:%M:%S")));
        if self.fail {
            return Err(Error::Capture("camera unplugged".into()));
        }
        Ok(CaptureOutcome::Captured(
            format!("image_{}.txt", instant.format("%Y%m%d")).into(),
        ))
    }
}

struct RecordingWakeTimer {
    journal: Journal,
    fail: bool,
}

impl WakeTimer for RecordingWakeTimer {
    async fn arm(&mut self, deadline: WakeDeadline) -> Result<()> {
        let mut journal = self.journal.lock();
        journal.push("wakealarm 0".to_string());
        if self.fail {
            return Err(Error::WakeTimerWrite {
                path: DEFAULT_WAKEALARM_PATH.into(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        journal.push(format!("wakealarm {}", deadline.epoch_seconds()));
        Ok(())
    }
}

struct RecordingPower {
    journal: Journal,
    fail: bool,
}

impl PowerControl for RecordingPower {
    async fn request_shutdown(&mut self, delay_minutes: u32) -> Result<()> {
        self.journal.lock().push(format!("shutdown +{delay_minutes}"));
        if self.fail {
            return Err(Error::ShutdownRequest("exit status: 1".into()));
        }
        Ok(())
    }
}

struct BrokenClock;

impl Clock for BrokenClock {
    fn now(&self) -> Result<DateTime<FixedOffset>> {
        Err(Error::ClockRead("RTC not set".into()))
    }

    async fn sleep(&self, _duration: Duration) {}
}

#[derive(Default)]
struct Faults {
    capture: bool,
    wake_timer: bool,
    power: bool,
}

type TestScheduler = Scheduler<ManualClock, RecordingCapture, RecordingWakeTimer, RecordingPower>;

fn utc(day: u32, h: u32, m: u32, s: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2026, 6, day, h, m, s)
        .unwrap()
}

fn no_grace() -> SchedulerConfig {
    SchedulerConfig {
        startup_grace: Duration::ZERO,
        ..Default::default()
    }
}

fn build(
    start: DateTime<FixedOffset>,
    config: SchedulerConfig,
    faults: Faults,
) -> (TestScheduler, ManualClock, Journal) {
    let journal = Journal::default();
    let clock = ManualClock::new(start);
    let scheduler = Scheduler::new(
        Schedule::default(),
        config,
        clock.clone(),
        RecordingCapture {
            journal: journal.clone(),
            fail: faults.capture,
        },
        RecordingWakeTimer {
            journal: journal.clone(),
            fail: faults.wake_timer,
        },
        RecordingPower {
            journal: journal.clone(),
            fail: faults.power,
        },
    )
    .unwrap();
    (scheduler, clock, journal)
}

fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().clone()
}

#[tokio::test]
async fn midday_capture_then_polls_until_window_closes() {
    let (mut scheduler, clock, journal) = build(utc(15, 12, 2, 0), no_grace(), Faults::default());

    let outcome = scheduler.run().await.unwrap();

    assert_eq!(outcome.deadline.at(), utc(15, 18, 0, 0));
    assert!(outcome.captured);
    // the loop kept polling through the afternoon and armed on the boundary
    assert_eq!(clock.current(), utc(15, 17, 55, 0));
    assert_eq!(
        entries(&journal),
        vec![
            "capture 12:02:00".to_string(),
            "wakealarm 0".to_string(),
            format!("wakealarm {}", utc(15, 18, 0, 0).timestamp()),
            "shutdown +1".to_string(),
        ]
    );
}

#[tokio::test]
async fn midday_wake_with_startup_grace() {
    // RTC fired at 11:55; the grace band carries the device past noon
    let (mut scheduler, clock, journal) =
        build(utc(15, 11, 55, 0), SchedulerConfig::default(), Faults::default());

    let outcome = scheduler.run().await.unwrap();

    assert_eq!(outcome.deadline.at(), utc(15, 18, 0, 0));
    assert_eq!(entries(&journal)[0], "capture 12:00:00");
    assert_eq!(clock.current(), utc(15, 17, 55, 0));
}

#[tokio::test]
async fn evening_wake_arms_next_midday() {
    let (mut scheduler, clock, journal) =
        build(utc(15, 18, 0, 0), SchedulerConfig::default(), Faults::default());

    let outcome = scheduler.run().await.unwrap();

    assert_eq!(outcome.deadline.at(), utc(16, 11, 55, 0));
    assert!(!outcome.captured);
    assert_eq!(clock.current(), utc(15, 18, 10, 0));
    assert_eq!(
        entries(&journal),
        vec![
            "wakealarm 0".to_string(),
            format!("wakealarm {}", utc(16, 11, 55, 0).timestamp()),
            "shutdown +1".to_string(),
        ]
    );
}

#[tokio::test]
async fn manual_power_up_at_night_arms_same_day_midday() {
    let (mut scheduler, clock, _journal) =
        build(utc(15, 3, 0, 0), SchedulerConfig::default(), Faults::default());

    let outcome = scheduler.run().await.unwrap();

    assert_eq!(outcome.deadline.at(), utc(15, 11, 55, 0));
    // only the startup grace elapsed
    assert_eq!(clock.current(), utc(15, 3, 4, 0));
}

#[tokio::test]
async fn trailing_edge_of_midday_arms_evening() {
    let (mut scheduler, _clock, _journal) =
        build(utc(15, 17, 57, 30), no_grace(), Faults::default());

    let outcome = scheduler.run().await.unwrap();
    assert_eq!(outcome.deadline.at(), utc(15, 18, 0, 0));
}

#[tokio::test]
async fn arm_after_capture_policy_shuts_down_at_once() {
    let config = SchedulerConfig {
        capture_policy: CapturePolicy::ArmAfterCapture,
        ..no_grace()
    };
    let (mut scheduler, clock, journal) = build(utc(15, 12, 2, 0), config, Faults::default());

    let outcome = scheduler.run().await.unwrap();

    assert_eq!(outcome.deadline.at(), utc(15, 18, 0, 0));
    assert_eq!(clock.current(), utc(15, 12, 2, 0));
    assert_eq!(entries(&journal).len(), 4);
}

#[tokio::test]
async fn capture_fires_once_per_cycle() {
    let (mut scheduler, _clock, journal) =
        build(utc(15, 11, 50, 0), no_grace(), Faults::default());

    scheduler.run().await.unwrap();

    let captures = entries(&journal)
        .iter()
        .filter(|e| e.starts_with("capture"))
        .count();
    assert_eq!(captures, 1);
}

#[tokio::test]
async fn capture_failure_does_not_stop_the_cycle() {
    let faults = Faults {
        capture: true,
        ..Default::default()
    };
    let (mut scheduler, _clock, journal) = build(utc(15, 12, 2, 0), no_grace(), faults);

    let outcome = scheduler.run().await.unwrap();

    assert_eq!(outcome.deadline.at(), utc(15, 18, 0, 0));
    let entries = entries(&journal);
    assert_eq!(entries.iter().filter(|e| e.starts_with("capture")).count(), 1);
    assert_eq!(entries.last().unwrap(), "shutdown +1");
}

#[tokio::test]
async fn wake_timer_failure_prevents_shutdown() {
    let faults = Faults {
        wake_timer: true,
        ..Default::default()
    };
    let (mut scheduler, _clock, journal) = build(utc(15, 19, 30, 0), no_grace(), faults);

    let err = scheduler.run().await.unwrap_err();

    assert!(matches!(err, Error::WakeTimerWrite { .. }));
    assert!(err.is_fatal());
    assert!(!entries(&journal).iter().any(|e| e.starts_with("shutdown")));
    assert!(matches!(scheduler.state(), SchedulerState::Arming(..)));
}

#[tokio::test]
async fn shutdown_failure_is_fatal_but_alarm_stays_armed() {
    let faults = Faults {
        power: true,
        ..Default::default()
    };
    let (mut scheduler, _clock, journal) = build(utc(15, 19, 30, 0), no_grace(), faults);

    let err = scheduler.run().await.unwrap_err();

    assert!(matches!(err, Error::ShutdownRequest(_)));
    assert_eq!(
        entries(&journal),
        vec![
            "wakealarm 0".to_string(),
            format!("wakealarm {}", utc(16, 11, 55, 0).timestamp()),
            "shutdown +1".to_string(),
        ]
    );
}

#[tokio::test]
async fn clock_failure_aborts_before_any_decision() {
    let journal = Journal::default();
    let mut scheduler = Scheduler::new(
        Schedule::default(),
        no_grace(),
        BrokenClock,
        RecordingCapture {
            journal: journal.clone(),
            fail: false,
        },
        RecordingWakeTimer {
            journal: journal.clone(),
            fail: false,
        },
        RecordingPower {
            journal: journal.clone(),
            fail: false,
        },
    )
    .unwrap();

    let err = scheduler.run().await.unwrap_err();

    assert!(matches!(err, Error::ClockRead(_)));
    assert!(entries(&journal).is_empty());
}

#[tokio::test]
async fn every_power_up_time_ends_with_a_future_wake_in_a_window() {
    let schedule = Schedule::default();
    for minute in (0..24 * 60).step_by(10) {
        let start = utc(15, minute / 60, minute % 60, 0);
        let (mut scheduler, clock, journal) = build(start, no_grace(), Faults::default());

        let outcome = scheduler.run().await.unwrap();
        let stopped = clock.current();

        assert!(outcome.deadline.at() > stopped, "start {start}");
        assert!(schedule.classify(&outcome.deadline.at()).is_on());
        assert_eq!(schedule.classify(&stopped), WindowState::Off);
        let captures = entries(&journal)
            .iter()
            .filter(|e| e.starts_with("capture"))
            .count();
        assert!(captures <= 1);
    }
}

#[tokio::test]
async fn file_capture_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(utc(15, 12, 2, 0));
    let mut scheduler = Scheduler::new(
        Schedule::default(),
        no_grace(),
        clock,
        FileCapture::new(dir.path()),
        DryRunWakeTimer::default(),
        DryRunShutdown::default(),
    )
    .unwrap();

    let outcome = scheduler.run().await.unwrap();

    let artifact = dir.path().join("image_20260615.txt");
    assert_eq!(std::fs::read_to_string(artifact).unwrap(), "20260615_12_02_00");
    assert_eq!(scheduler.wake_timer().armed, Some(outcome.deadline));
    assert_eq!(scheduler.power().requested, Some(1));
}
