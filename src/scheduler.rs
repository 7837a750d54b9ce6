/*!
 # Scheduler loop

 The state machine that runs once per power-up:

 ```text
 Starting -> Polling <-> Capturing
                |
                v
             Arming -> ShuttingDown -> Finished
 ```

 Nothing is persisted between power cycles. The once-per-day capture flag
 lives in the [`Scheduler`] value and is lost when the device powers off.
*/

use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use tracing::{debug, error, info, instrument, warn};

use crate::capture::{Capture, CaptureOutcome};
use crate::clock::Clock;
use crate::device::{PowerControl, WakeTimer};
use crate::schedule::{Schedule, WakeDeadline, WindowState};
use crate::{Error, Result};

/// Longest startup grace the scheduler accepts
pub const MAX_STARTUP_GRACE: Duration = Duration::from_secs(10 * 60);

/// What happens right after a successful capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapturePolicy {
    /// Go back to polling; the device stays up until its window closes
    #[default]
    ContinuePolling,
    /// Arm the next wake straight away and shut down
    ArmAfterCapture,
}

/// Tunables of the loop
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Wait after power-up before the first decision
    pub startup_grace: Duration,
    /// Sleep between samples while inside an on-window
    pub poll_interval: Duration,
    /// Minutes passed to the shutdown request
    pub shutdown_delay_minutes: u32,
    pub capture_policy: CapturePolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            startup_grace: Duration::from_secs(4 * 60),
            poll_interval: Duration::from_secs(5),
            shutdown_delay_minutes: 1,
            capture_policy: CapturePolicy::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.startup_grace > MAX_STARTUP_GRACE {
            return Err(Error::InvalidConfig(format!(
                "startup grace {}s exceeds {}s",
                self.startup_grace.as_secs(),
                MAX_STARTUP_GRACE.as_secs()
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::InvalidConfig("poll interval must be non-zero".into()));
        }
        Ok(())
    }
}

/// States of the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting out the startup grace
    Starting,
    /// Sampling the clock
    Polling,
    /// Capture due for the sampled instant
    Capturing(DateTime<FixedOffset>),
    /// Wake deadline to compute and arm from the sampled instant
    Arming(DateTime<FixedOffset>, WindowState),
    /// Alarm armed, shutdown to request
    ShuttingDown(WakeDeadline),
    /// Shutdown requested; no further steps
    Finished(WakeDeadline),
}

impl SchedulerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SchedulerState::Finished(_))
    }
}

/// Result of a completed cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// The alarm that was armed
    pub deadline: WakeDeadline,
    /// Whether the daily capture fired during this cycle
    pub captured: bool,
}

/// Drives one wake cycle from power-up to shutdown request
pub struct Scheduler<C, K, W, P> {
    schedule: Schedule,
    config: SchedulerConfig,
    clock: C,
    camera: K,
    wake_timer: W,
    power: P,
    state: SchedulerState,
    /// Set once the daily capture has been attempted in this cycle
    captured: bool,
}

impl<C, K, W, P> Scheduler<C, K, W, P>
where
    C: Clock,
    K: Capture,
    W: WakeTimer,
    P: PowerControl,
{
    pub fn new(
        schedule: Schedule,
        config: SchedulerConfig,
        clock: C,
        camera: K,
        wake_timer: W,
        power: P,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            schedule,
            config,
            clock,
            camera,
            wake_timer,
            power,
            state: SchedulerState::Starting,
            captured: false,
        })
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn has_captured(&self) -> bool {
        self.captured
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn camera(&self) -> &K {
        &self.camera
    }

    pub fn wake_timer(&self) -> &W {
        &self.wake_timer
    }

    pub fn power(&self) -> &P {
        &self.power
    }

    /// Runs the loop until the shutdown has been requested.
    ///
    /// Any fatal error returns immediately. In particular a failed alarm write
    /// never reaches the shutdown request, so the device stays powered.
    #[instrument(skip(self))]
    pub async fn run(&mut self) -> Result<Outcome> {
        info!("Scheduler starting");
        loop {
            if let SchedulerState::Finished(deadline) = self.step().await? {
                return Ok(Outcome {
                    deadline,
                    captured: self.captured,
                });
            }
        }
    }

    /// Performs a single transition and returns the new state
    pub async fn step(&mut self) -> Result<SchedulerState> {
        let next = match self.state {
            SchedulerState::Starting => self.start().await,
            SchedulerState::Polling => self.poll().await?,
            SchedulerState::Capturing(instant) => self.capture(instant).await,
            SchedulerState::Arming(instant, state) => self.arm(instant, state).await?,
            SchedulerState::ShuttingDown(deadline) => self.shut_down(deadline).await?,
            SchedulerState::Finished(deadline) => SchedulerState::Finished(deadline),
        };

        if next != self.state {
            debug!("Transition {:?} -> {:?}", self.state, next);
        }
        self.state = next;
        Ok(next)
    }

    async fn start(&mut self) -> SchedulerState {
        if !self.config.startup_grace.is_zero() {
            info!(
                "Waiting {}s before deciding, stop the service now to keep the device up",
                self.config.startup_grace.as_secs()
            );
            self.clock.sleep(self.config.startup_grace).await;
        }
        SchedulerState::Polling
    }

    async fn poll(&mut self) -> Result<SchedulerState> {
        let now = self.clock.now()?;

        if !self.captured && self.schedule.is_capture_hour(&now) {
            return Ok(SchedulerState::Capturing(now));
        }

        let state = self.schedule.classify(&now);
        if state == WindowState::Off {
            info!("{} is outside both windows", now.format("%H:%M:%S"));
            return Ok(SchedulerState::Arming(now, state));
        }

        if self.schedule.in_grace_band(&now) {
            debug!("In pre-wake grace band at {}", now.format("%H:%M:%S"));
        }
        self.clock.sleep(self.config.poll_interval).await;
        Ok(SchedulerState::Polling)
    }

    async fn capture(&mut self, instant: DateTime<FixedOffset>) -> SchedulerState {
        self.captured = true;
        match self.camera.capture(instant).await {
            Ok(CaptureOutcome::Captured(path)) => {
                info!("Daily capture written to {}", path.display());
            }
            Ok(CaptureOutcome::AlreadyCaptured(path)) => {
                info!("Daily capture already present at {}", path.display());
            }
            Err(e) => {
                warn!("Daily capture failed, carrying on: {}", e);
            }
        }

        match self.config.capture_policy {
            CapturePolicy::ContinuePolling => SchedulerState::Polling,
            CapturePolicy::ArmAfterCapture => {
                SchedulerState::Arming(instant, self.schedule.classify(&instant))
            }
        }
    }

    async fn arm(
        &mut self,
        instant: DateTime<FixedOffset>,
        state: WindowState,
    ) -> Result<SchedulerState> {
        let deadline = self.schedule.next_wake(&instant, state);
        if deadline.at() <= instant {
            // next_wake never goes backwards; refuse to power off on a bad alarm
            error!("Computed wake {} is not after {}", deadline, instant);
            return Err(Error::InvalidWindows(format!(
                "wake deadline {deadline} is not after {}",
                instant.to_rfc3339()
            )));
        }

        info!(
            "Setting wake alarm at epoch {}, which is {}",
            deadline.epoch_seconds(),
            deadline.at().format("%Y%m%d %H:%M:%S %:z")
        );
        self.wake_timer.arm(deadline).await.inspect_err(|e| {
            error!("Arming the wake alarm failed, not shutting down: {}", e);
        })?;

        Ok(SchedulerState::ShuttingDown(deadline))
    }

    async fn shut_down(&mut self, deadline: WakeDeadline) -> Result<SchedulerState> {
        info!(
            "Requesting shutdown in {} minute(s)",
            self.config.shutdown_delay_minutes
        );
        self.power
            .request_shutdown(self.config.shutdown_delay_minutes)
            .await
            .inspect_err(|e| error!("Shutdown request failed: {}", e))?;
        Ok(SchedulerState::Finished(deadline))
    }
}
