use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Result, WrapErr};
use suncycle::cli::parse_instant;
use suncycle::*;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Debug)]
struct Settings {
    #[command(flatten)]
    windows: WindowArgs,

    /// Seconds to wait after power-up before any decision (max 600)
    #[arg(long, global = true, default_value_t = 240)]
    startup_grace_secs: u64,

    /// Seconds between clock samples inside an on-window
    #[arg(long, global = true, default_value_t = 5)]
    poll_interval_secs: u64,

    /// Minutes passed to `shutdown +N`
    #[arg(long, global = true, default_value_t = 1)]
    shutdown_delay_mins: u32,

    /// What to do right after the daily capture
    #[arg(long, global = true, value_enum, default_value_t = PolicyArg::Continue)]
    capture_policy: PolicyArg,

    /// RTC wake alarm attribute
    #[arg(long, global = true, default_value = DEFAULT_WAKEALARM_PATH)]
    wakealarm: PathBuf,

    /// Directory receiving the daily artifacts
    #[arg(long, global = true, default_value = "/var/lib/suncycle/images")]
    images: PathBuf,

    /// External capture program, e.g. rpicam-still; the artifact path is
    /// appended after any --capture-arg values
    #[arg(long, global = true)]
    capture_command: Option<String>,

    /// One argument for the capture program, repeat for several; each value is
    /// passed as is, so quote it the way your shell expects
    #[arg(long = "capture-arg", global = true, allow_hyphen_values = true, requires = "capture_command")]
    capture_args: Vec<String>,

    /// Log what would be armed and shut down without touching the hardware
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
enum PolicyArg {
    /// Keep polling until the window closes
    Continue,
    /// Arm the next wake and shut down right after capturing
    Arm,
}

impl std::fmt::Display for PolicyArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyArg::Continue => write!(f, "continue"),
            PolicyArg::Arm => write!(f, "arm"),
        }
    }
}

impl From<PolicyArg> for CapturePolicy {
    fn from(policy: PolicyArg) -> Self {
        match policy {
            PolicyArg::Continue => CapturePolicy::ContinuePolling,
            PolicyArg::Arm => CapturePolicy::ArmAfterCapture,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run one wake cycle: poll, capture, arm the RTC alarm and shut down
    Run,
    /// Show the current classification, next wake and pending alarm
    Status,
    /// Take today's capture now
    Capture,
    /// Rehearse a full cycle on a simulated clock with dry-run hardware
    Simulate {
        /// Power-up instant (RFC 3339, e.g. 2026-06-15T11:55:00+00:00)
        #[arg(long, value_parser = parse_instant)]
        start: DateTime<FixedOffset>,
    },
}

impl Settings {
    fn schedule(&self) -> suncycle::Result<Schedule> {
        self.windows.schedule()
    }

    fn utc_offset(&self) -> FixedOffset {
        self.windows.utc_offset
    }

    fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            startup_grace: Duration::from_secs(self.startup_grace_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            shutdown_delay_minutes: self.shutdown_delay_mins,
            capture_policy: self.capture_policy.into(),
        }
    }

    fn capture_argv(&self) -> Vec<String> {
        match &self.capture_command {
            Some(program) => std::iter::once(program.clone())
                .chain(self.capture_args.iter().cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    fn camera(&self) -> FileCapture {
        FileCapture::new(&self.images).with_command(self.capture_argv())
    }
}

#[tokio::main]
#[instrument]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new("suncycle=info")),
        )
        .compact()
        .init();

    color_eyre::install()?;

    let cli = Cli::parse();
    debug!("Parsed command line arguments: {:?}", cli.settings);

    let settings = cli.settings;
    let schedule = settings.schedule().wrap_err("invalid window settings")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_cycle(&settings, schedule).await?,
        Commands::Status => status(&settings, schedule).await?,
        Commands::Capture => capture_now(&settings).await?,
        Commands::Simulate { start } => simulate(&settings, schedule, start).await?,
    }

    Ok(())
}

/// One real wake cycle
#[instrument(skip_all)]
async fn run_cycle(settings: &Settings, schedule: Schedule) -> Result<()> {
    let clock = SystemClock::new(settings.utc_offset());
    let config = settings.scheduler_config();

    let outcome = if settings.dry_run {
        info!("Dry run: the wake alarm and shutdown are only logged");
        Scheduler::new(
            schedule,
            config,
            clock,
            settings.camera(),
            DryRunWakeTimer::default(),
            DryRunShutdown::default(),
        )?
        .run()
        .await
    } else {
        Scheduler::new(
            schedule,
            config,
            clock,
            settings.camera(),
            SysfsWakeAlarm::new(&settings.wakealarm),
            SystemShutdown::default(),
        )?
        .run()
        .await
    };

    match outcome {
        Ok(outcome) => {
            info!(
                "Cycle complete, next wake {} (epoch {})",
                outcome.deadline,
                outcome.deadline.epoch_seconds()
            );
            Ok(())
        }
        Err(e) => {
            error!("Cycle aborted, the device stays powered: {}", e);
            Err(e).wrap_err("wake cycle aborted without shutdown")
        }
    }
}

/// Prints what the scheduler would decide right now
async fn status(settings: &Settings, schedule: Schedule) -> Result<()> {
    let now = SystemClock::new(settings.utc_offset()).now()?;
    let state = schedule.classify(&now);
    let deadline = schedule.next_wake(&now, state);

    println!("now:          {}", now.to_rfc3339());
    println!("state:        {state}");
    println!("capture hour: {}", schedule.is_capture_hour(&now));
    println!(
        "next wake:    {} (epoch {})",
        deadline,
        deadline.epoch_seconds()
    );

    let alarm = SysfsWakeAlarm::new(&settings.wakealarm);
    match alarm.pending().await {
        Ok(Some(epoch)) => println!("pending alarm: epoch {epoch}"),
        Ok(None) => println!("pending alarm: none"),
        Err(e) => println!("pending alarm: unreadable ({e})"),
    }
    Ok(())
}

/// Manual capture for the current day
async fn capture_now(settings: &Settings) -> Result<()> {
    let now = SystemClock::new(settings.utc_offset()).now()?;
    let outcome = settings.camera().capture(now).await?;
    match outcome {
        CaptureOutcome::Captured(path) => println!("captured {}", path.display()),
        CaptureOutcome::AlreadyCaptured(path) => println!("already captured {}", path.display()),
    }
    Ok(())
}

/// Replays a cycle from `start` in simulated time
#[instrument(skip(settings, schedule))]
async fn simulate(
    settings: &Settings,
    schedule: Schedule,
    start: DateTime<FixedOffset>,
) -> Result<()> {
    let clock = ManualClock::new(settings.windows.localize(start));
    let mut scheduler = Scheduler::new(
        schedule,
        settings.scheduler_config(),
        clock.clone(),
        SimulatedCapture,
        DryRunWakeTimer::default(),
        DryRunShutdown::default(),
    )?;

    let outcome = scheduler.run().await?;
    println!("powered up:  {}", start.to_rfc3339());
    println!("shutdown at: {}", clock.current().to_rfc3339());
    println!("captured:    {}", outcome.captured);
    println!(
        "next wake:   {} (epoch {})",
        outcome.deadline,
        outcome.deadline.epoch_seconds()
    );
    Ok(())
}

/// Capture stand-in for simulations, nothing is written
struct SimulatedCapture;

impl Capture for SimulatedCapture {
    async fn capture(
        &mut self,
        instant: DateTime<FixedOffset>,
    ) -> suncycle::Result<CaptureOutcome> {
        info!("[simulated] capture at {}", instant.to_rfc3339());
        Ok(CaptureOutcome::Captured(
            format!("image_{}.txt", instant.format("%Y%m%d")).into(),
        ))
    }
}
