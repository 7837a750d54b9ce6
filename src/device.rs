use std::future::Future;
use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info, instrument, warn};

use crate::schedule::WakeDeadline;
use crate::{Error, Result};

/// Sysfs attribute of the first RTC on Linux
pub const DEFAULT_WAKEALARM_PATH: &str = "/sys/class/rtc/rtc0/wakealarm";

/// Hardware alarm able to power the device on at an absolute time
pub trait WakeTimer {
    /// Clears any pending alarm, then arms a new one for `deadline`
    fn arm(&mut self, deadline: WakeDeadline) -> impl Future<Output = Result<()>>;
}

/// Host facility that powers the device off after a delay
pub trait PowerControl {
    /// Asks the host to power off in `delay_minutes` minutes
    fn request_shutdown(&mut self, delay_minutes: u32) -> impl Future<Output = Result<()>>;
}

/// RTC wake alarm exposed through sysfs.
///
/// The kernel only accepts a new alarm once the previous one has been
/// cleared, so every arm is two separate writes: `"0"`, then the epoch seconds
/// in ASCII decimal.
#[derive(Debug, Clone)]
pub struct SysfsWakeAlarm {
    path: PathBuf,
}

impl Default for SysfsWakeAlarm {
    fn default() -> Self {
        Self::new(DEFAULT_WAKEALARM_PATH)
    }
}

impl SysfsWakeAlarm {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `"0"`, cancelling any pending alarm
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn clear(&self) -> Result<()> {
        debug!("Clearing pending wake alarm");
        self.write("0").await
    }

    /// Reads back the pending alarm in epoch seconds, `None` when no alarm is set
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn pending(&self) -> Result<Option<i64>> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        let trimmed = contents.trim();
        if trimmed.is_empty() {
            debug!("No wake alarm pending");
            return Ok(None);
        }
        match trimmed.parse::<i64>() {
            Ok(0) => Ok(None),
            Ok(epoch) => Ok(Some(epoch)),
            Err(e) => {
                warn!("Unreadable wake alarm value {:?}: {}", trimmed, e);
                Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("unexpected wake alarm contents {trimmed:?}"),
                )))
            }
        }
    }

    /// One complete open-write-close of the attribute. The file is never
    /// created: a missing attribute means there is no RTC to wake us.
    async fn write(&self, value: &str) -> Result<()> {
        let result = async {
            let mut file = OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(&self.path)
                .await?;
            file.write_all(value.as_bytes()).await?;
            file.flush().await
        }
        .await;

        result.map_err(|source| {
            error!("Writing {:?} to wake alarm failed: {}", value, source);
            Error::WakeTimerWrite {
                path: self.path.clone(),
                source,
            }
        })
    }
}

impl WakeTimer for SysfsWakeAlarm {
    #[instrument(skip(self), fields(path = %self.path.display(), epoch = deadline.epoch_seconds()))]
    async fn arm(&mut self, deadline: WakeDeadline) -> Result<()> {
        self.clear().await?;
        self.write(&deadline.epoch_seconds().to_string()).await?;
        info!(
            "Wake alarm armed for epoch {} ({})",
            deadline.epoch_seconds(),
            deadline.at().format("%Y%m%d %H:%M:%S %:z")
        );
        Ok(())
    }
}

/// Powers off through the `shutdown` command.
///
/// The delay is passed as `+N` minutes so the host broadcasts the pending
/// power-off to logged in users, who can still cancel it with `shutdown -c`.
#[derive(Debug, Clone)]
pub struct SystemShutdown {
    program: PathBuf,
}

impl Default for SystemShutdown {
    fn default() -> Self {
        Self::new("shutdown")
    }
}

impl SystemShutdown {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl PowerControl for SystemShutdown {
    #[instrument(skip(self), fields(program = %self.program.display()))]
    async fn request_shutdown(&mut self, delay_minutes: u32) -> Result<()> {
        let delay = format!("+{delay_minutes}");
        info!("Requesting shutdown in {} minute(s)", delay_minutes);

        let output = Command::new(&self.program)
            .arg(&delay)
            .output()
            .await
            .map_err(|e| {
                error!("Could not run {}: {}", self.program.display(), e);
                Error::ShutdownRequest(format!("could not run {}: {e}", self.program.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("Shutdown command failed with {}: {}", output.status, stderr.trim());
            return Err(Error::ShutdownRequest(format!(
                "{} {delay} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        debug!("Shutdown scheduled");
        Ok(())
    }
}

/// Wake timer that only logs what it would have written
#[derive(Debug, Clone, Default)]
pub struct DryRunWakeTimer {
    pub armed: Option<WakeDeadline>,
}

impl WakeTimer for DryRunWakeTimer {
    async fn arm(&mut self, deadline: WakeDeadline) -> Result<()> {
        info!(
            "[dry-run] would write 0 then {} to the wake alarm ({})",
            deadline.epoch_seconds(),
            deadline
        );
        self.armed = Some(deadline);
        Ok(())
    }
}

/// Power control that only logs the shutdown it would have requested
#[derive(Debug, Clone, Default)]
pub struct DryRunShutdown {
    pub requested: Option<u32>,
}

impl PowerControl for DryRunShutdown {
    async fn request_shutdown(&mut self, delay_minutes: u32) -> Result<()> {
        info!("[dry-run] would run shutdown +{}", delay_minutes);
        self.requested = Some(delay_minutes);
        Ok(())
    }
}
