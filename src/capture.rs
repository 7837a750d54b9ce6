/*!
 # Daily capture

 The capture collaborator produces one dated artifact per calendar day. Calls
 for a date that already has an artifact leave it untouched, which makes the
 capture safe to trigger repeatedly within the capture hour.
*/

use std::future::Future;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::{Error, Result};

/// What a capture call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// A new artifact was written
    Captured(PathBuf),
    /// The artifact for this date already existed
    AlreadyCaptured(PathBuf),
}

impl CaptureOutcome {
    pub fn path(&self) -> &Path {
        match self {
            CaptureOutcome::Captured(p) | CaptureOutcome::AlreadyCaptured(p) => p,
        }
    }
}

/// Produces the dated artifact for the day of `instant`
pub trait Capture {
    fn capture(
        &mut self,
        instant: DateTime<FixedOffset>,
    ) -> impl Future<Output = Result<CaptureOutcome>>;
}

/// Writes `image_YYYYMMDD.*` into a directory.
///
/// Without a command the artifact is a text marker holding the capture time
/// (`YYYYMMDD_HH_MM_SS`). With a command, e.g. `rpicam-still -n -o`, the
/// program is run with the `.jpg` artifact path appended as its last argument.
#[derive(Debug, Clone)]
pub struct FileCapture {
    directory: PathBuf,
    command: Option<Vec<String>>,
}

impl FileCapture {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            command: None,
        }
    }

    /// Uses an external program to produce the artifact
    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = if command.is_empty() {
            None
        } else {
            Some(command)
        };
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Artifact path for the calendar date of `instant`
    pub fn artifact_path(&self, instant: &DateTime<FixedOffset>) -> PathBuf {
        let extension = if self.command.is_some() { "jpg" } else { "txt" };
        self.directory
            .join(format!("image_{}.{extension}", instant.format("%Y%m%d")))
    }

    async fn run_command(&self, command: &[String], path: &Path) -> Result<()> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::Capture("empty capture command".into()))?;

        debug!("Running capture command {} {:?}", program, args);
        let output = Command::new(program)
            .args(args)
            .arg(path)
            .output()
            .await
            .map_err(|e| Error::Capture(format!("could not run {program}: {e}")))?;

        if !output.status.success() {
            return Err(Error::Capture(format!(
                "{program} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(Error::Capture(format!(
                "{program} succeeded but {} was not written",
                path.display()
            )));
        }
        Ok(())
    }
}

impl Capture for FileCapture {
    #[instrument(skip(self), fields(directory = %self.directory.display()))]
    async fn capture(&mut self, instant: DateTime<FixedOffset>) -> Result<CaptureOutcome> {
        let path = self.artifact_path(&instant);

        if tokio::fs::try_exists(&path)
            .await
            .map_err(|e| Error::Capture(format!("could not check {}: {e}", path.display())))?
        {
            debug!("Artifact {} already exists", path.display());
            return Ok(CaptureOutcome::AlreadyCaptured(path));
        }

        tokio::fs::create_dir_all(&self.directory).await.map_err(|e| {
            Error::Capture(format!(
                "could not create {}: {e}",
                self.directory.display()
            ))
        })?;

        match &self.command {
            Some(command) => self.run_command(command, &path).await?,
            None => {
                let stamp = instant.format("%Y%m%d_%H_%M_%S").to_string();
                tokio::fs::write(&path, stamp.as_bytes())
                    .await
                    .map_err(|e| Error::Capture(format!("could not write {}: {e}", path.display())))?;
            }
        }

        info!("Captured {}", path.display());
        Ok(CaptureOutcome::Captured(path))
    }
}
