//! Local audio playback for VIP entrances.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Errors from starting playback.
#[derive(Error, Debug)]
pub enum AudioError {
    /// The audio file does not exist.
    #[error("Audio file not found: {0}")]
    NotFound(PathBuf),

    /// No player program configured.
    #[error("No audio player command configured")]
    NoPlayer,

    /// The player process could not be started.
    #[error("Failed to start audio player: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Plays an audio file.
pub trait AudioPlayer: Send + Sync {
    /// Starts playing `path`. Returns once playback has started.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError`] if playback cannot be started.
    fn play<'a>(&'a self, path: &'a Path) -> Pin<Box<dyn Future<Output = Result<(), AudioError>> + Send + 'a>>;
}

/// Runs an external player program with the file as its last argument.
///
/// The child runs detached; its exit status is logged when it finishes.
#[derive(Debug, Clone)]
pub struct CommandAudioPlayer {
    program: String,
    args: Vec<String>,
}

impl CommandAudioPlayer {
    /// Builds a player from `[program, args...]`.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::NoPlayer`] if `command` is empty.
    pub fn new(command: &[String]) -> Result<Self, AudioError> {
        let (program, args) = command.split_first().ok_or(AudioError::NoPlayer)?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    async fn spawn(&self, path: &Path) -> Result<(), AudioError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(AudioError::NotFound(path.to_path_buf()));
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false)
            .spawn()?;

        let file = path.display().to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => tracing::debug!(file = %file, "Audio finished"),
                Ok(status) => tracing::warn!(file = %file, %status, "Audio player exited with failure"),
                Err(e) => tracing::warn!(file = %file, error = %e, "Lost track of audio player"),
            }
        });
        Ok(())
    }
}

impl AudioPlayer for CommandAudioPlayer {
    fn play<'a>(&'a self, path: &'a Path) -> Pin<Box<dyn Future<Output = Result<(), AudioError>> + Send + 'a>> {
        Box::pin(self.spawn(path))
    }
}
