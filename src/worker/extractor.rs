use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{Result, SubtitleError};

/// Pulls the audio track out of a media source.
#[tonic::async_trait]
pub trait AudioExtractor: Send + Sync {
    /// Write the audio track of `source` to `destination`.
    async fn extract(&self, source: &str, destination: &Path) -> Result<()>;
}

/// Extracts audio with ffmpeg, re-encoding to AAC.
#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    binary: String,
}

impl Default for FfmpegExtractor {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegExtractor {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn args(source: &str, destination: &Path) -> Vec<String> {
        vec![
            "-loglevel".to_string(),
            "warning".to_string(),
            "-nostats".to_string(),
            "-i".to_string(),
            source.to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-vn".to_string(),
            destination.display().to_string(),
        ]
    }
}

#[tonic::async_trait]
impl AudioExtractor for FfmpegExtractor {
    async fn extract(&self, source: &str, destination: &Path) -> Result<()> {
        // Dropping the future (cancellation) kills ffmpeg
        let output = Command::new(&self.binary)
            .args(Self::args(source, destination))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SubtitleError::Extraction(format!("{}: {}", self.binary, e)))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(SubtitleError::Extraction(if stderr.is_empty() {
            format!("exit code: {:?}", output.status.code())
        } else {
            stderr
        }))
    }
}
