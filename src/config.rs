use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, SubtitleError};
use crate::scheduler::Language;

/// Configuration for the sandboxed inference containers.
///
/// Each job runs the inference image in its own Docker container with the
/// scratch directory mounted at `/app`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Inference image; `{language}` is replaced with the job's language code
    pub image_template: String,
    /// Request all GPUs for the container
    pub hw_accel: bool,
    /// Docker CLI used to manage containers
    pub docker_binary: String,
    /// Tool used to extract the audio track
    pub ffmpeg_binary: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            image_template: "ghcr.io/jim60105/whisperx:large-v3-{language}".to_string(),
            hw_accel: true,
            docker_binary: "docker".to_string(),
            ffmpeg_binary: "ffmpeg".to_string(),
        }
    }
}

impl EngineConfig {
    /// Resolve the inference image for a language.
    pub fn image_for(&self, language: Language) -> String {
        self.image_template.replace("{language}", language.code())
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub listen_addr: SocketAddr,
    /// Number of concurrent workers
    pub parallelism: usize,
    /// Jobs that may wait in the queue before `Generate` is rejected
    pub queue_capacity: usize,
    /// Downstream receiver, host:port or a full URI
    pub target: String,
    /// Shared credential for inbound and outbound calls
    pub auth_token: Option<String>,
    /// Holds the per-job audio tracks and subtitle artifacts
    pub scratch_dir: PathBuf,
    pub poll_interval: Duration,
    pub engine: EngineConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 50051)),
            parallelism: 3,
            queue_capacity: 10,
            target: "localhost:50053".to_string(),
            auth_token: None,
            scratch_dir: PathBuf::from("/tmp/whisper"),
            poll_interval: Duration::from_secs(1),
            engine: EngineConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    /// Set the shared credential. An empty token disables authentication.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.auth_token = if token.is_empty() { None } else { Some(token) };
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Reject settings that would leave the service unable to make progress.
    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 {
            return Err(SubtitleError::InvalidConfig(
                "parallelism must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(SubtitleError::InvalidConfig(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(SubtitleError::InvalidConfig(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if self.target.trim().is_empty() {
            return Err(SubtitleError::InvalidConfig(
                "downstream target must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
