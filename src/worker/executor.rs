use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{Result, SubtitleError};
use crate::scheduler::Language;

/// Mount point of the scratch directory inside the container.
pub const CONTAINER_WORKDIR: &str = "/app";

/// What an execution unit needs to transcribe one audio track.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub job_id: Uuid,
    pub language: Language,
    /// Host directory holding the audio track; the artifact is written here
    pub scratch_dir: PathBuf,
    /// File name of the audio track inside `scratch_dir`
    pub audio_file: String,
}

/// Handle to a launched execution unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitHandle {
    pub id: String,
}

/// Runs inference workloads in isolated units.
#[tonic::async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Start a unit for the request and return without waiting for it.
    async fn launch(&self, request: &InferenceRequest) -> Result<UnitHandle>;

    /// Whether the unit is still running.
    async fn is_running(&self, unit: &UnitHandle) -> Result<bool>;

    /// Stop the unit. Stopping an already stopped or removed unit succeeds.
    async fn stop(&self, unit: &UnitHandle) -> Result<()>;
}

/// Runs inference containers through the Docker CLI.
///
/// Containers are started detached with:
/// - The scratch directory bound at [`CONTAINER_WORKDIR`]
/// - All GPUs when hardware acceleration is enabled
/// - `--rm`, so a stopped container cleans itself up
#[derive(Debug, Clone)]
pub struct DockerEngine {
    config: EngineConfig,
}

impl DockerEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Arguments for `docker run`.
    pub fn run_args(&self, request: &InferenceRequest) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--detach".to_string(),
            "--rm".to_string(),
            format!("--name=subtitles-{}", request.job_id),
            format!(
                "--volume={}:{}",
                request.scratch_dir.display(),
                CONTAINER_WORKDIR
            ),
        ];

        if self.config.hw_accel {
            args.push("--gpus=all".to_string());
        }

        args.push(self.config.image_for(request.language));
        args.extend(
            [
                "--",
                "--language",
                request.language.code(),
                "--output_format",
                "vtt",
                request.audio_file.as_str(),
            ]
            .map(String::from),
        );
        args
    }

    async fn docker(&self, args: &[String]) -> std::io::Result<std::process::Output> {
        Command::new(&self.config.docker_binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
    }
}

fn stderr_of(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("exit code: {:?}", output.status.code())
    } else {
        stderr
    }
}

#[tonic::async_trait]
impl ExecutionEngine for DockerEngine {
    async fn launch(&self, request: &InferenceRequest) -> Result<UnitHandle> {
        let args = self.run_args(request);
        tracing::debug!(job_id = %request.job_id, ?args, "Starting container");

        let output = self
            .docker(&args)
            .await
            .map_err(|e| SubtitleError::Launch(e.to_string()))?;
        if !output.status.success() {
            return Err(SubtitleError::Launch(stderr_of(&output)));
        }

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(SubtitleError::Launch(
                "docker run printed no container id".to_string(),
            ));
        }
        Ok(UnitHandle { id })
    }

    async fn is_running(&self, unit: &UnitHandle) -> Result<bool> {
        let args = [
            "inspect".to_string(),
            "--format={{.State.Running}}".to_string(),
            unit.id.clone(),
        ];
        let output = self
            .docker(&args)
            .await
            .map_err(|e| SubtitleError::Engine(e.to_string()))?;
        if !output.status.success() {
            return Err(SubtitleError::Engine(stderr_of(&output)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim() == "true")
    }

    async fn stop(&self, unit: &UnitHandle) -> Result<()> {
        let args = ["stop".to_string(), unit.id.clone()];
        let output = self
            .docker(&args)
            .await
            .map_err(|e| SubtitleError::Engine(e.to_string()))?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = stderr_of(&output);
        // --rm removes the container as soon as it exits
        if stderr.contains("No such container") {
            return Ok(());
        }
        Err(SubtitleError::Engine(stderr))
    }
}
