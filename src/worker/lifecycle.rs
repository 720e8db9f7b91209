use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Result, SubtitleError};
use crate::scheduler::Job;
use crate::worker::executor::{ExecutionEngine, InferenceRequest, UnitHandle};
use crate::worker::extractor::AudioExtractor;
use crate::worker::forwarder::ResultForwarder;

/// Extension of the extracted audio track.
pub const AUDIO_EXTENSION: &str = "m4a";
/// Extension of the artifact written by the inference image.
pub const ARTIFACT_EXTENSION: &str = "vtt";

/// Steps a job goes through on a worker, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ExtractingAudio,
    Launching,
    Polling,
    RetrievingArtifact,
    Forwarding,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::ExtractingAudio => write!(f, "extracting_audio"),
            Stage::Launching => write!(f, "launching"),
            Stage::Polling => write!(f, "polling"),
            Stage::RetrievingArtifact => write!(f, "retrieving_artifact"),
            Stage::Forwarding => write!(f, "forwarding"),
        }
    }
}

/// How a job that got through the lifecycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Delivered,
    /// Subtitles were produced but the receiver could not be reached
    DeliveryFailed,
}

/// Per-job working state, owned by the worker running the job.
#[derive(Debug)]
pub struct ExecutionContext {
    pub id: Uuid,
    pub scratch_dir: PathBuf,
    pub unit: Option<UnitHandle>,
}

impl ExecutionContext {
    pub fn new(id: Uuid, scratch_dir: &Path) -> Self {
        Self {
            id,
            scratch_dir: scratch_dir.to_path_buf(),
            unit: None,
        }
    }

    pub fn audio_file_name(&self) -> String {
        format!("{}.{}", self.id, AUDIO_EXTENSION)
    }

    pub fn audio_path(&self) -> PathBuf {
        self.scratch_dir.join(self.audio_file_name())
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.scratch_dir
            .join(format!("{}.{}", self.id, ARTIFACT_EXTENSION))
    }
}

/// Drives one job from media source to delivered subtitles.
///
/// Stages run strictly in sequence, each only after the previous one
/// succeeded. Whatever happens, the execution unit is stopped and the job's
/// scratch files are removed before [`JobRunner::run`] returns.
#[derive(Clone)]
pub struct JobRunner {
    extractor: Arc<dyn AudioExtractor>,
    engine: Arc<dyn ExecutionEngine>,
    forwarder: Arc<dyn ResultForwarder>,
    scratch_dir: PathBuf,
    poll_interval: Duration,
}

impl JobRunner {
    pub fn new(
        extractor: Arc<dyn AudioExtractor>,
        engine: Arc<dyn ExecutionEngine>,
        forwarder: Arc<dyn ResultForwarder>,
        scratch_dir: PathBuf,
        poll_interval: Duration,
    ) -> Self {
        Self {
            extractor,
            engine,
            forwarder,
            scratch_dir,
            poll_interval,
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Run the full lifecycle for `job`.
    ///
    /// Delivery failures are logged and reported as
    /// [`Outcome::DeliveryFailed`]; every earlier failure is an error.
    pub async fn run(&self, job: &Job, shutdown: &CancellationToken) -> Result<Outcome> {
        let mut ctx = ExecutionContext::new(job.id, &self.scratch_dir);
        let result = self.run_stages(job, &mut ctx, shutdown).await;
        self.cleanup(&mut ctx).await;
        result
    }

    async fn run_stages(
        &self,
        job: &Job,
        ctx: &mut ExecutionContext,
        shutdown: &CancellationToken,
    ) -> Result<Outcome> {
        tokio::fs::create_dir_all(&ctx.scratch_dir).await?;

        // Audio extraction
        log_stage(job, Stage::ExtractingAudio);
        let audio_path = ctx.audio_path();
        tokio::select! {
            result = self.extractor.extract(&job.source, &audio_path) => result?,
            _ = shutdown.cancelled() => return Err(SubtitleError::Cancelled),
        }
        tracing::info!(job_id = %job.id, path = %audio_path.display(), "Audio extracted");

        // Launch
        log_stage(job, Stage::Launching);
        let request = InferenceRequest {
            job_id: job.id,
            language: job.language,
            scratch_dir: ctx.scratch_dir.clone(),
            audio_file: ctx.audio_file_name(),
        };
        let unit = self.engine.launch(&request).await?;
        tracing::info!(job_id = %job.id, unit_id = %unit.id, "Execution unit running");
        ctx.unit = Some(unit.clone());

        // Polling
        log_stage(job, Stage::Polling);
        self.wait_for_exit(job, &unit, shutdown).await?;

        // Artifact retrieval
        log_stage(job, Stage::RetrievingArtifact);
        let artifact_path = ctx.artifact_path();
        let subtitles = tokio::fs::read_to_string(&artifact_path)
            .await
            .map_err(|source| SubtitleError::Artifact {
                path: artifact_path.clone(),
                source,
            })?;
        tracing::debug!(job_id = %job.id, bytes = subtitles.len(), "Subtitles generated");

        // Forwarding
        log_stage(job, Stage::Forwarding);
        match self.forwarder.forward(job.receive_request(subtitles)).await {
            Ok(()) => {
                tracing::info!(job_id = %job.id, stream_id = job.stream_id, "Subtitles delivered");
                Ok(Outcome::Delivered)
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %job.id,
                    stream_id = job.stream_id,
                    error = %e,
                    "Failed to deliver subtitles"
                );
                Ok(Outcome::DeliveryFailed)
            }
        }
    }

    /// Poll the unit until it stops running. There is no timeout; only
    /// shutdown ends the wait early.
    async fn wait_for_exit(
        &self,
        job: &Job,
        unit: &UnitHandle,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        loop {
            match self.engine.is_running(unit).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    // Treat as finished; a missing artifact fails the job next.
                    tracing::warn!(job_id = %job.id, unit_id = %unit.id, error = %e, "Failed to inspect execution unit");
                    break;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.cancelled() => {
                    tracing::info!(job_id = %job.id, unit_id = %unit.id, "Shutdown while waiting for execution unit");
                    return Err(SubtitleError::Cancelled);
                }
            }
        }
        tracing::info!(job_id = %job.id, unit_id = %unit.id, "Execution unit finished");
        Ok(())
    }

    async fn cleanup(&self, ctx: &mut ExecutionContext) {
        if let Some(unit) = ctx.unit.take() {
            if let Err(e) = self.engine.stop(&unit).await {
                tracing::warn!(job_id = %ctx.id, unit_id = %unit.id, error = %e, "Failed to stop execution unit");
            }
        }

        for path in [ctx.audio_path(), ctx.artifact_path()] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "Removed scratch file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Could not remove scratch file")
                }
            }
        }
    }
}

fn log_stage(job: &Job, stage: Stage) {
    tracing::debug!(job_id = %job.id, stream_id = job.stream_id, %stage, "Entering stage");
}
