use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::auth::AuthGate;
use crate::config::ServiceConfig;
use crate::error::Result;
use crate::grpc::GrpcServer;
use crate::scheduler::JobQueue;
use crate::worker::{DockerEngine, FfmpegExtractor, GrpcForwarder, JobRunner, WorkerPool};

/// The subtitle service: gRPC gateway, job queue and worker pool.
pub struct SubtitleService {
    config: ServiceConfig,
    job_queue: Arc<JobQueue>,
    runner: Arc<JobRunner>,
}

impl SubtitleService {
    /// Build the service with ffmpeg, Docker and a gRPC forwarder.
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let runner = JobRunner::new(
            Arc::new(FfmpegExtractor::new(config.engine.ffmpeg_binary.clone())),
            Arc::new(DockerEngine::new(config.engine.clone())),
            Arc::new(GrpcForwarder::new(
                config.target.clone(),
                config.auth_token.clone(),
            )),
            config.scratch_dir.clone(),
            config.poll_interval,
        );
        Self::with_runner(config, runner)
    }

    /// Build the service around an existing runner.
    pub fn with_runner(config: ServiceConfig, runner: JobRunner) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            job_queue: Arc::new(JobQueue::with_capacity(config.queue_capacity)),
            runner: Arc::new(runner),
            config,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn job_queue(&self) -> Arc<JobQueue> {
        self.job_queue.clone()
    }

    /// Bind the configured address and serve until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Fails if the listener cannot be bound or the gRPC server stops with an
    /// error. Job failures are logged by the workers and never end the service.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    ///
    /// Shutdown order: the listener stops accepting, the queue stops
    /// admitting, workers finish or abandon their current job, then return.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(
            parallelism = self.config.parallelism,
            queue_capacity = self.config.queue_capacity,
            hw_accel = self.config.engine.hw_accel,
            receiver = %self.config.target,
            scratch_dir = %self.config.scratch_dir.display(),
            "Starting subtitle service"
        );

        let pool = WorkerPool::spawn(
            self.config.parallelism,
            self.job_queue.clone(),
            self.runner.clone(),
            shutdown.clone(),
        );

        let server = GrpcServer::new(AuthGate::new(self.config.auth_token.as_deref()));
        let server_shutdown = shutdown.clone();
        let result = server
            .serve_generator(listener, self.job_queue.clone(), async move {
                server_shutdown.cancelled().await
            })
            .await;

        self.job_queue.close();
        if let Err(ref e) = result {
            tracing::error!(error = %e, "gRPC server failed");
            shutdown.cancel();
        }

        tracing::info!(abandoned = self.job_queue.len(), "Waiting for workers to stop");
        pool.join().await;
        tracing::info!("Subtitle service stopped");

        result.map_err(Into::into)
    }
}
