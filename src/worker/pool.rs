use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::scheduler::JobQueue;
use crate::worker::lifecycle::{JobRunner, Outcome};

/// Fixed set of workers draining the job queue.
///
/// Each worker runs one job at a time to completion before taking the next.
/// Job failures are logged and never stop a worker.
pub struct WorkerPool {
    workers: JoinSet<()>,
}

impl WorkerPool {
    /// Spawn `parallelism` workers. They stop once `shutdown` fires or the
    /// queue is closed and drained.
    pub fn spawn(
        parallelism: usize,
        queue: Arc<JobQueue>,
        runner: Arc<JobRunner>,
        shutdown: CancellationToken,
    ) -> Self {
        let mut workers = JoinSet::new();
        for worker_id in 0..parallelism {
            let queue = queue.clone();
            let runner = runner.clone();
            let shutdown = shutdown.clone();
            workers.spawn(async move {
                Self::worker_loop(worker_id, queue, runner, shutdown).await;
            });
        }
        Self { workers }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Wait for every worker to exit.
    pub async fn join(mut self) {
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker task ended abnormally");
            }
        }
    }

    async fn worker_loop(
        worker_id: usize,
        queue: Arc<JobQueue>,
        runner: Arc<JobRunner>,
        shutdown: CancellationToken,
    ) {
        tracing::info!(worker_id, "Starting worker");

        while !shutdown.is_cancelled() {
            let Some(job) = queue.pop(&shutdown).await else {
                break;
            };

            tracing::info!(
                worker_id,
                job_id = %job.id,
                stream_id = job.stream_id,
                language = %job.language,
                queued_ms = job.queued_for().num_milliseconds(),
                "Handling job"
            );

            match runner.run(&job, &shutdown).await {
                Ok(Outcome::Delivered) => {
                    tracing::info!(worker_id, job_id = %job.id, "Job completed");
                }
                Ok(Outcome::DeliveryFailed) => {
                    tracing::info!(worker_id, job_id = %job.id, "Job completed without delivery");
                }
                Err(e) => {
                    tracing::error!(worker_id, job_id = %job.id, error = %e, "Job failed");
                }
            }
        }

        tracing::info!(worker_id, "Worker stopped");
    }
}
