use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::error;
use crate::proto::subtitle_generator_server::SubtitleGenerator;
use crate::proto::GenerateRequest;
use crate::scheduler::{Job, JobQueue, Language};

/// gRPC service admitting subtitle jobs into the queue
pub struct GeneratorService {
    job_queue: Arc<JobQueue>,
}

impl GeneratorService {
    pub fn new(job_queue: Arc<JobQueue>) -> Self {
        Self { job_queue }
    }

    /// Normalize the request and enqueue it without waiting for space.
    ///
    /// Returns the admitted job. An admitted job has not been processed yet
    /// and may still fail later on a worker.
    pub fn admit(&self, req: GenerateRequest) -> error::Result<Job> {
        let language: Language = req.language.parse()?;
        let job = Job::new(req.stream_id, req.source, language);
        self.job_queue.try_push(job.clone())?;
        Ok(job)
    }
}

#[tonic::async_trait]
impl SubtitleGenerator for GeneratorService {
    async fn generate(&self, request: Request<GenerateRequest>) -> Result<Response<()>, Status> {
        let req = request.into_inner();
        let stream_id = req.stream_id;
        tracing::info!(stream_id, language = %req.language, "Received Generate request");

        match self.admit(req) {
            Ok(job) => {
                tracing::info!(
                    job_id = %job.id,
                    stream_id,
                    language = %job.language,
                    queue_len = self.job_queue.len(),
                    "Job queued"
                );
                Ok(Response::new(()))
            }
            Err(e) => {
                tracing::warn!(stream_id, error = %e, "Generate request rejected");
                Err(e.into())
            }
        }
    }
}
