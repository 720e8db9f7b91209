use std::path::PathBuf;

use tokio::sync::broadcast;
use tonic::{Request, Response, Status};

use crate::proto::subtitle_receiver_server::SubtitleReceiver;
use crate::proto::ReceiveRequest;

/// Stand-in for the downstream subtitle store, for local development.
///
/// Logs every delivery, optionally writes the latest subtitles to a file,
/// and publishes deliveries to subscribers.
pub struct ReceiverService {
    save_to: Option<PathBuf>,
    deliveries: broadcast::Sender<ReceiveRequest>,
}

impl ReceiverService {
    pub fn new(save_to: Option<PathBuf>) -> Self {
        let (deliveries, _) = broadcast::channel(64);
        Self {
            save_to,
            deliveries,
        }
    }

    /// Receive every delivery made after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ReceiveRequest> {
        self.deliveries.subscribe()
    }
}

#[tonic::async_trait]
impl SubtitleReceiver for ReceiverService {
    async fn receive(&self, request: Request<ReceiveRequest>) -> Result<Response<()>, Status> {
        let req = request.into_inner();
        tracing::info!(
            stream_id = req.stream_id,
            language = %req.language,
            bytes = req.subtitles.len(),
            "Received subtitles"
        );

        if let Some(ref path) = self.save_to {
            tokio::fs::write(path, &req.subtitles).await.map_err(|e| {
                Status::internal(format!("failed to write {}: {}", path.display(), e))
            })?;
        }

        // No subscribers is fine
        let _ = self.deliveries.send(req);
        Ok(Response::new(()))
    }
}
