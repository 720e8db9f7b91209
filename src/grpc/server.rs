use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

use crate::auth::AuthGate;
use crate::grpc::generator_service::GeneratorService;
use crate::grpc::receiver_service::ReceiverService;
use crate::proto::subtitle_generator_server::SubtitleGeneratorServer;
use crate::proto::subtitle_receiver_server::SubtitleReceiverServer;
use crate::scheduler::JobQueue;

/// Inbound gRPC listener. Every service is wrapped in the same [`AuthGate`].
pub struct GrpcServer {
    auth: AuthGate,
}

impl GrpcServer {
    pub fn new(auth: AuthGate) -> Self {
        Self { auth }
    }

    /// Serve `SubtitleGenerator` until `shutdown` resolves, then stop
    /// accepting connections and let in-flight calls finish.
    pub async fn serve_generator<F>(
        self,
        listener: TcpListener,
        job_queue: Arc<JobQueue>,
        shutdown: F,
    ) -> Result<(), tonic::transport::Error>
    where
        F: Future<Output = ()>,
    {
        let service = GeneratorService::new(job_queue);
        tracing::info!(addr = ?listener.local_addr().ok(), auth = self.auth.is_enabled(), "Starting gRPC server");

        Server::builder()
            .add_service(SubtitleGeneratorServer::with_interceptor(service, self.auth))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
            .await
    }

    /// Serve the development `SubtitleReceiver` until `shutdown` resolves.
    pub async fn serve_receiver<F>(
        self,
        listener: TcpListener,
        service: ReceiverService,
        shutdown: F,
    ) -> Result<(), tonic::transport::Error>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(addr = ?listener.local_addr().ok(), auth = self.auth.is_enabled(), "Starting subtitle receiver");

        Server::builder()
            .add_service(SubtitleReceiverServer::with_interceptor(service, self.auth))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
            .await
    }
}
