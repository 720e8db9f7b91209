use tokio::sync::OnceCell;
use tonic::transport::{Channel, Endpoint};
use tonic::Request;

use crate::auth::attach_token;
use crate::error::Result;
use crate::proto::subtitle_receiver_client::SubtitleReceiverClient;
use crate::proto::ReceiveRequest;

/// Delivers finished subtitles to the downstream service.
#[tonic::async_trait]
pub trait ResultForwarder: Send + Sync {
    async fn forward(&self, request: ReceiveRequest) -> Result<()>;
}

/// Forwards results over gRPC to a `SubtitleReceiver`.
///
/// The channel is connected on first use and then shared by every worker;
/// tonic channels multiplex concurrent calls, so each call clones the client.
pub struct GrpcForwarder {
    target: String,
    auth_token: Option<String>,
    client: OnceCell<SubtitleReceiverClient<Channel>>,
}

impl GrpcForwarder {
    pub fn new(target: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            target: target.into(),
            auth_token: auth_token.filter(|t| !t.is_empty()),
            client: OnceCell::new(),
        }
    }

    /// Accepts `host:port` or a full `http(s)://` URI.
    pub fn endpoint_uri(target: &str) -> String {
        if target.starts_with("http://") || target.starts_with("https://") {
            target.to_string()
        } else {
            format!("http://{}", target)
        }
    }

    async fn client(&self) -> Result<SubtitleReceiverClient<Channel>> {
        let client = self
            .client
            .get_or_try_init(|| async {
                let uri = Self::endpoint_uri(&self.target);
                tracing::info!(uri = %uri, "Connecting to subtitle receiver");
                let channel = Endpoint::from_shared(uri)?.connect().await?;
                Ok::<_, crate::error::SubtitleError>(SubtitleReceiverClient::new(channel))
            })
            .await?;
        Ok(client.clone())
    }
}

impl std::fmt::Debug for GrpcForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcForwarder")
            .field("target", &self.target)
            .field("auth", &self.auth_token.is_some())
            .field("connected", &self.client.initialized())
            .finish()
    }
}

#[tonic::async_trait]
impl ResultForwarder for GrpcForwarder {
    async fn forward(&self, request: ReceiveRequest) -> Result<()> {
        let mut client = self.client().await?;

        let mut request = Request::new(request);
        if let Some(ref token) = self.auth_token {
            attach_token(&mut request, token)?;
        }

        client.receive(request).await?;
        Ok(())
    }
}
