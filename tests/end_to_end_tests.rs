//! End-to-end tests over real gRPC connections: client -> auth gate ->
//! gateway -> queue -> worker -> forwarder -> receiver.


use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tonic::transport::Channel;
use tonic::{Code, Request};

use subtitle_service::auth::{attach_token, AuthGate};
use subtitle_service::config::ServiceConfig;
use subtitle_service::grpc::{GrpcServer, ReceiverService};
use subtitle_service::proto::subtitle_generator_client::SubtitleGeneratorClient;
use subtitle_service::proto::{GenerateRequest, ReceiveRequest};
use subtitle_service::scheduler::{Job, JobQueue, Language};
use subtitle_service::service::SubtitleService;
use subtitle_service::worker::{GrpcForwarder, Outcome};
use test_harness::{runner, scratch_files, FakeEngine, FakeExtractor, SUBTITLES};
use tokio_util::sync::CancellationToken;

const TOKEN: &str = "shared-s3cret";

struct Receiver {
    addr: SocketAddr,
    deliveries: broadcast::Receiver<ReceiveRequest>,
    shutdown: CancellationToken,
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn start_receiver(token: Option<&str>) -> Receiver {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let service = ReceiverService::new(None);
    let deliveries = service.subscribe();
    let shutdown = CancellationToken::new();

    let server = GrpcServer::new(AuthGate::new(token));
    let stop = shutdown.clone();
    tokio::spawn(async move {
        server
            .serve_receiver(listener, service, async move { stop.cancelled().await })
            .await
            .unwrap();
    });

    Receiver {
        addr,
        deliveries,
        shutdown,
    }
}

struct RunningService {
    addr: SocketAddr,
    queue: Arc<JobQueue>,
    engine: Arc<FakeEngine>,
    shutdown: CancellationToken,
    handle: JoinHandle<subtitle_service::error::Result<()>>,
    _scratch: tempfile::TempDir,
}

async fn start_service(token: Option<&str>, target: SocketAddr, engine: FakeEngine) -> RunningService {
    let scratch = tempfile::tempdir().unwrap();
    let engine = Arc::new(engine);
    let mut config = ServiceConfig::new("127.0.0.1:0".parse().unwrap())
        .with_target(target.to_string());
    config.parallelism = 1;
    config.queue_capacity = 2;
    config.scratch_dir = scratch.path().to_path_buf();
    if let Some(token) = token {
        config = config.with_auth_token(token);
    }

    let runner = runner(
        scratch.path(),
        Arc::new(FakeExtractor::default()),
        engine.clone(),
        Arc::new(GrpcForwarder::new(
            target.to_string(),
            token.map(str::to_string),
        )),
    );
    let service = SubtitleService::with_runner(config, runner).unwrap();
    let queue = service.job_queue();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(service.serve(listener, shutdown.clone()));

    RunningService {
        addr,
        queue,
        engine,
        shutdown,
        handle,
        _scratch: scratch,
    }
}

async fn connect(addr: SocketAddr) -> SubtitleGeneratorClient<Channel> {
    let channel = Channel::from_shared(format!("http://{}", addr))
        .unwrap()
        .connect()
        .await
        .unwrap();
    SubtitleGeneratorClient::new(channel)
}

fn generate(stream_id: i32, language: &str, token: Option<&str>) -> Request<GenerateRequest> {
    let mut request = Request::new(GenerateRequest {
        stream_id,
        source: "https://x/playlist.m3u8".to_string(),
        language: language.to_string(),
    });
    if let Some(token) = token {
        attach_token(&mut request, token).unwrap();
    }
    request
}

#[tokio::test]
async fn test_generate_is_delivered_to_receiver() {
    let mut receiver = start_receiver(Some(TOKEN)).await;
    let service = start_service(Some(TOKEN), receiver.addr, FakeEngine::default()).await;
    let mut client = connect(service.addr).await;

    client
        .generate(generate(7, "english", Some(TOKEN)))
        .await
        .expect("request should be acknowledged");

    let delivered = tokio::time::timeout(Duration::from_secs(5), receiver.deliveries.recv())
        .await
        .expect("subtitles should reach the receiver")
        .unwrap();
    assert_eq!(delivered.stream_id, 7);
    assert_eq!(delivered.language, "en");
    assert_eq!(delivered.subtitles, SUBTITLES);

    let launched = service.engine.launched();
    assert_eq!(launched.len(), 1);
    assert_eq!(launched[0].language, Language::English);

    drop(client);
    service.shutdown.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), service.handle)
        .await
        .expect("service should stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_requests_without_valid_token_are_unauthenticated() {
    let receiver = start_receiver(None).await;
    let service = start_service(Some(TOKEN), receiver.addr, FakeEngine::default()).await;
    let mut client = connect(service.addr).await;

    let err = client.generate(generate(1, "en", None)).await.unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);

    let err = client
        .generate(generate(1, "en", Some("shared-s3cre7")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);

    // Auth runs before validation: a bad language is still unauthenticated
    let err = client
        .generate(generate(1, "klingon", Some("wrong")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);

    assert!(service.queue.is_empty());
    assert!(service.engine.launched().is_empty());
    service.shutdown.cancel();
}

#[tokio::test]
async fn test_invalid_language_and_full_queue_over_the_wire() {
    let receiver = start_receiver(None).await;
    let service = start_service(None, receiver.addr, FakeEngine::held()).await;
    let mut client = connect(service.addr).await;

    let err = client.generate(generate(1, "fr", None)).await.unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
    assert!(service.queue.is_empty());

    // One job on the worker, two in the queue, the fourth is rejected
    client.generate(generate(1, "en", None)).await.unwrap();
    service.engine.wait_for_launches(1).await;
    client.generate(generate(2, "de", None)).await.unwrap();
    client.generate(generate(3, "Deutsch", None)).await.unwrap();
    let err = client.generate(generate(4, "en", None)).await.unwrap_err();
    assert_eq!(err.code(), Code::ResourceExhausted);
    assert_eq!(service.queue.len(), 2);

    // Shutdown stops the held unit and the worker
    drop(client);
    service.shutdown.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), service.handle)
        .await
        .expect("service should stop")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(service.engine.stopped().len(), 1);
    assert_eq!(service.engine.active_units(), 0);
    assert!(service.queue.is_closed());
}

#[tokio::test]
async fn test_rejected_delivery_still_completes_job() {
    let receiver = start_receiver(Some(TOKEN)).await;
    let scratch = tempfile::tempdir().unwrap();
    let engine = Arc::new(FakeEngine::default());
    let runner = runner(
        scratch.path(),
        Arc::new(FakeExtractor::default()),
        engine.clone(),
        Arc::new(GrpcForwarder::new(
            receiver.addr.to_string(),
            Some("not-the-token".to_string()),
        )),
    );

    let job = Job::new(9, "https://x/playlist.m3u8".to_string(), Language::German);
    let outcome = runner.run(&job, &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, Outcome::DeliveryFailed);
    assert_eq!(engine.active_units(), 0);
    assert!(scratch_files(scratch.path()).is_empty());
}

#[tokio::test]
async fn test_service_fails_when_port_is_taken() {
    let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = ServiceConfig::new(occupied.local_addr().unwrap());
    let service = SubtitleService::new(config).unwrap();

    let result = service.run(CancellationToken::new()).await;
    assert!(result.is_err());
}
