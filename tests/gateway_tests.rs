//! Tests for the Generate gateway: language normalization and admission
//! control against the bounded queue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tonic::{Code, Request};

use subtitle_service::grpc::GeneratorService;
use subtitle_service::proto::subtitle_generator_server::SubtitleGenerator;
use subtitle_service::proto::GenerateRequest;
use subtitle_service::scheduler::{JobQueue, Language};
use tokio_util::sync::CancellationToken;

fn request(stream_id: i32, language: &str) -> Request<GenerateRequest> {
    Request::new(GenerateRequest {
        stream_id,
        source: "https://x/playlist.m3u8".to_string(),
        language: language.to_string(),
    })
}

fn service(capacity: usize) -> (GeneratorService, Arc<JobQueue>) {
    let queue = Arc::new(JobQueue::with_capacity(capacity));
    (GeneratorService::new(queue.clone()), queue)
}

#[tokio::test]
async fn test_unsupported_languages_are_rejected_and_not_queued() {
    let (service, queue) = service(10);

    for language in ["", "fr", "french", "en-GB", "deu", "Englisch", "e n"] {
        let err = service
            .generate(request(1, language))
            .await
            .expect_err("unsupported language should be rejected");
        assert_eq!(err.code(), Code::InvalidArgument, "{:?}", language);
        assert_eq!(queue.len(), 0);
    }
}

#[tokio::test]
async fn test_english_aliases_normalize_to_en() {
    let (service, queue) = service(10);
    let shutdown = CancellationToken::new();

    for alias in ["en", "EN", "English", "english"] {
        service.generate(request(1, alias)).await.unwrap();
        let job = queue.pop(&shutdown).await.unwrap();
        assert_eq!(job.language, Language::English);
        assert_eq!(job.receive_request(String::new()).language, "en");
    }
}

#[tokio::test]
async fn test_german_aliases_normalize_to_de() {
    let (service, queue) = service(10);
    let shutdown = CancellationToken::new();

    for alias in ["de", "DE", "Deutsch", "deutsch", "German", "german"] {
        service.generate(request(1, alias)).await.unwrap();
        let job = queue.pop(&shutdown).await.unwrap();
        assert_eq!(job.language, Language::German);
        assert_eq!(job.language.code(), "de");
    }
}

#[tokio::test]
async fn test_admitted_job_keeps_request_fields() {
    let (service, queue) = service(10);
    let job = service
        .admit(GenerateRequest {
            stream_id: 42,
            source: "https://x/playlist.m3u8?jwt=abc".to_string(),
            language: "german".to_string(),
        })
        .unwrap();

    assert_eq!(job.stream_id, 42);
    assert_eq!(job.source, "https://x/playlist.m3u8?jwt=abc");
    assert_eq!(job.language, Language::German);

    let queued = queue.pop(&CancellationToken::new()).await.unwrap();
    assert_eq!(queued, job);
}

#[tokio::test]
async fn test_resource_exhausted_when_queue_full() {
    let (service, queue) = service(2);

    service.generate(request(1, "en")).await.unwrap();
    service.generate(request(2, "en")).await.unwrap();

    let start = Instant::now();
    let err = service
        .generate(request(3, "en"))
        .await
        .expect_err("third request exceeds capacity");
    let elapsed = start.elapsed();

    assert_eq!(err.code(), Code::ResourceExhausted);
    assert_eq!(queue.len(), 2);
    // Must fail fast rather than wait for space
    assert!(
        elapsed < Duration::from_millis(200),
        "enqueue must be non-blocking (took {:?})",
        elapsed
    );
}

#[tokio::test]
async fn test_invalid_language_checked_before_capacity() {
    let (service, queue) = service(1);
    service.generate(request(1, "en")).await.unwrap();

    let err = service.generate(request(2, "xx")).await.unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
    assert_eq!(queue.len(), 1);
}

#[tokio::test]
async fn test_closed_queue_rejects_as_unavailable() {
    let (service, queue) = service(2);
    queue.close();

    let err = service.generate(request(1, "en")).await.unwrap_err();
    assert_eq!(err.code(), Code::Unavailable);
    assert!(queue.is_empty());
}
