//! End-to-end pipeline tests against mocked external services.
//!
//! The model service and the vector store are wiremock servers; the
//! decoder and store are the in-crate fakes. Bus/queue publishes go to
//! an unreachable fabric and degrade to warnings, which is the
//! documented best-effort behavior.

use std::sync::Arc;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vagent_bus::{BusConfig, EventBus};
use vagent_index::{IndexConfig, SimilarityIndex};
use vagent_model_client::{ModelClient, ModelClientConfig};
use vagent_models::{
    EnqueueOptions, Job, JobOrigin, JobRequest, ProcessingOptions, EMBEDDING_DIM,
};
use vagent_queue::{JobQueue, QueueConfig};
use vagent_worker::pipeline::{CancelToken, PipelineContext, PipelineOrchestrator};
use vagent_worker::decoder::FakeDecoder;
use vagent_worker::{InMemoryJobStore, WorkerConfig, WorkerError};

/// Fabric URL nothing listens on; bus/progress publishes degrade to
/// warnings.
const DEAD_REDIS: &str = "redis://127.0.0.1:1";

async fn mock_model_service() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/vision"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": "{\"description\": \"a speaker on stage\", \"features\": [\"indoor\"], \
                        \"objects\": [{\"label\": \"person\", \"confidence\": 0.9}]}",
            "model": "vision-1"
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/embedding"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "vector": vec![0.25f32; EMBEDDING_DIM]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/transcription"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "transcription": "hello and welcome",
            "segments": [
                {"speaker": "speaker_0", "start_sec": 0.0, "end_sec": 2.5,
                 "text": "hello and welcome", "confidence": 0.93}
            ],
            "language": "en",
            "topics": ["introduction"],
            "keywords": ["welcome"]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/classification"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "primary_category": "talk",
            "categories": [{"label": "talk", "score": 0.88}],
            "tags": ["conference"]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/synthesis"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": "A speaker welcomes the audience."
        })))
        .mount(&server)
        .await;

    server
}

async fn mock_index(expect_upserts: bool) -> MockServer {
    let server = MockServer::start().await;
    let ok = ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "result": {"status": "completed"},
        "status": "ok"
    }));

    let video_mock = Mock::given(method("PUT"))
        .and(path("/collections/video_embeddings/points"))
        .respond_with(ok.clone());
    let scene_mock = Mock::given(method("PUT"))
        .and(path("/collections/scene_embeddings/points"))
        .respond_with(ok);

    if expect_upserts {
        video_mock.expect(1).mount(&server).await;
        scene_mock.expect(1).mount(&server).await;
    } else {
        video_mock.expect(0).mount(&server).await;
        scene_mock.expect(0).mount(&server).await;
    }

    server
}

async fn context(
    model_url: &str,
    index_url: &str,
    frame_count: u64,
) -> (Arc<PipelineContext>, Arc<InMemoryJobStore>) {
    let bus = EventBus::new(BusConfig {
        redis_url: DEAD_REDIS.to_string(),
    })
    .unwrap();
    let queue = JobQueue::new(
        QueueConfig {
            redis_url: DEAD_REDIS.to_string(),
            ..QueueConfig::default()
        },
        bus.clone(),
    )
    .unwrap();
    let index = SimilarityIndex::new(IndexConfig {
        base_url: index_url.to_string(),
        max_retries: 0,
        ..IndexConfig::default()
    })
    .unwrap();
    let model = ModelClient::new(ModelClientConfig {
        base_url: model_url.to_string(),
        max_retries: 0,
        ..ModelClientConfig::default()
    })
    .unwrap();
    let store = Arc::new(InMemoryJobStore::new());

    let cacher = vagent_queue::Cacher::new(DEAD_REDIS, "vagent-test").unwrap();

    let ctx = Arc::new(PipelineContext {
        config: WorkerConfig::default(),
        queue,
        bus,
        index,
        model,
        decoder: Arc::new(FakeDecoder::with_frames(frame_count)),
        store: Arc::clone(&store) as Arc<dyn vagent_worker::JobStore>,
        cacher,
        http: reqwest::Client::new(),
    });

    (ctx, store)
}

async fn upload_job() -> Job {
    let source = vagent_worker::prepare::stage_upload_buffer(b"fake video", "in.mp4")
        .await
        .unwrap();
    Job::from_request(
        JobRequest {
            origin: JobOrigin::Upload,
            reference: source.to_string_lossy().to_string(),
            user_id: "u1".to_string(),
            session_id: None,
            options: ProcessingOptions::default(),
            priority: None,
            delay_secs: None,
        },
        &EnqueueOptions::default(),
    )
    .start()
}

#[tokio::test]
async fn happy_path_produces_full_result() {
    let model_server = mock_model_service().await;
    let index_server = mock_index(true).await;
    let (ctx, store) = context(&model_server.uri(), &index_server.uri(), 3).await;

    let job = upload_job().await;
    let orchestrator = PipelineOrchestrator::new(ctx);

    let result = orchestrator
        .process(&job, &CancelToken::new())
        .await
        .expect("pipeline should complete");

    // Frames analyzed, embedded, frame-ordered
    assert_eq!(result.frames.len(), 3);
    for (i, frame) in result.frames.iter().enumerate() {
        assert_eq!(frame.frame_number, i as u64);
        assert_eq!(frame.description, "a speaker on stage");
        assert_eq!(frame.embedding.as_ref().unwrap().len(), EMBEDDING_DIM);
        assert_eq!(frame.objects.len(), 1);
    }

    // Audio, scenes, classification, summary all populated
    let audio = result.audio.expect("audio analysis present");
    assert_eq!(audio.transcription, "hello and welcome");
    assert_eq!(audio.segments.len(), 1);

    assert_eq!(result.scenes.len(), 1);
    assert_eq!(result.scenes[0].start_frame, 0);
    assert_eq!(result.scenes[0].end_frame, 3);
    assert_eq!(
        result.scenes[0].embedding.as_ref().unwrap().len(),
        EMBEDDING_DIM
    );

    assert_eq!(
        result.classification.as_ref().unwrap().primary_category,
        "talk"
    );
    assert_eq!(
        result.summary.as_deref(),
        Some("A speaker welcomes the audience.")
    );
    assert!(result.metadata.width == 1280);
    assert!(!result.model_usage.is_empty());

    // Persisted to the store
    assert!(store.result(&job.id).is_some());
    assert_eq!(store.frame_count(&job.id), 3);
}

#[tokio::test]
async fn cancellation_stops_before_work_and_skips_embeddings() {
    let model_server = mock_model_service().await;
    let index_server = mock_index(false).await;
    let (ctx, store) = context(&model_server.uri(), &index_server.uri(), 3).await;

    let job = upload_job().await;
    let orchestrator = PipelineOrchestrator::new(ctx);

    let cancel = CancelToken::new();
    cancel.cancel();

    let err = orchestrator.process(&job, &cancel).await.unwrap_err();
    assert!(matches!(err, WorkerError::Cancelled));

    orchestrator.discard_artifacts(&job).await;
    assert!(store.result(&job.id).is_none());
}

#[tokio::test]
async fn audio_failure_is_non_fatal() {
    let model_server = MockServer::start().await;

    // Vision/embedding succeed, transcription fails permanently.
    Mock::given(method("POST"))
        .and(path("/v1/vision"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": "plain prose description",
            "model": "vision-1"
        })))
        .mount(&model_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/embedding"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "vector": vec![0.5f32; EMBEDDING_DIM]
        })))
        .mount(&model_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/transcription"))
        .respond_with(ResponseTemplate::new(400).set_body_string("unsupported audio"))
        .mount(&model_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/classification"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "primary_category": "other", "categories": [], "tags": []
        })))
        .mount(&model_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/synthesis"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": "summary"
        })))
        .mount(&model_server)
        .await;

    let index_server = mock_index(true).await;
    let (ctx, _store) = context(&model_server.uri(), &index_server.uri(), 2).await;

    let job = upload_job().await;
    let orchestrator = PipelineOrchestrator::new(ctx);
    let result = orchestrator
        .process(&job, &CancelToken::new())
        .await
        .expect("audio failure must not fail the job");

    assert!(result.audio.is_none());
    assert_eq!(result.frames.len(), 2);
    // The schema-violating vision response fell back to raw prose.
    assert_eq!(result.frames[0].description, "plain prose description");
}

#[tokio::test]
async fn vision_failure_is_terminal_for_the_job() {
    let model_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/vision"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&model_server)
        .await;

    let index_server = mock_index(false).await;
    let (ctx, _store) = context(&model_server.uri(), &index_server.uri(), 2).await;

    let job = upload_job().await;
    let orchestrator = PipelineOrchestrator::new(ctx);
    let err = orchestrator
        .process(&job, &CancelToken::new())
        .await
        .unwrap_err();

    // 5xx classifies as transient; the queue retries it.
    assert!(matches!(err, WorkerError::ExternalTransient(_)));
    assert!(err.is_retryable());
}
