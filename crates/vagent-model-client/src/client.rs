//! Model service HTTP client.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use vagent_models::{ensure_embedding_dim, AudioAnalysis, ContentClassification};

use crate::error::{ModelError, ModelResult};
use crate::types::{
    ClassificationRequest, EmbeddingKind, EmbeddingRequest, EmbeddingResponse, HealthResponse,
    SynthesisKind, SynthesisRequest, SynthesisResponse, TranscriptionOptions,
    TranscriptionRequest, VisionRequest, VisionResponse,
};

/// Configuration for the model client.
#[derive(Debug, Clone)]
pub struct ModelClientConfig {
    /// Base URL of the model service
    pub base_url: String,
    /// Optional bearer token
    pub api_key: Option<String>,
    /// Per-frame vision timeout
    pub vision_timeout: Duration,
    /// Transcription timeout (long audio)
    pub transcription_timeout: Duration,
    /// Embedding timeout
    pub embedding_timeout: Duration,
    /// Timeout for classification/synthesis
    pub default_timeout: Duration,
    /// Max retries on transient failures
    pub max_retries: u32,
}

impl Default for ModelClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            api_key: None,
            vision_timeout: Duration::from_secs(60),
            transcription_timeout: Duration::from_secs(3600),
            embedding_timeout: Duration::from_secs(10),
            default_timeout: Duration::from_secs(120),
            max_retries: 2,
        }
    }
}

impl ModelClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("MODEL_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8001".to_string()),
            api_key: std::env::var("MODEL_SERVICE_API_KEY").ok(),
            vision_timeout: Duration::from_secs(
                std::env::var("MODEL_VISION_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            transcription_timeout: Duration::from_secs(
                std::env::var("MODEL_TRANSCRIPTION_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            max_retries: std::env::var("MODEL_SERVICE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            ..defaults
        }
    }
}

/// Client for the model service.
#[derive(Clone)]
pub struct ModelClient {
    http: Client,
    config: ModelClientConfig,
}

impl ModelClient {
    /// Create a new model client.
    pub fn new(config: ModelClientConfig) -> ModelResult<Self> {
        let http = Client::builder().build().map_err(ModelError::Network)?;
        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> ModelResult<Self> {
        Self::new(ModelClientConfig::from_env())
    }

    /// Check if the model service is healthy.
    pub async fn health_check(&self) -> ModelResult<bool> {
        let url = format!("{}/health", self.config.base_url);

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("Model service health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Model service health check error: {}", e);
                Ok(false)
            }
        }
    }

    /// Analyze one frame. Returns the raw model output; callers parse
    /// it with the shared vision parser.
    pub async fn vision(
        &self,
        image_b64: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> ModelResult<VisionResponse> {
        let request = VisionRequest {
            image_b64: image_b64.to_string(),
            prompt: prompt.to_string(),
            max_tokens,
        };
        self.post_json("/v1/vision", &request, self.config.vision_timeout)
            .await
    }

    /// Transcribe an audio track with diarization.
    pub async fn transcription(
        &self,
        audio_path: &str,
        options: TranscriptionOptions,
    ) -> ModelResult<AudioAnalysis> {
        let request = TranscriptionRequest {
            audio_path: audio_path.to_string(),
            options,
        };
        self.post_json("/v1/transcription", &request, self.config.transcription_timeout)
            .await
    }

    /// Classify content from aggregated descriptions and transcript.
    pub async fn classification(
        &self,
        request: &ClassificationRequest,
    ) -> ModelResult<ContentClassification> {
        self.post_json("/v1/classification", request, self.config.default_timeout)
            .await
    }

    /// Synthesize a summary (or custom analysis) from source snippets.
    pub async fn synthesis(&self, sources: Vec<String>, kind: SynthesisKind) -> ModelResult<String> {
        let request = SynthesisRequest { sources, kind };
        let response: SynthesisResponse = self
            .post_json("/v1/synthesis", &request, self.config.default_timeout)
            .await?;
        Ok(response.content)
    }

    /// Embed text. Only 1024-D vectors are accepted.
    pub async fn embedding(&self, text: &str, kind: EmbeddingKind) -> ModelResult<Vec<f32>> {
        let request = EmbeddingRequest {
            text: text.to_string(),
            kind,
        };
        let response: EmbeddingResponse = self
            .post_json("/v1/embedding", &request, self.config.embedding_timeout)
            .await?;

        ensure_embedding_dim(&response.vector)?;
        Ok(response.vector)
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> ModelResult<T> {
        let url = format!("{}{}", self.config.base_url, path);
        debug!(url = %url, "Model service request");

        let response = self
            .with_retry(|| async {
                let mut builder = self.http.post(&url).timeout(timeout).json(body);
                if let Some(key) = &self.config.api_key {
                    builder = builder.bearer_auth(key);
                }
                let response = builder.send().await.map_err(ModelError::Network)?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ModelError::Status {
                        status: status.as_u16(),
                        body,
                    });
                }
                Ok(response)
            })
            .await?;

        response
            .json::<T>()
            .await
            .map_err(|e| ModelError::schema(e.to_string()))
    }

    /// Execute with retry on transient failures.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> ModelResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = ModelResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "Model request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ModelError::schema("unknown error")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vagent_models::EMBEDDING_DIM;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ModelClient {
        ModelClient::new(ModelClientConfig {
            base_url: server.uri(),
            max_retries: 1,
            ..ModelClientConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn config_defaults() {
        let config = ModelClientConfig::default();
        assert_eq!(config.vision_timeout, Duration::from_secs(60));
        assert_eq!(config.transcription_timeout, Duration::from_secs(3600));
        assert_eq!(config.embedding_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn vision_returns_raw_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/vision"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": "{\"description\": \"a cat\"}",
                "model": "vision-1"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let response = client.vision("aGk=", "describe", 512).await.unwrap();
        assert!(response.content.contains("a cat"));
        assert_eq!(response.model, "vision-1");
    }

    #[tokio::test]
    async fn embedding_enforces_dimension() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embedding"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "vector": vec![0.1f32; 512]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.embedding("text", EmbeddingKind::Document).await.unwrap_err();
        assert!(matches!(err, ModelError::Embedding(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn embedding_accepts_correct_dimension() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embedding"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "vector": vec![0.1f32; EMBEDDING_DIM]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let vector = client.embedding("text", EmbeddingKind::Query).await.unwrap();
        assert_eq!(vector.len(), EMBEDDING_DIM);
    }

    #[tokio::test]
    async fn retries_on_5xx_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/synthesis"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/synthesis"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": "a summary"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let summary = client
            .synthesis(vec!["a".to_string()], SynthesisKind::Summary)
            .await
            .unwrap();
        assert_eq!(summary, "a summary");
    }

    #[tokio::test]
    async fn does_not_retry_4xx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/classification"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .classification(&ClassificationRequest {
                descriptions: vec![],
                transcript: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_permanent());
    }
}
