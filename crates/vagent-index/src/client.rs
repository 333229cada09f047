//! HTTP client for the vector store.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use vagent_models::{ensure_embedding_dim, SceneEmbedding, VideoEmbedding};

use crate::error::{IndexError, IndexResult};
use crate::types::{
    ApiResponse, Condition, CreateCollectionRequest, DeleteRequest, Filter, PointStruct,
    SearchRequest, SearchResult, UpsertRequest, SCENE_COLLECTION, VIDEO_COLLECTION,
};

/// Batch upserts are chunked to this size.
const UPSERT_CHUNK_SIZE: usize = 100;

/// Default minimum cosine score returned by searches.
const DEFAULT_SCORE_THRESHOLD: f32 = 0.7;

/// Index client configuration.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Base URL of the vector store
    pub base_url: String,
    /// Optional API key sent as a header
    pub api_key: Option<String>,
    /// Search timeout
    pub search_timeout: Duration,
    /// Retrieve/write timeout
    pub write_timeout: Duration,
    /// Max retries for retryable failures
    pub max_retries: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:6333".to_string(),
            api_key: None,
            search_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
            max_retries: 2,
        }
    }
}

impl IndexConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("VECTOR_STORE_URL")
                .unwrap_or_else(|_| "http://localhost:6333".to_string()),
            api_key: std::env::var("VECTOR_STORE_API_KEY").ok(),
            search_timeout: Duration::from_secs(
                std::env::var("VECTOR_STORE_SEARCH_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            write_timeout: Duration::from_secs(
                std::env::var("VECTOR_STORE_WRITE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            max_retries: std::env::var("VECTOR_STORE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
        }
    }
}

/// Two-collection similarity index client.
#[derive(Clone)]
pub struct SimilarityIndex {
    http: Client,
    config: IndexConfig,
}

impl SimilarityIndex {
    /// Create a new index client.
    pub fn new(config: IndexConfig) -> IndexResult<Self> {
        let http = Client::builder()
            .timeout(config.search_timeout.max(config.write_timeout))
            .build()
            .map_err(IndexError::Network)?;
        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> IndexResult<Self> {
        Self::new(IndexConfig::from_env())
    }

    /// Create the two collections; existing collections are left alone.
    pub async fn initialize_collections(&self) -> IndexResult<()> {
        for name in [VIDEO_COLLECTION, SCENE_COLLECTION] {
            let url = format!("{}/collections/{}", self.config.base_url, name);
            let body = CreateCollectionRequest::cosine_1024();

            let response = self
                .request(reqwest::Method::PUT, &url, Some(&body), self.config.write_timeout)
                .await?;

            let status = response.status();
            if status.is_success() {
                info!(collection = name, "Created vector collection");
            } else if status == reqwest::StatusCode::CONFLICT {
                debug!(collection = name, "Vector collection already exists");
            } else {
                let body = response.text().await.unwrap_or_default();
                // Some stores report an existing collection as a 400.
                if body.contains("already exists") {
                    debug!(collection = name, "Vector collection already exists");
                } else {
                    return Err(IndexError::request_failed(format!(
                        "collection create returned status {}: {}",
                        status, body
                    )));
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Upserts
    // ========================================================================

    /// Upsert a video embedding.
    pub async fn upsert_video(&self, embedding: &VideoEmbedding) -> IndexResult<()> {
        ensure_embedding_dim(&embedding.vector)?;
        let point = PointStruct {
            id: embedding.id.clone(),
            vector: embedding.vector.clone(),
            payload: serde_json::to_value(&embedding.payload)?,
        };
        self.upsert_points(VIDEO_COLLECTION, vec![point]).await
    }

    /// Upsert a single scene embedding.
    pub async fn upsert_scene(&self, embedding: &SceneEmbedding) -> IndexResult<()> {
        self.upsert_scenes_batch(std::slice::from_ref(embedding)).await
    }

    /// Upsert scene embeddings, chunked for large lists.
    pub async fn upsert_scenes_batch(&self, embeddings: &[SceneEmbedding]) -> IndexResult<()> {
        for embedding in embeddings {
            ensure_embedding_dim(&embedding.vector)?;
        }

        for chunk in embeddings.chunks(UPSERT_CHUNK_SIZE) {
            let points = chunk
                .iter()
                .map(|e| {
                    Ok(PointStruct {
                        id: e.id.clone(),
                        vector: e.vector.clone(),
                        payload: serde_json::to_value(&e.payload)?,
                    })
                })
                .collect::<IndexResult<Vec<_>>>()?;
            self.upsert_points(SCENE_COLLECTION, points).await?;
        }
        Ok(())
    }

    async fn upsert_points(&self, collection: &str, points: Vec<PointStruct>) -> IndexResult<()> {
        let url = format!(
            "{}/collections/{}/points?wait=true",
            self.config.base_url, collection
        );
        let count = points.len();
        let body = UpsertRequest { points };

        self.with_retry(|| async {
            let response = self
                .request(reqwest::Method::PUT, &url, Some(&body), self.config.write_timeout)
                .await?;
            self.check_status(response).await?;
            Ok(())
        })
        .await?;

        debug!(collection = collection, count = count, "Upserted points");
        Ok(())
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Cosine search over the video collection.
    pub async fn search_videos(
        &self,
        query: &[f32],
        limit: usize,
        filter: Option<Filter>,
    ) -> IndexResult<Vec<SearchResult>> {
        self.search(VIDEO_COLLECTION, query, limit, filter).await
    }

    /// Cosine search over the scene collection.
    pub async fn search_scenes(
        &self,
        query: &[f32],
        limit: usize,
        filter: Option<Filter>,
    ) -> IndexResult<Vec<SearchResult>> {
        self.search(SCENE_COLLECTION, query, limit, filter).await
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        filter: Option<Filter>,
    ) -> IndexResult<Vec<SearchResult>> {
        ensure_embedding_dim(query)?;

        let url = format!(
            "{}/collections/{}/points/search",
            self.config.base_url, collection
        );
        let body = SearchRequest {
            vector: query.to_vec(),
            limit,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            filter: filter.filter(|f| !f.is_empty()),
            with_payload: true,
        };

        let mut results: Vec<SearchResult> = self
            .with_retry(|| async {
                let response = self
                    .request(reqwest::Method::POST, &url, Some(&body), self.config.search_timeout)
                    .await?;
                let response = self.check_status(response).await?;
                let parsed: ApiResponse<Vec<SearchResult>> = response.json().await?;
                Ok(parsed.result)
            })
            .await?;

        // The store returns hits sorted descending already; enforce it
        // anyway so callers can rely on the contract.
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(results)
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Remove a video point and every scene point belonging to it.
    pub async fn delete_video(&self, video_id: &str) -> IndexResult<()> {
        let url = format!(
            "{}/collections/{}/points/delete?wait=true",
            self.config.base_url, VIDEO_COLLECTION
        );
        let body = DeleteRequest::Points {
            points: vec![video_id.to_string()],
        };
        self.with_retry(|| async {
            let response = self
                .request(reqwest::Method::POST, &url, Some(&body), self.config.write_timeout)
                .await?;
            self.check_status(response).await?;
            Ok(())
        })
        .await?;

        let url = format!(
            "{}/collections/{}/points/delete?wait=true",
            self.config.base_url, SCENE_COLLECTION
        );
        let body = DeleteRequest::Filter {
            filter: Filter::new(vec![Condition::match_value("video_id", video_id)]),
        };
        self.with_retry(|| async {
            let response = self
                .request(reqwest::Method::POST, &url, Some(&body), self.config.write_timeout)
                .await?;
            self.check_status(response).await?;
            Ok(())
        })
        .await?;

        info!(video_id = %video_id, "Deleted video and scene embeddings");
        Ok(())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn request<B: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&B>,
        timeout: Duration,
    ) -> IndexResult<reqwest::Response> {
        let mut builder = self.http.request(method, url).timeout(timeout);
        if let Some(key) = &self.config.api_key {
            builder = builder.header("api-key", key);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder.send().await.map_err(IndexError::Network)
    }

    async fn check_status(&self, response: reqwest::Response) -> IndexResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(IndexError::request_failed(format!(
            "index returned status {}: {}",
            status, body
        )))
    }

    /// Execute with retry on retryable failures.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> IndexResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = IndexResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "Index request failed (attempt {}), retrying in {:?}: {}",
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

        Err(last_error.unwrap_or_else(|| IndexError::request_failed("unknown error")))
    }

    /// Retrieve a parsed value from an arbitrary store path. Used by
    /// health checks.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> IndexResult<T> {
        let url = format!("{}{}", self.config.base_url, path);
        let response = self
            .request::<()>(reqwest::Method::GET, &url, None, self.config.write_timeout)
            .await?;
        let response = self.check_status(response).await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vagent_models::{ScenePayload, VideoPayload, EMBEDDING_DIM};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn video_embedding(dim: usize) -> VideoEmbedding {
        VideoEmbedding::new("v1", vec![0.5; dim], VideoPayload::default())
    }

    #[test]
    fn config_defaults() {
        let config = IndexConfig::default();
        assert_eq!(config.base_url, "http://localhost:6333");
        assert_eq!(config.search_timeout, Duration::from_secs(10));
        assert_eq!(config.write_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimension() {
        let index = SimilarityIndex::new(IndexConfig::default()).unwrap();
        let bad = video_embedding(512);
        let err = index.upsert_video(&bad).await.unwrap_err();
        assert!(matches!(err, IndexError::Embedding(_)));
    }

    #[tokio::test]
    async fn search_rejects_wrong_dimension() {
        let index = SimilarityIndex::new(IndexConfig::default()).unwrap();
        let err = index.search_videos(&[0.1; 10], 5, None).await.unwrap_err();
        assert!(matches!(err, IndexError::Embedding(_)));
    }

    #[tokio::test]
    async fn search_parses_and_sorts_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/collections/{}/points/search", VIDEO_COLLECTION)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": [
                    {"id": "b", "score": 0.72, "payload": {}},
                    {"id": "a", "score": 0.91, "payload": {}}
                ],
                "status": "ok"
            })))
            .mount(&server)
            .await;

        let index = SimilarityIndex::new(IndexConfig {
            base_url: server.uri(),
            ..IndexConfig::default()
        })
        .unwrap();

        let results = index
            .search_videos(&vec![0.1; EMBEDDING_DIM], 5, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn scene_batch_upsert_chunks() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(format!("/collections/{}/points", SCENE_COLLECTION)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": {"status": "completed"},
                "status": "ok"
            })))
            .expect(3) // 250 points in chunks of 100, 100, 50
            .mount(&server)
            .await;

        let index = SimilarityIndex::new(IndexConfig {
            base_url: server.uri(),
            ..IndexConfig::default()
        })
        .unwrap();

        let scenes: Vec<SceneEmbedding> = (0..250)
            .map(|i| {
                SceneEmbedding::new("v1", i, vec![0.5; EMBEDDING_DIM], ScenePayload::default())
            })
            .collect();

        index.upsert_scenes_batch(&scenes).await.unwrap();
    }
}
