//! Index request/response types and filters.

use serde::{Deserialize, Serialize};

/// Video-level collection name.
pub const VIDEO_COLLECTION: &str = "video_embeddings";

/// Scene-level collection name.
pub const SCENE_COLLECTION: &str = "scene_embeddings";

/// Vector parameters for collection creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorParams {
    pub size: usize,
    pub distance: String,
    pub on_disk: bool,
}

/// HNSW tuning for collection creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswConfig {
    pub m: u32,
    pub ef_construct: u32,
    pub full_scan_threshold: u32,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construct: 100,
            full_scan_threshold: 10_000,
        }
    }
}

/// Collection creation request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCollectionRequest {
    pub vectors: VectorParams,
    pub hnsw_config: HnswConfig,
    pub on_disk_payload: bool,
}

impl CreateCollectionRequest {
    /// The standard 1024-D cosine collection used by both collections.
    pub fn cosine_1024() -> Self {
        Self {
            vectors: VectorParams {
                size: vagent_models::EMBEDDING_DIM,
                distance: "Cosine".to_string(),
                on_disk: true,
            },
            hnsw_config: HnswConfig::default(),
            on_disk_payload: true,
        }
    }
}

/// A point to upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointStruct {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: serde_json::Value,
}

/// Batch upsert request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertRequest {
    pub points: Vec<PointStruct>,
}

/// One AND-ed clause of a payload filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    /// Exact payload match
    Match {
        key: String,
        r#match: MatchValue,
    },
    /// Numeric range over a payload field
    Range {
        key: String,
        range: RangeValue,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchValue {
    /// Field equals this value
    Value { value: serde_json::Value },
    /// Field equals any of these values
    Any { any: Vec<serde_json::Value> },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RangeValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lte: Option<f64>,
}

impl Condition {
    /// `key == value`
    pub fn match_value(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Condition::Match {
            key: key.into(),
            r#match: MatchValue::Value {
                value: value.into(),
            },
        }
    }

    /// `key` equals any of `values`
    pub fn match_any(
        key: impl Into<String>,
        values: impl IntoIterator<Item = serde_json::Value>,
    ) -> Self {
        Condition::Match {
            key: key.into(),
            r#match: MatchValue::Any {
                any: values.into_iter().collect(),
            },
        }
    }

    /// `gte <= key <= lte`
    pub fn range(key: impl Into<String>, gte: Option<f64>, lte: Option<f64>) -> Self {
        Condition::Range {
            key: key.into(),
            range: RangeValue { gte, lte },
        }
    }
}

/// AND-of-must payload filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filter {
    pub must: Vec<Condition>,
}

impl Filter {
    pub fn new(must: Vec<Condition>) -> Self {
        Self { must }
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }
}

/// Search request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub vector: Vec<f32>,
    pub limit: usize,
    pub score_threshold: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    pub with_payload: bool,
}

/// Delete-points request body: explicit ids or a payload filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeleteRequest {
    Points { points: Vec<String> },
    Filter { filter: Filter },
}

/// Store response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub result: T,
    #[serde(default)]
    pub status: serde_json::Value,
}

/// A scored search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    /// Cosine similarity in [-1, 1]
    pub score: f32,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Heuristically re-ranked score; unbounded, never replaces `score`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

/// Heuristic re-ranking criteria.
#[derive(Debug, Clone, Default)]
pub struct RerankCriteria {
    /// Tags that boost a hit when present in its payload `tags`
    pub boost_tags: Vec<String>,
    /// Scene types that boost a hit via payload `scene_types`/`scene_type`
    pub boost_scene_types: Vec<String>,
    /// Multiplier applied per tag match
    pub tag_factor: f32,
    /// Multiplier applied per scene-type match
    pub scene_factor: f32,
}

impl RerankCriteria {
    pub fn new(boost_tags: Vec<String>, boost_scene_types: Vec<String>) -> Self {
        Self {
            boost_tags,
            boost_scene_types,
            tag_factor: 1.2,
            scene_factor: 1.1,
        }
    }
}

/// Multiply heuristic factors into `rerank_score`, preserving the
/// cosine `score`, and re-sort by the reranked value.
pub fn apply_rerank(mut results: Vec<SearchResult>, criteria: &RerankCriteria) -> Vec<SearchResult> {
    let payload_strings = |payload: &serde_json::Value, key: &str| -> Vec<String> {
        payload
            .get(key)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    };

    for hit in &mut results {
        let mut factor = 1.0f32;

        let tags = payload_strings(&hit.payload, "tags");
        for tag in &criteria.boost_tags {
            if tags.iter().any(|t| t == tag) {
                factor *= criteria.tag_factor;
            }
        }

        let mut scene_types = payload_strings(&hit.payload, "scene_types");
        if let Some(single) = hit.payload.get("scene_type").and_then(|v| v.as_str()) {
            scene_types.push(single.to_string());
        }
        for st in &criteria.boost_scene_types {
            if scene_types.iter().any(|s| s == st) {
                factor *= criteria.scene_factor;
            }
        }

        hit.rerank_score = Some(hit.score * factor);
    }

    results.sort_by(|a, b| {
        let ka = a.rerank_score.unwrap_or(a.score);
        let kb = b.rerank_score.unwrap_or(b.score);
        kb.partial_cmp(&ka).unwrap_or(std::cmp::Ordering::Equal)
    });
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_serializes_to_must_clauses() {
        let filter = Filter::new(vec![
            Condition::match_value("user_id", "u1"),
            Condition::match_any("tags", vec![json!("sport"), json!("news")]),
            Condition::range("duration_sec", Some(10.0), Some(300.0)),
        ]);

        let json = serde_json::to_value(&filter).unwrap();
        assert_eq!(json["must"][0]["key"], "user_id");
        assert_eq!(json["must"][0]["match"]["value"], "u1");
        assert_eq!(json["must"][1]["match"]["any"][1], "news");
        assert_eq!(json["must"][2]["range"]["gte"], 10.0);
    }

    #[test]
    fn rerank_preserves_cosine_score() {
        let results = vec![
            SearchResult {
                id: "a".to_string(),
                score: 0.8,
                payload: json!({"tags": ["sport"]}),
                rerank_score: None,
            },
            SearchResult {
                id: "b".to_string(),
                score: 0.85,
                payload: json!({"tags": []}),
                rerank_score: None,
            },
        ];

        let criteria = RerankCriteria::new(vec!["sport".to_string()], vec![]);
        let reranked = apply_rerank(results, &criteria);

        // "a" gets boosted past "b", but its cosine score is untouched.
        assert_eq!(reranked[0].id, "a");
        assert_eq!(reranked[0].score, 0.8);
        assert!(reranked[0].rerank_score.unwrap() > 0.9);
        assert_eq!(reranked[1].rerank_score.unwrap(), 0.85);
    }

    #[test]
    fn collection_spec_matches_contract() {
        let spec = CreateCollectionRequest::cosine_1024();
        assert_eq!(spec.vectors.size, 1024);
        assert_eq!(spec.vectors.distance, "Cosine");
        assert_eq!(spec.hnsw_config.m, 16);
        assert_eq!(spec.hnsw_config.ef_construct, 100);
        assert_eq!(spec.hnsw_config.full_scan_threshold, 10_000);
        assert!(spec.on_disk_payload);
    }
}
