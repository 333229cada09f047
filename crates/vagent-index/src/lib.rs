//! Similarity index client.
//!
//! Maintains two cosine collections (`video_embeddings`,
//! `scene_embeddings`, 1024-D) over the vector store's REST API, with
//! filtered search, chunked batch upserts and payload-scoped deletes.

pub mod client;
pub mod error;
pub mod types;

pub use client::{IndexConfig, SimilarityIndex};
pub use error::{IndexError, IndexResult};
pub use types::{
    apply_rerank, Condition, Filter, RerankCriteria, SearchResult, SCENE_COLLECTION,
    VIDEO_COLLECTION,
};
