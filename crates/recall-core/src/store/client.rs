//! Vector store client seam.
//!
//! Everything above this boundary works with typed records and JSON payloads;
//! the store's native point and filter types never leak into the graph,
//! search, or query layers. The pool creates clients through a factory so
//! tests can substitute in-memory implementations.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageError;

/// One stored point: id, dense vector, JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Value,
}

/// A search hit with its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPointRecord {
    pub id: String,
    pub score: f32,
    pub payload: Value,
}

/// Conjunction of keyword equality conditions over payload fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointFilter {
    pub must: Vec<(String, String)>,
}

impl PointFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.must.push((field.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }

    /// Evaluate against a JSON payload. A keyword condition matches a string
    /// field exactly, or any element of a string array.
    pub fn matches(&self, payload: &Value) -> bool {
        self.must.iter().all(|(field, expected)| {
            match payload.get(field) {
                Some(Value::String(actual)) => actual == expected,
                Some(Value::Array(items)) => items
                    .iter()
                    .any(|item| item.as_str() == Some(expected.as_str())),
                _ => false,
            }
        })
    }
}

/// Payload index field types the engine creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFieldKind {
    Keyword,
    Float,
}

/// HNSW parameters for collection creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HnswSpec {
    pub m: u64,
    pub ef_construct: u64,
    pub full_scan_threshold: u64,
}

/// Everything needed to create one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSpec {
    pub name: String,
    pub vector_size: usize,
    pub hnsw: Option<HnswSpec>,
    pub indexing_threshold: Option<u64>,
    /// int8 scalar quantization (memory collection only)
    pub int8_quantization: bool,
}

/// Operations the engine needs from a vector store.
#[async_trait]
pub trait VectorClient: Send + Sync + 'static {
    async fn list_collections(&self) -> Result<Vec<String>, StorageError>;

    async fn collection_exists(&self, name: &str) -> Result<bool, StorageError>;

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<(), StorageError>;

    async fn delete_collection(&self, name: &str) -> Result<(), StorageError>;

    async fn create_payload_index(
        &self,
        collection: &str,
        field: &str,
        kind: PayloadFieldKind,
    ) -> Result<(), StorageError>;

    /// Batched create-or-replace by point id.
    async fn upsert_points(
        &self,
        collection: &str,
        points: Vec<PointRecord>,
    ) -> Result<(), StorageError>;

    /// Filtered paginated scroll. Returns the batch and the next offset, if
    /// more points remain.
    async fn scroll(
        &self,
        collection: &str,
        filter: &PointFilter,
        limit: u32,
        offset: Option<String>,
    ) -> Result<(Vec<PointRecord>, Option<String>), StorageError>;

    /// Nearest-neighbor search with an optional payload filter.
    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        filter: Option<&PointFilter>,
        limit: u64,
    ) -> Result<Vec<ScoredPointRecord>, StorageError>;

    async fn count(&self, collection: &str, filter: &PointFilter) -> Result<u64, StorageError>;

    /// Delete matching points, returning how many were removed.
    async fn delete_by_filter(
        &self,
        collection: &str,
        filter: &PointFilter,
    ) -> Result<u64, StorageError>;

    /// Release underlying resources. Must be safe to call more than once.
    fn close(&self);
}

/// Creates connected clients for the pool.
#[async_trait]
pub trait ClientFactory: Send + Sync + 'static {
    type Client: VectorClient;

    async fn connect(&self) -> Result<Self::Client, StorageError>;

    /// Endpoint this factory connects to, for error reporting.
    fn url(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_matches_strings_and_arrays() {
        let payload = json!({
            "project_name": "recall",
            "tags": ["python", "async"],
            "importance": 0.8,
        });

        assert!(PointFilter::new().matches(&payload));
        assert!(PointFilter::new()
            .must("project_name", "recall")
            .matches(&payload));
        assert!(PointFilter::new().must("tags", "async").matches(&payload));
        assert!(!PointFilter::new().must("tags", "java").matches(&payload));
        assert!(!PointFilter::new()
            .must("project_name", "other")
            .matches(&payload));
        // Non-string fields never match keyword conditions.
        assert!(!PointFilter::new().must("importance", "0.8").matches(&payload));
        // Conjunction semantics.
        assert!(!PointFilter::new()
            .must("project_name", "recall")
            .must("tags", "java")
            .matches(&payload));
    }
}
