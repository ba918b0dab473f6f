//! Engine configuration.
//!
//! One immutable [`EngineConfig`] value is built up front and handed to each
//! component at construction. There are no process-wide globals.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::RecallError;

/// Embedding models the engine recognizes. Only the vector width matters to
/// the core; model loading and inference live behind the [`crate::embeddings::Embedder`] seam.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmbeddingModel {
    #[default]
    #[serde(rename = "all-MiniLM-L6-v2")]
    AllMiniLmL6V2,
    #[serde(rename = "all-MiniLM-L12-v2")]
    AllMiniLmL12V2,
    #[serde(rename = "all-mpnet-base-v2")]
    AllMpnetBaseV2,
}

impl EmbeddingModel {
    /// Vector width the store collections must be created with.
    pub fn dimensions(&self) -> usize {
        match self {
            EmbeddingModel::AllMiniLmL6V2 | EmbeddingModel::AllMiniLmL12V2 => 384,
            EmbeddingModel::AllMpnetBaseV2 => 768,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingModel::AllMiniLmL6V2 => "all-MiniLM-L6-v2",
            EmbeddingModel::AllMiniLmL12V2 => "all-MiniLM-L12-v2",
            EmbeddingModel::AllMpnetBaseV2 => "all-mpnet-base-v2",
        }
    }

    /// Parse a configured model name. Unknown names fall back to the widest
    /// supported width so existing collections stay readable.
    pub fn parse_name(name: &str) -> Self {
        match name {
            "all-MiniLM-L6-v2" => EmbeddingModel::AllMiniLmL6V2,
            "all-MiniLM-L12-v2" => EmbeddingModel::AllMiniLmL12V2,
            _ => EmbeddingModel::AllMpnetBaseV2,
        }
    }
}

impl std::fmt::Display for EmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Connection pool sizing and behavior.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connections created eagerly at initialization
    pub min_size: usize,
    /// Hard cap on live connections
    pub max_size: usize,
    /// Max wait when acquiring a connection
    pub timeout: Duration,
    /// Connections older than this are closed and replaced
    pub recycle: Duration,
    /// Run a FAST health check on every acquire
    pub enable_health_checks: bool,
    /// Run the background metrics monitor
    pub enable_monitoring: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 5,
            timeout: Duration::from_secs(10),
            recycle: Duration::from_secs(3600),
            enable_health_checks: true,
            enable_monitoring: false,
        }
    }
}

impl PoolConfig {
    /// Reject impossible sizings before any connection is created.
    pub fn validate(&self) -> Result<(), RecallError> {
        if self.max_size < 1 {
            return Err(RecallError::Config(format!(
                "max_size must be >= 1, got {}",
                self.max_size
            )));
        }
        if self.min_size > self.max_size {
            return Err(RecallError::Config(format!(
                "min_size ({}) cannot exceed max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.timeout.is_zero() {
            return Err(RecallError::Config("timeout must be > 0".into()));
        }
        if self.recycle.is_zero() {
            return Err(RecallError::Config("recycle must be > 0".into()));
        }
        Ok(())
    }
}

/// Immutable engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Qdrant endpoint (gRPC)
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    /// Memory-unit collection name
    pub qdrant_collection_name: String,
    /// Call-graph collection name
    pub call_graph_collection_name: String,
    pub embedding_model: EmbeddingModel,
    /// Recognized for config compatibility; the Rust client is natively gRPC
    pub qdrant_prefer_grpc: bool,
    pub pool: PoolConfig,
    /// Reject all writes when set
    pub read_only_mode: bool,
    pub retrieval_gate_enabled: bool,
    pub auto_index_enabled: bool,
    pub auto_index_on_startup: bool,
    /// SQLite side-store for tags and collections
    pub tag_db_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            qdrant_url: "http://localhost:6334".to_string(),
            qdrant_api_key: None,
            qdrant_collection_name: "memories".to_string(),
            call_graph_collection_name: "code_call_graph".to_string(),
            embedding_model: EmbeddingModel::default(),
            qdrant_prefer_grpc: true,
            pool: PoolConfig::default(),
            read_only_mode: false,
            retrieval_gate_enabled: false,
            auto_index_enabled: true,
            auto_index_on_startup: false,
            tag_db_path: default_tag_db_path(),
        }
    }
}

impl EngineConfig {
    /// Vector width for both store collections.
    pub fn vector_size(&self) -> usize {
        self.embedding_model.dimensions()
    }
}

/// Platform data directory fallback for the side-store.
pub fn default_tag_db_path() -> PathBuf {
    ProjectDirs::from("com", "recall", "core")
        .map(|dirs| dirs.data_dir().join("recall_tags.db"))
        .unwrap_or_else(|| PathBuf::from("recall_tags.db"))
}
