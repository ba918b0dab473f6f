//! Error taxonomy for the retrieval engine.
//!
//! Validation and security failures surface to the caller verbatim and are
//! never retried. Storage failures carry an actionable `solution()` hint so
//! end users can recover without reading the source.

use std::time::Duration;

// ============================================================================
// VALIDATION
// ============================================================================

/// Malformed input rejected before any state is touched.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Pattern preset name is not in the closed preset table
    #[error("Unknown pattern preset: {name}. Available presets: {available}")]
    UnknownPreset { name: String, available: String },
    /// Regex failed to compile
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    /// Tag name is empty after normalization
    #[error("Tag name cannot be empty")]
    EmptyTagName,
    /// Tag name contains characters outside the allowed set
    #[error("Invalid tag name '{0}': only letters, numbers, hyphens, and underscores are allowed")]
    InvalidTagName(String),
    /// Tag hierarchy is bounded to four levels
    #[error("Tag hierarchy cannot exceed 4 levels")]
    HierarchyTooDeep,
    /// Referenced parent tag does not exist
    #[error("Parent tag not found: {0}")]
    ParentTagNotFound(String),
    /// Referenced tag does not exist
    #[error("Tag not found: {0}")]
    TagNotFound(String),
    /// Non-cascading delete on a tag with children
    #[error("Tag has {count} descendants. Use cascade to delete all.")]
    TagHasDescendants { count: usize },
    /// Referenced collection does not exist
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// Collection name is empty after trimming
    #[error("Collection name cannot be empty")]
    EmptyCollectionName,
    #[error("Memory content cannot be empty")]
    EmptyContent,
    #[error("Memory content exceeds {max} characters (got {len})")]
    ContentTooLong { len: usize, max: usize },
    #[error("Query cannot be empty")]
    EmptyQuery,
    #[error("Query exceeds {max} characters (got {len})")]
    QueryTooLong { len: usize, max: usize },
    /// Import conflict mode outside {skip, overwrite, merge}
    #[error("Invalid conflict mode '{0}': expected skip, overwrite, or merge")]
    InvalidConflictMode(String),
    /// `index_documents` called with mismatched parallel sequences
    #[error("Documents and memory units must have same length")]
    CorpusLengthMismatch,
}

// ============================================================================
// STORAGE
// ============================================================================

/// Failures from the vector store, the connection pool, or the side-store.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Cannot reach the vector store at all
    #[error("Cannot connect to Qdrant at {url}: {reason}")]
    Connection { url: String, reason: String },
    /// An expected collection is missing
    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),
    /// An expected record is missing
    #[error("Memory with ID '{0}' not found")]
    MemoryNotFound(String),
    /// All permitted connections are lent out and the wait timed out
    #[error(
        "Connection pool exhausted: {active} active connections at max_size {max_size}, \
         timeout reached after {timeout:?} waiting for available connection"
    )]
    PoolExhausted {
        active: usize,
        max_size: usize,
        timeout: Duration,
    },
    /// Health check failed even after replacing the connection
    #[error("Connection health check failed on attempt {attempt}: {reason}")]
    HealthCheckFailed { reason: String, attempt: u32 },
    /// Client construction failed
    #[error("Failed to create connection to Qdrant at {url}: {reason}")]
    ConnectionCreationFailed { url: String, reason: String },
    /// Duplicate tag `full_path`
    #[error("Tag already exists: {0}")]
    TagExists(String),
    /// Duplicate collection name
    #[error("Collection already exists: {0}")]
    CollectionExists(String),
    /// Side-store failure
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Anything else the backend reported
    #[error("Storage operation failed: {0}")]
    Backend(String),
}

impl StorageError {
    /// Short, user-facing recovery hint.
    pub fn solution(&self) -> &'static str {
        match self {
            StorageError::Connection { .. } => {
                "Steps to fix:\n\
                 1. Verify Qdrant is running: docker ps | grep qdrant\n\
                 2. Start Qdrant if needed: docker-compose up -d\n\
                 3. Check Qdrant health: curl http://localhost:6333/healthz\n\
                 4. Verify qdrant_url in your configuration\n\
                 5. Check Docker logs: docker logs qdrant"
            }
            StorageError::CollectionNotFound(_) => {
                "Run collection bootstrap to create the expected collections, \
                 or check qdrant_collection_name in your configuration."
            }
            StorageError::MemoryNotFound(_) => {
                "The record may have been deleted or never indexed. \
                 Re-index the project and retry."
            }
            StorageError::PoolExhausted { .. } => {
                "Options to resolve:\n\
                 1. Increase max_size in the pool configuration\n\
                 2. Increase the acquire timeout\n\
                 3. Reduce concurrent operations: batch requests or add backpressure\n\
                 4. Check Qdrant health: curl http://localhost:6333/healthz"
            }
            StorageError::HealthCheckFailed { .. } => {
                "Steps to diagnose:\n\
                 1. Check Qdrant is running: curl http://localhost:6333/healthz\n\
                 2. Verify network connectivity to the store\n\
                 3. Check logs: docker logs qdrant (if using Docker)\n\
                 4. Reset the connection pool\n\
                 5. Restart Qdrant: docker-compose restart qdrant"
            }
            StorageError::ConnectionCreationFailed { .. } => {
                "Steps to fix:\n\
                 1. Verify Qdrant is running: docker ps | grep qdrant\n\
                 2. Start Qdrant if needed: docker-compose up -d\n\
                 3. Verify the configured URL and API key\n\
                 4. Check Docker logs: docker logs qdrant"
            }
            StorageError::TagExists(_) => "Use the existing tag, or merge_tags to combine duplicates.",
            StorageError::CollectionExists(_) => {
                "Use the existing collection, or pick a different name."
            }
            StorageError::Sqlite(_) => {
                "Check that the side-store file is writable and not corrupted."
            }
            StorageError::Backend(_) => "Inspect the store logs for details and retry.",
        }
    }

    /// Documentation link for the failure, when one exists.
    pub fn docs_url(&self) -> Option<&'static str> {
        match self {
            StorageError::Connection { .. }
            | StorageError::ConnectionCreationFailed { .. }
            | StorageError::HealthCheckFailed { .. } => {
                Some("https://qdrant.tech/documentation/guides/installation/")
            }
            StorageError::PoolExhausted { .. } => {
                Some("https://qdrant.tech/documentation/guides/administration/")
            }
            _ => None,
        }
    }
}

// ============================================================================
// CRATE-LEVEL SUM TYPE
// ============================================================================

/// Every failure the engine can surface to a caller.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum RecallError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Content matched an injection signature
    #[error("Security violation: {0}")]
    Security(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Transport succeeded but the query failed semantically
    #[error("Retrieval failed: {0}")]
    Retrieval(String),
    /// Upstream embedding service failed
    #[error("Embedding generation failed: {0}")]
    Embedding(String),
    /// Write attempted while configured read-only
    #[error("Cannot perform {operation} operation: engine is in read-only mode")]
    ReadOnly { operation: String },
    #[error("Parsing failed: {0}")]
    Parsing(String),
    #[error("Indexing failed: {0}")]
    Indexing(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RecallError>;
