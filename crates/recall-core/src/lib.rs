//! # Recall Core
//!
//! Code-and-memory retrieval engine. Answers two classes of question over a
//! corpus of source code and free-form memory notes:
//!
//! - **Hybrid retrieval**: fuse dense vector similarity with BM25 keyword
//!   scoring (weighted, reciprocal-rank, or cascade fusion), with optional
//!   regex pattern predicates to filter or boost results.
//! - **Structural queries**: callers, callees, interface implementations,
//!   call chains between two functions, and file-level dependency graphs,
//!   answered from a persisted call graph.
//!
//! Qdrant is both the vector index and the persistent store for memory units
//! and call-graph nodes, reached through a bounded connection pool with
//! tiered health checks, age-based recycling, and an optional background
//! monitor. Tags and collections live in a SQLite side-store.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use recall_core::{
//!     CallGraphStore, ConnectionPool, EngineConfig, QdrantFactory,
//!     StructuralQueryService,
//! };
//!
//! let config = Arc::new(EngineConfig::default());
//! let pool = Arc::new(ConnectionPool::new(
//!     QdrantFactory::from_config(&config),
//!     config.pool.clone(),
//! )?);
//! pool.initialize().await?;
//!
//! let store = Arc::new(CallGraphStore::new(
//!     Arc::clone(&pool),
//!     config.call_graph_collection_name.clone(),
//!     config.vector_size(),
//!     config.read_only_mode,
//! ));
//! let queries = StructuralQueryService::new(store, "my-project");
//!
//! let callers = queries.find_callers("validate", None, true, 3, 50).await?;
//! println!("{} callers", callers.total_callers);
//! ```

// ============================================================================
// MODULES
// ============================================================================

pub mod config;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod graph;
pub mod memory;
pub mod query;
pub mod search;
pub mod store;
pub mod tagging;
pub mod validation;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use config::{default_tag_db_path, EmbeddingModel, EngineConfig, PoolConfig};
pub use engine::Engine;
pub use error::{RecallError, Result, StorageError, ValidationError};
pub use memory::MemoryUnit;

pub use graph::{
    extract::{extractor_for, CallExtractor, PythonCallExtractor},
    CallGraph, CallSite, CallType, FunctionNode, GraphStatistics, InterfaceImplementation,
};

pub use search::{
    Bm25, FusionMethod, HybridSearchResult, HybridSearcher, PatternMatcher, PatternMode,
    PatternPredicate,
};

pub use store::{
    CallGraphStore, ClientFactory, CollectionBootstrap, ConnectionPool, HealthCheckLevel,
    HealthCheckResult, HealthChecker, ImportReport, MemoryExport, MemoryStore, PointFilter,
    PointRecord, PoolMonitor, PoolStats, ProjectStats, QdrantFactory, QdrantTransport,
    ScoredPointRecord, VectorClient,
};

pub use query::{RetrievalService, StructuralQueryService};

pub use tagging::{AutoTagger, Collection, CollectionStore, Tag, TagFilter, TagStore};

pub use embeddings::{Embedder, EmbeddingCache};
pub use validation::{ConflictMode, MAX_CONTENT_LENGTH, MAX_QUERY_LENGTH};
