//! Vector-store layer: client seam, Qdrant transport, connection pool,
//! health checking, monitoring, collection bootstrap, and call-graph
//! persistence.

pub mod call_graph;
pub mod client;
pub mod health;
pub mod memory_store;
pub mod monitor;
pub mod pool;
pub mod qdrant;
pub mod setup;

pub use call_graph::CallGraphStore;
pub use memory_store::{ImportReport, MemoryExport, MemoryStore, ProjectStats};
pub use client::{
    ClientFactory, CollectionSpec, HnswSpec, PayloadFieldKind, PointFilter, PointRecord,
    ScoredPointRecord, VectorClient,
};
pub use health::{HealthCheckLevel, HealthCheckResult, HealthChecker, HealthStats};
pub use monitor::{AlertSeverity, MonitorConfig, MonitorStats, PoolAlert, PoolMetrics, PoolMonitor};
pub use pool::{backoff_delay, ConnectionPool, PoolStats};
pub use qdrant::{QdrantFactory, QdrantTransport};
pub use setup::{CollectionBootstrap, CALL_GRAPH_PAYLOAD_INDEXES, MEMORY_PAYLOAD_INDEXES};
