//! Engine facade wiring the components together.
//!
//! Lifecycle is `initialize -> serve -> close`: initialization builds the
//! connection pool, bootstraps both store collections, and opens the tag
//! side-store; closing tears down the pool and any monitors.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::embeddings::Embedder;
use crate::error::{RecallError, StorageError};
use crate::query::retrieve::RetrievalService;
use crate::query::structural::StructuralQueryService;
use crate::store::call_graph::CallGraphStore;
use crate::store::client::ClientFactory;
use crate::store::memory_store::MemoryStore;
use crate::store::pool::ConnectionPool;
use crate::store::setup::CollectionBootstrap;
use crate::tagging::collections::CollectionStore;
use crate::tagging::tags::TagStore;

/// One initialized retrieval engine.
pub struct Engine<F: ClientFactory> {
    config: Arc<EngineConfig>,
    pool: Arc<ConnectionPool<F>>,
    call_graph_store: Arc<CallGraphStore<F>>,
    memory_store: Arc<MemoryStore<F>>,
    structural: StructuralQueryService<F>,
    retrieval: RetrievalService<F>,
    tags: TagStore,
    collections: CollectionStore,
}

impl<F: ClientFactory> Engine<F> {
    /// Build and initialize every component. The pool comes up first; the
    /// collection bootstrap then runs over one pooled client.
    pub async fn initialize(
        config: Arc<EngineConfig>,
        factory: F,
        embedder: Arc<dyn Embedder>,
        project_name: impl Into<String>,
    ) -> Result<Self, RecallError> {
        let pool = Arc::new(ConnectionPool::new(factory, config.pool.clone())?);
        pool.initialize().await?;

        let bootstrap = CollectionBootstrap::from_config(&config);
        {
            let client = pool.acquire().await?;
            let result = bootstrap.ensure_collections(client.as_ref()).await;
            pool.release(&client);
            result?;
        }

        if let Some(parent) = config.tag_db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::Backend(format!("side-store directory: {e}")))?;
        }
        let tags = TagStore::open(&config.tag_db_path)?;
        let collections = CollectionStore::open(&config.tag_db_path)?;

        let call_graph_store = Arc::new(CallGraphStore::new(
            Arc::clone(&pool),
            config.call_graph_collection_name.clone(),
            config.vector_size(),
            config.read_only_mode,
        ));
        let memory_store = Arc::new(MemoryStore::new(
            Arc::clone(&pool),
            config.qdrant_collection_name.clone(),
            config.read_only_mode,
        ));
        let structural =
            StructuralQueryService::new(Arc::clone(&call_graph_store), project_name.into());
        let retrieval = RetrievalService::new(Arc::clone(&config), Arc::clone(&pool), embedder);

        tracing::info!("engine initialized");
        Ok(Self {
            config,
            pool,
            call_graph_store,
            memory_store,
            structural,
            retrieval,
            tags,
            collections,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<F>> {
        &self.pool
    }

    pub fn call_graph_store(&self) -> &Arc<CallGraphStore<F>> {
        &self.call_graph_store
    }

    pub fn memory_store(&self) -> &Arc<MemoryStore<F>> {
        &self.memory_store
    }

    /// Structural operations: callers, callees, implementations, chains,
    /// file dependencies.
    pub fn structural(&self) -> &StructuralQueryService<F> {
        &self.structural
    }

    /// Hybrid retrieval over memory units.
    pub fn retrieval(&self) -> &RetrievalService<F> {
        &self.retrieval
    }

    pub fn tags(&self) -> &TagStore {
        &self.tags
    }

    pub fn collections(&self) -> &CollectionStore {
        &self.collections
    }

    /// Tear down the pool and its monitors. Idempotent.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("engine closed");
    }
}
