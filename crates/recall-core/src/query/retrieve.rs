//! Hybrid retrieval over memory units.
//!
//! Flow: validate query -> embed (LRU-cached) -> vector search in the memory
//! collection -> lazily index the project's corpus for BM25 -> fuse -> apply
//! registered pattern predicates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;

use crate::config::EngineConfig;
use crate::embeddings::{Embedder, EmbeddingCache};
use crate::error::RecallError;
use crate::memory::MemoryUnit;
use crate::search::hybrid::{FusionMethod, HybridSearchResult, HybridSearcher};
use crate::search::pattern::{PatternMatcher, PatternMode, PatternPredicate};
use crate::store::client::{ClientFactory, PointFilter};
use crate::store::pool::ConnectionPool;
use crate::validation::validate_query;

/// Vector candidates fetched before fusion.
pub const VECTOR_CANDIDATES: u64 = 50;
/// Scroll batch size when building a project corpus.
const CORPUS_BATCH_SIZE: u32 = 100;
/// Corpus cache key for memories without a project.
const GLOBAL_CORPUS: &str = "global";

/// Hybrid retrieval service for one engine instance.
pub struct RetrievalService<F: ClientFactory> {
    config: Arc<EngineConfig>,
    pool: Arc<ConnectionPool<F>>,
    embedder: Arc<dyn Embedder>,
    embedding_cache: EmbeddingCache,
    fusion_method: FusionMethod,
    matcher: PatternMatcher,
    predicates: StdMutex<Vec<PatternPredicate>>,
    /// Per-project searchers, built lazily from the stored corpus
    searchers: Mutex<HashMap<String, HybridSearcher>>,
}

impl<F: ClientFactory> RetrievalService<F> {
    pub fn new(
        config: Arc<EngineConfig>,
        pool: Arc<ConnectionPool<F>>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            config,
            pool,
            embedder,
            embedding_cache: EmbeddingCache::default(),
            fusion_method: FusionMethod::Weighted,
            matcher: PatternMatcher::new(),
            predicates: StdMutex::new(Vec::new()),
            searchers: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_fusion_method(mut self, method: FusionMethod) -> Self {
        self.fusion_method = method;
        self
    }

    /// Register a pattern applied to every retrieval according to its mode.
    pub fn register_pattern(&self, predicate: PatternPredicate) {
        self.predicates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(predicate);
    }

    pub fn clear_patterns(&self) {
        self.predicates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Drop a project's cached corpus so the next retrieval rebuilds it.
    pub async fn invalidate_corpus(&self, project_name: Option<&str>) {
        let key = project_name.unwrap_or(GLOBAL_CORPUS).to_string();
        self.searchers.lock().await.remove(&key);
    }

    /// Embed with the exact-text cache in front of the embedder.
    fn embed(&self, text: &str) -> Result<Vec<f32>, RecallError> {
        if let Some(cached) = self.embedding_cache.get(text) {
            return Ok(cached);
        }
        let vector = self.embedder.embed(text)?;
        self.embedding_cache.put(text, vector.clone());
        Ok(vector)
    }

    /// Run a hybrid retrieval and return fused, pattern-filtered results.
    pub async fn hybrid_retrieve(
        &self,
        query: &str,
        project_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<HybridSearchResult>, RecallError> {
        validate_query(query)?;
        let query_vector = self.embed(query)?;

        let client = self.pool.acquire().await?;
        let outcome = self
            .retrieve_with_client(&client, query, project_name, limit, query_vector)
            .await;
        self.pool.release(&client);
        outcome
    }

    async fn retrieve_with_client(
        &self,
        client: &Arc<F::Client>,
        query: &str,
        project_name: Option<&str>,
        limit: usize,
        query_vector: Vec<f32>,
    ) -> Result<Vec<HybridSearchResult>, RecallError> {
        use crate::store::client::VectorClient;

        let filter = project_name.map(|p| PointFilter::new().must("project_name", p));
        let hits = client
            .search(
                &self.config.qdrant_collection_name,
                query_vector,
                filter.as_ref(),
                VECTOR_CANDIDATES,
            )
            .await?;

        let mut vector_results: Vec<(MemoryUnit, f64)> = Vec::with_capacity(hits.len());
        for hit in hits {
            match serde_json::from_value::<MemoryUnit>(hit.payload) {
                Ok(memory) => vector_results.push((memory, hit.score as f64)),
                Err(e) => tracing::warn!(point = %hit.id, error = %e, "skipping malformed memory payload"),
            }
        }

        let corpus_key = project_name.unwrap_or(GLOBAL_CORPUS).to_string();
        let mut searchers = self.searchers.lock().await;
        if !searchers.contains_key(&corpus_key) {
            let searcher = self.build_searcher(client, project_name).await?;
            searchers.insert(corpus_key.clone(), searcher);
        }
        let searcher = searchers
            .get(&corpus_key)
            .ok_or_else(|| RecallError::Retrieval("corpus cache lost during build".into()))?;

        let fused = searcher.hybrid_search(query, &vector_results, limit);
        drop(searchers);

        self.apply_predicates(fused)
    }

    /// Scroll the project's memories once and fit the BM25 side.
    async fn build_searcher(
        &self,
        client: &Arc<F::Client>,
        project_name: Option<&str>,
    ) -> Result<HybridSearcher, RecallError> {
        use crate::store::client::VectorClient;

        let filter = match project_name {
            Some(project) => PointFilter::new().must("project_name", project),
            None => PointFilter::new(),
        };

        let mut documents = Vec::new();
        let mut units = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            let (points, next_offset) = client
                .scroll(
                    &self.config.qdrant_collection_name,
                    &filter,
                    CORPUS_BATCH_SIZE,
                    offset.take(),
                )
                .await?;
            if points.is_empty() {
                break;
            }
            for record in points {
                match serde_json::from_value::<MemoryUnit>(record.payload) {
                    Ok(memory) => {
                        documents.push(memory.content.clone());
                        units.push(memory);
                    }
                    Err(e) => {
                        tracing::warn!(point = %record.id, error = %e, "skipping malformed memory payload")
                    }
                }
            }
            match next_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        let mut searcher = HybridSearcher::new(0.5, self.fusion_method);
        if !documents.is_empty() {
            searcher.index_documents(documents, units)?;
        }
        tracing::info!(
            project = project_name.unwrap_or(GLOBAL_CORPUS),
            "built hybrid search corpus"
        );
        Ok(searcher)
    }

    /// Apply registered patterns: `require` and `filter` drop non-matching
    /// results, `boost` adds `weight * pattern_score` and re-sorts.
    fn apply_predicates(
        &self,
        mut results: Vec<HybridSearchResult>,
    ) -> Result<Vec<HybridSearchResult>, RecallError> {
        let predicates = self
            .predicates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if predicates.is_empty() {
            return Ok(results);
        }

        let mut boosted = false;
        for predicate in &predicates {
            match predicate.mode {
                PatternMode::Require | PatternMode::Filter => {
                    let mut kept = Vec::with_capacity(results.len());
                    for result in results {
                        if self.matcher.matches(&predicate.pattern, &result.memory.content)? {
                            kept.push(result);
                        }
                    }
                    results = kept;
                }
                PatternMode::Boost => {
                    for result in &mut results {
                        let score = self.matcher.pattern_score(
                            &result.memory.content,
                            &predicate.pattern,
                            "memory",
                        )?;
                        result.total_score += predicate.weight * score;
                    }
                    boosted = true;
                }
            }
        }

        if boosted {
            results.sort_by(|a, b| {
                b.total_score
                    .partial_cmp(&a.total_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        Ok(results)
    }
}
