//! Hybrid search combining BM25 keyword scores with vector similarity.
//!
//! The vector side arrives pre-ranked from the store; the BM25 side is
//! computed here over the indexed corpus. Three fusion strategies are
//! supported:
//!
//! - weighted: alpha-blend of min-max-normalized scores
//! - rrf: reciprocal rank fusion, rank-only
//! - cascade: positive BM25 hits first, vector results backfill

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::memory::MemoryUnit;
use crate::search::bm25::Bm25;

/// Default RRF dampening constant.
pub const DEFAULT_RRF_K: usize = 60;

/// Strategy for combining keyword and vector result lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionMethod {
    #[default]
    Weighted,
    Rrf,
    Cascade,
}

impl FusionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FusionMethod::Weighted => "weighted",
            FusionMethod::Rrf => "rrf",
            FusionMethod::Cascade => "cascade",
        }
    }
}

/// One fused result with full scoring detail.
#[derive(Debug, Clone, Serialize)]
pub struct HybridSearchResult {
    pub memory: MemoryUnit,
    pub total_score: f64,
    pub vector_score: f64,
    pub bm25_score: f64,
    pub rank_vector: Option<usize>,
    pub rank_bm25: Option<usize>,
    pub fusion_method: FusionMethod,
}

/// Hybrid searcher over one indexed corpus.
pub struct HybridSearcher {
    alpha: f64,
    fusion_method: FusionMethod,
    rrf_k: usize,
    bm25: Bm25,
    documents: Vec<String>,
    memory_units: Vec<MemoryUnit>,
}

impl Default for HybridSearcher {
    fn default() -> Self {
        Self::new(0.5, FusionMethod::Weighted)
    }
}

impl HybridSearcher {
    pub fn new(alpha: f64, fusion_method: FusionMethod) -> Self {
        Self {
            alpha,
            fusion_method,
            rrf_k: DEFAULT_RRF_K,
            bm25: Bm25::default(),
            documents: Vec::new(),
            memory_units: Vec::new(),
        }
    }

    pub fn with_rrf_k(mut self, k: usize) -> Self {
        self.rrf_k = k;
        self
    }

    pub fn with_bm25_params(mut self, k1: f64, b: f64) -> Self {
        self.bm25 = Bm25::new(k1, b);
        self
    }

    pub fn fusion_method(&self) -> FusionMethod {
        self.fusion_method
    }

    pub fn is_indexed(&self) -> bool {
        !self.documents.is_empty()
    }

    /// Build the BM25 index over `documents`, one per memory unit.
    pub fn index_documents(
        &mut self,
        documents: Vec<String>,
        memory_units: Vec<MemoryUnit>,
    ) -> Result<(), ValidationError> {
        if documents.len() != memory_units.len() {
            return Err(ValidationError::CorpusLengthMismatch);
        }
        self.bm25.fit(&documents);
        self.documents = documents;
        self.memory_units = memory_units;
        tracing::info!(
            documents = self.documents.len(),
            "indexed documents for hybrid search"
        );
        Ok(())
    }

    /// Fuse pre-ranked `vector_results` with BM25 scores for `query`.
    ///
    /// With no indexed corpus the vector results pass through unchanged with
    /// a zero BM25 score.
    pub fn hybrid_search(
        &self,
        query: &str,
        vector_results: &[(MemoryUnit, f64)],
        limit: usize,
    ) -> Vec<HybridSearchResult> {
        if self.documents.is_empty() {
            tracing::warn!("no documents indexed for BM25 search, returning vector results");
            return vector_results
                .iter()
                .take(limit)
                .map(|(memory, score)| HybridSearchResult {
                    memory: memory.clone(),
                    total_score: *score,
                    vector_score: *score,
                    bm25_score: 0.0,
                    rank_vector: None,
                    rank_bm25: None,
                    fusion_method: self.fusion_method,
                })
                .collect();
        }

        let scores = self.bm25.scores(query);
        let mut bm25_results: Vec<(MemoryUnit, f64)> = self
            .memory_units
            .iter()
            .cloned()
            .zip(scores)
            .collect();
        bm25_results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        match self.fusion_method {
            FusionMethod::Weighted => self.weighted_fusion(vector_results, &bm25_results, limit),
            FusionMethod::Rrf => self.rrf_fusion(vector_results, &bm25_results, limit),
            FusionMethod::Cascade => self.cascade_fusion(vector_results, &bm25_results, limit),
        }
    }

    /// `total = alpha * vec_norm + (1 - alpha) * bm25_norm`
    fn weighted_fusion(
        &self,
        vector_results: &[(MemoryUnit, f64)],
        bm25_results: &[(MemoryUnit, f64)],
        limit: usize,
    ) -> Vec<HybridSearchResult> {
        let vector_norm = normalize_scores(&collect_scores(vector_results));
        let bm25_norm = normalize_scores(&collect_scores(bm25_results));

        // id -> (normalized, raw, rank)
        let mut vector_by_id: HashMap<&str, (f64, f64, usize)> = HashMap::new();
        for (rank, ((memory, raw), norm)) in vector_results.iter().zip(&vector_norm).enumerate() {
            vector_by_id.insert(memory.id.as_str(), (*norm, *raw, rank));
        }
        let mut bm25_by_id: HashMap<&str, (f64, f64, usize)> = HashMap::new();
        for (rank, ((memory, raw), norm)) in bm25_results.iter().zip(&bm25_norm).enumerate() {
            bm25_by_id.insert(memory.id.as_str(), (*norm, *raw, rank));
        }

        let mut combined = Vec::new();
        for (id, memory) in unique_memories(vector_results, bm25_results) {
            let (vec_norm, vec_raw, vec_rank) = match vector_by_id.get(id) {
                Some(&(n, r, rank)) => (n, r, Some(rank)),
                None => (0.0, 0.0, None),
            };
            let (bm25_norm, bm25_raw, bm25_rank) = match bm25_by_id.get(id) {
                Some(&(n, r, rank)) => (n, r, Some(rank)),
                None => (0.0, 0.0, None),
            };

            combined.push(HybridSearchResult {
                memory: memory.clone(),
                total_score: self.alpha * vec_norm + (1.0 - self.alpha) * bm25_norm,
                vector_score: vec_raw,
                bm25_score: bm25_raw,
                rank_vector: vec_rank,
                rank_bm25: bm25_rank,
                fusion_method: FusionMethod::Weighted,
            });
        }

        sort_by_total(&mut combined);
        combined.truncate(limit);
        combined
    }

    /// `total = sum over lists of 1 / (k + rank + 1)` with 0-origin ranks.
    fn rrf_fusion(
        &self,
        vector_results: &[(MemoryUnit, f64)],
        bm25_results: &[(MemoryUnit, f64)],
        limit: usize,
    ) -> Vec<HybridSearchResult> {
        let vector_ranks: HashMap<&str, usize> = vector_results
            .iter()
            .enumerate()
            .map(|(rank, (memory, _))| (memory.id.as_str(), rank))
            .collect();
        let bm25_ranks: HashMap<&str, usize> = bm25_results
            .iter()
            .enumerate()
            .map(|(rank, (memory, _))| (memory.id.as_str(), rank))
            .collect();

        let raw_vector: HashMap<&str, f64> = vector_results
            .iter()
            .map(|(memory, score)| (memory.id.as_str(), *score))
            .collect();
        let raw_bm25: HashMap<&str, f64> = bm25_results
            .iter()
            .map(|(memory, score)| (memory.id.as_str(), *score))
            .collect();

        let k = self.rrf_k as f64;
        let mut combined = Vec::new();
        for (id, memory) in unique_memories(vector_results, bm25_results) {
            let mut total = 0.0;
            if let Some(&rank) = vector_ranks.get(id) {
                total += 1.0 / (k + rank as f64 + 1.0);
            }
            if let Some(&rank) = bm25_ranks.get(id) {
                total += 1.0 / (k + rank as f64 + 1.0);
            }

            combined.push(HybridSearchResult {
                memory: memory.clone(),
                total_score: total,
                vector_score: raw_vector.get(id).copied().unwrap_or(0.0),
                bm25_score: raw_bm25.get(id).copied().unwrap_or(0.0),
                rank_vector: vector_ranks.get(id).copied(),
                rank_bm25: bm25_ranks.get(id).copied(),
                fusion_method: FusionMethod::Rrf,
            });
        }

        sort_by_total(&mut combined);
        combined.truncate(limit);
        combined
    }

    /// Positive-BM25 head, vector backfill in original order.
    fn cascade_fusion(
        &self,
        vector_results: &[(MemoryUnit, f64)],
        bm25_results: &[(MemoryUnit, f64)],
        limit: usize,
    ) -> Vec<HybridSearchResult> {
        let mut results = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        for (rank, (memory, score)) in bm25_results.iter().take(limit).enumerate() {
            if *score > 0.0 {
                results.push(HybridSearchResult {
                    memory: memory.clone(),
                    total_score: *score,
                    vector_score: 0.0,
                    bm25_score: *score,
                    rank_vector: None,
                    rank_bm25: Some(rank),
                    fusion_method: FusionMethod::Cascade,
                });
                seen.insert(memory.id.as_str());
            }
        }

        for (rank, (memory, score)) in vector_results.iter().enumerate() {
            if results.len() >= limit {
                break;
            }
            if !seen.contains(memory.id.as_str()) {
                results.push(HybridSearchResult {
                    memory: memory.clone(),
                    total_score: *score,
                    vector_score: *score,
                    bm25_score: 0.0,
                    rank_vector: Some(rank),
                    rank_bm25: None,
                    fusion_method: FusionMethod::Cascade,
                });
                seen.insert(memory.id.as_str());
            }
        }

        results.truncate(limit);
        results
    }
}

fn collect_scores(results: &[(MemoryUnit, f64)]) -> Vec<f64> {
    results.iter().map(|(_, score)| *score).collect()
}

/// Min-max normalization to [0, 1]; a constant list maps to all ones.
fn normalize_scores(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }
    let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == min {
        return vec![1.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / (max - min)).collect()
}

/// All memories in either list, first occurrence wins, vector side first.
fn unique_memories<'a>(
    vector_results: &'a [(MemoryUnit, f64)],
    bm25_results: &'a [(MemoryUnit, f64)],
) -> Vec<(&'a str, &'a MemoryUnit)> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (memory, _) in vector_results.iter().chain(bm25_results.iter()) {
        if seen.insert(memory.id.as_str()) {
            out.push((memory.id.as_str(), memory));
        }
    }
    out
}

fn sort_by_total(results: &mut [HybridSearchResult]) {
    results.sort_by(|a, b| {
        b.total_score
            .partial_cmp(&a.total_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: &str, content: &str) -> MemoryUnit {
        let mut m = MemoryUnit::new(content, "fact", "project", "private").expect("valid memory");
        m.id = id.to_string();
        m
    }

    fn indexed_searcher(method: FusionMethod) -> (HybridSearcher, Vec<MemoryUnit>) {
        let units = vec![
            unit("m1", "authentication user login system"),
            unit("m2", "database connection pool manager"),
            unit("m3", "user authentication handler function"),
            unit("m4", "configuration file parser"),
        ];
        let docs = units.iter().map(|u| u.content.clone()).collect();
        let mut searcher = HybridSearcher::new(0.5, method);
        searcher
            .index_documents(docs, units.clone())
            .expect("same length");
        (searcher, units)
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let mut searcher = HybridSearcher::default();
        let err = searcher.index_documents(vec!["a".into()], vec![]);
        assert!(matches!(err, Err(ValidationError::CorpusLengthMismatch)));
    }

    #[test]
    fn no_corpus_falls_back_to_vector_results() {
        let searcher = HybridSearcher::default();
        let vector = vec![(unit("m1", "one"), 0.9), (unit("m2", "two"), 0.5)];
        let results = searcher.hybrid_search("query", &vector, 10);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].memory.id, "m1");
        assert_eq!(results[0].bm25_score, 0.0);
        assert_eq!(results[0].total_score, 0.9);
    }

    #[test]
    fn weighted_alpha_one_preserves_vector_order() {
        let (_, units) = indexed_searcher(FusionMethod::Weighted);
        let docs: Vec<String> = units.iter().map(|u| u.content.clone()).collect();
        let mut searcher = HybridSearcher::new(1.0, FusionMethod::Weighted);
        searcher
            .index_documents(docs, units.clone())
            .expect("same length");

        let vector = vec![
            (units[3].clone(), 0.9),
            (units[1].clone(), 0.7),
            (units[0].clone(), 0.4),
        ];
        let results = searcher.hybrid_search("authentication user", &vector, 3);
        let ids: Vec<&str> = results.iter().map(|r| r.memory.id.as_str()).collect();
        assert_eq!(ids, vec!["m4", "m2", "m1"]);
    }

    #[test]
    fn weighted_ranking_is_invariant_under_vector_rescaling() {
        let (searcher, units) = indexed_searcher(FusionMethod::Weighted);
        let vector: Vec<(MemoryUnit, f64)> = vec![
            (units[0].clone(), 0.8),
            (units[2].clone(), 0.6),
            (units[1].clone(), 0.2),
        ];
        let scaled: Vec<(MemoryUnit, f64)> =
            vector.iter().map(|(m, s)| (m.clone(), s * 7.5)).collect();

        let base: Vec<String> = searcher
            .hybrid_search("authentication user", &vector, 4)
            .into_iter()
            .map(|r| r.memory.id)
            .collect();
        let rescaled: Vec<String> = searcher
            .hybrid_search("authentication user", &scaled, 4)
            .into_iter()
            .map(|r| r.memory.id)
            .collect();
        assert_eq!(base, rescaled);
    }

    #[test]
    fn weighted_all_equal_scores_normalize_to_one() {
        let scores = normalize_scores(&[0.4, 0.4, 0.4]);
        assert_eq!(scores, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn rrf_depends_only_on_ranks() {
        let (searcher, units) = indexed_searcher(FusionMethod::Rrf);
        let vector = vec![(units[0].clone(), 0.8), (units[1].clone(), 0.3)];
        let scaled: Vec<(MemoryUnit, f64)> =
            vector.iter().map(|(m, s)| (m.clone(), s * 123.0)).collect();

        let base: Vec<String> = searcher
            .hybrid_search("authentication user", &vector, 4)
            .into_iter()
            .map(|r| r.memory.id)
            .collect();
        let rescaled: Vec<String> = searcher
            .hybrid_search("authentication user", &scaled, 4)
            .into_iter()
            .map(|r| r.memory.id)
            .collect();
        assert_eq!(base, rescaled);
    }

    #[test]
    fn rrf_rewards_presence_in_both_lists() {
        let (searcher, units) = indexed_searcher(FusionMethod::Rrf);
        // m1 ranks first on the vector side and high on BM25 for this query.
        let vector = vec![(units[0].clone(), 0.9), (units[3].clone(), 0.8)];
        let results = searcher.hybrid_search("authentication user", &vector, 4);
        assert_eq!(results[0].memory.id, "m1");
        assert!(results[0].rank_vector.is_some());
        assert!(results[0].rank_bm25.is_some());
    }

    #[test]
    fn cascade_takes_bm25_head_then_backfills() {
        let (searcher, units) = indexed_searcher(FusionMethod::Cascade);
        let vector = vec![(units[3].clone(), 0.95), (units[1].clone(), 0.85)];
        let results = searcher.hybrid_search("authentication user", &vector, 4);

        // BM25 produces positive scores only for m1 and m3; the rest backfills
        // from the vector list in order.
        assert_eq!(results.len(), 4);
        let head: HashSet<&str> = results[..2].iter().map(|r| r.memory.id.as_str()).collect();
        assert!(head.contains("m1") && head.contains("m3"));
        for r in &results[..2] {
            assert_eq!(r.vector_score, 0.0);
            assert!(r.bm25_score > 0.0);
        }
        assert_eq!(results[2].memory.id, "m4");
        assert_eq!(results[2].bm25_score, 0.0);
        assert_eq!(results[3].memory.id, "m2");
    }

    #[test]
    fn results_respect_limit() {
        let (searcher, units) = indexed_searcher(FusionMethod::Weighted);
        let vector = vec![(units[0].clone(), 0.9)];
        let results = searcher.hybrid_search("authentication user", &vector, 2);
        assert!(results.len() <= 2);
    }
}
