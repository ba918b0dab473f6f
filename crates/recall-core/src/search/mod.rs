//! Search Module
//!
//! Keyword, hybrid, and pattern search over memory units:
//! - BM25 keyword scoring over a fitted corpus
//! - Hybrid fusion of vector and keyword rankings (weighted, RRF, cascade)
//! - Regex pattern matching with presets and quality scoring

pub mod bm25;
pub mod hybrid;
pub mod pattern;

pub use bm25::{tokenize, Bm25, DEFAULT_B, DEFAULT_K1};
pub use hybrid::{FusionMethod, HybridSearchResult, HybridSearcher, DEFAULT_RRF_K};
pub use pattern::{
    available_presets, preset_pattern, MatchLocation, PatternHit, PatternMatcher, PatternMode,
    PatternPredicate, PATTERN_PRESETS,
};
