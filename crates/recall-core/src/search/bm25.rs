//! Okapi BM25 scoring over a small in-memory corpus.
//!
//! `fit` is an idempotent rebuild; there is no incremental update. Both
//! `fit` and `scores` run the same tokenizer, so query terms line up with
//! indexed terms exactly.

use std::collections::HashMap;

/// Term-frequency saturation default.
pub const DEFAULT_K1: f64 = 1.5;
/// Length-normalization default.
pub const DEFAULT_B: f64 = 0.75;

/// Lowercase, split on non-alphanumeric, drop empties.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// BM25 index over a fitted document corpus.
#[derive(Debug, Clone)]
pub struct Bm25 {
    k1: f64,
    b: f64,
    corpus_size: usize,
    avgdl: f64,
    /// Per-document term frequencies
    term_freqs: Vec<HashMap<String, usize>>,
    /// Inverse document frequency per term
    idf: HashMap<String, f64>,
    doc_lens: Vec<usize>,
}

impl Default for Bm25 {
    fn default() -> Self {
        Self::new(DEFAULT_K1, DEFAULT_B)
    }
}

impl Bm25 {
    pub fn new(k1: f64, b: f64) -> Self {
        Self {
            k1,
            b,
            corpus_size: 0,
            avgdl: 0.0,
            term_freqs: Vec::new(),
            idf: HashMap::new(),
            doc_lens: Vec::new(),
        }
    }

    /// Rebuild the index from scratch over `documents`.
    pub fn fit(&mut self, documents: &[String]) {
        self.corpus_size = documents.len();
        self.term_freqs.clear();
        self.doc_lens.clear();
        self.idf.clear();

        let mut doc_freqs: HashMap<String, usize> = HashMap::new();

        for doc in documents {
            let tokens = tokenize(doc);
            self.doc_lens.push(tokens.len());

            let mut freqs: HashMap<String, usize> = HashMap::new();
            for token in tokens {
                *freqs.entry(token).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }
            self.term_freqs.push(freqs);
        }

        self.avgdl = if self.corpus_size > 0 {
            self.doc_lens.iter().sum::<usize>() as f64 / self.corpus_size as f64
        } else {
            0.0
        };

        // Non-negative idf variant: a term present in over half the corpus
        // still contributes a positive weight.
        let n = self.corpus_size as f64;
        for (term, df) in doc_freqs {
            let df = df as f64;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
            self.idf.insert(term, idf);
        }
    }

    /// Number of fitted documents.
    pub fn corpus_size(&self) -> usize {
        self.corpus_size
    }

    /// BM25 score of `query` against every fitted document, indexed parallel
    /// to the corpus. Documents sharing no term with the query score 0.
    pub fn scores(&self, query: &str) -> Vec<f64> {
        let query_terms = tokenize(query);
        let mut scores = vec![0.0; self.corpus_size];

        if self.corpus_size == 0 || self.avgdl == 0.0 {
            return scores;
        }

        for (doc_idx, freqs) in self.term_freqs.iter().enumerate() {
            let dl = self.doc_lens[doc_idx] as f64;
            let norm = self.k1 * (1.0 - self.b + self.b * dl / self.avgdl);

            let mut score = 0.0;
            for term in &query_terms {
                let Some(&tf) = freqs.get(term) else { continue };
                let Some(&idf) = self.idf.get(term) else { continue };
                let tf = tf as f64;
                score += idf * (tf * (self.k1 + 1.0)) / (tf + norm);
            }
            scores[doc_idx] = score;
        }

        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<String> {
        vec![
            "authentication user login system".to_string(),
            "database connection pool manager".to_string(),
            "user authentication handler function".to_string(),
            "configuration file parser".to_string(),
        ]
    }

    #[test]
    fn tokenizer_splits_and_lowercases() {
        assert_eq!(
            tokenize("Hello, World! foo_bar"),
            vec!["hello", "world", "foo", "bar"]
        );
        assert!(tokenize("--- ---").is_empty());
    }

    #[test]
    fn scores_are_parallel_to_corpus() {
        let docs = corpus();
        let mut bm25 = Bm25::default();
        bm25.fit(&docs);
        assert_eq!(bm25.scores("anything").len(), docs.len());
    }

    #[test]
    fn documents_without_query_terms_score_zero() {
        let docs = corpus();
        let mut bm25 = Bm25::default();
        bm25.fit(&docs);

        let scores = bm25.scores("authentication user");
        assert_eq!(scores[3], 0.0); // "configuration file parser"
    }

    #[test]
    fn relevant_documents_rank_above_irrelevant() {
        let docs = corpus();
        let mut bm25 = Bm25::default();
        bm25.fit(&docs);

        let scores = bm25.scores("authentication user");
        // Documents 0 and 2 contain both terms; 1 and 3 contain neither.
        assert!(scores[0] > scores[1]);
        assert!(scores[0] > scores[3]);
        assert!(scores[2] > scores[1]);
        assert!(scores[2] > scores[3]);
    }

    #[test]
    fn fit_is_an_idempotent_rebuild() {
        let docs = corpus();
        let mut bm25 = Bm25::default();
        bm25.fit(&docs);
        let first = bm25.scores("authentication user");
        bm25.fit(&docs);
        let second = bm25.scores("authentication user");
        assert_eq!(first, second);

        bm25.fit(&docs[..2].to_vec());
        assert_eq!(bm25.scores("user").len(), 2);
    }

    #[test]
    fn empty_corpus_yields_empty_scores() {
        let mut bm25 = Bm25::default();
        bm25.fit(&[]);
        assert!(bm25.scores("query").is_empty());
    }
}
