//! Regex pattern matching for code search.
//!
//! Patterns are raw regexes or `@preset:<name>` references into a closed
//! preset table. Compiled patterns are cached keyed by the original input
//! string, so a preset reference and its expanded regex coexist in the cache.
//! All patterns compile with multi-line and dot-all semantics.

use std::collections::HashMap;
use std::sync::Mutex;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Named regex presets for common code-search intents.
pub const PATTERN_PRESETS: &[(&str, &str)] = &[
    // Error handling
    ("error_handlers", r"(try|catch|except|rescue)\s*[:\{]"),
    ("bare_except", r"except\s*:"),
    ("broad_catch", r"catch\s*\(\s*Exception"),
    ("empty_catch", r"catch\s*\([^)]+\)\s*\{\s*\}"),
    // Code comments
    ("TODO_comments", r"(TODO|FIXME|HACK|XXX|NOTE)[:|\s]"),
    ("deprecated_markers", r"@deprecated|@Deprecated|DEPRECATED"),
    // Security keywords
    ("security_keywords", r"(password|secret|token|api[_-]?key|private[_-]?key)"),
    ("auth_patterns", r"(authenticate|authorize|permission|access[_-]?control)"),
    // API patterns
    ("deprecated_apis", r"(deprecated\(|@Deprecated|__deprecated__|OBSOLETE)"),
    ("async_patterns", r"(async\s+def|await\s+|Promise\.|async\s+function)"),
    // Code smells
    ("magic_numbers", r"\b\d{3,}\b"),
    ("long_lines", r"^.{120,}$"),
    ("multiple_returns", r"return\s+.*\n.*return\s+"),
    // Configuration
    ("config_keys", r"(config\.|env\[|process\.env\.|getenv\()"),
    ("hardcoded_urls", r#"https?://[^\s"']+"#),
];

const PRESET_PREFIX: &str = "@preset:";

/// How a registered pattern participates in hybrid retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternMode {
    /// Drop results that do not match
    Filter,
    /// Add `weight * pattern_score` to matching results
    Boost,
    /// Every result must match or the result is dropped
    Require,
}

/// A pattern plus its retrieval mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternPredicate {
    pub pattern: String,
    pub mode: PatternMode,
    pub weight: f64,
}

/// A single raw match span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternHit {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// A match with its position resolved to line and column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchLocation {
    /// 1-origin line number
    pub line: usize,
    /// 0-origin column within the line
    pub column: usize,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Regex matcher with a compiled-pattern cache.
pub struct PatternMatcher {
    cache: Mutex<HashMap<String, Regex>>,
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternMatcher {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve presets, compile, and cache by the original input string.
    fn compile(&self, pattern: &str) -> Result<Regex, ValidationError> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(compiled) = cache.get(pattern) {
            return Ok(compiled.clone());
        }

        let source = if let Some(name) = pattern.strip_prefix(PRESET_PREFIX) {
            match preset_pattern(name) {
                Some(expanded) => {
                    tracing::debug!(preset = name, "resolved pattern preset");
                    expanded
                }
                None => {
                    return Err(ValidationError::UnknownPreset {
                        name: name.to_string(),
                        available: available_presets().join(", "),
                    });
                }
            }
        } else {
            pattern
        };

        let compiled = RegexBuilder::new(source)
            .multi_line(true)
            .dot_matches_new_line(true)
            .build()
            .map_err(|e| ValidationError::InvalidPattern {
                pattern: source.to_string(),
                reason: e.to_string(),
            })?;

        cache.insert(pattern.to_string(), compiled.clone());
        Ok(compiled)
    }

    /// True when the pattern matches anywhere in `content`.
    pub fn matches(&self, pattern: &str, content: &str) -> Result<bool, ValidationError> {
        Ok(self.compile(pattern)?.is_match(content))
    }

    /// Every non-overlapping match span.
    pub fn find_matches(&self, pattern: &str, content: &str) -> Result<Vec<PatternHit>, ValidationError> {
        let regex = self.compile(pattern)?;
        Ok(regex
            .find_iter(content)
            .map(|m| PatternHit {
                start: m.start(),
                end: m.end(),
                text: m.as_str().to_string(),
            })
            .collect())
    }

    pub fn match_count(&self, pattern: &str, content: &str) -> Result<usize, ValidationError> {
        Ok(self.find_matches(pattern, content)?.len())
    }

    /// Matches resolved to 1-origin line numbers via newline offsets.
    pub fn match_locations(
        &self,
        pattern: &str,
        content: &str,
    ) -> Result<Vec<MatchLocation>, ValidationError> {
        let hits = self.find_matches(pattern, content)?;

        // Offset of the first byte of each line.
        let mut line_offsets = vec![0usize];
        for line in content.split('\n') {
            line_offsets.push(line_offsets[line_offsets.len() - 1] + line.len() + 1);
        }

        Ok(hits
            .into_iter()
            .map(|hit| {
                let line = match line_offsets.binary_search(&hit.start) {
                    Ok(idx) => idx + 1,
                    Err(idx) => idx,
                };
                let column = hit.start - line_offsets[line - 1];
                MatchLocation {
                    line,
                    column,
                    text: hit.text,
                    start: hit.start,
                    end: hit.end,
                }
            })
            .collect())
    }

    /// Match quality score in [0, 1].
    ///
    /// Scoring factors:
    /// - match exists: +0.5
    /// - match count (diminishing): up to +0.2
    /// - match within the first two lines: +0.2
    /// - match density per line: up to +0.1
    pub fn pattern_score(
        &self,
        content: &str,
        pattern: &str,
        _unit_type: &str,
    ) -> Result<f64, ValidationError> {
        let hits = self.find_matches(pattern, content)?;
        if hits.is_empty() {
            return Ok(0.0);
        }

        let mut score = 0.5;
        let match_count = hits.len();
        score += (match_count as f64 * 0.05).min(0.2);

        let lines: Vec<&str> = content.split('\n').collect();
        if lines.len() >= 2 {
            let signature_len = lines[0].len() + 1 + lines[1].len();
            if hits.iter().any(|hit| hit.start < signature_len) {
                score += 0.2;
            }
        }

        let line_count = lines.len().max(1);
        let density = match_count as f64 / line_count as f64;
        score += (density * 10.0).min(0.1);

        Ok(score.min(1.0))
    }

    /// Drop the compiled-pattern cache.
    pub fn clear_cache(&self) {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).clear();
        tracing::info!("pattern compilation cache cleared");
    }

    #[cfg(test)]
    fn cache_len(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Preset names, sorted.
pub fn available_presets() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = PATTERN_PRESETS.iter().map(|(name, _)| *name).collect();
    names.sort_unstable();
    names
}

/// Expanded regex for a preset name.
pub fn preset_pattern(name: &str) -> Option<&'static str> {
    PATTERN_PRESETS
        .iter()
        .find(|(preset, _)| *preset == name)
        .map(|(_, pattern)| *pattern)
}
