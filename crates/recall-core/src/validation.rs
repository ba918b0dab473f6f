//! Input validation and injection screening.
//!
//! Validation runs before any state is touched; a rejected input never
//! reaches the stores.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::RegexBuilder;

use crate::error::{RecallError, ValidationError};

/// Memory content hard cap.
pub const MAX_CONTENT_LENGTH: usize = 50_000;
/// Search query hard cap.
pub const MAX_QUERY_LENGTH: usize = 1_000;

/// Reject empty or oversize memory content.
pub fn validate_content(content: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    let len = content.chars().count();
    if len > MAX_CONTENT_LENGTH {
        return Err(ValidationError::ContentTooLong {
            len,
            max: MAX_CONTENT_LENGTH,
        });
    }
    Ok(())
}

/// Reject empty or oversize queries. A single-character query is valid; a
/// 1001-character query is not.
pub fn validate_query(query: &str) -> Result<(), ValidationError> {
    if query.trim().is_empty() {
        return Err(ValidationError::EmptyQuery);
    }
    let len = query.chars().count();
    if len > MAX_QUERY_LENGTH {
        return Err(ValidationError::QueryTooLong {
            len,
            max: MAX_QUERY_LENGTH,
        });
    }
    Ok(())
}

/// Conflict policy for memory import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictMode {
    Skip,
    Overwrite,
    Merge,
}

impl FromStr for ConflictMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(ConflictMode::Skip),
            "overwrite" => Ok(ConflictMode::Overwrite),
            "merge" => Ok(ConflictMode::Merge),
            other => Err(ValidationError::InvalidConflictMode(other.to_string())),
        }
    }
}

static INJECTION_SIGNATURES: LazyLock<Vec<(&'static str, regex::Regex)>> = LazyLock::new(|| {
    let families = [
        (
            "SQL injection",
            r"(union\s+select|drop\s+table|insert\s+into|delete\s+from|;\s*--|'\s*or\s+'1'\s*=\s*'1)",
        ),
        (
            "command injection",
            r"(;\s*(rm|curl|wget|nc|bash|sh)\b|\$\([^)]*\)|`[^`]*`|\|\s*(sh|bash)\b)",
        ),
        ("path traversal", r"(\.\./\.\./|\.\.\\\.\.\\|/etc/passwd|%2e%2e%2f)"),
        (
            "prompt injection",
            r"(ignore\s+(all\s+)?previous\s+instructions|disregard\s+(all\s+)?prior|system\s*prompt\s*:)",
        ),
    ];
    families
        .iter()
        .map(|(name, pattern)| {
            let re = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .expect("injection signature compiles");
            (*name, re)
        })
        .collect()
});

/// Screen content against known injection signatures.
pub fn screen_content(content: &str) -> Result<(), RecallError> {
    for (family, signature) in INJECTION_SIGNATURES.iter() {
        if signature.is_match(content) {
            return Err(RecallError::Security(format!(
                "content matches {family} signature"
            )));
        }
    }
    Ok(())
}
