//! Memory units - the retrievable unit of knowledge.
//!
//! A memory unit is free-form text plus the classification facets the store
//! filters on. Field names match the payload index names in the vector store,
//! so these records serialize straight into point payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::validation::validate_content;

/// A single retrievable memory.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryUnit {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// The remembered text, at most 50,000 characters
    pub content: String,
    /// Coarse kind of memory (fact, snippet, decision, ...)
    pub category: String,
    /// How broadly the memory applies (session, project, global, ...)
    pub context_level: String,
    /// Visibility scope used for filtered retrieval
    pub scope: String,
    /// Owning project, if the memory is project-bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    /// Relative weight in [0, 1]
    pub importance: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryUnit {
    /// Create a validated memory unit with a fresh id and timestamps.
    pub fn new(
        content: impl Into<String>,
        category: impl Into<String>,
        context_level: impl Into<String>,
        scope: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let content = content.into();
        validate_content(&content)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            content,
            category: category.into(),
            context_level: context_level.into(),
            scope: scope.into(),
            project_name: None,
            importance: 0.5,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project_name = Some(project.into());
        self
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance.clamp(0.0, 1.0);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Re-check the content invariant, e.g. after deserializing from an
    /// untrusted import.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_content(&self.content)
    }
}
