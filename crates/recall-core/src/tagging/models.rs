//! Data models for the tagging system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Maximum hierarchy depth (levels 0 through 3).
pub const MAX_TAG_DEPTH: u32 = 4;

/// Lowercase, trim, and validate a tag name.
pub fn normalize_tag_name(name: &str) -> Result<String, ValidationError> {
    let normalized = name.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(ValidationError::EmptyTagName);
    }
    if !normalized
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidTagName(normalized));
    }
    Ok(normalized)
}

/// A node in the bounded tag hierarchy. Uniqueness is by `full_path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    /// 0 for roots, `parent.level + 1` otherwise
    pub level: u32,
    /// `/`-joined chain from the root, e.g. `language/python/async`
    pub full_path: String,
    pub created_at: DateTime<Utc>,
}

impl Tag {
    /// Build a validated tag under an optional parent.
    pub fn new(name: &str, parent: Option<&Tag>) -> Result<Self, ValidationError> {
        let name = normalize_tag_name(name)?;
        let (level, full_path, parent_id) = match parent {
            Some(parent) => {
                if parent.level >= MAX_TAG_DEPTH - 1 {
                    return Err(ValidationError::HierarchyTooDeep);
                }
                (
                    parent.level + 1,
                    format!("{}/{}", parent.full_path, name),
                    Some(parent.id.clone()),
                )
            }
            None => (0, name.clone(), None),
        };
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name,
            parent_id,
            level,
            full_path,
            created_at: Utc::now(),
        })
    }
}

/// Boolean operator for collection tag filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterOp {
    And,
    Or,
}

/// Tag predicate attached to a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagFilter {
    pub tags: Vec<String>,
    pub op: FilterOp,
}

/// A named grouping of memories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub auto_generated: bool,
    pub tag_filter: Option<TagFilter>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Collection {
    pub fn new(
        name: &str,
        description: Option<String>,
        tag_filter: Option<TagFilter>,
    ) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyCollectionName);
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description,
            auto_generated: false,
            tag_filter,
            created_at: now,
            updated_at: now,
        })
    }
}

/// memory <-> tag junction row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryTag {
    pub memory_id: String,
    pub tag_id: String,
    pub confidence: f64,
    pub auto_generated: bool,
    pub created_at: DateTime<Utc>,
}

/// collection <-> memory junction row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMemory {
    pub collection_id: String,
    pub memory_id: String,
    pub added_at: DateTime<Utc>,
}
