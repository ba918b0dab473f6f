//! Memory unit persistence over the vector store.
//!
//! Memory units live in the memory collection, one point per unit with the
//! unit itself as payload. Export produces a versioned snapshot; import
//! replays one with a caller-chosen conflict policy. The conflict mode is
//! parsed before any row is touched.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embeddings::Embedder;
use crate::error::{RecallError, StorageError};
use crate::memory::MemoryUnit;
use crate::store::client::{ClientFactory, PointFilter, PointRecord, VectorClient};
use crate::store::pool::ConnectionPool;
use crate::validation::{screen_content, ConflictMode};

/// Export snapshot format version.
pub const EXPORT_VERSION: &str = "1.0";
/// Scroll batch size for listing and exports.
const SCAN_BATCH_SIZE: u32 = 100;

/// Versioned export of memory units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryExport {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub total_count: usize,
    pub memories: Vec<MemoryUnit>,
}

/// Outcome of one import run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub total_processed: usize,
    pub errors: Vec<String>,
}

/// Aggregate statistics for one project's memories.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectStats {
    pub project_name: String,
    pub total_memories: usize,
    pub categories: HashMap<String, usize>,
    pub context_levels: HashMap<String, usize>,
    pub last_indexed: Option<DateTime<Utc>>,
}

/// Vector-store-backed persistence for [`MemoryUnit`]s.
pub struct MemoryStore<F: ClientFactory> {
    pool: Arc<ConnectionPool<F>>,
    collection: String,
    read_only: bool,
}

impl<F: ClientFactory> MemoryStore<F> {
    pub fn new(pool: Arc<ConnectionPool<F>>, collection: impl Into<String>, read_only: bool) -> Self {
        Self {
            pool,
            collection: collection.into(),
            read_only,
        }
    }

    fn ensure_writable(&self, operation: &str) -> Result<(), RecallError> {
        if self.read_only {
            return Err(RecallError::ReadOnly {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// Validate, screen, and persist one memory with its embedding.
    pub async fn store_memory(
        &self,
        unit: &MemoryUnit,
        vector: Vec<f32>,
    ) -> Result<String, RecallError> {
        self.ensure_writable("store_memory")?;
        unit.validate()?;
        screen_content(&unit.content)?;

        let record = PointRecord {
            id: unit.id.clone(),
            vector,
            payload: serde_json::to_value(unit)
                .map_err(|e| StorageError::Backend(format!("payload serialization: {e}")))?,
        };

        let client = self.pool.acquire().await?;
        let result = client.upsert_points(&self.collection, vec![record]).await;
        self.pool.release(&client);
        result?;

        tracing::debug!(memory_id = %unit.id, "stored memory");
        Ok(unit.id.clone())
    }

    pub async fn get_memory(&self, memory_id: &str) -> Result<Option<MemoryUnit>, RecallError> {
        let filter = PointFilter::new().must("id", memory_id);
        let client = self.pool.acquire().await?;
        let result = client.scroll(&self.collection, &filter, 1, None).await;
        self.pool.release(&client);

        let (points, _) = result?;
        match points.into_iter().next() {
            Some(record) => Ok(Some(parse_memory(&record)?)),
            None => Ok(None),
        }
    }

    /// Delete one memory; `true` when a point was removed.
    pub async fn delete_memory(&self, memory_id: &str) -> Result<bool, RecallError> {
        self.ensure_writable("delete_memory")?;

        let filter = PointFilter::new().must("id", memory_id);
        let client = self.pool.acquire().await?;
        let result = client.delete_by_filter(&self.collection, &filter).await;
        self.pool.release(&client);
        Ok(result? > 0)
    }

    /// One page of memories, optionally filtered by project and category.
    pub async fn list_memories(
        &self,
        project_name: Option<&str>,
        category: Option<&str>,
        limit: u32,
        offset: Option<String>,
    ) -> Result<(Vec<MemoryUnit>, Option<String>), RecallError> {
        let mut filter = PointFilter::new();
        if let Some(project) = project_name {
            filter = filter.must("project_name", project);
        }
        if let Some(category) = category {
            filter = filter.must("category", category);
        }

        let client = self.pool.acquire().await?;
        let result = client.scroll(&self.collection, &filter, limit, offset).await;
        self.pool.release(&client);

        let (points, next_offset) = result?;
        let mut memories = Vec::with_capacity(points.len());
        for record in &points {
            memories.push(parse_memory(record)?);
        }
        Ok((memories, next_offset))
    }

    pub async fn count_memories(&self, project_name: Option<&str>) -> Result<u64, RecallError> {
        let mut filter = PointFilter::new();
        if let Some(project) = project_name {
            filter = filter.must("project_name", project);
        }
        let client = self.pool.acquire().await?;
        let result = client.count(&self.collection, &filter).await;
        self.pool.release(&client);
        Ok(result?)
    }

    /// Distinct project names across the collection, sorted.
    pub async fn get_all_projects(&self) -> Result<Vec<String>, RecallError> {
        let client = self.pool.acquire().await?;
        let result = self
            .scan(&client, &PointFilter::new(), |record, acc: &mut Vec<String>| {
                if let Some(project) = record.payload.get("project_name").and_then(|v| v.as_str()) {
                    acc.push(project.to_string());
                }
                Ok(())
            })
            .await;
        self.pool.release(&client);

        let mut projects = result?;
        projects.sort_unstable();
        projects.dedup();
        Ok(projects)
    }

    /// Category and context-level breakdown for one project.
    pub async fn get_project_stats(&self, project_name: &str) -> Result<ProjectStats, RecallError> {
        let filter = PointFilter::new().must("project_name", project_name);
        let client = self.pool.acquire().await?;
        let result = self
            .scan(&client, &filter, |record, stats: &mut ProjectStats| {
                stats.total_memories += 1;
                if let Some(category) = record.payload.get("category").and_then(|v| v.as_str()) {
                    *stats.categories.entry(category.to_string()).or_insert(0) += 1;
                }
                if let Some(level) = record.payload.get("context_level").and_then(|v| v.as_str()) {
                    *stats.context_levels.entry(level.to_string()).or_insert(0) += 1;
                }
                if let Some(updated) = record
                    .payload
                    .get("updated_at")
                    .and_then(|v| v.as_str())
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                {
                    let updated = updated.with_timezone(&Utc);
                    if stats.last_indexed.is_none_or(|last| updated > last) {
                        stats.last_indexed = Some(updated);
                    }
                }
                Ok(())
            })
            .await;
        self.pool.release(&client);

        let mut stats = result?;
        stats.project_name = project_name.to_string();
        Ok(stats)
    }

    /// Snapshot every memory, optionally scoped to one project.
    pub async fn export_memories(
        &self,
        project_name: Option<&str>,
    ) -> Result<MemoryExport, RecallError> {
        let mut filter = PointFilter::new();
        if let Some(project) = project_name {
            filter = filter.must("project_name", project);
        }

        let client = self.pool.acquire().await?;
        let result = self
            .scan(&client, &filter, |record, acc: &mut Vec<MemoryUnit>| {
                acc.push(parse_memory(record)?);
                Ok(())
            })
            .await;
        self.pool.release(&client);

        let memories = result?;
        Ok(MemoryExport {
            version: EXPORT_VERSION.to_string(),
            exported_at: Utc::now(),
            total_count: memories.len(),
            memories,
        })
    }

    /// Replay an export. `conflict_mode` is one of `skip`, `overwrite`, or
    /// `merge` and is rejected before any row is touched. Per-memory
    /// failures are collected rather than aborting the run.
    pub async fn import_memories(
        &self,
        export: &MemoryExport,
        conflict_mode: &str,
        embedder: &dyn Embedder,
    ) -> Result<ImportReport, RecallError> {
        self.ensure_writable("import_memories")?;
        let mode: ConflictMode = conflict_mode.parse()?;

        let mut report = ImportReport {
            total_processed: export.memories.len(),
            ..ImportReport::default()
        };

        for unit in &export.memories {
            let outcome = self.import_one(unit, mode, embedder).await;
            match outcome {
                Ok(ImportOutcome::Created) => report.created += 1,
                Ok(ImportOutcome::Updated) => report.updated += 1,
                Ok(ImportOutcome::Skipped) => report.skipped += 1,
                Err(e) => report.errors.push(format!("{}: {e}", unit.id)),
            }
        }

        tracing::info!(
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            errors = report.errors.len(),
            "imported memories"
        );
        Ok(report)
    }

    async fn import_one(
        &self,
        unit: &MemoryUnit,
        mode: ConflictMode,
        embedder: &dyn Embedder,
    ) -> Result<ImportOutcome, RecallError> {
        unit.validate()?;
        let existing = self.get_memory(&unit.id).await?;

        let (to_store, outcome) = match (existing, mode) {
            (None, _) => (unit.clone(), ImportOutcome::Created),
            (Some(_), ConflictMode::Skip) => return Ok(ImportOutcome::Skipped),
            (Some(_), ConflictMode::Overwrite) => (unit.clone(), ImportOutcome::Updated),
            (Some(existing), ConflictMode::Merge) => {
                (merge_units(existing, unit), ImportOutcome::Updated)
            }
        };

        let vector = embedder.embed(&to_store.content)?;
        self.store_memory(&to_store, vector).await?;
        Ok(outcome)
    }

    /// Scroll every matching record through a fold.
    async fn scan<T: Default>(
        &self,
        client: &Arc<F::Client>,
        filter: &PointFilter,
        mut fold: impl FnMut(&PointRecord, &mut T) -> Result<(), RecallError>,
    ) -> Result<T, RecallError> {
        let mut acc = T::default();
        let mut offset: Option<String> = None;
        loop {
            let (points, next_offset) = client
                .scroll(&self.collection, filter, SCAN_BATCH_SIZE, offset.take())
                .await?;
            if points.is_empty() {
                break;
            }
            for record in &points {
                fold(record, &mut acc)?;
            }
            match next_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(acc)
    }
}

enum ImportOutcome {
    Created,
    Updated,
    Skipped,
}

/// Merge an incoming unit into an existing one: newer content wins, tags
/// union, importance keeps the maximum.
fn merge_units(existing: MemoryUnit, incoming: &MemoryUnit) -> MemoryUnit {
    let mut merged = if incoming.updated_at >= existing.updated_at {
        incoming.clone()
    } else {
        existing.clone()
    };
    merged.importance = existing.importance.max(incoming.importance);
    for tag in existing.tags.iter().chain(incoming.tags.iter()) {
        if !merged.tags.contains(tag) {
            merged.tags.push(tag.clone());
        }
    }
    merged.created_at = existing.created_at.min(incoming.created_at);
    merged.updated_at = Utc::now();
    merged
}

fn parse_memory(record: &PointRecord) -> Result<MemoryUnit, StorageError> {
    serde_json::from_value(record.payload.clone())
        .map_err(|e| StorageError::Backend(format!("malformed memory payload: {e}")))
}
