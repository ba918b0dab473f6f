//! Tag hierarchy management and CRUD over the SQLite side-store.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{RecallError, StorageError, ValidationError};
use crate::tagging::models::Tag;

/// Hierarchical tag store backed by SQLite.
///
/// Merges and cascading deletes run in a single transaction.
pub struct TagStore {
    conn: Mutex<Connection>,
}

impl TagStore {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Private in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Self::ensure_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn ensure_tables(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tags (
                 id TEXT PRIMARY KEY,
                 name TEXT NOT NULL,
                 parent_id TEXT REFERENCES tags(id),
                 level INTEGER NOT NULL,
                 full_path TEXT NOT NULL UNIQUE,
                 created_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_tags_parent ON tags(parent_id);
             CREATE INDEX IF NOT EXISTS idx_tags_path ON tags(full_path);

             CREATE TABLE IF NOT EXISTS memory_tags (
                 memory_id TEXT NOT NULL,
                 tag_id TEXT NOT NULL,
                 confidence REAL DEFAULT 1.0,
                 auto_generated INTEGER DEFAULT 0,
                 created_at TEXT NOT NULL,
                 PRIMARY KEY (memory_id, tag_id)
             );
             CREATE INDEX IF NOT EXISTS idx_memory_tags_memory ON memory_tags(memory_id);
             CREATE INDEX IF NOT EXISTS idx_memory_tags_tag ON memory_tags(tag_id);",
        )
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Backend("tag store lock poisoned".into()))
    }

    /// Create a tag under an optional parent. Duplicate `full_path` is a
    /// storage error; an unknown parent is a validation error.
    pub fn create_tag(&self, name: &str, parent_id: Option<&str>) -> Result<Tag, RecallError> {
        let parent = match parent_id {
            Some(id) => Some(
                self.get_tag(id)?
                    .ok_or_else(|| ValidationError::ParentTagNotFound(id.to_string()))?,
            ),
            None => None,
        };

        let tag = Tag::new(name, parent.as_ref())?;

        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT INTO tags (id, name, parent_id, level, full_path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                tag.id,
                tag.name,
                tag.parent_id,
                tag.level,
                tag.full_path,
                tag.created_at,
            ],
        );
        match inserted {
            Ok(_) => Ok(tag),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::TagExists(tag.full_path).into())
            }
            Err(e) => Err(StorageError::from(e).into()),
        }
    }

    pub fn get_tag(&self, tag_id: &str) -> Result<Option<Tag>, StorageError> {
        let conn = self.lock()?;
        let tag = conn
            .query_row("SELECT * FROM tags WHERE id = ?1", params![tag_id], tag_from_row)
            .optional()?;
        Ok(tag)
    }

    pub fn get_tag_by_path(&self, full_path: &str) -> Result<Option<Tag>, StorageError> {
        let conn = self.lock()?;
        let tag = conn
            .query_row(
                "SELECT * FROM tags WHERE full_path = ?1",
                params![full_path.to_lowercase()],
                tag_from_row,
            )
            .optional()?;
        Ok(tag)
    }

    /// List tags filtered by parent or path prefix; with neither, list roots.
    pub fn list_tags(
        &self,
        parent_id: Option<&str>,
        prefix: Option<&str>,
    ) -> Result<Vec<Tag>, StorageError> {
        let conn = self.lock()?;
        let mut out = Vec::new();

        if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
            let mut stmt =
                conn.prepare("SELECT * FROM tags WHERE full_path LIKE ?1 ORDER BY full_path")?;
            let rows = stmt.query_map(params![format!("{prefix}%")], tag_from_row)?;
            for row in rows {
                out.push(row?);
            }
        } else if let Some(parent_id) = parent_id {
            let mut stmt = conn.prepare("SELECT * FROM tags WHERE parent_id = ?1 ORDER BY name")?;
            let rows = stmt.query_map(params![parent_id], tag_from_row)?;
            for row in rows {
                out.push(row?);
            }
        } else {
            let mut stmt = conn.prepare("SELECT * FROM tags WHERE parent_id IS NULL ORDER BY name")?;
            let rows = stmt.query_map([], tag_from_row)?;
            for row in rows {
                out.push(row?);
            }
        }
        Ok(out)
    }

    /// Ancestor chain ordered root -> parent, excluding the tag itself.
    pub fn get_ancestors(&self, tag_id: &str) -> Result<Vec<Tag>, StorageError> {
        let mut ancestors = Vec::new();
        let mut current = self.get_tag(tag_id)?;

        while let Some(tag) = current {
            let Some(parent_id) = tag.parent_id else { break };
            match self.get_tag(&parent_id)? {
                Some(parent) => {
                    ancestors.insert(0, parent.clone());
                    current = Some(parent);
                }
                None => break,
            }
        }
        Ok(ancestors)
    }

    /// Every tag whose path extends this tag's path.
    pub fn get_descendants(&self, tag_id: &str) -> Result<Vec<Tag>, StorageError> {
        let Some(tag) = self.get_tag(tag_id)? else {
            return Ok(Vec::new());
        };
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT * FROM tags WHERE full_path LIKE ?1 AND id != ?2 ORDER BY full_path")?;
        let rows = stmt.query_map(params![format!("{}/%", tag.full_path), tag_id], tag_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Delete a tag. Without `cascade`, a tag with descendants is refused;
    /// with it, the whole subtree and its memory associations go in one
    /// transaction.
    pub fn delete_tag(&self, tag_id: &str, cascade: bool) -> Result<(), RecallError> {
        if self.get_tag(tag_id)?.is_none() {
            return Err(ValidationError::TagNotFound(tag_id.to_string()).into());
        }
        let descendants = self.get_descendants(tag_id)?;
        if !descendants.is_empty() && !cascade {
            return Err(ValidationError::TagHasDescendants {
                count: descendants.len(),
            }
            .into());
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StorageError::from)?;
        for descendant in &descendants {
            tx.execute("DELETE FROM memory_tags WHERE tag_id = ?1", params![descendant.id])
                .map_err(StorageError::from)?;
            tx.execute("DELETE FROM tags WHERE id = ?1", params![descendant.id])
                .map_err(StorageError::from)?;
        }
        tx.execute("DELETE FROM memory_tags WHERE tag_id = ?1", params![tag_id])
            .map_err(StorageError::from)?;
        tx.execute("DELETE FROM tags WHERE id = ?1", params![tag_id])
            .map_err(StorageError::from)?;
        tx.commit().map_err(StorageError::from)?;
        Ok(())
    }

    /// Retag every memory tagged with `source` to `target` (collapsing
    /// duplicates), then delete `source`. Atomic.
    pub fn merge_tags(&self, source_id: &str, target_id: &str) -> Result<(), RecallError> {
        if self.get_tag(source_id)?.is_none() {
            return Err(ValidationError::TagNotFound(source_id.to_string()).into());
        }
        if self.get_tag(target_id)?.is_none() {
            return Err(ValidationError::TagNotFound(target_id.to_string()).into());
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StorageError::from)?;
        tx.execute(
            "UPDATE OR IGNORE memory_tags SET tag_id = ?1 WHERE tag_id = ?2",
            params![target_id, source_id],
        )
        .map_err(StorageError::from)?;
        // Rows that collided with an existing (memory, target) pair remain
        // pointing at source; drop them.
        tx.execute("DELETE FROM memory_tags WHERE tag_id = ?1", params![source_id])
            .map_err(StorageError::from)?;
        tx.execute("DELETE FROM tags WHERE id = ?1", params![source_id])
            .map_err(StorageError::from)?;
        tx.commit().map_err(StorageError::from)?;
        Ok(())
    }

    /// Upsert the (memory, tag) association.
    pub fn tag_memory(
        &self,
        memory_id: &str,
        tag_id: &str,
        confidence: f64,
        auto_generated: bool,
    ) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO memory_tags (memory_id, tag_id, confidence, auto_generated, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                memory_id,
                tag_id,
                confidence.clamp(0.0, 1.0),
                auto_generated as i64,
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    pub fn untag_memory(&self, memory_id: &str, tag_id: &str) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM memory_tags WHERE memory_id = ?1 AND tag_id = ?2",
            params![memory_id, tag_id],
        )?;
        Ok(())
    }

    /// Tags attached to a memory, ordered by path.
    pub fn get_memory_tags(&self, memory_id: &str) -> Result<Vec<Tag>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT t.* FROM tags t
             JOIN memory_tags mt ON t.id = mt.tag_id
             WHERE mt.memory_id = ?1
             ORDER BY t.full_path",
        )?;
        let rows = stmt.query_map(params![memory_id], tag_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Memory ids tagged with a given tag.
    pub fn memories_with_tag(&self, tag_id: &str) -> Result<Vec<String>, StorageError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT memory_id FROM memory_tags WHERE tag_id = ?1 ORDER BY memory_id")?;
        let rows = stmt.query_map(params![tag_id], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Walk the path segments left to right, creating whatever is missing.
    /// Calling this twice with the same path returns the same tag.
    pub fn get_or_create_tag(&self, full_path: &str) -> Result<Tag, RecallError> {
        if let Some(existing) = self.get_tag_by_path(full_path)? {
            return Ok(existing);
        }

        let segments: Vec<&str> = full_path.split('/').collect();
        let mut parent_id: Option<String> = None;

        for (idx, segment) in segments.iter().enumerate() {
            let current_path: String = segments[..=idx].join("/");
            match self.get_tag_by_path(&current_path)? {
                Some(existing) => parent_id = Some(existing.id),
                None => {
                    let created = self.create_tag(segment, parent_id.as_deref())?;
                    parent_id = Some(created.id);
                }
            }
        }

        self.get_tag_by_path(full_path)?
            .ok_or_else(|| StorageError::Backend(format!("tag vanished after creation: {full_path}")).into())
    }
}

fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get("id")?,
        name: row.get("name")?,
        parent_id: row.get("parent_id")?,
        level: row.get("level")?,
        full_path: row.get("full_path")?,
        created_at: row.get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> TagStore {
        TagStore::open_in_memory().expect("in-memory store")
    }

    #[test]
    fn create_and_fetch_round_trip() {
        let store = store();
        let tag = store.create_tag("Python", None).expect("created");
        assert_eq!(tag.name, "python");
        assert_eq!(tag.level, 0);

        let fetched = store.get_tag(&tag.id).expect("query ok").expect("found");
        assert_eq!(fetched, tag);
        let by_path = store.get_tag_by_path("PYTHON").expect("query ok").expect("found");
        assert_eq!(by_path.id, tag.id);
    }

    #[test]
    fn duplicate_full_path_is_a_storage_error() {
        let store = store();
        store.create_tag("python", None).expect("created");
        let err = store.create_tag("Python", None).expect_err("duplicate");
        assert!(matches!(
            err,
            RecallError::Storage(StorageError::TagExists(path)) if path == "python"
        ));
    }

    #[test]
    fn unknown_parent_is_a_validation_error() {
        let store = store();
        let err = store.create_tag("child", Some("missing-id")).expect_err("rejected");
        assert!(matches!(
            err,
            RecallError::Validation(ValidationError::ParentTagNotFound(_))
        ));
    }

    #[test]
    fn hierarchy_depth_is_enforced_end_to_end() {
        let store = store();
        let leaf = store
            .get_or_create_tag("a/b/c/d")
            .expect("four levels are allowed");
        assert_eq!(leaf.level, 3);

        let err = store.create_tag("e", Some(&leaf.id)).expect_err("level 4 rejected");
        assert!(matches!(
            err,
            RecallError::Validation(ValidationError::HierarchyTooDeep)
        ));
    }

    #[test]
    fn get_or_create_builds_the_chain_and_is_idempotent() {
        let store = store();
        let leaf = store.get_or_create_tag("language/python/async").expect("created");
        assert_eq!(leaf.full_path, "language/python/async");
        assert_eq!(leaf.level, 2);

        let again = store.get_or_create_tag("language/python/async").expect("idempotent");
        assert_eq!(again.id, leaf.id);

        let ancestors = store.get_ancestors(&leaf.id).expect("query ok");
        let paths: Vec<&str> = ancestors.iter().map(|t| t.full_path.as_str()).collect();
        assert_eq!(paths, vec!["language", "language/python"]);
    }

    #[test]
    fn descendants_and_cascade_delete() {
        let store = store();
        let leaf = store.get_or_create_tag("language/python/async").expect("created");
        let root = store.get_tag_by_path("language").expect("query ok").expect("found");
        store.tag_memory("m1", &leaf.id, 0.9, true).expect("tagged");

        let descendants = store.get_descendants(&root.id).expect("query ok");
        assert_eq!(descendants.len(), 2);

        let err = store.delete_tag(&root.id, false).expect_err("has children");
        assert!(matches!(
            err,
            RecallError::Validation(ValidationError::TagHasDescendants { count: 2 })
        ));

        store.delete_tag(&root.id, true).expect("cascade");
        assert!(store.get_tag_by_path("language").expect("query ok").is_none());
        assert!(store.get_tag_by_path("language/python").expect("query ok").is_none());
        assert!(store.get_tag_by_path("language/python/async").expect("query ok").is_none());
        assert!(store.get_memory_tags("m1").expect("query ok").is_empty());
    }

    #[test]
    fn merge_tags_collapses_duplicates() {
        let store = store();
        let source = store.create_tag("py", None).expect("created");
        let target = store.create_tag("python", None).expect("created");

        // m1 carries both tags, m2 only the source.
        store.tag_memory("m1", &source.id, 1.0, false).expect("tagged");
        store.tag_memory("m1", &target.id, 1.0, false).expect("tagged");
        store.tag_memory("m2", &source.id, 1.0, false).expect("tagged");

        store.merge_tags(&source.id, &target.id).expect("merged");

        assert!(store.get_tag(&source.id).expect("query ok").is_none());
        let m1_tags = store.get_memory_tags("m1").expect("query ok");
        assert_eq!(m1_tags.len(), 1);
        assert_eq!(m1_tags[0].id, target.id);
        let m2_tags = store.get_memory_tags("m2").expect("query ok");
        assert_eq!(m2_tags.len(), 1);
        assert_eq!(m2_tags[0].id, target.id);
    }

    #[test]
    fn tag_memory_upserts_by_primary_key() {
        let store = store();
        let tag = store.create_tag("rust", None).expect("created");

        store.tag_memory("m1", &tag.id, 0.5, true).expect("tagged");
        store.tag_memory("m1", &tag.id, 0.9, false).expect("re-tagged");

        assert_eq!(store.get_memory_tags("m1").expect("query ok").len(), 1);
        assert_eq!(store.memories_with_tag(&tag.id).expect("query ok"), vec!["m1"]);

        store.untag_memory("m1", &tag.id).expect("untagged");
        assert!(store.get_memory_tags("m1").expect("query ok").is_empty());
    }

    #[test]
    fn list_tags_by_parent_and_prefix() {
        let store = store();
        store.get_or_create_tag("language/python").expect("created");
        store.get_or_create_tag("language/rust").expect("created");
        store.get_or_create_tag("domain/api").expect("created");

        let roots = store.list_tags(None, None).expect("query ok");
        let root_names: Vec<&str> = roots.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(root_names, vec!["domain", "language"]);

        let language = store.get_tag_by_path("language").expect("query ok").expect("found");
        let children = store.list_tags(Some(&language.id), None).expect("query ok");
        assert_eq!(children.len(), 2);

        let prefixed = store.list_tags(None, Some("language/")).expect("query ok");
        assert_eq!(prefixed.len(), 2);
    }
}
