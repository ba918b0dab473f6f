//! Collection management for organizing memories by theme.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{RecallError, StorageError, ValidationError};
use crate::tagging::models::{Collection, FilterOp, TagFilter};

/// Default auto-generated collection patterns: name -> required tags.
pub const DEFAULT_COLLECTION_PATTERNS: &[(&str, &[&str])] = &[
    ("Python Async Patterns", &["python", "async"]),
    ("React Components", &["react", "javascript"]),
    ("Database Queries", &["database", "sql"]),
    ("API Endpoints", &["api", "endpoint"]),
    ("Testing Code", &["testing", "pytest"]),
    ("FastAPI Routes", &["fastapi", "api"]),
    ("Authentication Logic", &["auth", "login"]),
];

/// Collection store backed by SQLite.
pub struct CollectionStore {
    conn: Mutex<Connection>,
}

impl CollectionStore {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Private in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Self::ensure_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn ensure_tables(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS collections (
                 id TEXT PRIMARY KEY,
                 name TEXT NOT NULL UNIQUE,
                 description TEXT,
                 auto_generated INTEGER DEFAULT 0,
                 tag_filter TEXT,
                 created_at TEXT NOT NULL,
                 updated_at TEXT NOT NULL
             );

             CREATE TABLE IF NOT EXISTS collection_memories (
                 collection_id TEXT NOT NULL,
                 memory_id TEXT NOT NULL,
                 added_at TEXT NOT NULL,
                 PRIMARY KEY (collection_id, memory_id)
             );
             CREATE INDEX IF NOT EXISTS idx_collection_memories_collection
                 ON collection_memories(collection_id);
             CREATE INDEX IF NOT EXISTS idx_collection_memories_memory
                 ON collection_memories(memory_id);",
        )
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Backend("collection store lock poisoned".into()))
    }

    fn insert(&self, collection: &Collection) -> Result<(), RecallError> {
        let tag_filter_json = collection
            .tag_filter
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StorageError::Backend(format!("tag filter serialization: {e}")))?;

        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT INTO collections (id, name, description, auto_generated, tag_filter, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                collection.id,
                collection.name,
                collection.description,
                collection.auto_generated as i64,
                tag_filter_json,
                collection.created_at,
                collection.updated_at,
            ],
        );
        match inserted {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::CollectionExists(collection.name.clone()).into())
            }
            Err(e) => Err(StorageError::from(e).into()),
        }
    }

    /// Create a collection; names are unique.
    pub fn create_collection(
        &self,
        name: &str,
        description: Option<String>,
        tag_filter: Option<TagFilter>,
    ) -> Result<Collection, RecallError> {
        let collection = Collection::new(name, description, tag_filter)?;
        self.insert(&collection)?;
        Ok(collection)
    }

    pub fn get_collection(&self, collection_id: &str) -> Result<Option<Collection>, StorageError> {
        let conn = self.lock()?;
        let collection = conn
            .query_row(
                "SELECT * FROM collections WHERE id = ?1",
                params![collection_id],
                collection_from_row,
            )
            .optional()?;
        Ok(collection)
    }

    pub fn get_collection_by_name(&self, name: &str) -> Result<Option<Collection>, StorageError> {
        let conn = self.lock()?;
        let collection = conn
            .query_row(
                "SELECT * FROM collections WHERE name = ?1",
                params![name],
                collection_from_row,
            )
            .optional()?;
        Ok(collection)
    }

    pub fn list_collections(&self) -> Result<Vec<Collection>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT * FROM collections ORDER BY name")?;
        let rows = stmt.query_map([], collection_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Add memories to a collection and bump its `updated_at`. Memberships
    /// already present are left alone.
    pub fn add_to_collection(
        &self,
        collection_id: &str,
        memory_ids: &[String],
    ) -> Result<(), RecallError> {
        if self.get_collection(collection_id)?.is_none() {
            return Err(ValidationError::CollectionNotFound(collection_id.to_string()).into());
        }

        let conn = self.lock()?;
        let now = Utc::now();
        for memory_id in memory_ids {
            conn.execute(
                "INSERT OR IGNORE INTO collection_memories (collection_id, memory_id, added_at)
                 VALUES (?1, ?2, ?3)",
                params![collection_id, memory_id, now],
            )
            .map_err(StorageError::from)?;
        }
        conn.execute(
            "UPDATE collections SET updated_at = ?1 WHERE id = ?2",
            params![now, collection_id],
        )
        .map_err(StorageError::from)?;
        Ok(())
    }

    /// Remove memories from a collection and bump its `updated_at`.
    pub fn remove_from_collection(
        &self,
        collection_id: &str,
        memory_ids: &[String],
    ) -> Result<(), StorageError> {
        let conn = self.lock()?;
        for memory_id in memory_ids {
            conn.execute(
                "DELETE FROM collection_memories WHERE collection_id = ?1 AND memory_id = ?2",
                params![collection_id, memory_id],
            )?;
        }
        conn.execute(
            "UPDATE collections SET updated_at = ?1 WHERE id = ?2",
            params![Utc::now(), collection_id],
        )?;
        Ok(())
    }

    /// Memory ids in a collection, most recently added first.
    pub fn get_collection_memories(&self, collection_id: &str) -> Result<Vec<String>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT memory_id FROM collection_memories
             WHERE collection_id = ?1 ORDER BY added_at DESC, memory_id",
        )?;
        let rows = stmt.query_map(params![collection_id], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn delete_collection(&self, collection_id: &str) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM collection_memories WHERE collection_id = ?1",
            params![collection_id],
        )?;
        conn.execute("DELETE FROM collections WHERE id = ?1", params![collection_id])?;
        Ok(())
    }

    /// Create auto-generated collections for each (name, tags) pattern with
    /// an AND tag filter. Existing names are skipped, so reruns are no-ops.
    pub fn auto_generate_collections(
        &self,
        patterns: Option<&[(&str, &[&str])]>,
    ) -> Result<Vec<Collection>, RecallError> {
        let patterns = patterns.unwrap_or(DEFAULT_COLLECTION_PATTERNS);
        let mut generated = Vec::new();

        for (name, tags) in patterns {
            if self.get_collection_by_name(name)?.is_some() {
                continue;
            }

            let tag_filter = TagFilter {
                tags: tags.iter().map(|t| t.to_string()).collect(),
                op: FilterOp::And,
            };
            let mut collection = Collection::new(
                name,
                Some(format!(
                    "Auto-generated collection for {} patterns",
                    tags.join(", ")
                )),
                Some(tag_filter),
            )?;
            collection.auto_generated = true;

            match self.insert(&collection) {
                Ok(()) => generated.push(collection),
                // Raced with a concurrent run; the collection exists now.
                Err(RecallError::Storage(StorageError::CollectionExists(_))) => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(generated)
    }
}

fn collection_from_row(row: &Row<'_>) -> rusqlite::Result<Collection> {
    let tag_filter: Option<String> = row.get("tag_filter")?;
    let tag_filter = tag_filter.and_then(|json| serde_json::from_str::<TagFilter>(&json).ok());
    let auto_generated: i64 = row.get("auto_generated")?;
    let created_at: DateTime<Utc> = row.get("created_at")?;
    let updated_at: DateTime<Utc> = row.get("updated_at")?;
    Ok(Collection {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        auto_generated: auto_generated != 0,
        tag_filter,
        created_at,
        updated_at,
    })
}
