//! End-to-end tests over an in-memory vector store: index a Python module,
//! persist its call graph, answer structural queries, and run hybrid
//! retrieval against a seeded memory corpus.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use recall_core::error::StorageError;
use recall_core::graph::extract::CallExtractor;
use recall_core::store::client::{
    ClientFactory, CollectionSpec, PayloadFieldKind, PointFilter, PointRecord, ScoredPointRecord,
    VectorClient,
};
use recall_core::{
    CallGraphStore, ConnectionPool, Embedder, EngineConfig, FusionMethod, MemoryUnit, PoolConfig,
    PythonCallExtractor, RecallError, RetrievalService, StructuralQueryService,
};

// ============================================================================
// IN-MEMORY VECTOR STORE
// ============================================================================

#[derive(Default, Debug)]
struct InMemoryStore {
    collections: Mutex<HashMap<String, HashMap<String, PointRecord>>>,
}

#[derive(Debug)]
struct InMemoryClient {
    store: Arc<InMemoryStore>,
}

impl InMemoryClient {
    fn sorted_matches(&self, collection: &str, filter: &PointFilter) -> Vec<PointRecord> {
        let collections = self.store.collections.lock().expect("store lock");
        let mut matches: Vec<PointRecord> = collections
            .get(collection)
            .map(|points| {
                points
                    .values()
                    .filter(|record| filter.matches(&record.payload))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        matches
    }
}

#[async_trait]
impl VectorClient for InMemoryClient {
    async fn list_collections(&self) -> Result<Vec<String>, StorageError> {
        let collections = self.store.collections.lock().expect("store lock");
        Ok(collections.keys().cloned().collect())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, StorageError> {
        let collections = self.store.collections.lock().expect("store lock");
        Ok(collections.contains_key(name))
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<(), StorageError> {
        let mut collections = self.store.collections.lock().expect("store lock");
        collections.entry(spec.name.clone()).or_default();
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), StorageError> {
        let mut collections = self.store.collections.lock().expect("store lock");
        collections.remove(name);
        Ok(())
    }

    async fn create_payload_index(
        &self,
        _collection: &str,
        _field: &str,
        _kind: PayloadFieldKind,
    ) -> Result<(), StorageError> {
        Ok(())
    }

    async fn upsert_points(
        &self,
        collection: &str,
        points: Vec<PointRecord>,
    ) -> Result<(), StorageError> {
        let mut collections = self.store.collections.lock().expect("store lock");
        let slot = collections.entry(collection.to_string()).or_default();
        for point in points {
            slot.insert(point.id.clone(), point);
        }
        Ok(())
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: &PointFilter,
        limit: u32,
        offset: Option<String>,
    ) -> Result<(Vec<PointRecord>, Option<String>), StorageError> {
        let matches = self.sorted_matches(collection, filter);
        let start = match offset {
            Some(offset_id) => matches
                .iter()
                .position(|record| record.id == offset_id)
                .unwrap_or(matches.len()),
            None => 0,
        };
        let end = (start + limit as usize).min(matches.len());
        let next = matches.get(end).map(|record| record.id.clone());
        Ok((matches[start..end].to_vec(), next))
    }

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        filter: Option<&PointFilter>,
        limit: u64,
    ) -> Result<Vec<ScoredPointRecord>, StorageError> {
        let empty = PointFilter::new();
        let matches = self.sorted_matches(collection, filter.unwrap_or(&empty));
        let mut scored: Vec<ScoredPointRecord> = matches
            .into_iter()
            .map(|record| {
                let score: f32 = record
                    .vector
                    .iter()
                    .zip(vector.iter())
                    .map(|(a, b)| a * b)
                    .sum();
                ScoredPointRecord {
                    id: record.id,
                    score,
                    payload: record.payload,
                }
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit as usize);
        Ok(scored)
    }

    async fn count(&self, collection: &str, filter: &PointFilter) -> Result<u64, StorageError> {
        Ok(self.sorted_matches(collection, filter).len() as u64)
    }

    async fn delete_by_filter(
        &self,
        collection: &str,
        filter: &PointFilter,
    ) -> Result<u64, StorageError> {
        let mut collections = self.store.collections.lock().expect("store lock");
        let Some(points) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = points.len();
        points.retain(|_, record| !filter.matches(&record.payload));
        Ok((before - points.len()) as u64)
    }

    fn close(&self) {}
}

struct InMemoryFactory {
    store: Arc<InMemoryStore>,
}

#[async_trait]
impl ClientFactory for InMemoryFactory {
    type Client = InMemoryClient;

    async fn connect(&self) -> Result<InMemoryClient, StorageError> {
        Ok(InMemoryClient {
            store: Arc::clone(&self.store),
        })
    }

    fn url(&self) -> &str {
        "memory://test"
    }
}

async fn make_pool() -> Arc<ConnectionPool<InMemoryFactory>> {
    let factory = InMemoryFactory {
        store: Arc::new(InMemoryStore::default()),
    };
    let config = PoolConfig {
        min_size: 1,
        max_size: 2,
        timeout: Duration::from_secs(1),
        ..PoolConfig::default()
    };
    let pool = Arc::new(ConnectionPool::new(factory, config).expect("valid pool config"));
    pool.initialize().await.expect("pool initializes");
    pool
}

// ============================================================================
// CALL GRAPH PERSISTENCE + STRUCTURAL QUERIES
// ============================================================================

const SAMPLE_SOURCE: &str = r#"def main(data):
    result = process(data)
    print(f"Result: {result}")
def process(data):
    validated = validate(data)
    return clean(validated) * 2
def validate(data):
    return helper(data) if data else 0
def helper(value):
    return abs(value)
def clean(value):
    return value
"#;

const PROJECT: &str = "sample";

async fn seeded_store(pool: &Arc<ConnectionPool<InMemoryFactory>>) -> CallGraphStore<InMemoryFactory> {
    let store = CallGraphStore::new(Arc::clone(pool), "code_call_graph", 8, false);

    let extractor = PythonCallExtractor;
    let functions = extractor.extract_functions("sample.py", SAMPLE_SOURCE);
    let calls = extractor.extract_calls("sample.py", SAMPLE_SOURCE);
    assert_eq!(functions.len(), 5);

    for function in &functions {
        let calls_to: Vec<String> = calls
            .iter()
            .filter(|c| c.caller_function == function.qualified_name)
            .map(|c| c.callee_function.clone())
            .collect();
        let called_by: Vec<String> = calls
            .iter()
            .filter(|c| c.callee_function == function.qualified_name)
            .map(|c| c.caller_function.clone())
            .collect();
        store
            .store_function_node(function, PROJECT, &calls_to, &called_by)
            .await
            .expect("stores node");
    }

    for function in &functions {
        let sites: Vec<_> = calls
            .iter()
            .filter(|c| c.caller_function == function.qualified_name)
            .cloned()
            .collect();
        store
            .store_call_sites(&function.qualified_name, &sites, PROJECT)
            .await
            .expect("stores call sites");
    }

    store
}

#[tokio::test]
async fn call_graph_round_trips_through_the_store() {
    let pool = make_pool().await;
    let store = seeded_store(&pool).await;

    let graph = store.load_call_graph(PROJECT).await.expect("loads graph");
    let stats = graph.statistics();
    assert_eq!(stats.total_functions, 5);
    // main->process, main->print, process->validate, process->clean,
    // validate->helper, helper->abs
    assert_eq!(stats.total_calls, 6);

    let callers = graph.find_callers("validate", false, 1);
    assert_eq!(callers.len(), 1);
    assert_eq!(callers[0].qualified_name, "process");

    let callees: BTreeSet<String> = graph
        .find_callees("main", false, 1)
        .into_iter()
        .map(|n| n.qualified_name)
        .collect();
    assert!(callees.contains("process"));

    let chains = graph.find_call_chain("main", "helper", 10, 5);
    assert!(chains.contains(&vec![
        "main".to_string(),
        "process".to_string(),
        "validate".to_string(),
        "helper".to_string(),
    ]));
}

#[tokio::test]
async fn storing_a_function_twice_keeps_one_record_and_its_edges() {
    let pool = make_pool().await;
    let store = seeded_store(&pool).await;

    let before = store.load_call_graph(PROJECT).await.expect("loads graph");
    let calls_before = before.statistics().total_calls;

    let node = store
        .find_function_by_name("validate", PROJECT)
        .await
        .expect("lookup works")
        .expect("validate exists");
    let first_id = store
        .store_function_node(&node, PROJECT, &[], &[])
        .await
        .expect("re-store");
    let second_id = store
        .store_function_node(&node, PROJECT, &[], &[])
        .await
        .expect("re-store again");
    assert_eq!(first_id, second_id);

    // Re-storing the node neither duplicates the record nor drops the call
    // sites previously stored on it.
    let graph = store.load_call_graph(PROJECT).await.expect("loads graph");
    assert_eq!(graph.statistics().total_functions, 5);
    assert_eq!(graph.statistics().total_calls, calls_before);

    let sites = store
        .call_sites_for_caller("validate", PROJECT)
        .await
        .expect("call sites survive the rewrite");
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0].callee_function, "helper");

    let callers = graph.find_callers("helper", false, 1);
    assert_eq!(callers.len(), 1);
    assert_eq!(callers[0].qualified_name, "validate");
}

#[tokio::test]
async fn call_sites_require_an_existing_node() {
    let pool = make_pool().await;
    let store = CallGraphStore::new(Arc::clone(&pool), "code_call_graph", 8, false);

    let err = store
        .store_call_sites("ghost", &[], PROJECT)
        .await
        .expect_err("missing node");
    assert!(matches!(
        err,
        RecallError::Storage(StorageError::MemoryNotFound(name)) if name == "ghost"
    ));
}

#[tokio::test]
async fn structural_queries_produce_envelopes() {
    let pool = make_pool().await;
    let store = Arc::new(seeded_store(&pool).await);
    let queries = StructuralQueryService::new(Arc::clone(&store), PROJECT);

    let callers = queries
        .find_callers("validate", None, false, 1, 50)
        .await
        .expect("find_callers");
    assert_eq!(callers.function, "validate");
    assert_eq!(callers.project, PROJECT);
    assert_eq!(callers.total_callers, 1);
    assert_eq!(callers.direct_callers, 1);
    assert_eq!(callers.indirect_callers, 0);
    assert_eq!(callers.callers[0].caller_function, "process");
    assert_eq!(callers.callers[0].caller_line, 5);
    assert!(callers.analysis_time_ms >= 0.0);

    let callees = queries
        .find_callees("main", None, true, 5, 50)
        .await
        .expect("find_callees");
    let names: BTreeSet<&str> = callees
        .callees
        .iter()
        .map(|c| c.callee_function.as_str())
        .collect();
    assert!(names.contains("process"));
    // Transitive callees arrive as synthesized indirect entries.
    assert!(callees
        .callees
        .iter()
        .any(|c| c.callee_function == "helper" && c.call_site_line == 0));
    assert_eq!(
        callees.total_callees,
        callees.direct_callees + callees.indirect_callees
    );

    let chain = queries
        .get_call_chain("main", "helper", None, 5, 10)
        .await
        .expect("get_call_chain");
    assert_eq!(chain.total_paths, 1);
    assert_eq!(chain.shortest_path_length, 4);
    assert_eq!(chain.longest_path_length, 4);
    let detail = &chain.paths[0];
    assert_eq!(detail.path, vec!["main", "process", "validate", "helper"]);
    assert_eq!(detail.call_details.len(), 3);
    assert_eq!(detail.call_details[0].caller, "main");
    assert_eq!(detail.call_details[0].callee, "process");
    assert_eq!(detail.call_details[0].line, 2);
}

#[tokio::test]
async fn implementations_store_and_query() {
    let pool = make_pool().await;
    let store = Arc::new(seeded_store(&pool).await);

    let source = "import abc\n\nclass SqlStore(Storage):\n    def get(self):\n        pass\n";
    let extractor = PythonCallExtractor;
    let implementations = extractor.extract_implementations("store.py", source);
    assert_eq!(implementations.len(), 1);

    store
        .store_implementations("Storage", &implementations, PROJECT)
        .await
        .expect("stores implementations via anchor record");

    let queries = StructuralQueryService::new(Arc::clone(&store), PROJECT);
    let response = queries
        .find_implementations("Storage", None, None, 50)
        .await
        .expect("find_implementations");
    assert_eq!(response.total_implementations, 1);
    assert_eq!(response.implementations[0].class_name, "SqlStore");
    assert_eq!(response.implementations[0].method_count, 1);
    assert_eq!(response.languages, vec!["python"]);

    // Case-insensitive language filter.
    let filtered = queries
        .find_implementations("Storage", None, Some("PYTHON"), 50)
        .await
        .expect("filtered");
    assert_eq!(filtered.total_implementations, 1);
    let none = queries
        .find_implementations("Storage", None, Some("rust"), 50)
        .await
        .expect("filtered out");
    assert_eq!(none.total_implementations, 0);
}

#[tokio::test]
async fn deleting_a_project_removes_its_records() {
    let pool = make_pool().await;
    let store = seeded_store(&pool).await;

    let removed = store
        .delete_project_call_graph(PROJECT)
        .await
        .expect("delete");
    assert_eq!(removed, 5);

    let graph = store.load_call_graph(PROJECT).await.expect("loads empty");
    assert_eq!(graph.statistics().total_functions, 0);
}

#[tokio::test]
async fn read_only_mode_rejects_writes() {
    let pool = make_pool().await;
    let seeded = seeded_store(&pool).await;
    let node = seeded
        .find_function_by_name("main", PROJECT)
        .await
        .expect("lookup")
        .expect("exists");

    let read_only = CallGraphStore::new(Arc::clone(&pool), "code_call_graph", 8, true);
    let err = read_only
        .store_function_node(&node, PROJECT, &[], &[])
        .await
        .expect_err("rejected");
    assert!(matches!(err, RecallError::ReadOnly { .. }));

    let err = read_only
        .delete_project_call_graph(PROJECT)
        .await
        .expect_err("rejected");
    assert!(matches!(err, RecallError::ReadOnly { .. }));

    // Reads still work.
    assert!(read_only.load_call_graph(PROJECT).await.is_ok());
}

// ============================================================================
// HYBRID RETRIEVAL
// ============================================================================

struct HistogramEmbedder;

impl Embedder for HistogramEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RecallError> {
        let mut vector = vec![0.0f32; 8];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % 8] += byte as f32 / 255.0;
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        8
    }
}

fn memory(content: &str, project: &str) -> MemoryUnit {
    MemoryUnit::new(content, "fact", "project", "private")
        .expect("valid memory")
        .with_project(project)
}

#[tokio::test]
async fn hybrid_retrieve_fuses_vector_and_keyword_signals() {
    let pool = make_pool().await;
    let config = Arc::new(EngineConfig {
        qdrant_collection_name: "memories".to_string(),
        ..EngineConfig::default()
    });
    let embedder = Arc::new(HistogramEmbedder);

    // Seed the memory collection with embedded content.
    let corpus = [
        "authentication user login system",
        "database connection pool manager",
        "user authentication handler function",
        "configuration file parser",
    ];
    let client = pool.acquire().await.expect("acquire");
    let points: Vec<PointRecord> = corpus
        .iter()
        .map(|content| {
            let unit = memory(content, "proj");
            PointRecord {
                id: unit.id.clone(),
                vector: embedder.embed(content).expect("embeds"),
                payload: serde_json::to_value(&unit).expect("serializes"),
            }
        })
        .collect();
    client
        .upsert_points("memories", points)
        .await
        .expect("seeds corpus");
    pool.release(&client);

    // Cascade fusion: positive BM25 hits lead, vector results backfill.
    let service = RetrievalService::new(config, Arc::clone(&pool), embedder)
        .with_fusion_method(FusionMethod::Cascade);
    let results = service
        .hybrid_retrieve("authentication user", Some("proj"), 4)
        .await
        .expect("retrieves");

    assert_eq!(results.len(), 4);
    // The two authentication memories must outrank the unrelated ones.
    let top_two: Vec<&str> = results[..2].iter().map(|r| r.memory.content.as_str()).collect();
    assert!(top_two.iter().all(|content| content.contains("authentication")));
    assert!(results[..2].iter().all(|r| r.bm25_score > 0.0));
    assert!(results[2..].iter().all(|r| r.bm25_score == 0.0));
    for result in &results {
        assert!(result.total_score >= 0.0);
    }

    // Project filtering excludes foreign memories entirely.
    let other = service
        .hybrid_retrieve("authentication user", Some("other-project"), 4)
        .await
        .expect("retrieves nothing");
    assert!(other.is_empty());
}

#[tokio::test]
async fn hybrid_retrieve_rejects_oversize_queries() {
    let pool = make_pool().await;
    let config = Arc::new(EngineConfig::default());
    let service = RetrievalService::new(config, pool, Arc::new(HistogramEmbedder));

    let long_query = "q".repeat(1001);
    let err = service
        .hybrid_retrieve(&long_query, None, 10)
        .await
        .expect_err("rejected before any store access");
    assert!(matches!(err, RecallError::Validation(_)));

    // A single-character query is valid input.
    let results = service.hybrid_retrieve("q", None, 10).await.expect("runs");
    assert!(results.is_empty());
}

// ============================================================================
// ENGINE LIFECYCLE
// ============================================================================

#[tokio::test]
async fn engine_lifecycle_wires_everything() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = Arc::new(InMemoryStore::default());
    let factory = InMemoryFactory {
        store: Arc::clone(&store),
    };
    let config = Arc::new(EngineConfig {
        tag_db_path: dir.path().join("tags.db"),
        ..EngineConfig::default()
    });

    let engine = recall_core::Engine::initialize(
        Arc::clone(&config),
        factory,
        Arc::new(HistogramEmbedder),
        "proj",
    )
    .await
    .expect("engine initializes");

    // Bootstrap created both collections.
    {
        let collections = store.collections.lock().expect("store lock");
        assert!(collections.contains_key("memories"));
        assert!(collections.contains_key("code_call_graph"));
    }

    // The side-store is live.
    let tag = engine
        .tags()
        .get_or_create_tag("language/rust")
        .expect("tag created");
    assert_eq!(tag.level, 1);
    let generated = engine
        .collections()
        .auto_generate_collections(None)
        .expect("collections generated");
    assert!(!generated.is_empty());

    // Structural queries answer over the (empty) project graph.
    let callers = engine
        .structural()
        .find_callers("anything", None, false, 1, 10)
        .await
        .expect("empty result");
    assert_eq!(callers.total_callers, 0);

    engine.close().await;
    let err = engine.pool().acquire().await.expect_err("pool closed");
    assert!(matches!(err, StorageError::Backend(msg) if msg.contains("closed")));
}

// ============================================================================
// MEMORY PERSISTENCE, EXPORT / IMPORT
// ============================================================================

use recall_core::MemoryStore;

#[tokio::test]
async fn memory_store_round_trip_and_stats() {
    let pool = make_pool().await;
    let store = MemoryStore::new(Arc::clone(&pool), "memories", false);
    let embedder = HistogramEmbedder;

    for (content, project) in [
        ("rust ownership notes", "alpha"),
        ("python asyncio notes", "alpha"),
        ("deployment checklist", "beta"),
    ] {
        let unit = memory(content, project);
        let vector = embedder.embed(content).expect("embeds");
        store.store_memory(&unit, vector).await.expect("stores");
    }

    assert_eq!(store.count_memories(None).await.expect("counts"), 3);
    assert_eq!(store.count_memories(Some("alpha")).await.expect("counts"), 2);
    assert_eq!(
        store.get_all_projects().await.expect("projects"),
        vec!["alpha", "beta"]
    );

    let (page, _) = store
        .list_memories(Some("alpha"), Some("fact"), 10, None)
        .await
        .expect("lists");
    assert_eq!(page.len(), 2);

    let stats = store.get_project_stats("alpha").await.expect("stats");
    assert_eq!(stats.project_name, "alpha");
    assert_eq!(stats.total_memories, 2);
    assert_eq!(stats.categories.get("fact"), Some(&2));
    assert!(stats.last_indexed.is_some());

    let empty = store.get_project_stats("missing").await.expect("stats");
    assert_eq!(empty.total_memories, 0);
    assert!(empty.categories.is_empty());

    let first = store
        .list_memories(None, None, 1, None)
        .await
        .expect("first page")
        .0
        .remove(0);
    let fetched = store
        .get_memory(&first.id)
        .await
        .expect("lookup works")
        .expect("found");
    assert_eq!(fetched, first);

    assert!(store.delete_memory(&first.id).await.expect("deletes"));
    assert!(!store.delete_memory(&first.id).await.expect("second delete is a no-op"));
    assert_eq!(store.count_memories(None).await.expect("counts"), 2);
}

#[tokio::test]
async fn import_honors_conflict_modes() {
    let pool = make_pool().await;
    let store = MemoryStore::new(Arc::clone(&pool), "memories", false);
    let embedder = HistogramEmbedder;

    // Seed one existing memory that the import collides with.
    let mut existing = memory("original content", "proj");
    existing.id = "mem_existing".to_string();
    existing.tags = vec!["old".to_string()];
    let vector = embedder.embed(&existing.content).expect("embeds");
    store.store_memory(&existing, vector).await.expect("stores");

    let mut incoming = memory("updated content", "proj");
    incoming.id = "mem_existing".to_string();
    incoming.tags = vec!["new".to_string()];
    let fresh = memory("brand new memory", "proj");

    let export = store.export_memories(Some("proj")).await.expect("exports");
    assert_eq!(export.total_count, 1);

    let snapshot = recall_core::MemoryExport {
        version: "1.0".to_string(),
        exported_at: chrono::Utc::now(),
        total_count: 2,
        memories: vec![incoming.clone(), fresh.clone()],
    };

    // Invalid mode is rejected before any row is touched.
    let err = store
        .import_memories(&snapshot, "invalid", &embedder)
        .await
        .expect_err("rejected");
    assert!(matches!(err, RecallError::Validation(_)));
    assert_eq!(
        store
            .get_memory("mem_existing")
            .await
            .expect("lookup")
            .expect("still there")
            .content,
        "original content"
    );

    // Skip: existing rows stay untouched.
    let report = store
        .import_memories(&snapshot, "skip", &embedder)
        .await
        .expect("imports");
    assert_eq!(report.created, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.updated, 0);
    assert_eq!(report.total_processed, 2);
    assert!(report.errors.is_empty());

    // Overwrite: collisions are replaced wholesale.
    let report = store
        .import_memories(&snapshot, "overwrite", &embedder)
        .await
        .expect("imports");
    assert_eq!(report.updated, 2); // both rows now exist
    let replaced = store
        .get_memory("mem_existing")
        .await
        .expect("lookup")
        .expect("found");
    assert_eq!(replaced.content, "updated content");
    assert_eq!(replaced.tags, vec!["new"]);

    // Merge: tags union across versions.
    let mut remerge = incoming.clone();
    remerge.tags = vec!["extra".to_string()];
    remerge.updated_at = chrono::Utc::now();
    let merge_snapshot = recall_core::MemoryExport {
        version: "1.0".to_string(),
        exported_at: chrono::Utc::now(),
        total_count: 1,
        memories: vec![remerge],
    };
    let report = store
        .import_memories(&merge_snapshot, "merge", &embedder)
        .await
        .expect("imports");
    assert_eq!(report.updated, 1);
    let merged = store
        .get_memory("mem_existing")
        .await
        .expect("lookup")
        .expect("found");
    assert!(merged.tags.contains(&"extra".to_string()));
    assert!(merged.tags.contains(&"new".to_string()));
}

#[tokio::test]
async fn memory_store_read_only_and_screening() {
    let pool = make_pool().await;
    let writable = MemoryStore::new(Arc::clone(&pool), "memories", false);
    let read_only = MemoryStore::new(Arc::clone(&pool), "memories", true);
    let embedder = HistogramEmbedder;

    let unit = memory("a harmless note", "proj");
    let vector = embedder.embed(&unit.content).expect("embeds");
    let err = read_only
        .store_memory(&unit, vector.clone())
        .await
        .expect_err("read-only");
    assert!(matches!(err, RecallError::ReadOnly { .. }));

    // Injection signatures are rejected at the door.
    let hostile = memory("1 UNION SELECT password FROM users", "proj");
    let err = writable
        .store_memory(&hostile, vector)
        .await
        .expect_err("screened");
    assert!(matches!(err, RecallError::Security(_)));
}
