//! Call-graph persistence over the vector store.
//!
//! One record per function node in a dedicated collection. The vector is a
//! placeholder of the configured embedding width; the payload carries the
//! typed node, its adjacency, call sites, and any interface implementations.
//! Point ids are UUIDv5 over `(project, qualified_name)`, so storing a
//! function twice rewrites its record instead of accumulating duplicates.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RecallError, StorageError};
use crate::graph::{CallGraph, CallSite, FunctionNode, InterfaceImplementation};
use crate::store::client::{ClientFactory, PointFilter, PointRecord, VectorClient};
use crate::store::pool::ConnectionPool;
use crate::store::setup::{CALL_GRAPH_PAYLOAD_INDEXES, CollectionBootstrap};

/// Scroll batch size when loading a project graph.
const LOAD_BATCH_SIZE: u32 = 100;

/// Full payload of one call-graph record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GraphPayload {
    function_node: FunctionNode,
    #[serde(default)]
    calls_to: Vec<String>,
    #[serde(default)]
    called_by: Vec<String>,
    #[serde(default)]
    call_sites: Vec<CallSite>,
    #[serde(default)]
    implementations: Vec<InterfaceImplementation>,
    project_name: String,
    /// Duplicated at the payload root for filtered lookup
    qualified_name: String,
    indexed_at: DateTime<Utc>,
}

/// Vector-store-backed persistence for [`CallGraph`] entities.
pub struct CallGraphStore<F: ClientFactory> {
    pool: Arc<ConnectionPool<F>>,
    collection: String,
    vector_size: usize,
    read_only: bool,
}

impl<F: ClientFactory> CallGraphStore<F> {
    pub fn new(
        pool: Arc<ConnectionPool<F>>,
        collection: impl Into<String>,
        vector_size: usize,
        read_only: bool,
    ) -> Self {
        Self {
            pool,
            collection: collection.into(),
            vector_size,
            read_only,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Deterministic point id for one function in one project.
    pub fn point_id(project_name: &str, qualified_name: &str) -> String {
        let key = format!("{project_name}::{qualified_name}");
        Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
    }

    fn ensure_writable(&self, operation: &str) -> Result<(), RecallError> {
        if self.read_only {
            return Err(RecallError::ReadOnly {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    fn placeholder_vector(&self) -> Vec<f32> {
        vec![0.0; self.vector_size]
    }

    /// Make sure the collection and its payload indexes exist.
    pub async fn initialize(&self, bootstrap: &CollectionBootstrap) -> Result<(), RecallError> {
        let client = self.pool.acquire().await?;
        let result = async {
            if !client.collection_exists(&self.collection).await? {
                client.create_collection(&bootstrap.call_graph_collection_spec()).await?;
                for (field, kind) in CALL_GRAPH_PAYLOAD_INDEXES {
                    if let Err(e) = client.create_payload_index(&self.collection, field, *kind).await
                    {
                        tracing::debug!(field, error = %e, "payload index creation failed");
                    }
                }
            }
            Ok::<(), StorageError>(())
        }
        .await;
        self.pool.release(&client);
        result?;
        tracing::info!(collection = %self.collection, "call graph store initialized");
        Ok(())
    }

    /// Store (or rewrite) one function node record. Re-storing a function
    /// keeps its previously stored call sites and implementations; only the
    /// node, its adjacency, and the index timestamp are replaced.
    pub async fn store_function_node(
        &self,
        node: &FunctionNode,
        project_name: &str,
        calls_to: &[String],
        called_by: &[String],
    ) -> Result<String, RecallError> {
        self.ensure_writable("store_function_node")?;

        let point_id = Self::point_id(project_name, &node.qualified_name);

        let client = self.pool.acquire().await?;
        let result = async {
            let (call_sites, implementations) = match self
                .find_record(&*client, &node.qualified_name, project_name)
                .await?
            {
                Some(existing) => {
                    let existing = parse_payload(&existing)?;
                    (existing.call_sites, existing.implementations)
                }
                None => (Vec::new(), Vec::new()),
            };

            let payload = GraphPayload {
                function_node: node.clone(),
                calls_to: calls_to.to_vec(),
                called_by: called_by.to_vec(),
                call_sites,
                implementations,
                project_name: project_name.to_string(),
                qualified_name: node.qualified_name.clone(),
                indexed_at: Utc::now(),
            };
            let record = PointRecord {
                id: point_id.clone(),
                vector: self.placeholder_vector(),
                payload: to_payload_json(&payload)?,
            };
            client
                .upsert_points(&self.collection, vec![record])
                .await
                .map_err(RecallError::from)
        }
        .await;
        self.pool.release(&client);
        result?;

        tracing::debug!(
            qualified_name = %node.qualified_name,
            point_id = %point_id,
            "stored function node"
        );
        Ok(point_id)
    }

    /// Replace the stored call sites of one function. The replacement is a
    /// full overwrite; callers amending the set must read, modify, and write
    /// the whole list. Fails with `MemoryNotFound` when the node record does
    /// not exist.
    pub async fn store_call_sites(
        &self,
        function_name: &str,
        call_sites: &[CallSite],
        project_name: &str,
    ) -> Result<(), RecallError> {
        self.ensure_writable("store_call_sites")?;

        let client = self.pool.acquire().await?;
        let result = async {
            let Some(record) = self.find_record(&*client, function_name, project_name).await? else {
                return Err(RecallError::Storage(StorageError::MemoryNotFound(
                    function_name.to_string(),
                )));
            };
            let mut payload = parse_payload(&record)?;
            payload.call_sites = call_sites.to_vec();

            let updated = PointRecord {
                id: record.id,
                vector: self.placeholder_vector(),
                payload: to_payload_json(&payload)?,
            };
            client
                .upsert_points(&self.collection, vec![updated])
                .await
                .map_err(RecallError::from)
        }
        .await;
        self.pool.release(&client);
        result?;

        tracing::debug!(
            count = call_sites.len(),
            function = function_name,
            "stored call sites"
        );
        Ok(())
    }

    /// Replace the stored implementations of an interface, creating an
    /// anchor record with a stub function node when the interface has no
    /// record yet.
    pub async fn store_implementations(
        &self,
        interface_name: &str,
        implementations: &[InterfaceImplementation],
        project_name: &str,
    ) -> Result<(), RecallError> {
        self.ensure_writable("store_implementations")?;

        let client = self.pool.acquire().await?;
        let result = async {
            let existing = self.find_record(&*client, interface_name, project_name).await?;
            let updated = match existing {
                Some(record) => {
                    let mut payload = parse_payload(&record)?;
                    payload.implementations = implementations.to_vec();
                    PointRecord {
                        id: record.id,
                        vector: self.placeholder_vector(),
                        payload: to_payload_json(&payload)?,
                    }
                }
                None => {
                    let language = implementations
                        .first()
                        .map(|i| i.language.clone())
                        .unwrap_or_else(|| "unknown".to_string());
                    let payload = GraphPayload {
                        function_node: FunctionNode {
                            name: interface_name.to_string(),
                            qualified_name: interface_name.to_string(),
                            file_path: String::new(),
                            language,
                            start_line: 0,
                            end_line: 0,
                            is_exported: true,
                            is_async: false,
                            parameters: Vec::new(),
                            return_type: None,
                        },
                        calls_to: Vec::new(),
                        called_by: Vec::new(),
                        call_sites: Vec::new(),
                        implementations: implementations.to_vec(),
                        project_name: project_name.to_string(),
                        qualified_name: interface_name.to_string(),
                        indexed_at: Utc::now(),
                    };
                    PointRecord {
                        id: Self::point_id(project_name, interface_name),
                        vector: self.placeholder_vector(),
                        payload: to_payload_json(&payload)?,
                    }
                }
            };
            client
                .upsert_points(&self.collection, vec![updated])
                .await
                .map_err(RecallError::from)
        }
        .await;
        self.pool.release(&client);
        result?;

        tracing::debug!(
            count = implementations.len(),
            interface = interface_name,
            "stored implementations"
        );
        Ok(())
    }

    /// Load the whole project graph by replaying every stored record into a
    /// fresh [`CallGraph`].
    pub async fn load_call_graph(&self, project_name: &str) -> Result<CallGraph, RecallError> {
        let client = self.pool.acquire().await?;
        let result = async {
            let mut graph = CallGraph::new();
            let filter = PointFilter::new().must("project_name", project_name);
            let mut offset: Option<String> = None;

            loop {
                let (points, next_offset) = client
                    .scroll(&self.collection, &filter, LOAD_BATCH_SIZE, offset.take())
                    .await?;
                if points.is_empty() {
                    break;
                }
                for record in points {
                    let payload = parse_payload(&record)?;
                    graph.add_function(payload.function_node);
                    for call_site in payload.call_sites {
                        graph.add_call(call_site);
                    }
                    for implementation in payload.implementations {
                        graph.add_implementation(implementation);
                    }
                }
                match next_offset {
                    Some(next) => offset = Some(next),
                    None => break,
                }
            }
            Ok::<CallGraph, RecallError>(graph)
        }
        .await;
        self.pool.release(&client);

        let graph = result?;
        let stats = graph.statistics();
        tracing::info!(
            project = project_name,
            nodes = stats.total_functions,
            calls = stats.total_calls,
            "loaded call graph"
        );
        Ok(graph)
    }

    pub async fn find_function_by_name(
        &self,
        function_name: &str,
        project_name: &str,
    ) -> Result<Option<FunctionNode>, RecallError> {
        let client = self.pool.acquire().await?;
        let result = self.find_record(&*client, function_name, project_name).await;
        self.pool.release(&client);

        match result? {
            Some(record) => Ok(Some(parse_payload(&record)?.function_node)),
            None => Ok(None),
        }
    }

    /// Call sites stored on one caller's record; empty when the record is
    /// missing.
    pub async fn call_sites_for_caller(
        &self,
        caller_function: &str,
        project_name: &str,
    ) -> Result<Vec<CallSite>, RecallError> {
        let client = self.pool.acquire().await?;
        let result = self.find_record(&*client, caller_function, project_name).await;
        self.pool.release(&client);

        match result? {
            Some(record) => Ok(parse_payload(&record)?.call_sites),
            None => Ok(Vec::new()),
        }
    }

    /// Implementations stored on an interface's anchor record, optionally
    /// filtered by project.
    pub async fn implementations(
        &self,
        interface_name: &str,
        project_name: Option<&str>,
    ) -> Result<Vec<InterfaceImplementation>, RecallError> {
        let mut filter = PointFilter::new().must("qualified_name", interface_name);
        if let Some(project) = project_name {
            filter = filter.must("project_name", project);
        }

        let client = self.pool.acquire().await?;
        let result = client.scroll(&self.collection, &filter, 1, None).await;
        self.pool.release(&client);

        let (points, _) = result?;
        match points.into_iter().next() {
            Some(record) => Ok(parse_payload(&record)?.implementations),
            None => Ok(Vec::new()),
        }
    }

    /// Remove every record for a project, returning how many went away.
    pub async fn delete_project_call_graph(&self, project_name: &str) -> Result<u64, RecallError> {
        self.ensure_writable("delete_project_call_graph")?;

        let filter = PointFilter::new().must("project_name", project_name);
        let client = self.pool.acquire().await?;
        let result = client.delete_by_filter(&self.collection, &filter).await;
        self.pool.release(&client);

        let removed = result?;
        tracing::info!(project = project_name, removed, "deleted project call graph");
        Ok(removed)
    }

    async fn find_record(
        &self,
        client: &F::Client,
        qualified_name: &str,
        project_name: &str,
    ) -> Result<Option<PointRecord>, StorageError> {
        let filter = PointFilter::new()
            .must("qualified_name", qualified_name)
            .must("project_name", project_name);
        let (points, _) = client.scroll(&self.collection, &filter, 1, None).await?;
        Ok(points.into_iter().next())
    }
}

fn to_payload_json(payload: &GraphPayload) -> Result<serde_json::Value, StorageError> {
    serde_json::to_value(payload)
        .map_err(|e| StorageError::Backend(format!("payload serialization: {e}")))
}

fn parse_payload(record: &PointRecord) -> Result<GraphPayload, StorageError> {
    serde_json::from_value(record.payload.clone())
        .map_err(|e| StorageError::Backend(format!("malformed call-graph payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_are_deterministic_per_project_and_name() {
        let a = CallGraphStore::<crate::store::qdrant::QdrantFactory>::point_id("proj", "Mod.f");
        let b = CallGraphStore::<crate::store::qdrant::QdrantFactory>::point_id("proj", "Mod.f");
        let other_project =
            CallGraphStore::<crate::store::qdrant::QdrantFactory>::point_id("other", "Mod.f");
        let other_name =
            CallGraphStore::<crate::store::qdrant::QdrantFactory>::point_id("proj", "Mod.g");

        assert_eq!(a, b);
        assert_ne!(a, other_project);
        assert_ne!(a, other_name);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn graph_payload_round_trips_through_json() {
        let payload = GraphPayload {
            function_node: FunctionNode {
                name: "run".into(),
                qualified_name: "Worker.run".into(),
                file_path: "worker.py".into(),
                language: "python".into(),
                start_line: 3,
                end_line: 9,
                is_exported: true,
                is_async: true,
                parameters: vec!["self".into()],
                return_type: None,
            },
            calls_to: vec!["helper".into()],
            called_by: vec!["main".into()],
            call_sites: vec![CallSite {
                caller_function: "Worker.run".into(),
                caller_file: "worker.py".into(),
                caller_line: 5,
                callee_function: "helper".into(),
                callee_file: None,
                call_type: crate::graph::CallType::Direct,
            }],
            implementations: Vec::new(),
            project_name: "proj".into(),
            qualified_name: "Worker.run".into(),
            indexed_at: Utc::now(),
        };

        let json = to_payload_json(&payload).expect("serializes");
        // Filterable fields sit at the payload root.
        assert_eq!(json["qualified_name"], "Worker.run");
        assert_eq!(json["project_name"], "proj");

        let record = PointRecord {
            id: "x".into(),
            vector: vec![],
            payload: json,
        };
        let parsed = parse_payload(&record).expect("parses");
        assert_eq!(parsed.function_node, payload.function_node);
        assert_eq!(parsed.call_sites, payload.call_sites);
    }

    #[test]
    fn legacy_payloads_without_optional_lists_still_parse() {
        let json = serde_json::json!({
            "function_node": {
                "name": "f",
                "qualified_name": "f",
                "file_path": "a.py",
                "language": "python",
                "start_line": 1,
                "end_line": 2,
                "is_exported": false,
                "is_async": false,
                "parameters": [],
                "return_type": null
            },
            "project_name": "proj",
            "qualified_name": "f",
            "indexed_at": Utc::now(),
        });
        let record = PointRecord {
            id: "x".into(),
            vector: vec![],
            payload: json,
        };
        let parsed = parse_payload(&record).expect("defaults fill in");
        assert!(parsed.call_sites.is_empty());
        assert!(parsed.implementations.is_empty());
    }
}
