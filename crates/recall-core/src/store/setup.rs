//! Collection bootstrap for the two logical collections.
//!
//! The memory collection carries tuned HNSW parameters plus int8 scalar
//! quantization; the call-graph collection uses lighter settings since its
//! vectors are placeholders. Payload indexes back every filtered field.

use crate::config::EngineConfig;
use crate::error::StorageError;
use crate::store::client::{CollectionSpec, HnswSpec, PayloadFieldKind, VectorClient};

/// Payload indexes for the memory collection.
pub const MEMORY_PAYLOAD_INDEXES: &[(&str, PayloadFieldKind)] = &[
    ("category", PayloadFieldKind::Keyword),
    ("context_level", PayloadFieldKind::Keyword),
    ("scope", PayloadFieldKind::Keyword),
    ("project_name", PayloadFieldKind::Keyword),
    ("importance", PayloadFieldKind::Float),
    ("tags", PayloadFieldKind::Keyword),
];

/// Payload indexes for the call-graph collection.
pub const CALL_GRAPH_PAYLOAD_INDEXES: &[(&str, PayloadFieldKind)] = &[
    ("qualified_name", PayloadFieldKind::Keyword),
    ("project_name", PayloadFieldKind::Keyword),
];

/// Creates and configures the engine's collections.
pub struct CollectionBootstrap {
    memory_collection: String,
    call_graph_collection: String,
    vector_size: usize,
}

impl CollectionBootstrap {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            memory_collection: config.qdrant_collection_name.clone(),
            call_graph_collection: config.call_graph_collection_name.clone(),
            vector_size: config.vector_size(),
        }
    }

    pub fn memory_collection_spec(&self) -> CollectionSpec {
        CollectionSpec {
            name: self.memory_collection.clone(),
            vector_size: self.vector_size,
            hnsw: Some(HnswSpec {
                m: 16,
                ef_construct: 200,
                full_scan_threshold: 2000,
            }),
            indexing_threshold: Some(10_000),
            int8_quantization: true,
        }
    }

    pub fn call_graph_collection_spec(&self) -> CollectionSpec {
        CollectionSpec {
            name: self.call_graph_collection.clone(),
            vector_size: self.vector_size,
            hnsw: Some(HnswSpec {
                m: 16,
                ef_construct: 100,
                full_scan_threshold: 1000,
            }),
            indexing_threshold: Some(5_000),
            int8_quantization: false,
        }
    }

    /// Create whichever collections are missing and (re-)assert their
    /// payload indexes. Existing collections are left untouched.
    pub async fn ensure_collections<C: VectorClient>(&self, client: &C) -> Result<(), StorageError> {
        self.ensure_one(client, &self.memory_collection_spec(), MEMORY_PAYLOAD_INDEXES)
            .await?;
        self.ensure_one(
            client,
            &self.call_graph_collection_spec(),
            CALL_GRAPH_PAYLOAD_INDEXES,
        )
        .await
    }

    async fn ensure_one<C: VectorClient>(
        &self,
        client: &C,
        spec: &CollectionSpec,
        indexes: &[(&str, PayloadFieldKind)],
    ) -> Result<(), StorageError> {
        if client.collection_exists(&spec.name).await? {
            tracing::info!(collection = %spec.name, "collection already configured");
            return Ok(());
        }

        client.create_collection(spec).await?;
        for (field, kind) in indexes {
            if let Err(e) = client.create_payload_index(&spec.name, field, *kind).await {
                // The index may already exist after a partial bootstrap.
                tracing::debug!(field, error = %e, "payload index creation failed");
            } else {
                tracing::info!(collection = %spec.name, field, "created payload index");
            }
        }
        Ok(())
    }
}
