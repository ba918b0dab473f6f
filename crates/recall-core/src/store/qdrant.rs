//! Qdrant-backed implementation of the vector client seam.
//!
//! Point and filter conversion happens here and nowhere else; callers see
//! only [`PointRecord`]s with JSON payloads.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, value::Kind, Condition, CountPointsBuilder,
    CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder, Distance,
    FieldType, Filter, HnswConfigDiff, ListValue, OptimizersConfigDiff, PointId, PointStruct,
    QuantizationType, ScalarQuantization, ScrollPointsBuilder,
    SearchPointsBuilder, Struct, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};

use crate::config::EngineConfig;
use crate::error::StorageError;
use crate::store::client::{
    ClientFactory, CollectionSpec, PayloadFieldKind, PointFilter, PointRecord, ScoredPointRecord,
    VectorClient,
};

/// Per-attempt client timeout.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// One gRPC connection to Qdrant.
pub struct QdrantTransport {
    client: Qdrant,
    url: String,
}

impl QdrantTransport {
    /// Build a client and probe it with a collection listing, so a returned
    /// transport is known to be reachable.
    pub async fn connect(
        url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        let connection_error = |reason: String| StorageError::Connection {
            url: url.to_string(),
            reason,
        };

        let mut builder = Qdrant::from_url(url).timeout(timeout);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder.build().map_err(|e| connection_error(e.to_string()))?;

        client
            .list_collections()
            .await
            .map_err(|e| connection_error(e.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn backend_error(&self, e: qdrant_client::QdrantError) -> StorageError {
        StorageError::Backend(format!("{} ({})", e, self.url))
    }
}

#[async_trait]
impl VectorClient for QdrantTransport {
    async fn list_collections(&self) -> Result<Vec<String>, StorageError> {
        let response = self
            .client
            .list_collections()
            .await
            .map_err(|e| self.backend_error(e))?;
        Ok(response
            .collections
            .into_iter()
            .map(|collection| collection.name)
            .collect())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, StorageError> {
        self.client
            .collection_exists(name)
            .await
            .map_err(|e| self.backend_error(e))
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<(), StorageError> {
        let mut builder = CreateCollectionBuilder::new(spec.name.clone()).vectors_config(
            VectorParamsBuilder::new(spec.vector_size as u64, Distance::Cosine),
        );

        if let Some(hnsw) = spec.hnsw {
            builder = builder.hnsw_config(HnswConfigDiff {
                m: Some(hnsw.m),
                ef_construct: Some(hnsw.ef_construct),
                full_scan_threshold: Some(hnsw.full_scan_threshold),
                ..Default::default()
            });
        }
        if let Some(indexing_threshold) = spec.indexing_threshold {
            builder = builder.optimizers_config(OptimizersConfigDiff {
                indexing_threshold: Some(indexing_threshold),
                ..Default::default()
            });
        }
        if spec.int8_quantization {
            builder = builder.quantization_config(ScalarQuantization {
                r#type: QuantizationType::Int8.into(),
                quantile: Some(0.99),
                always_ram: Some(true),
            });
        }

        self.client
            .create_collection(builder)
            .await
            .map_err(|e| self.backend_error(e))?;
        tracing::info!(collection = %spec.name, "collection created");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), StorageError> {
        self.client
            .delete_collection(name)
            .await
            .map_err(|e| self.backend_error(e))?;
        Ok(())
    }

    async fn create_payload_index(
        &self,
        collection: &str,
        field: &str,
        kind: PayloadFieldKind,
    ) -> Result<(), StorageError> {
        let field_type = match kind {
            PayloadFieldKind::Keyword => FieldType::Keyword,
            PayloadFieldKind::Float => FieldType::Float,
        };
        self.client
            .create_field_index(CreateFieldIndexCollectionBuilder::new(
                collection, field, field_type,
            ))
            .await
            .map_err(|e| self.backend_error(e))?;
        Ok(())
    }

    async fn upsert_points(
        &self,
        collection: &str,
        points: Vec<PointRecord>,
    ) -> Result<(), StorageError> {
        let mut qdrant_points = Vec::with_capacity(points.len());
        for point in points {
            let payload = Payload::try_from(point.payload)
                .map_err(|e| StorageError::Backend(format!("payload conversion: {e}")))?;
            qdrant_points.push(PointStruct::new(point.id, point.vector, payload));
        }

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, qdrant_points).wait(true))
            .await
            .map_err(|e| self.backend_error(e))?;
        Ok(())
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: &PointFilter,
        limit: u32,
        offset: Option<String>,
    ) -> Result<(Vec<PointRecord>, Option<String>), StorageError> {
        let mut builder = ScrollPointsBuilder::new(collection)
            .limit(limit)
            .with_payload(true)
            .with_vectors(false);
        if !filter.is_empty() {
            builder = builder.filter(build_filter(filter));
        }
        if let Some(offset) = offset {
            builder = builder.offset(PointId::from(offset));
        }

        let response = self
            .client
            .scroll(builder)
            .await
            .map_err(|e| self.backend_error(e))?;

        let points = response
            .result
            .into_iter()
            .map(|point| PointRecord {
                id: point.id.map(point_id_to_string).unwrap_or_default(),
                vector: Vec::new(),
                payload: payload_to_json(point.payload),
            })
            .collect();
        let next_offset = response.next_page_offset.map(point_id_to_string);
        Ok((points, next_offset))
    }

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        filter: Option<&PointFilter>,
        limit: u64,
    ) -> Result<Vec<ScoredPointRecord>, StorageError> {
        let mut builder = SearchPointsBuilder::new(collection, vector, limit).with_payload(true);
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            builder = builder.filter(build_filter(filter));
        }

        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| self.backend_error(e))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| ScoredPointRecord {
                id: point.id.map(point_id_to_string).unwrap_or_default(),
                score: point.score,
                payload: payload_to_json(point.payload),
            })
            .collect())
    }

    async fn count(&self, collection: &str, filter: &PointFilter) -> Result<u64, StorageError> {
        let mut builder = CountPointsBuilder::new(collection).exact(true);
        if !filter.is_empty() {
            builder = builder.filter(build_filter(filter));
        }
        let response = self
            .client
            .count(builder)
            .await
            .map_err(|e| self.backend_error(e))?;
        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    async fn delete_by_filter(
        &self,
        collection: &str,
        filter: &PointFilter,
    ) -> Result<u64, StorageError> {
        let removed = self.count(collection, filter).await?;
        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(build_filter(filter))
                    .wait(true),
            )
            .await
            .map_err(|e| self.backend_error(e))?;
        Ok(removed)
    }

    fn close(&self) {
        // Dropping the client tears down the gRPC channel; nothing to do
        // eagerly.
    }
}

fn build_filter(filter: &PointFilter) -> Filter {
    Filter::must(
        filter
            .must
            .iter()
            .map(|(field, value)| Condition::matches(field.clone(), value.clone())),
    )
}

fn point_id_to_string(id: PointId) -> String {
    match id.point_id_options {
        Some(PointIdOptions::Uuid(uuid)) => uuid,
        Some(PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}

fn payload_to_json(payload: HashMap<String, QdrantValue>) -> serde_json::Value {
    serde_json::Value::Object(
        payload
            .into_iter()
            .map(|(key, value)| (key, qdrant_value_to_json(value)))
            .collect(),
    )
}

fn qdrant_value_to_json(value: QdrantValue) -> serde_json::Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(i),
        Some(Kind::DoubleValue(f)) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(ListValue { values })) => {
            serde_json::Value::Array(values.into_iter().map(qdrant_value_to_json).collect())
        }
        Some(Kind::StructValue(Struct { fields })) => payload_to_json(fields),
    }
}

/// Factory producing [`QdrantTransport`] clients for the pool.
pub struct QdrantFactory {
    url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl QdrantFactory {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            url: url.into(),
            api_key,
            timeout: CLIENT_TIMEOUT,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.qdrant_url.clone(), config.qdrant_api_key.clone())
    }
}

#[async_trait]
impl ClientFactory for QdrantFactory {
    type Client = QdrantTransport;

    async fn connect(&self) -> Result<Self::Client, StorageError> {
        QdrantTransport::connect(&self.url, self.api_key.clone(), self.timeout).await
    }

    fn url(&self) -> &str {
        &self.url
    }
}
