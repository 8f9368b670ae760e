use super::{rank, IndexedVector, ScoredPoint, VectorBackend};
use crate::chunking::{Chunk, ChunkMetadata};
use crate::error::{RagError, Result};
use log::debug;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    PointId, PointStruct, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value,
    VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use serde_json::json;
use std::collections::HashMap;
use std::env;

const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
const SCROLL_PAGE_SIZE: u32 = 1024;

/// Configuration for Qdrant
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
}

impl QdrantConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("QDRANT_URL").unwrap_or_else(|| DEFAULT_QDRANT_URL.to_string());
        let api_key = lookup("QDRANT_API_KEY").filter(|key| !key.is_empty());

        QdrantConfig { url, api_key }
    }
}

/// Vector backend on a Qdrant server
pub struct QdrantBackend {
    client: Qdrant,
}

impl QdrantBackend {
    /// Create a new Qdrant client
    pub fn new(config: QdrantConfig) -> Result<Self> {
        let config_builder = Qdrant::from_url(&config.url);
        let config_builder = if let Some(api_key) = config.api_key {
            config_builder.api_key(api_key)
        } else {
            config_builder
        };

        let client = config_builder
            .build()
            .map_err(|e| unavailable(format!("failed to connect to {}", config.url), e))?;

        Ok(QdrantBackend { client })
    }
}

fn unavailable(context: String, error: QdrantError) -> RagError {
    RagError::IndexUnavailable(format!("{}: {}", context, error))
}

impl VectorBackend for QdrantBackend {
    async fn collection_dimension(&self, name: &str) -> Result<Option<usize>> {
        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(|e| unavailable(format!("failed to check collection {}", name), e))?;
        if !exists {
            return Ok(None);
        }

        let info = self
            .client
            .collection_info(name)
            .await
            .map_err(|e| unavailable(format!("failed to describe collection {}", name), e))?;

        let vectors_config = info
            .result
            .and_then(|info| info.config)
            .and_then(|config| config.params)
            .and_then(|params| params.vectors_config)
            .and_then(|vectors| vectors.config);

        match vectors_config {
            Some(VectorsConfigKind::Params(params)) => Ok(Some(params.size as usize)),
            Some(VectorsConfigKind::ParamsMap(_)) => Err(RagError::Configuration(format!(
                "collection {} uses named vectors, expected a single unnamed vector",
                name
            ))),
            None => Err(RagError::IndexUnavailable(format!(
                "collection {} reported no vector configuration",
                name
            ))),
        }
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let create_collection = CreateCollectionBuilder::new(name)
            .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine));

        self.client
            .create_collection(create_collection)
            .await
            .map_err(|e| unavailable(format!("failed to create collection {}", name), e))?;

        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<IndexedVector>) -> Result<()> {
        let points: Vec<PointStruct> = points
            .into_iter()
            .map(|point| {
                let payload = chunk_to_payload(&point.payload)?;
                Ok(PointStruct::new(point.id, point.vector, payload))
            })
            .collect::<Result<_>>()?;

        debug!("Upserting {} points into {}", points.len(), name);

        // A single request with wait=true is applied as one operation
        self.client
            .upsert_points(UpsertPointsBuilder::new(name, points).wait(true))
            .await
            .map_err(|e| unavailable(format!("failed to upsert points in collection {}", name), e))?;

        Ok(())
    }

    async fn search(&self, name: &str, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        let search_response = self
            .client
            .search_points(
                SearchPointsBuilder::new(name, vector.to_vec(), limit as u64).with_payload(true),
            )
            .await
            .map_err(|e| unavailable(format!("failed to search collection {}", name), e))?;

        let mut hits = search_response
            .result
            .into_iter()
            .map(|scored_point| {
                let id = point_id_num(scored_point.id).ok_or_else(|| {
                    RagError::IndexUnavailable(format!("point in {} has a non-numeric id", name))
                })?;
                Ok(ScoredPoint {
                    id,
                    score: scored_point.score,
                    payload: payload_to_chunk(&scored_point.payload)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // Qdrant does not promise an order among equal scores
        rank(&mut hits);
        Ok(hits)
    }

    async fn delete_by_source(&self, name: &str, source: &str) -> Result<()> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(name)
                    .points(Filter::must([Condition::matches(
                        "metadata.source",
                        source.to_string(),
                    )]))
                    .wait(true),
            )
            .await
            .map_err(|e| unavailable(format!("failed to delete {} from {}", source, name), e))?;

        Ok(())
    }

    async fn count(&self, name: &str) -> Result<usize> {
        let response = self
            .client
            .count(CountPointsBuilder::new(name).exact(true))
            .await
            .map_err(|e| unavailable(format!("failed to count collection {}", name), e))?;

        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    async fn max_id(&self, name: &str) -> Result<Option<u64>> {
        let mut max_id: Option<u64> = None;
        let mut offset: Option<PointId> = None;

        loop {
            let mut request = ScrollPointsBuilder::new(name)
                .limit(SCROLL_PAGE_SIZE)
                .with_payload(false)
                .with_vectors(false);
            if let Some(offset) = offset.take() {
                request = request.offset(offset);
            }

            let page = self
                .client
                .scroll(request)
                .await
                .map_err(|e| unavailable(format!("failed to scroll collection {}", name), e))?;

            for point in page.result {
                if let Some(id) = point_id_num(point.id) {
                    max_id = Some(max_id.map_or(id, |current| current.max(id)));
                }
            }

            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(max_id)
    }
}

fn point_id_num(id: Option<PointId>) -> Option<u64> {
    match id.and_then(|id| id.point_id_options) {
        Some(PointIdOptions::Num(num)) => Some(num),
        _ => None,
    }
}

fn chunk_to_payload(chunk: &Chunk) -> Result<Payload> {
    Payload::try_from(json!({
        "text": chunk.text,
        "metadata": {
            "source": chunk.metadata.source,
            "chunk_index": chunk.metadata.chunk_index,
        },
    }))
    .map_err(|e| RagError::IndexUnavailable(format!("failed to build payload: {}", e)))
}

fn payload_to_chunk(payload: &HashMap<String, Value>) -> Result<Chunk> {
    let malformed = |field: &str| {
        RagError::IndexUnavailable(format!("stored point has no valid '{}' payload", field))
    };

    let text = payload
        .get("text")
        .and_then(|v| v.as_str())
        .ok_or_else(|| malformed("text"))?;
    let metadata = payload
        .get("metadata")
        .and_then(|v| match &v.kind {
            Some(Kind::StructValue(metadata)) => Some(metadata),
            _ => None,
        })
        .ok_or_else(|| malformed("metadata"))?;
    let source = metadata
        .fields
        .get("source")
        .and_then(|v| v.as_str())
        .ok_or_else(|| malformed("metadata.source"))?;
    let chunk_index = metadata
        .fields
        .get("chunk_index")
        .and_then(|v| v.as_integer())
        .filter(|idx| *idx >= 0)
        .ok_or_else(|| malformed("metadata.chunk_index"))?;

    Ok(Chunk {
        text: text.to_string(),
        metadata: ChunkMetadata {
            source: source.to_string(),
            chunk_index: chunk_index as usize,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::Struct;

    fn string_value(s: &str) -> Value {
        Value {
            kind: Some(Kind::StringValue(s.to_string())),
        }
    }

    fn integer_value(i: i64) -> Value {
        Value {
            kind: Some(Kind::IntegerValue(i)),
        }
    }

    #[test]
    fn test_config_defaults_to_local_server() {
        let config = QdrantConfig::from_lookup(|_| None);
        assert_eq!(config.url, DEFAULT_QDRANT_URL);
        assert!(config.api_key.is_none());

        let config = QdrantConfig::from_lookup(|key| match key {
            "QDRANT_URL" => Some("http://qdrant:6334".to_string()),
            "QDRANT_API_KEY" => Some("secret".to_string()),
            _ => None,
        });
        assert_eq!(config.url, "http://qdrant:6334");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_payload_to_chunk() {
        let mut fields = HashMap::new();
        fields.insert("source".to_string(), string_value("a.txt"));
        fields.insert("chunk_index".to_string(), integer_value(1));

        let mut payload = HashMap::new();
        payload.insert("text".to_string(), string_value("Bananas are yellow."));
        payload.insert(
            "metadata".to_string(),
            Value {
                kind: Some(Kind::StructValue(Struct { fields })),
            },
        );

        let chunk = payload_to_chunk(&payload).unwrap();
        assert_eq!(chunk.text, "Bananas are yellow.");
        assert_eq!(chunk.metadata.source, "a.txt");
        assert_eq!(chunk.metadata.chunk_index, 1);
    }

    #[test]
    fn test_payload_without_metadata_is_rejected() {
        let mut payload = HashMap::new();
        payload.insert("text".to_string(), string_value("orphan"));
        assert!(payload_to_chunk(&payload).is_err());
    }

    #[test]
    fn test_point_id_num() {
        assert_eq!(point_id_num(Some(PointId::from(7u64))), Some(7));
        assert_eq!(point_id_num(None), None);
    }
}
