//! Storage backends for indexed chunk vectors.
//!
//! A backend owns named collections. Each collection has one fixed vector
//! dimension and uses cosine similarity. Backends store whatever vectors they
//! are handed; embedding and id assignment live in [`crate::store::VectorIndex`].

pub mod memory;
pub mod qdrant;

use crate::chunking::Chunk;
use crate::error::{RagError, Result};
use log::info;

pub use memory::MemoryBackend;
pub use qdrant::{QdrantBackend, QdrantConfig};

/// The persisted form of a chunk
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVector {
    pub id: u64,
    pub vector: Vec<f32>,
    pub payload: Chunk,
}

/// A stored chunk together with its similarity to a query vector
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: u64,
    pub score: f32,
    pub payload: Chunk,
}

/// Collection lifecycle, storage and similarity search
#[allow(async_fn_in_trait)]
pub trait VectorBackend {
    /// Dimension of an existing collection, or `None` when it is absent
    async fn collection_dimension(&self, name: &str) -> Result<Option<usize>>;

    /// Create a cosine collection; the caller has checked that it is absent
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()>;

    /// Create the collection if absent, otherwise verify its dimension
    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()> {
        match self.collection_dimension(name).await? {
            Some(existing) if existing == dimension => Ok(()),
            Some(existing) => Err(RagError::DimensionMismatch {
                collection: name.to_string(),
                expected: existing,
                actual: dimension,
            }),
            None => {
                self.create_collection(name, dimension).await?;
                info!("Created collection {} (dimension {})", name, dimension);
                Ok(())
            }
        }
    }

    /// Insert or overwrite points by id; all points become visible together
    async fn upsert(&self, name: &str, points: Vec<IndexedVector>) -> Result<()>;

    /// Up to `limit` points ordered by descending score, ties by ascending id
    async fn search(&self, name: &str, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>>;

    /// Remove every point whose metadata source equals `source`
    async fn delete_by_source(&self, name: &str, source: &str) -> Result<()>;

    /// Number of stored points
    async fn count(&self, name: &str) -> Result<usize>;

    /// Highest id currently stored, if any
    async fn max_id(&self, name: &str) -> Result<Option<u64>>;
}

/// Sort hits by descending score, breaking ties by insertion order
///
/// NaN scores rank below every real score.
pub(crate) fn rank(points: &mut [ScoredPoint]) {
    fn key(point: &ScoredPoint) -> f32 {
        if point.score.is_nan() {
            f32::NEG_INFINITY
        } else {
            point.score
        }
    }

    points.sort_by(|a, b| key(b).total_cmp(&key(a)).then(a.id.cmp(&b.id)));
}

impl<T: VectorBackend> VectorBackend for &T {
    async fn collection_dimension(&self, name: &str) -> Result<Option<usize>> {
        (**self).collection_dimension(name).await
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        (**self).create_collection(name, dimension).await
    }

    async fn upsert(&self, name: &str, points: Vec<IndexedVector>) -> Result<()> {
        (**self).upsert(name, points).await
    }

    async fn search(&self, name: &str, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        (**self).search(name, vector, limit).await
    }

    async fn delete_by_source(&self, name: &str, source: &str) -> Result<()> {
        (**self).delete_by_source(name, source).await
    }

    async fn count(&self, name: &str) -> Result<usize> {
        (**self).count(name).await
    }

    async fn max_id(&self, name: &str) -> Result<Option<u64>> {
        (**self).max_id(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkMetadata;

    fn hit(id: u64, score: f32) -> ScoredPoint {
        ScoredPoint {
            id,
            score,
            payload: Chunk {
                text: format!("chunk {}", id),
                metadata: ChunkMetadata {
                    source: "a.txt".to_string(),
                    chunk_index: id as usize,
                },
            },
        }
    }

    #[test]
    fn test_rank_orders_by_score_then_id() {
        let mut hits = vec![hit(3, 0.5), hit(1, 0.9), hit(0, 0.5), hit(2, -0.2)];
        rank(&mut hits);
        let ids: Vec<u64> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![1, 0, 3, 2]);
    }

    #[test]
    fn test_rank_puts_nan_scores_last() {
        let mut hits = vec![hit(0, f32::NAN), hit(1, 0.5), hit(2, f32::NAN), hit(3, -1.0)];
        rank(&mut hits);
        let ids: Vec<u64> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![1, 3, 0, 2]);
    }
}
