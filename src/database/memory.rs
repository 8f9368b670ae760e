use super::{rank, IndexedVector, ScoredPoint, VectorBackend};
use crate::embeddings::cosine_similarity;
use crate::error::{RagError, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

struct Collection {
    dimension: usize,
    points: BTreeMap<u64, IndexedVector>,
}

/// In-process vector store with exact cosine search
///
/// Each handle is independent, so tests and embedders can run isolated
/// collections side by side.
#[derive(Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all collections, sorted
    pub fn collection_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.read()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .read()
            .map_err(|_| RagError::IndexUnavailable("memory index lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .write()
            .map_err(|_| RagError::IndexUnavailable("memory index lock poisoned".to_string()))
    }
}

fn missing(name: &str) -> RagError {
    RagError::Configuration(format!("collection {} does not exist", name))
}

impl VectorBackend for MemoryBackend {
    async fn collection_dimension(&self, name: &str) -> Result<Option<usize>> {
        Ok(self.read()?.get(name).map(|c| c.dimension))
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        self.write()?
            .entry(name.to_string())
            .or_insert_with(|| Collection {
                dimension,
                points: BTreeMap::new(),
            });
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<IndexedVector>) -> Result<()> {
        let mut collections = self.write()?;
        let collection = collections.get_mut(name).ok_or_else(|| missing(name))?;

        // Validate the whole batch before touching the collection
        if let Some(bad) = points
            .iter()
            .find(|p| p.vector.len() != collection.dimension)
        {
            return Err(RagError::DimensionMismatch {
                collection: name.to_string(),
                expected: collection.dimension,
                actual: bad.vector.len(),
            });
        }

        for point in points {
            collection.points.insert(point.id, point);
        }
        Ok(())
    }

    async fn search(&self, name: &str, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        let collections = self.read()?;
        let collection = collections.get(name).ok_or_else(|| missing(name))?;

        if vector.len() != collection.dimension {
            return Err(RagError::DimensionMismatch {
                collection: name.to_string(),
                expected: collection.dimension,
                actual: vector.len(),
            });
        }

        let mut hits: Vec<ScoredPoint> = collection
            .points
            .values()
            .map(|point| ScoredPoint {
                id: point.id,
                score: cosine_similarity(vector, &point.vector),
                payload: point.payload.clone(),
            })
            .collect();

        rank(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete_by_source(&self, name: &str, source: &str) -> Result<()> {
        let mut collections = self.write()?;
        let collection = collections.get_mut(name).ok_or_else(|| missing(name))?;
        collection
            .points
            .retain(|_, point| point.payload.metadata.source != source);
        Ok(())
    }

    async fn count(&self, name: &str) -> Result<usize> {
        let collections = self.read()?;
        let collection = collections.get(name).ok_or_else(|| missing(name))?;
        Ok(collection.points.len())
    }

    async fn max_id(&self, name: &str) -> Result<Option<u64>> {
        let collections = self.read()?;
        let collection = collections.get(name).ok_or_else(|| missing(name))?;
        Ok(collection.points.keys().next_back().copied())
    }
}
