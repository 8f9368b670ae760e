use crate::chunking::{Chunk, ChunkMetadata};
use crate::database::{IndexedVector, VectorBackend};
use crate::embeddings::EmbeddingProvider;
use crate::error::{RagError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// A retrieved chunk and its cosine similarity to the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

/// Chunk store bound to one embedder, one backend and one collection
///
/// Writes are serialised through an async mutex that also owns the id
/// counter. The counter starts after the highest id already in the
/// collection, so ids are never reused.
pub struct VectorIndex<E, B> {
    embedder: E,
    backend: B,
    collection: String,
    next_id: Mutex<Option<u64>>,
}

impl<E: EmbeddingProvider, B: VectorBackend> VectorIndex<E, B> {
    /// Open a handle, creating the collection with the embedder's dimension if needed
    pub async fn open(embedder: E, backend: B, collection: impl Into<String>) -> Result<Self> {
        let collection = collection.into();
        backend
            .ensure_collection(&collection, embedder.dimension())
            .await?;

        Ok(VectorIndex {
            embedder,
            backend,
            collection,
            next_id: Mutex::new(None),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Number of stored chunks
    pub async fn count(&self) -> Result<usize> {
        self.backend.count(&self.collection).await
    }

    /// Embed and append chunks; returns how many were stored
    ///
    /// Re-storing a document appends duplicates. Use
    /// [`replace_documents`](Self::replace_documents) to overwrite by source.
    pub async fn store(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut next_id = self.next_id.lock().await;
        let vectors = self.embed_chunks(chunks).await?;
        let first_id = self.reserve_ids(&mut next_id, chunks.len()).await?;
        self.upsert(first_id, chunks, vectors).await
    }

    /// Replace all previously stored chunks of every source present in `chunks`
    ///
    /// Embedding happens before anything is deleted, so an embedding failure
    /// leaves the collection untouched.
    pub async fn replace_documents(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut next_id = self.next_id.lock().await;
        let vectors = self.embed_chunks(chunks).await?;
        // Seed the counter before deleting so removed ids stay retired
        let first_id = self.reserve_ids(&mut next_id, chunks.len()).await?;

        let mut sources: Vec<&str> = Vec::new();
        for chunk in chunks {
            let source = chunk.metadata.source.as_str();
            if !sources.contains(&source) {
                sources.push(source);
            }
        }
        for source in &sources {
            debug!("Removing previous chunks of {} from {}", source, self.collection);
            self.backend
                .delete_by_source(&self.collection, source)
                .await?;
        }

        self.upsert(first_id, chunks, vectors).await
    }

    /// The `top_k` chunks most similar to `query`, best first
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed_one(query).await?;
        self.check_dimension(vector.len())?;

        let hits = self
            .backend
            .search(&self.collection, &vector, top_k)
            .await?;

        Ok(hits
            .into_iter()
            .map(|hit| SearchResult {
                text: hit.payload.text,
                metadata: hit.payload.metadata,
                score: hit.score,
            })
            .collect())
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_many(&texts).await?;

        if vectors.len() != chunks.len() {
            return Err(RagError::Embedding(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        for vector in &vectors {
            self.check_dimension(vector.len())?;
        }

        Ok(vectors)
    }

    async fn reserve_ids(&self, next_id: &mut Option<u64>, count: usize) -> Result<u64> {
        let first = match *next_id {
            Some(id) => id,
            None => self
                .backend
                .max_id(&self.collection)
                .await?
                .map_or(0, |max| max + 1),
        };
        *next_id = Some(first + count as u64);
        Ok(first)
    }

    async fn upsert(
        &self,
        first_id: u64,
        chunks: &[Chunk],
        vectors: Vec<Vec<f32>>,
    ) -> Result<usize> {
        let points: Vec<IndexedVector> = chunks
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(offset, (chunk, vector))| IndexedVector {
                id: first_id + offset as u64,
                vector,
                payload: chunk.clone(),
            })
            .collect();

        let stored = points.len();
        self.backend.upsert(&self.collection, points).await?;
        info!("Stored {} chunks in {}", stored, self.collection);

        Ok(stored)
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        let expected = self.embedder.dimension();
        if actual != expected {
            return Err(RagError::DimensionMismatch {
                collection: self.collection.clone(),
                expected,
                actual,
            });
        }
        Ok(())
    }
}
