use crate::context::ContextAssembler;
use crate::database::VectorBackend;
use crate::embeddings::EmbeddingProvider;
use crate::error::Result;
use crate::store::{SearchResult, VectorIndex};
use log::debug;

/// Returned by [`RetrievalEngine::retrieve_context`] when nothing matches
pub const NO_RELEVANT_INFORMATION: &str = "No relevant information found.";

const DEFAULT_TOP_K: usize = 3;

/// RAG (Retrieval-Augmented Generation) retrieval engine
pub struct RetrievalEngine<E, B> {
    index: VectorIndex<E, B>,
    assembler: ContextAssembler,
    top_k: usize,
}

impl<E: EmbeddingProvider, B: VectorBackend> RetrievalEngine<E, B> {
    /// Create a new retrieval engine over an opened index
    pub fn new(index: VectorIndex<E, B>) -> Self {
        RetrievalEngine {
            index,
            assembler: ContextAssembler::new(),
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Default number of chunks used by [`retrieve_context`](Self::retrieve_context)
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn index(&self) -> &VectorIndex<E, B> {
        &self.index
    }

    /// Prompt-ready context for `query` using the default `top_k`
    pub async fn retrieve_context(&self, query: &str) -> Result<String> {
        self.retrieve_context_with(query, self.top_k).await
    }

    /// Prompt-ready context for `query`, or [`NO_RELEVANT_INFORMATION`]
    pub async fn retrieve_context_with(&self, query: &str, top_k: usize) -> Result<String> {
        let results = self.index.search(query, top_k).await?;
        debug!("Retrieved {} chunks for query", results.len());

        if results.is_empty() {
            return Ok(NO_RELEVANT_INFORMATION.to_string());
        }

        Ok(self.assembler.format(&results))
    }

    /// Raw ranked results with scores and metadata
    pub async fn get_relevant_chunks(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        self.index.search(query, top_k).await
    }
}
