use crate::document::Document;
use crate::embeddings::{cosine_similarity, EmbeddingProvider};
use crate::error::{RagError, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::Path;
use unicode_segmentation::UnicodeSegmentation;

/// Provenance of a chunk within its source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Path or identifier of the source document
    pub source: String,
    /// Zero-based position of the chunk within the source document
    pub chunk_index: usize,
}

/// Represents a text chunk with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// The actual text content of this chunk
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Tuning knobs for [`SemanticChunker`]
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Chunks shorter than this (in characters, after trimming) are merged with a neighbour
    pub min_characters: usize,
    /// Soft upper bound; a single sentence longer than this is kept whole
    pub max_characters: usize,
    /// Adjacent sentences less similar than this start a new chunk
    pub similarity_threshold: f32,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        ChunkerConfig {
            min_characters: 100,
            max_characters: 2000,
            similarity_threshold: 0.3,
        }
    }
}

/// Splits documents at topic shifts detected by an embedding model
///
/// The text is segmented into sentences, every sentence is embedded, and a
/// boundary is placed wherever two neighbouring sentences drift apart. Chunks
/// are contiguous slices of the input, so nothing is lost or repeated.
#[derive(Debug, Clone)]
pub struct SemanticChunker<E> {
    embedder: E,
    config: ChunkerConfig,
}

impl<E: EmbeddingProvider> SemanticChunker<E> {
    /// Create a new chunker
    pub fn new(embedder: E, config: ChunkerConfig) -> Self {
        SemanticChunker { embedder, config }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split `text` into chunks attributed to `source`
    pub async fn chunk(&self, text: &str, source: &str) -> Result<Vec<Chunk>> {
        let spans = sentence_spans(text);
        if spans.is_empty() {
            return Ok(Vec::new());
        }

        let sentences: Vec<String> = spans
            .iter()
            .map(|span| text[span.clone()].trim().to_string())
            .collect();
        let vectors = self.embedder.embed_many(&sentences).await?;
        if vectors.len() != sentences.len() {
            return Err(RagError::Embedding(format!(
                "embedder returned {} vectors for {} sentences",
                vectors.len(),
                sentences.len()
            )));
        }

        let mut groups: Vec<Range<usize>> = Vec::new();
        let mut current = spans[0].clone();

        for idx in 1..spans.len() {
            let similarity = cosine_similarity(&vectors[idx - 1], &vectors[idx]);
            let topic_shift = similarity < self.config.similarity_threshold;
            // Measured on the text the chunk would emit, gaps included
            let extended = text[current.start..spans[idx].end].trim();
            let too_long = char_count(extended) > self.config.max_characters;

            if topic_shift || too_long {
                groups.push(current);
                current = spans[idx].clone();
            } else {
                current.end = spans[idx].end;
            }
        }
        groups.push(current);

        let merged = merge_small_groups(text, groups, self.config.min_characters);
        debug!(
            "Chunked {} ({} sentences) into {} chunks",
            source,
            spans.len(),
            merged.len()
        );

        Ok(merged
            .into_iter()
            .enumerate()
            .map(|(chunk_index, range)| Chunk {
                text: text[range].trim().to_string(),
                metadata: ChunkMetadata {
                    source: source.to_string(),
                    chunk_index,
                },
            })
            .collect())
    }

    /// Read a document from disk and chunk it, using its path as the source
    pub async fn chunk_document(&self, path: &Path) -> Result<Vec<Chunk>> {
        let document = Document::from_file(path)?;
        self.chunk(&document.content, &path.display().to_string())
            .await
    }
}

/// Byte ranges of sentences covering the whole text
///
/// Whitespace-only segments are folded into the preceding sentence and the
/// first range starts at offset zero, so the ranges are contiguous.
fn sentence_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans: Vec<Range<usize>> = Vec::new();

    for (offset, segment) in text.split_sentence_bound_indices() {
        let end = offset + segment.len();
        if segment.trim().is_empty() {
            if let Some(last) = spans.last_mut() {
                last.end = end;
            }
            continue;
        }
        spans.push(offset..end);
    }

    if let Some(first) = spans.first_mut() {
        first.start = 0;
    }
    if let Some(last) = spans.last_mut() {
        last.end = text.len();
    }

    spans
}

/// Fold groups below `min_characters` into their successor; a short tail goes into its predecessor
fn merge_small_groups(
    text: &str,
    groups: Vec<Range<usize>>,
    min_characters: usize,
) -> Vec<Range<usize>> {
    let mut merged: Vec<Range<usize>> = Vec::new();
    let mut pending: Option<Range<usize>> = None;

    for group in groups {
        let range = match pending.take() {
            Some(short) => short.start..group.end,
            None => group,
        };

        if char_count(text[range.clone()].trim()) < min_characters {
            pending = Some(range);
        } else {
            merged.push(range);
        }
    }

    if let Some(rest) = pending {
        match merged.last_mut() {
            Some(last) => last.end = rest.end,
            None => merged.push(rest),
        }
    }

    merged
}

fn char_count(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;

    fn chunker(min_characters: usize, max_characters: usize) -> SemanticChunker<HashEmbedder> {
        SemanticChunker::new(
            HashEmbedder::new(1024),
            ChunkerConfig {
                min_characters,
                max_characters,
                similarity_threshold: 0.5,
            },
        )
    }

    fn non_whitespace(text: &str) -> String {
        text.chars().filter(|c| !c.is_whitespace()).collect()
    }

    const TWO_TOPICS: &str = "Cats purr softly at night. Cats purr softly at dawn. \
        Cats purr softly at noon.\n\nRockets launch loudly from the pad. \
        Rockets launch loudly from the sea.";

    #[tokio::test]
    async fn test_whitespace_only_text_has_no_chunks() {
        let chunker = chunker(10, 2000);
        assert!(chunker.chunk("", "a.txt").await.unwrap().is_empty());
        assert!(chunker.chunk(" \n\n\t ", "a.txt").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_short_document_is_single_chunk() {
        let chunker = chunker(100, 2000);
        let chunks = chunker.chunk("  Tiny note.  ", "notes/tiny.md").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Tiny note.");
        assert_eq!(chunks[0].metadata.source, "notes/tiny.md");
        assert_eq!(chunks[0].metadata.chunk_index, 0);
    }

    #[tokio::test]
    async fn test_splits_at_topic_shift() {
        let chunker = chunker(10, 2000);
        let chunks = chunker.chunk(TWO_TOPICS, "a.txt").await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.starts_with("Cats purr"));
        assert!(chunks[0].text.ends_with("noon."));
        assert!(chunks[1].text.starts_with("Rockets launch"));
        assert_eq!(chunks[1].metadata.chunk_index, 1);
    }

    #[tokio::test]
    async fn test_small_fragments_are_merged() {
        let chunker = chunker(1000, 5000);
        let chunks = chunker.chunk(TWO_TOPICS, "a.txt").await.unwrap();
        // Whole document is below the minimum, so it is the single remainder
        assert_eq!(chunks.len(), 1);
        assert_eq!(non_whitespace(&chunks[0].text), non_whitespace(TWO_TOPICS));

        let chunker = chunker_with_min(60);
        let chunks = chunker.chunk(TWO_TOPICS, "a.txt").await.unwrap();
        for chunk in &chunks {
            assert!(chunk.text.trim().chars().count() >= 60, "{:?}", chunk.text);
        }
    }

    fn chunker_with_min(min_characters: usize) -> SemanticChunker<HashEmbedder> {
        SemanticChunker::new(
            HashEmbedder::new(1024),
            ChunkerConfig {
                min_characters,
                max_characters: 2000,
                // Every sentence boundary is a topic shift
                similarity_threshold: 2.0,
            },
        )
    }

    #[tokio::test]
    async fn test_max_characters_forces_boundary() {
        let text = "Alpha beta gamma delta. ".repeat(20);
        let chunker = chunker(10, 60);
        let chunks = chunker.chunk(&text, "a.txt").await.unwrap();
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 60, "{:?}", chunk.text);
        }
    }

    #[tokio::test]
    async fn test_max_characters_counts_paragraph_gaps() {
        let text = format!("Alpha beta gamma delta.{}", "\n".repeat(20)).repeat(4);
        let chunker = SemanticChunker::new(
            HashEmbedder::new(1024),
            ChunkerConfig {
                min_characters: 0,
                max_characters: 60,
                // Cosine never drops below -1, so only size splits
                similarity_threshold: -2.0,
            },
        );
        let chunks = chunker.chunk(&text, "a.txt").await.unwrap();
        assert_eq!(chunks.len(), 4);
        for chunk in &chunks {
            assert_eq!(chunk.text, "Alpha beta gamma delta.");
        }
    }

    /// Embedder whose batch call drops the last vector
    struct LossyEmbedder(HashEmbedder);

    impl EmbeddingProvider for LossyEmbedder {
        fn model_id(&self) -> &str {
            "lossy"
        }

        fn dimension(&self) -> usize {
            self.0.dimension()
        }

        async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
            self.0.embed_one(text).await
        }

        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut vectors = self.0.embed_many(texts).await?;
            vectors.pop();
            Ok(vectors)
        }
    }

    #[tokio::test]
    async fn test_short_embedding_batch_is_an_error() {
        let chunker = SemanticChunker::new(
            LossyEmbedder(HashEmbedder::new(64)),
            ChunkerConfig::default(),
        );
        let err = chunker.chunk(TWO_TOPICS, "a.txt").await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }

    #[tokio::test]
    async fn test_content_reconstructed_exactly_once() {
        let text = format!(
            "\n\n  {}\n\nA trailing thought that stands alone!   Another one?  ",
            TWO_TOPICS
        );
        for min in [0, 10, 40, 200] {
            let chunks = chunker_with_min(min).chunk(&text, "a.txt").await.unwrap();
            let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
            assert_eq!(non_whitespace(&joined), non_whitespace(&text));
            for (idx, chunk) in chunks.iter().enumerate() {
                assert_eq!(chunk.metadata.chunk_index, idx);
                assert!(!chunk.text.trim().is_empty());
            }
        }
    }

    #[tokio::test]
    async fn test_chunking_is_deterministic() {
        let chunker = chunker(20, 2000);
        let first = chunker.chunk(TWO_TOPICS, "a.txt").await.unwrap();
        let second = chunker.chunk(TWO_TOPICS, "a.txt").await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_sentence_spans_are_contiguous() {
        let text = "  One. Two!\n\nThree?  ";
        let spans = sentence_spans(text);
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].start, 0);
        assert_eq!(spans.last().map(|s| s.end), Some(text.len()));
        for pair in spans.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }
}
