use crate::chunking::{Chunk, SemanticChunker};
use crate::database::VectorBackend;
use crate::document::is_supported;
use crate::embeddings::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::snapshot::{load_snapshot, save_snapshot};
use crate::store::VectorIndex;
use log::{info, warn};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A file that could not be chunked
#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: RagError,
}

/// Chunks gathered from a directory plus the files that were skipped
#[derive(Debug, Default)]
pub struct DirectoryChunks {
    pub chunks: Vec<Chunk>,
    pub failures: Vec<FileFailure>,
}

/// Outcome of [`process_documents`]
#[derive(Debug)]
pub struct IngestReport {
    /// Chunks ingested, whether freshly chunked or loaded from the snapshot
    pub chunks: usize,
    /// Chunks written to the vector index
    pub stored: usize,
    pub failures: Vec<FileFailure>,
    pub from_snapshot: bool,
}

/// Chunk every supported file under `dir` and save the result to `output`
///
/// Files are visited in file-name order. A file that cannot be read or
/// parsed is logged and recorded in `failures`; the walk continues. Embedding
/// and backend errors are not file-specific and abort the walk.
pub async fn chunk_directory<E: EmbeddingProvider>(
    chunker: &SemanticChunker<E>,
    dir: &Path,
    output: &Path,
) -> Result<DirectoryChunks> {
    if !dir.is_dir() {
        return Err(RagError::io(
            dir,
            io::Error::new(io::ErrorKind::NotFound, "not a directory"),
        ));
    }

    let mut result = DirectoryChunks::default();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
                warn!("Skipping {}: {}", path.display(), e);
                let source = io::Error::new(io::ErrorKind::Other, e.to_string());
                result.failures.push(FileFailure {
                    error: RagError::io(&path, source),
                    path,
                });
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().is_file() || !is_supported(path) {
            continue;
        }

        info!("Processing {}...", path.display());
        match chunker.chunk_document(path).await {
            Ok(chunks) => {
                info!("Added {} chunks", chunks.len());
                result.chunks.extend(chunks);
            }
            Err(error) if error.is_io() => {
                warn!("Skipping {}: {}", path.display(), error);
                result.failures.push(FileFailure {
                    path: path.to_path_buf(),
                    error,
                });
            }
            Err(error) => return Err(error),
        }
    }

    save_snapshot(output, &result.chunks)?;

    if !result.failures.is_empty() {
        warn!(
            "{} file(s) under {} could not be processed",
            result.failures.len(),
            dir.display()
        );
    }

    Ok(result)
}

/// Ingest a directory into the index, reusing the chunk snapshot when possible
///
/// Unless `force` is set, an existing non-empty snapshot is loaded instead of
/// re-chunking. A corrupt snapshot is logged and the documents are processed
/// again. Stored chunks replace earlier chunks from the same sources.
pub async fn process_documents<C, E, B>(
    chunker: &SemanticChunker<C>,
    index: &VectorIndex<E, B>,
    dir: &Path,
    snapshot_path: &Path,
    force: bool,
) -> Result<IngestReport>
where
    C: EmbeddingProvider,
    E: EmbeddingProvider,
    B: VectorBackend,
{
    let mut cached = None;

    if !force && snapshot_path.exists() {
        info!(
            "Chunks file exists at {}. Use --force to reprocess.",
            snapshot_path.display()
        );
        match load_snapshot(snapshot_path) {
            Ok(chunks) if !chunks.is_empty() => {
                info!("Loaded {} chunks from file.", chunks.len());
                cached = Some(chunks);
            }
            Ok(_) => info!("Chunks file is empty. Will reprocess documents."),
            Err(e) => warn!("{}. Will reprocess documents.", e),
        }
    }

    let (chunks, failures, from_snapshot) = match cached {
        Some(chunks) => (chunks, Vec::new(), true),
        None => {
            info!("Processing documents in {}...", dir.display());
            let result = chunk_directory(chunker, dir, snapshot_path).await?;
            (result.chunks, result.failures, false)
        }
    };

    let stored = index.replace_documents(&chunks).await?;

    Ok(IngestReport {
        chunks: chunks.len(),
        stored,
        failures,
        from_snapshot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkerConfig;
    use crate::database::MemoryBackend;
    use crate::embeddings::HashEmbedder;
    use std::fs;

    fn chunker() -> SemanticChunker<HashEmbedder> {
        SemanticChunker::new(
            HashEmbedder::new(256),
            ChunkerConfig {
                min_characters: 10,
                ..ChunkerConfig::default()
            },
        )
    }

    fn write_docs(root: &Path) {
        fs::write(root.join("a.txt"), "The sky is blue. The sky is wide.").unwrap();
        fs::write(root.join("b.md"), "# Fruit\n\nBananas are yellow and sweet.").unwrap();
        fs::write(root.join("c.pdf"), b"not really a pdf").unwrap();
        fs::write(root.join("d.png"), b"\x89PNG").unwrap();
        fs::create_dir(root.join("nested")).unwrap();
        fs::write(root.join("nested").join("e.txt"), "Rivers flow to the sea.").unwrap();
    }

    #[tokio::test]
    async fn test_chunk_directory_isolates_bad_files() {
        let docs = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_docs(docs.path());
        let snapshot = out.path().join("chunks.json");

        let result = chunk_directory(&chunker(), docs.path(), &snapshot)
            .await
            .unwrap();

        let sources: Vec<&str> = result
            .chunks
            .iter()
            .map(|c| c.metadata.source.as_str())
            .collect();
        assert!(sources[0].ends_with("a.txt"));
        assert!(sources.iter().any(|s| s.ends_with("b.md")));
        assert!(sources.last().is_some_and(|s| s.ends_with("e.txt")));
        assert!(!sources.iter().any(|s| s.ends_with("d.png")));

        assert_eq!(result.failures.len(), 1);
        assert!(result.failures[0].path.ends_with("c.pdf"));

        assert_eq!(load_snapshot(&snapshot).unwrap(), result.chunks);
    }

    #[tokio::test]
    async fn test_chunk_directory_missing_dir() {
        let out = tempfile::tempdir().unwrap();
        let err = chunk_directory(
            &chunker(),
            &out.path().join("missing"),
            &out.path().join("chunks.json"),
        )
        .await
        .unwrap_err();
        assert!(err.is_io());
    }

    #[tokio::test]
    async fn test_process_documents_reuses_snapshot() {
        let docs = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_docs(docs.path());
        let snapshot = out.path().join("chunks.json");

        let backend = MemoryBackend::new();
        let index = VectorIndex::open(HashEmbedder::new(384), &backend, "docs")
            .await
            .unwrap();

        let first = process_documents(&chunker(), &index, docs.path(), &snapshot, false)
            .await
            .unwrap();
        assert!(!first.from_snapshot);
        assert_eq!(first.failures.len(), 1);
        assert_eq!(first.stored, first.chunks);
        assert!(first.chunks > 0);

        let second = process_documents(&chunker(), &index, docs.path(), &snapshot, false)
            .await
            .unwrap();
        assert!(second.from_snapshot);
        assert_eq!(second.chunks, first.chunks);
        // Replace-by-source keeps re-ingestion from duplicating
        assert_eq!(index.count().await.unwrap(), first.chunks);

        let forced = process_documents(&chunker(), &index, docs.path(), &snapshot, true)
            .await
            .unwrap();
        assert!(!forced.from_snapshot);
        assert_eq!(index.count().await.unwrap(), first.chunks);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_falls_back_to_reprocessing() {
        let docs = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_docs(docs.path());
        let snapshot = out.path().join("chunks.json");
        fs::write(&snapshot, "{ not json").unwrap();

        let backend = MemoryBackend::new();
        let index = VectorIndex::open(HashEmbedder::new(384), &backend, "docs")
            .await
            .unwrap();

        let report = process_documents(&chunker(), &index, docs.path(), &snapshot, false)
            .await
            .unwrap();
        assert!(!report.from_snapshot);
        assert!(report.chunks > 0);
        assert_eq!(load_snapshot(&snapshot).unwrap().len(), report.chunks);
    }
}
