use crate::chunking::Chunk;
use crate::error::{RagError, Result};
use log::info;
use std::fs;
use std::path::Path;

/// Write the chunk list as pretty-printed JSON, creating parent directories
pub fn save_snapshot(path: &Path, chunks: &[Chunk]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| RagError::io(parent, e))?;
    }

    let json = serde_json::to_string_pretty(chunks).map_err(|source| RagError::CorruptSnapshot {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(|e| RagError::io(path, e))?;

    info!("Saved {} chunks to {}", chunks.len(), path.display());
    Ok(())
}

/// Read a chunk list written by [`save_snapshot`]
pub fn load_snapshot(path: &Path) -> Result<Vec<Chunk>> {
    let json = fs::read_to_string(path).map_err(|e| RagError::io(path, e))?;
    serde_json::from_str(&json).map_err(|source| RagError::CorruptSnapshot {
        path: path.to_path_buf(),
        source,
    })
}
