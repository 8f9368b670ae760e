use crate::error::{RagError, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Which embedding backend the pipeline should use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderKind {
    /// Local deterministic hashing embedder (no network)
    Hash,
    /// Gemini embedding API
    Gemini,
}

impl FromStr for EmbedderKind {
    type Err = RagError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hash" => Ok(EmbedderKind::Hash),
            "gemini" => Ok(EmbedderKind::Gemini),
            other => Err(RagError::Configuration(format!(
                "unknown embedder '{}', expected 'hash' or 'gemini'",
                other
            ))),
        }
    }
}

/// Configuration for the retrieval pipeline
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub collection: String,
    pub snapshot_path: PathBuf,
    pub min_characters: usize,
    pub max_characters: usize,
    pub similarity_threshold: f32,
    pub top_k: usize,
    pub embedder: EmbedderKind,
    pub embedding_dimension: usize,
    pub report_path: PathBuf,
    pub eval_threshold: f32,
}

impl Default for RagConfig {
    fn default() -> Self {
        RagConfig {
            collection: "document_chunks".to_string(),
            snapshot_path: PathBuf::from("knowledge/chunks.json"),
            min_characters: 100,
            max_characters: 2000,
            similarity_threshold: 0.3,
            top_k: 3,
            embedder: EmbedderKind::Hash,
            embedding_dimension: 384,
            report_path: PathBuf::from("report.md"),
            eval_threshold: 0.7,
        }
    }
}

impl RagConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = RagConfig::default();

        let config = RagConfig {
            collection: lookup("RAG_COLLECTION").unwrap_or(defaults.collection),
            snapshot_path: lookup("RAG_SNAPSHOT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.snapshot_path),
            min_characters: parse_var(&lookup, "RAG_MIN_CHARACTERS", defaults.min_characters)?,
            max_characters: parse_var(&lookup, "RAG_MAX_CHARACTERS", defaults.max_characters)?,
            similarity_threshold: parse_var(
                &lookup,
                "RAG_SIMILARITY_THRESHOLD",
                defaults.similarity_threshold,
            )?,
            top_k: parse_var(&lookup, "RAG_TOP_K", defaults.top_k)?,
            embedder: parse_var(&lookup, "RAG_EMBEDDER", defaults.embedder)?,
            embedding_dimension: parse_var(
                &lookup,
                "RAG_EMBEDDING_DIMENSION",
                defaults.embedding_dimension,
            )?,
            report_path: lookup("RAG_REPORT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.report_path),
            eval_threshold: parse_var(&lookup, "RAG_EVAL_THRESHOLD", defaults.eval_threshold)?,
        };

        if config.collection.trim().is_empty() {
            return Err(RagError::Configuration(
                "RAG_COLLECTION must not be empty".to_string(),
            ));
        }
        if config.embedding_dimension == 0 {
            return Err(RagError::Configuration(
                "RAG_EMBEDDING_DIMENSION must be positive".to_string(),
            ));
        }
        if config.top_k == 0 {
            return Err(RagError::Configuration(
                "RAG_TOP_K must be positive".to_string(),
            ));
        }

        Ok(config)
    }
}

/// Parse an optional variable, falling back to `default` when it is unset
pub(crate) fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| {
            RagError::Configuration(format!("invalid value '{}' for {}: {}", raw, key, e))
        }),
    }
}
