pub mod chunking;
pub mod config;
pub mod context;
pub mod crew;
pub mod database;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod evaluation;
pub mod gemini;
pub mod ingest;
pub mod rag;
pub mod snapshot;
pub mod store;

pub use error::{RagError, Result};
