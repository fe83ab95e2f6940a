// Database module
// Flat-file vector index holding chunk text, embeddings and citation metadata


pub mod vector_store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

pub use vector_store::{SearchResult, SourceSummary, VectorStore};

/// Metadata stored alongside each chunk. Serialised as a flat mapping so that
/// older index files with arbitrary keys still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// File name of the source document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// 1-based page number for paginated documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// When the chunk was added to the index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingested_at: Option<DateTime<Utc>>,
    /// Any other keys found in the persisted mapping
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ChunkMetadata {
    #[inline]
    pub fn for_source(source: impl Into<String>, page: Option<u32>) -> Self {
        Self {
            source: Some(source.into()),
            page,
            ..Self::default()
        }
    }

    /// Label used when citing this chunk, e.g. `paper.pdf (page 3)`
    #[inline]
    pub fn citation(&self) -> String {
        let source = self.source.as_deref().unwrap_or("Unknown");
        match self.page {
            Some(page) => format!("{} (page {})", source, page),
            None => source.to_string(),
        }
    }
}

/// Borrowed view of one record in the index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexRecord<'a> {
    pub text: &'a str,
    pub vector: &'a [f32],
    pub metadata: &'a ChunkMetadata,
}

#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("Number of texts ({texts}) and embeddings ({vectors}) must match")]
    LengthMismatch { texts: usize, vectors: usize },

    #[error("Number of metadatas ({metadatas}) must match number of texts ({texts})")]
    MetadataLengthMismatch { texts: usize, metadatas: usize },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding vectors cannot be empty")]
    EmptyVector,

    #[error("Index file {path} could not be used: {message}")]
    Storage { path: PathBuf, message: String },
}

impl VectorStoreError {
    /// Whether this error rejects the caller's input rather than reporting a storage problem
    #[inline]
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Storage { .. })
    }
}
