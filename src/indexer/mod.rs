// Indexer module
// Turns documents on disk into embedded, citable records in the vector index

#[cfg(test)]
mod tests;

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::database::{ChunkMetadata, VectorStore, VectorStoreError};
use crate::embeddings::{ChunkingConfig, Embedder, EmbeddingPurpose, chunk_page};
use crate::extractor::TextExtractor;

/// Why a single document could not be ingested
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Failed to extract text: {0:#}")]
    Extraction(anyhow::Error),

    #[error("No text could be extracted")]
    NoText,

    #[error("Embedding count mismatch: expected {expected}, received {received}")]
    EmbeddingUnavailable { expected: usize, received: usize },

    #[error("Failed to add records to the index: {0}")]
    Index(#[from] VectorStoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentStatus {
    Ingested { pages: usize, chunks: usize },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentOutcome {
    pub path: PathBuf,
    pub source: String,
    pub status: DocumentStatus,
}

impl DocumentOutcome {
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self.status, DocumentStatus::Ingested { .. })
    }
}

impl fmt::Display for DocumentOutcome {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            DocumentStatus::Ingested { pages, chunks } => write!(
                f,
                "{}: {} chunks from {} pages",
                self.source, chunks, pages
            ),
            DocumentStatus::Failed { reason } => write!(f, "{}: failed ({})", self.source, reason),
        }
    }
}

/// Summary of one ingestion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionReport {
    pub documents: Vec<DocumentOutcome>,
    /// Records in the index after the run
    pub total_records: usize,
    pub index_path: PathBuf,
}

impl IngestionReport {
    #[inline]
    pub fn succeeded(&self) -> impl Iterator<Item = &DocumentOutcome> {
        self.documents.iter().filter(|outcome| outcome.is_success())
    }

    #[inline]
    pub fn failed(&self) -> impl Iterator<Item = &DocumentOutcome> {
        self.documents.iter().filter(|outcome| !outcome.is_success())
    }

    /// Chunks added by this run
    #[inline]
    pub fn chunks_added(&self) -> usize {
        self.documents
            .iter()
            .map(|outcome| match outcome.status {
                DocumentStatus::Ingested { chunks, .. } => chunks,
                DocumentStatus::Failed { .. } => 0,
            })
            .sum()
    }
}

/// Records prepared for one document, added to the index in one call
struct PreparedDocument {
    texts: Vec<String>,
    vectors: Vec<Vec<f32>>,
    metadatas: Vec<ChunkMetadata>,
    pages: usize,
}

/// Ingestion pipeline: extract, chunk, embed and index documents
pub struct Indexer<E, X> {
    embedder: E,
    extractor: X,
    chunking: ChunkingConfig,
    batch_size: usize,
    show_progress: bool,
}

impl<E, X> Indexer<E, X>
where
    E: Embedder,
    X: TextExtractor,
{
    #[inline]
    pub fn new(embedder: E, extractor: X, config: &Config) -> Self {
        Self {
            embedder,
            extractor,
            chunking: config.chunking.clone(),
            batch_size: usize::try_from(config.ollama.batch_size)
                .unwrap_or(usize::MAX)
                .max(1),
            show_progress: false,
        }
    }

    /// Show a progress bar on stderr when it is attended
    #[inline]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Ingest `paths` into the index at `index_path` and persist it once.
    ///
    /// With `clear_existing` the persisted index is deleted first, otherwise new
    /// records are appended to it. Per-document failures are reported, not returned.
    #[inline]
    pub fn ingest<P: AsRef<Path>>(
        &self,
        paths: &[P],
        index_path: &Path,
        clear_existing: bool,
    ) -> crate::Result<IngestionReport> {
        let mut store = if clear_existing {
            VectorStore::discard_persisted(index_path)?;
            VectorStore::new()
        } else {
            VectorStore::load(index_path)?
        };

        info!(
            "Ingesting {} documents into {} ({} existing records)",
            paths.len(),
            index_path.display(),
            store.len()
        );

        let documents = self.ingest_into(&mut store, paths);

        store.save(index_path)?;

        let report = IngestionReport {
            documents,
            total_records: store.len(),
            index_path: index_path.to_path_buf(),
        };

        info!(
            "Ingestion finished: {} succeeded, {} failed, {} records in index",
            report.succeeded().count(),
            report.failed().count(),
            report.total_records
        );

        Ok(report)
    }

    /// Process `paths` into an in-memory store without persisting
    #[inline]
    pub fn ingest_into<P: AsRef<Path>>(
        &self,
        store: &mut VectorStore,
        paths: &[P],
    ) -> Vec<DocumentOutcome> {
        let bar = self.progress_bar(paths.len());
        let ingested_at = Utc::now();
        let mut outcomes = Vec::with_capacity(paths.len());

        for path in paths {
            let path = path.as_ref();
            let source = source_name(path);
            bar.set_message(source.clone());
            info!("Processing {}...", path.display());

            let status = match self.index_document(store, path, &source, ingested_at) {
                Ok((pages, chunks)) => {
                    info!("Added {} chunks from {} to the index", chunks, source);
                    DocumentStatus::Ingested { pages, chunks }
                }
                Err(e) => {
                    error!("Failed to process {}: {}", path.display(), e);
                    DocumentStatus::Failed {
                        reason: e.to_string(),
                    }
                }
            };

            outcomes.push(DocumentOutcome {
                path: path.to_path_buf(),
                source,
                status,
            });
            bar.inc(1);
        }

        bar.finish_and_clear();
        outcomes
    }

    fn index_document(
        &self,
        store: &mut VectorStore,
        path: &Path,
        source: &str,
        ingested_at: DateTime<Utc>,
    ) -> Result<(usize, usize), DocumentError> {
        let prepared = self.prepare_document(path, source, ingested_at)?;
        let pages = prepared.pages;
        let chunks = prepared.texts.len();

        store.add(prepared.texts, prepared.vectors, Some(prepared.metadatas))?;

        Ok((pages, chunks))
    }

    fn prepare_document(
        &self,
        path: &Path,
        source: &str,
        ingested_at: DateTime<Utc>,
    ) -> Result<PreparedDocument, DocumentError> {
        let pages = self
            .extractor
            .extract(path)
            .map_err(DocumentError::Extraction)?;

        let mut texts = Vec::new();
        let mut metadatas = Vec::new();
        for page in &pages {
            let chunks = chunk_page(source, page.number, &page.text, &self.chunking);
            metadatas.extend(chunks.iter().map(|_| ChunkMetadata {
                source: Some(source.to_string()),
                page: page.number,
                ingested_at: Some(ingested_at),
                ..ChunkMetadata::default()
            }));
            texts.extend(chunks);
        }

        if texts.is_empty() {
            return Err(DocumentError::NoText);
        }

        debug!(
            "Split {} pages of {} into {} chunks",
            pages.len(),
            source,
            texts.len()
        );

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embeddings = self.embedder.embed_batch(batch, EmbeddingPurpose::Document);
            if embeddings.len() != batch.len() {
                warn!(
                    "Embedding batch for {} came back with {} of {} vectors",
                    source,
                    embeddings.len(),
                    batch.len()
                );
                return Err(DocumentError::EmbeddingUnavailable {
                    expected: texts.len(),
                    received: vectors.len() + embeddings.len(),
                });
            }
            vectors.extend(embeddings);
        }

        Ok(PreparedDocument {
            texts,
            vectors,
            metadatas,
            pages: pages.len(),
        })
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        let bar = if self.show_progress && console::user_attended_stderr() {
            ProgressBar::new_spinner().with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Ingesting {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };
        bar.set_length(u64::try_from(len).unwrap_or(u64::MAX));
        bar
    }
}

/// File name used as the citation source for a document
#[inline]
pub fn source_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}
