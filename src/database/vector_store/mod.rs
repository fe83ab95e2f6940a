
use super::{ChunkMetadata, IndexRecord, VectorStoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// In-memory vector index with brute-force cosine similarity search.
///
/// Records are kept as three parallel sequences which always have the same length.
/// Records are only ever appended; [`VectorStore::clear`] is the only removal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorStore {
    vectors: Vec<Vec<f32>>,
    documents: Vec<String>,
    metadatas: Vec<ChunkMetadata>,
}

/// Search result from vector similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Cosine similarity in `[-1, 1]`
    pub score: f32,
}

/// Per-source statistics for status reporting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSummary {
    pub chunks: usize,
    pub pages: BTreeSet<u32>,
    pub last_ingested: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct PersistedIndexRef<'a> {
    vectors: &'a [Vec<f32>],
    documents: &'a [String],
    metadatas: &'a [ChunkMetadata],
}

#[derive(Deserialize)]
struct PersistedIndex {
    vectors: Vec<Vec<f32>>,
    documents: Vec<String>,
    #[serde(default)]
    metadatas: Option<Vec<ChunkMetadata>>,
}

impl VectorStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Embedding dimension shared by every record, `None` while empty
    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.vectors.first().map(Vec::len)
    }

    #[inline]
    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    #[inline]
    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    #[inline]
    pub fn metadatas(&self) -> &[ChunkMetadata] {
        &self.metadatas
    }

    #[inline]
    pub fn records(&self) -> impl Iterator<Item = IndexRecord<'_>> {
        self.documents
            .iter()
            .zip(&self.vectors)
            .zip(&self.metadatas)
            .map(|((text, vector), metadata)| IndexRecord {
                text,
                vector,
                metadata,
            })
    }

    /// Append records to the index.
    ///
    /// A no-op when either `texts` or `vectors` is empty. All validation happens before
    /// anything is appended, so on error the index is unchanged.
    #[inline]
    pub fn add(
        &mut self,
        texts: Vec<String>,
        vectors: Vec<Vec<f32>>,
        metadatas: Option<Vec<ChunkMetadata>>,
    ) -> Result<(), VectorStoreError> {
        if texts.is_empty() || vectors.is_empty() {
            debug!("No records to add");
            return Ok(());
        }

        if texts.len() != vectors.len() {
            return Err(VectorStoreError::LengthMismatch {
                texts: texts.len(),
                vectors: vectors.len(),
            });
        }

        if let Some(metadatas) = &metadatas {
            if metadatas.len() != texts.len() {
                return Err(VectorStoreError::MetadataLengthMismatch {
                    texts: texts.len(),
                    metadatas: metadatas.len(),
                });
            }
        }

        let expected = self.dimension().unwrap_or(vectors[0].len());
        if expected == 0 {
            return Err(VectorStoreError::EmptyVector);
        }
        if let Some(vector) = vectors.iter().find(|v| v.len() != expected) {
            return Err(VectorStoreError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        let count = texts.len();
        self.documents.extend(texts);
        self.vectors.extend(vectors);
        match metadatas {
            Some(metadatas) => self.metadatas.extend(metadatas),
            None => self
                .metadatas
                .extend(std::iter::repeat_with(ChunkMetadata::default).take(count)),
        }

        debug!("Added {} records, index now holds {}", count, self.len());
        Ok(())
    }

    /// Return up to `k` records most similar to `query_vector`, best first.
    ///
    /// Empty index, `k == 0` and a zero-norm query all yield no results. Equal scores
    /// keep insertion order.
    #[inline]
    pub fn search(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<SearchResult>, VectorStoreError> {
        let Some(dimension) = self.dimension() else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        if query_vector.len() != dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: dimension,
                actual: query_vector.len(),
            });
        }

        let query_norm = l2_norm(query_vector);
        if query_norm == 0.0 || !query_norm.is_finite() {
            debug!("Query vector has zero norm, returning no results");
            return Ok(Vec::new());
        }
        let normalized: Vec<f64> = query_vector
            .iter()
            .map(|&v| f64::from(v) / query_norm)
            .collect();

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .map(|vector| cosine_to_normalized(&normalized, vector))
            .enumerate()
            .collect();

        let by_score = |a: &(usize, f32), b: &(usize, f32)| -> Ordering {
            b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
        };

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, by_score);
            scored.truncate(k);
        }
        scored.sort_unstable_by(by_score);

        debug!(
            "Search over {} records returned {} results",
            self.len(),
            scored.len()
        );

        Ok(scored
            .into_iter()
            .map(|(idx, score)| SearchResult {
                text: self.documents[idx].clone(),
                metadata: self.metadatas[idx].clone(),
                score,
            })
            .collect())
    }

    /// Remove every record
    #[inline]
    pub fn clear(&mut self) {
        self.vectors.clear();
        self.documents.clear();
        self.metadatas.clear();
    }

    /// Chunk counts, pages and latest ingestion time grouped by source
    #[inline]
    pub fn source_counts(&self) -> BTreeMap<String, SourceSummary> {
        let mut summaries: BTreeMap<String, SourceSummary> = BTreeMap::new();
        for record in self.records() {
            let source = record
                .metadata
                .source
                .clone()
                .unwrap_or_else(|| "Unknown".to_string());
            let summary = summaries.entry(source).or_default();
            summary.chunks += 1;
            if let Some(page) = record.metadata.page {
                summary.pages.insert(page);
            }
            if record.metadata.ingested_at > summary.last_ingested {
                summary.last_ingested = record.metadata.ingested_at;
            }
        }
        summaries
    }

    /// Persist the index as a single JSON document, replacing `path` atomically
    #[inline]
    pub fn save(&self, path: &Path) -> Result<(), VectorStoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| storage_error(path, e))?;
        }

        let temp_path = temp_path_for(path);
        let file = File::create(&temp_path).map_err(|e| storage_error(path, e))?;
        let mut writer = BufWriter::new(file);

        serde_json::to_writer(
            &mut writer,
            &PersistedIndexRef {
                vectors: &self.vectors,
                documents: &self.documents,
                metadatas: &self.metadatas,
            },
        )
        .map_err(|e| storage_error(path, e))?;
        writer.flush().map_err(|e| storage_error(path, e))?;
        drop(writer);

        fs::rename(&temp_path, path).map_err(|e| storage_error(path, e))?;

        info!(
            "Vector store saved to {} with {} records",
            path.display(),
            self.len()
        );
        Ok(())
    }

    /// Load a persisted index. A missing file yields an empty index; any other
    /// failure is reported as a storage error.
    #[inline]
    pub fn load(path: &Path) -> Result<Self, VectorStoreError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(
                    "No vector store at {}, starting with an empty index",
                    path.display()
                );
                return Ok(Self::new());
            }
            Err(e) => return Err(storage_error(path, e)),
        };

        let persisted: PersistedIndex =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| storage_error(path, e))?;

        let store = Self::from_persisted(persisted).map_err(|e| storage_error(path, e))?;

        info!(
            "Vector store loaded from {} with {} records",
            path.display(),
            store.len()
        );
        Ok(store)
    }

    /// Delete the persisted index at `path`, if any
    #[inline]
    pub fn discard_persisted(path: &Path) -> Result<(), VectorStoreError> {
        match fs::remove_file(path) {
            Ok(()) => {
                warn!("Discarded existing vector store at {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(path, e)),
        }
    }

    fn from_persisted(persisted: PersistedIndex) -> Result<Self, VectorStoreError> {
        let PersistedIndex {
            vectors,
            documents,
            metadatas,
        } = persisted;

        if vectors.len() != documents.len() {
            return Err(VectorStoreError::LengthMismatch {
                texts: documents.len(),
                vectors: vectors.len(),
            });
        }

        let metadatas = metadatas.unwrap_or_else(|| {
            debug!("Index file has no metadatas, using empty mappings");
            vec![ChunkMetadata::default(); documents.len()]
        });

        let mut store = Self::new();
        store.add(documents, vectors, Some(metadatas))?;
        Ok(store)
    }
}

fn l2_norm(vector: &[f32]) -> f64 {
    vector
        .iter()
        .map(|&v| f64::from(v) * f64::from(v))
        .sum::<f64>()
        .sqrt()
}

/// Cosine similarity between a unit-length query and a stored vector; zero-norm
/// vectors score 0
fn cosine_to_normalized(query: &[f64], vector: &[f32]) -> f32 {
    let norm = l2_norm(vector);
    if norm == 0.0 || !norm.is_finite() {
        return 0.0;
    }

    let dot: f64 = query
        .iter()
        .zip(vector)
        .map(|(&q, &v)| q * f64::from(v))
        .sum();

    let score = (dot / norm) as f32;
    if score.is_finite() { score } else { 0.0 }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    PathBuf::from(temp)
}

fn storage_error(path: &Path, error: impl std::fmt::Display) -> VectorStoreError {
    VectorStoreError::Storage {
        path: path.to_path_buf(),
        message: error.to_string(),
    }
}
