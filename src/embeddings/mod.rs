// Embeddings module
// Chunking of extracted text and the embedding gateway used by ingestion and queries

pub mod chunking;
pub mod ollama;


pub use chunking::{ChunkingConfig, chunk_page, citation_header, split_text};
pub use ollama::OllamaClient;

/// What a text is being embedded for. Retrieval models may embed documents and
/// queries asymmetrically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingPurpose {
    Document,
    Query,
}

/// Gateway to an external embedding function.
///
/// Implementations fail open: on any external failure they log and return an empty
/// (or short) list, and callers treat that as "embedding unavailable" for the batch.
pub trait Embedder {
    fn embed_batch(&self, texts: &[String], purpose: EmbeddingPurpose) -> Vec<Vec<f32>>;

    /// Embed a single query string, `None` when the embedding is unavailable
    #[inline]
    fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        self.embed_batch(&[query.to_string()], EmbeddingPurpose::Query)
            .into_iter()
            .next()
            .filter(|vector| !vector.is_empty())
    }
}

impl<T: Embedder + ?Sized> Embedder for &T {
    #[inline]
    fn embed_batch(&self, texts: &[String], purpose: EmbeddingPurpose) -> Vec<Vec<f32>> {
        (**self).embed_batch(texts, purpose)
    }
}

impl<T: Embedder + ?Sized> Embedder for Box<T> {
    #[inline]
    fn embed_batch(&self, texts: &[String], purpose: EmbeddingPurpose) -> Vec<Vec<f32>> {
        (**self).embed_batch(texts, purpose)
    }
}
