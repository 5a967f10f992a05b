//! Retrieval engine
//!
//! Embeds a natural-language query and asks a vector index for the nearest
//! stored passages. The index is opened once per process and shared
//! read-only across requests.

use crate::models::RetrievedDocument;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub mod embeddings;
pub mod index;
pub mod pgvector;

pub use embeddings::GeminiEmbedder;
pub use index::{InMemoryIndex, StoredChunk};
pub use pgvector::PgVectorIndex;

/// Turns text into a dense vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Nearest-neighbour lookup over stored `{text, source}` units.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `k` units ordered by descending similarity, skipping
    /// any that score below `min_score`.
    async fn nearest(
        &self,
        embedding: &[f32],
        k: usize,
        min_score: Option<f32>,
    ) -> Result<Vec<RetrievedDocument>>;

    /// Whether the index holds no units at all.
    async fn is_empty(&self) -> Result<bool>;
}

pub struct RetrievalEngine {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    min_score: Option<f32>,
}

impl RetrievalEngine {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            min_score: None,
        }
    }

    pub fn with_min_score(mut self, min_score: Option<f32>) -> Self {
        self.min_score = min_score;
        self
    }

    /// Ranked passages for `query`; empty when the corpus is empty or nothing clears the threshold.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>> {
        if k == 0 || self.index.is_empty().await? {
            debug!(query = %query, "Retrieval skipped: empty corpus or k = 0");
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(query).await?;
        let documents = self.index.nearest(&embedding, k, self.min_score).await?;

        debug!(query = %query, k, hits = documents.len(), "Retrieval complete");
        Ok(documents)
    }
}

/// Cosine similarity; zero when either vector has no magnitude or dimensions differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Deterministic embedder for tests: one dimension per keyword.

    use super::*;

    pub const KEYWORDS: [&str; 4] = ["nom-019", "fcc", "anatel", "energy"];

    pub struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let lowered = text.to_lowercase();
            Ok(KEYWORDS
                .iter()
                .map(|k| if lowered.contains(k) { 1.0 } else { 0.0 })
                .collect())
        }
    }

    /// Embedder that must never be reached.
    pub struct UnreachableEmbedder;

    #[async_trait]
    impl Embedder for UnreachableEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(crate::error::ComplianceError::Embedding(
                "embedder should not be called".to_string(),
            ))
        }
    }

    pub fn chunk(text: &str, source: &str, embedding: Vec<f32>) -> StoredChunk {
        StoredChunk {
            text: text.to_string(),
            source: source.to_string(),
            embedding,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_empty_corpus_returns_nothing_without_embedding() {
        let engine = RetrievalEngine::new(
            Arc::new(UnreachableEmbedder),
            Arc::new(InMemoryIndex::new(Vec::new()).unwrap()),
        );

        let results = engine.search("What does FCC stand for?", 3).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_search_length_is_min_of_k_and_corpus() {
        let index = InMemoryIndex::new(vec![
            chunk("NOM-019 scope", "mex/nom-019.pdf", vec![1.0, 0.0, 0.0, 0.0]),
            chunk("FCC part 15", "usa/fcc-15.pdf", vec![0.0, 1.0, 0.0, 0.0]),
        ])
        .unwrap();
        let engine = RetrievalEngine::new(Arc::new(KeywordEmbedder), Arc::new(index));

        assert_eq!(engine.search("NOM-019", 5).await.unwrap().len(), 2);
        assert_eq!(engine.search("NOM-019", 1).await.unwrap().len(), 1);
        assert!(engine.search("NOM-019", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_threshold_filters_weak_matches() {
        let index = InMemoryIndex::new(vec![
            chunk("NOM-019 scope", "mex/nom-019.pdf", vec![1.0, 0.0, 0.0, 0.0]),
            chunk("FCC part 15", "usa/fcc-15.pdf", vec![0.0, 1.0, 0.0, 0.0]),
        ])
        .unwrap();
        let engine = RetrievalEngine::new(Arc::new(KeywordEmbedder), Arc::new(index))
            .with_min_score(Some(0.5));

        let results = engine.search("NOM-019 labeling", 3).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, "mex/nom-019.pdf");
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
