//! In-memory vector index
//!
//! Holds the JSON export of the offline ingestion job:
//! `[{ "text": ..., "source": ..., "embedding": [...] }, ...]`.
//! Brute-force cosine scan; fine for a per-country compliance library.

use super::{cosine_similarity, VectorIndex};
use crate::error::ComplianceError;
use crate::models::RetrievedDocument;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    pub text: String,
    #[serde(default)]
    pub source: String,
    pub embedding: Vec<f32>,
}

pub struct InMemoryIndex {
    chunks: Vec<StoredChunk>,
    dimensions: usize,
}

impl InMemoryIndex {
    /// All chunks must share one embedding dimension.
    pub fn new(chunks: Vec<StoredChunk>) -> Result<Self> {
        let dimensions = chunks.first().map(|c| c.embedding.len()).unwrap_or(0);

        if let Some(bad) = chunks.iter().position(|c| c.embedding.len() != dimensions) {
            return Err(ComplianceError::Index(format!(
                "chunk {} has {} dimensions, expected {}",
                bad,
                chunks[bad].embedding.len(),
                dimensions
            )));
        }

        Ok(Self { chunks, dimensions })
    }

    /// Load an ingestion export from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let chunks: Vec<StoredChunk> = serde_json::from_str(&raw)?;
        let index = Self::new(chunks)?;

        info!(
            path = %path.display(),
            chunks = index.len(),
            dimensions = index.dimensions,
            "Loaded compliance index"
        );
        Ok(index)
    }

    /// Like [`load`](Self::load), but a missing file means an empty corpus.
    pub fn open_or_empty(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                path = %path.display(),
                "Compliance index not found; every search will return no rules"
            );
            return Self::new(Vec::new());
        }
        Self::load(path)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn nearest(
        &self,
        embedding: &[f32],
        k: usize,
        min_score: Option<f32>,
    ) -> Result<Vec<RetrievedDocument>> {
        if self.chunks.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        if embedding.len() != self.dimensions {
            return Err(ComplianceError::Index(format!(
                "query embedding has {} dimensions, index has {}",
                embedding.len(),
                self.dimensions
            )));
        }

        let mut scored: Vec<(f32, &StoredChunk)> = self
            .chunks
            .iter()
            .map(|chunk| (cosine_similarity(embedding, &chunk.embedding), chunk))
            .filter(|(score, _)| min_score.map_or(true, |min| *score >= min))
            .collect();

        // Stable: equal scores keep ingestion order.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, chunk)| RetrievedDocument {
                text: chunk.text.clone(),
                source: chunk.source.clone(),
                score,
            })
            .collect())
    }

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.chunks.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use crate::retrieval::test_support::chunk;
    use super::*;

    #[tokio::test]
    async fn test_ranks_by_similarity_with_stable_ties() {
        let index = InMemoryIndex::new(vec![
            chunk("a", "a.pdf", vec![0.0, 1.0]),
            chunk("b", "b.pdf", vec![1.0, 0.0]),
            chunk("c", "c.pdf", vec![1.0, 0.0]),
        ])
        .unwrap();

        let docs = index.nearest(&[1.0, 0.0], 3, None).await.unwrap();
        let sources: Vec<_> = docs.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(sources, vec!["b.pdf", "c.pdf", "a.pdf"]);
    }

    #[test]
    fn test_rejects_mixed_dimensions() {
        let result = InMemoryIndex::new(vec![
            chunk("a", "a.pdf", vec![0.0, 1.0]),
            chunk("b", "b.pdf", vec![1.0]),
        ]);
        assert!(matches!(result, Err(ComplianceError::Index(_))));
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch_is_an_error() {
        let index = InMemoryIndex::new(vec![chunk("a", "a.pdf", vec![0.0, 1.0])]).unwrap();
        assert!(index.nearest(&[1.0, 0.0, 0.0], 1, None).await.is_err());
    }

    #[test]
    fn test_load_export_and_missing_file() {
        let dir = std::env::temp_dir().join(format!("compliance-index-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("index.json");
        std::fs::write(
            &path,
            r#"[{"text":"Scope of NOM-019","source":"mex/nom-019.pdf","embedding":[1.0,0.0]}]"#,
        )
        .unwrap();

        assert_eq!(InMemoryIndex::load(&path).unwrap().len(), 1);
        assert_eq!(InMemoryIndex::open_or_empty(&dir.join("missing.json")).unwrap().len(), 0);

        std::fs::remove_dir_all(&dir).ok();
    }
}
