//! Vector storage and similarity search over per-user collections

pub mod sqlite_store;

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::providers::EmbeddingProvider;
use crate::types::Chunk;

pub use sqlite_store::SqliteVectorStore;

/// Search result from a vector store
#[derive(Debug, Clone)]
pub struct VectorSearchResult {
    /// The matched chunk
    pub chunk: Chunk,
    /// Cosine similarity in [-1, 1], higher is more similar
    pub score: f32,
}

/// Trait for embedding storage and search
///
/// Every operation is scoped to a collection; the service uses one collection
/// per user id.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Ids of every chunk in the collection
    async fn existing_ids(&self, collection: &str) -> Result<HashSet<String>>;

    /// Insert chunks with their embeddings. Chunks whose id is already present
    /// are left untouched. Returns the number inserted.
    async fn add_chunks(
        &self,
        collection: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize>;

    /// The `k` most similar chunks, best first
    async fn similarity_search_with_score(
        &self,
        collection: &str,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<VectorSearchResult>>;

    /// Drop a collection. Returns the number of chunks removed.
    async fn delete_collection(&self, collection: &str) -> Result<usize>;

    /// Number of chunks in the collection
    async fn count(&self, collection: &str) -> Result<usize>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}

/// Embed and insert the chunks the collection does not hold yet
///
/// Returns the number of chunks added.
pub async fn add_to_store(
    store: &dyn VectorStore,
    embedder: &dyn EmbeddingProvider,
    collection: &str,
    chunks: Vec<Chunk>,
) -> Result<usize> {
    let existing = store.existing_ids(collection).await?;
    let new_chunks: Vec<Chunk> = chunks
        .into_iter()
        .filter(|c| !existing.contains(&c.id))
        .collect();

    if new_chunks.is_empty() {
        tracing::info!("No new chunks were added");
        return Ok(0);
    }

    tracing::info!("Adding {} new chunks to db", new_chunks.len());

    let texts: Vec<String> = new_chunks.iter().map(|c| c.content.clone()).collect();
    let embeddings = embedder.embed_documents(&texts).await?;
    if embeddings.len() != new_chunks.len() {
        return Err(Error::embedding(format!(
            "{} returned {} embeddings for {} chunks",
            embedder.name(),
            embeddings.len(),
            new_chunks.len()
        )));
    }

    store.add_chunks(collection, &new_chunks, &embeddings).await
}

/// Cosine similarity; zero when either vector has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
