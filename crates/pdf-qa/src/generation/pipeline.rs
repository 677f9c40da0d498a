//! Retrieval-augmented question answering over a user's documents

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::{RetrievalConfig, RagConfig};
use crate::error::{Error, Result};
use crate::generation::prompt::build_prompt;
use crate::ingestion::{assign_chunk_ids, load_documents, TextSplitter};
use crate::providers::{EmbeddingProvider, LlmProvider};
use crate::retrieval::{add_to_store, VectorStore};
use crate::storage::DocumentBucket;
use crate::types::{QueryResponse, Source};

/// Outcome of ingesting a user's documents
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IngestReport {
    pub user_id: String,
    /// Pages loaded from the user's source folder
    pub pages: usize,
    /// Chunks produced by splitting
    pub chunks: usize,
    /// Chunks newly added to the vector store
    pub added: usize,
    /// Chunks removed first because of a reset
    pub removed: usize,
}

/// Embedding, retrieval and generation for one deployment
pub struct RagPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
    store: Arc<dyn VectorStore>,
    bucket: DocumentBucket,
    splitter: TextSplitter,
    retrieval: RetrievalConfig,
    /// One ingest at a time per user, so overlapping uploads embed each chunk once
    ingest_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl RagPipeline {
    pub fn new(
        config: &RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        store: Arc<dyn VectorStore>,
        bucket: DocumentBucket,
    ) -> Self {
        Self {
            embedder,
            llm,
            store,
            bucket,
            splitter: TextSplitter::from_config(&config.chunking),
            retrieval: config.retrieval.clone(),
            ingest_locks: DashMap::new(),
        }
    }

    pub fn bucket(&self) -> &DocumentBucket {
        &self.bucket
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Answer a question from the user's collection
    ///
    /// When nothing is retrieved, or the best match scores below the
    /// relevance threshold, the answer is the fixed no-match response and
    /// the model is not called.
    pub async fn process_query(&self, user_id: &str, query_text: &str) -> Result<QueryResponse> {
        let query_embedding = self.embedder.embed_query(query_text).await?;
        let results = self
            .store
            .similarity_search_with_score(user_id, &query_embedding, self.retrieval.top_k)
            .await?;

        let best = results.first().map(|r| r.score);
        match best {
            Some(score) if score >= self.retrieval.min_relevance => {}
            _ => {
                tracing::info!(
                    "Unable to find matching results. (user: {}, best score: {:?})",
                    user_id,
                    best
                );
                return Ok(QueryResponse::no_match(query_text));
            }
        }

        let contexts: Vec<&str> = results.iter().map(|r| r.chunk.content.as_str()).collect();
        let prompt = build_prompt(&contexts, query_text);

        tracing::debug!(
            "Generating answer with {} ({} chunks in context)",
            self.llm.model(),
            results.len()
        );
        let response_text = self.llm.generate(&prompt).await?;

        let mut seen = HashSet::new();
        let sources: Vec<Source> = results
            .iter()
            .map(|r| r.chunk.to_source())
            .filter(|s| seen.insert(s.clone()))
            .collect();

        tracing::info!(
            "Answered query for {} with {} sources: {:?}",
            user_id,
            sources.len(),
            results.iter().map(|r| r.chunk.id.as_str()).collect::<Vec<_>>()
        );

        Ok(QueryResponse {
            query_text: query_text.to_string(),
            response_text,
            sources,
        })
    }

    /// Load, split and store the user's uploaded documents
    ///
    /// With `reset`, the user's collection is cleared first.
    pub async fn ingest(&self, user_id: &str, reset: bool) -> Result<IngestReport> {
        let dir = self.bucket.user_source_dir(user_id)?;

        let lock = self
            .ingest_locks
            .entry(user_id.to_string())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        let removed = if reset {
            self.clear_database(user_id).await?
        } else {
            0
        };

        let pages = tokio::task::spawn_blocking(move || load_documents(&dir))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))??;

        let pieces = self.splitter.split_documents(&pages);
        let chunks = assign_chunk_ids(pieces);
        let chunk_count = chunks.len();

        let added = add_to_store(
            self.store.as_ref(),
            self.embedder.as_ref(),
            user_id,
            chunks,
        )
        .await?;

        tracing::info!(
            "Ingested documents for {}: {} pages, {} chunks, {} new",
            user_id,
            pages.len(),
            chunk_count,
            added
        );

        Ok(IngestReport {
            user_id: user_id.to_string(),
            pages: pages.len(),
            chunks: chunk_count,
            added,
            removed,
        })
    }

    /// Remove the user's whole collection
    pub async fn clear_database(&self, user_id: &str) -> Result<usize> {
        let removed = self.store.delete_collection(user_id).await?;
        tracing::info!("Cleared {} chunks from collection {}", removed, user_id);
        Ok(removed)
    }
}
