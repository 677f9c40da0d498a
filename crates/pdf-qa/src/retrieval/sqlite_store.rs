//! SQLite-backed vector store
//!
//! Embeddings are stored as little-endian f32 blobs and searched by brute
//! force cosine similarity. Per-user collections are small enough that a
//! full scan stays fast.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use super::{cosine_similarity, VectorSearchResult, VectorStore};
use crate::error::{Error, Result};
use crate::types::Chunk;

/// Chunk store keyed by `(collection, chunk id)`
#[derive(Clone)]
pub struct SqliteVectorStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVectorStore {
    /// Create or open the store at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::vector_db(format!("Failed to open vector store: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Create an in-memory store
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::vector_db(format!("Failed to open in-memory store: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;

            CREATE TABLE IF NOT EXISTS chunks (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                content TEXT NOT NULL,
                source TEXT NOT NULL,
                page INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                PRIMARY KEY (collection, id)
            );
            "#,
        )
        .map_err(|e| Error::vector_db(format!("Failed to migrate vector store: {}", e)))?;

        Ok(())
    }

    fn existing_ids_sync(&self, collection: &str) -> Result<HashSet<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id FROM chunks WHERE collection = ?1")
            .map_err(|e| Error::vector_db(format!("Failed to prepare query: {}", e)))?;

        let ids = stmt
            .query_map(params![collection], |row| row.get::<_, String>(0))
            .map_err(|e| Error::vector_db(format!("Failed to list ids: {}", e)))?
            .collect::<rusqlite::Result<HashSet<_>>>()
            .map_err(|e| Error::vector_db(format!("Failed to read id: {}", e)))?;

        Ok(ids)
    }

    fn add_chunks_sync(
        &self,
        collection: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize> {
        if chunks.len() != embeddings.len() {
            return Err(Error::vector_db(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::vector_db(format!("Failed to begin transaction: {}", e)))?;

        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO chunks (collection, id, content, source, page, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(|e| Error::vector_db(format!("Failed to prepare insert: {}", e)))?;

            for (chunk, embedding) in chunks.iter().zip(embeddings) {
                inserted += stmt
                    .execute(params![
                        collection,
                        chunk.id,
                        chunk.content,
                        chunk.source,
                        chunk.page,
                        encode_embedding(embedding),
                    ])
                    .map_err(|e| Error::vector_db(format!("Failed to insert chunk: {}", e)))?;
            }
        }

        tx.commit()
            .map_err(|e| Error::vector_db(format!("Failed to commit chunks: {}", e)))?;

        Ok(inserted)
    }

    fn search_sync(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<VectorSearchResult>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, content, source, page, embedding FROM chunks WHERE collection = ?1",
            )
            .map_err(|e| Error::vector_db(format!("Failed to prepare search: {}", e)))?;

        let rows = stmt
            .query_map(params![collection], |row| {
                Ok((
                    Chunk {
                        id: row.get(0)?,
                        content: row.get(1)?,
                        source: row.get(2)?,
                        page: row.get(3)?,
                    },
                    row.get::<_, Vec<u8>>(4)?,
                ))
            })
            .map_err(|e| Error::vector_db(format!("Failed to search: {}", e)))?;

        let mut results = Vec::new();
        for row in rows {
            let (chunk, blob) =
                row.map_err(|e| Error::vector_db(format!("Failed to read chunk: {}", e)))?;
            let embedding = decode_embedding(&blob);

            if embedding.len() != query.len() {
                tracing::warn!(
                    "Skipping chunk {} with {} dimensions (query has {})",
                    chunk.id,
                    embedding.len(),
                    query.len()
                );
                continue;
            }

            results.push(VectorSearchResult {
                score: cosine_similarity(query, &embedding),
                chunk,
            });
        }

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        results.truncate(k);

        Ok(results)
    }

    fn delete_collection_sync(&self, collection: &str) -> Result<usize> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM chunks WHERE collection = ?1", params![collection])
            .map_err(|e| Error::vector_db(format!("Failed to delete collection: {}", e)))
    }

    fn count_sync(&self, collection: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM chunks WHERE collection = ?1",
                params![collection],
                |row| row.get(0),
            )
            .map_err(|e| Error::vector_db(format!("Failed to count chunks: {}", e)))?;
        Ok(count as usize)
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn existing_ids(&self, collection: &str) -> Result<HashSet<String>> {
        let store = self.clone();
        let collection = collection.to_string();
        tokio::task::spawn_blocking(move || store.existing_ids_sync(&collection))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    async fn add_chunks(
        &self,
        collection: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize> {
        let store = self.clone();
        let collection = collection.to_string();
        let chunks = chunks.to_vec();
        let embeddings = embeddings.to_vec();
        tokio::task::spawn_blocking(move || store.add_chunks_sync(&collection, &chunks, &embeddings))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    async fn similarity_search_with_score(
        &self,
        collection: &str,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<VectorSearchResult>> {
        let store = self.clone();
        let collection = collection.to_string();
        let query = query_embedding.to_vec();
        tokio::task::spawn_blocking(move || store.search_sync(&collection, &query, k))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    async fn delete_collection(&self, collection: &str) -> Result<usize> {
        let store = self.clone();
        let collection = collection.to_string();
        tokio::task::spawn_blocking(move || store.delete_collection_sync(&collection))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let store = self.clone();
        let collection = collection.to_string();
        tokio::task::spawn_blocking(move || store.count_sync(&collection))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
