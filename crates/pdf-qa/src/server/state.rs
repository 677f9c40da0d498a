//! Application state for the API

use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::processing::{JobQueue, WorkerTask};
use crate::storage::{DocumentBucket, QueryTable};
use crate::types::QueryModel;

/// Shared application state
///
/// The API reads and writes the bucket and the table and may invoke the
/// worker. It never runs the pipeline itself.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: RagConfig,
    table: QueryTable,
    bucket: DocumentBucket,
    job_queue: Arc<JobQueue>,
    ready: RwLock<bool>,
}

impl AppState {
    pub fn new(
        config: RagConfig,
        table: QueryTable,
        bucket: DocumentBucket,
        job_queue: Arc<JobQueue>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                table,
                bucket,
                job_queue,
                ready: RwLock::new(true),
            }),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    pub fn table(&self) -> &QueryTable {
        &self.inner.table
    }

    pub fn bucket(&self) -> &DocumentBucket {
        &self.inner.bucket
    }

    pub fn job_queue(&self) -> &Arc<JobQueue> {
        &self.inner.job_queue
    }

    /// Check if the server is ready
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.read() && !self.inner.job_queue.is_closed()
    }

    /// Set ready state
    pub fn set_ready(&self, ready: bool) {
        *self.inner.ready.write() = ready;
    }

    /// Store a new incomplete record and hand it to the worker
    pub async fn submit_query(&self, user_id: &str, query_text: &str) -> Result<QueryModel> {
        if query_text.trim().is_empty() {
            return Err(Error::bad_request("query_text must not be empty"));
        }

        let item = QueryModel::with_ttl(user_id, query_text, self.config().storage.ttl_secs);

        let table = self.table().clone();
        let stored = item.clone();
        tokio::task::spawn_blocking(move || table.put_item(&stored))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))??;

        if let Err(e) = self.job_queue().invoke(WorkerTask::Answer(item.clone())) {
            let table = self.table().clone();
            let query_id = item.query_id.clone();
            match tokio::task::spawn_blocking(move || table.delete_item(&query_id)).await {
                Ok(Ok(_)) => {}
                Ok(Err(cleanup)) => {
                    tracing::warn!("Failed to remove unqueued query {}: {}", item.query_id, cleanup)
                }
                Err(join) => tracing::warn!("Task join error: {}", join),
            }
            return Err(e);
        }
        tracing::info!("Submitted query {} for {}", item.query_id, user_id);

        Ok(item)
    }

    /// Fetch a live record owned by `user_id`
    pub async fn get_query(&self, user_id: &str, query_id: &str) -> Result<QueryModel> {
        let table = self.table().clone();
        let (user, id) = (user_id.to_string(), query_id.to_string());

        tokio::task::spawn_blocking(move || table.get_user_item(&user, &id))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))??
            .ok_or_else(|| Error::NotFound(format!("Query {}", query_id)))
    }

    /// A user's most recent records, newest first
    pub async fn list_queries(&self, user_id: &str, count: usize) -> Result<Vec<QueryModel>> {
        let table = self.table().clone();
        let user = user_id.to_string();

        tokio::task::spawn_blocking(move || table.list_items(&user, count))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }
}
