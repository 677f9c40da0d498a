//! Composition root
//!
//! Provisions the document bucket, the query table, the worker and the API,
//! and grants each the handles it needs: the worker gets the pipeline and
//! the table, the API gets the table, the bucket and the invocation queue.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::generation::RagPipeline;
use crate::processing::{spawn_ttl_sweeper, JobQueue, Worker};
use crate::providers::{ApiKeyLoader, EmbeddingProvider, GeminiEmbedder, GeminiLlm, LlmProvider};
use crate::retrieval::SqliteVectorStore;
use crate::server::{state::AppState, ApiServer, FILES_PREFIX};
use crate::storage::{DocumentBucket, QueryTable};

/// What a provisioned stack reports at startup
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StackOutputs {
    /// Public URL of the API
    pub function_url: String,
    /// Bucket directory
    pub bucket_path: PathBuf,
    /// Query table database
    pub table_path: PathBuf,
}

/// A running deployment: worker and sweeper spawned, API ready to serve
pub struct Stack {
    config: RagConfig,
    state: AppState,
    pipeline: Arc<RagPipeline>,
    worker: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl Stack {
    /// Provision with Gemini providers using the configured API key
    pub async fn provision(config: RagConfig) -> Result<Self> {
        let (embedder, llm) = gemini_providers(&config)?;
        Self::assemble(config, embedder, llm)
    }

    /// Provision with the given providers
    ///
    /// Must be called from within a tokio runtime.
    pub fn assemble(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<Self> {
        config.validate()?;
        tracing::info!("Provisioning stack in {}", config.storage.data_dir.display());

        std::fs::create_dir_all(&config.storage.data_dir).map_err(|e| {
            Error::Config(format!(
                "Failed to create {}: {}",
                config.storage.data_dir.display(),
                e
            ))
        })?;

        let table = QueryTable::new(config.storage.table_path())?;
        tracing::info!("Query table ready: {}", config.storage.table_path().display());

        let pipeline = Arc::new(build_pipeline(&config, embedder, llm)?);

        let (job_queue, receiver) = JobQueue::new(config.worker.queue_capacity);
        let job_queue = Arc::new(job_queue);

        let worker = Worker::new(
            pipeline.clone(),
            table.clone(),
            job_queue.clone(),
            &config.worker,
        );
        let worker = tokio::spawn(worker.run(receiver));

        let sweeper = spawn_ttl_sweeper(
            table.clone(),
            Duration::from_secs(config.storage.sweep_interval_secs),
        );

        let state = AppState::new(
            config.clone(),
            table,
            pipeline.bucket().clone(),
            job_queue,
        );

        Ok(Self {
            config,
            state,
            pipeline,
            worker,
            sweeper,
        })
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn pipeline(&self) -> &Arc<RagPipeline> {
        &self.pipeline
    }

    pub fn outputs(&self) -> StackOutputs {
        StackOutputs {
            function_url: function_url(&self.config),
            bucket_path: self.config.storage.bucket_dir(),
            table_path: self.config.storage.table_path(),
        }
    }

    /// The API router, for serving elsewhere or testing
    pub fn router(&self) -> axum::Router {
        self.api_server().build_router()
    }

    /// Serve the API on the configured address until shutdown
    pub async fn serve(&self) -> Result<()> {
        self.api_server().start().await
    }

    /// Serve the API on an already bound listener
    pub async fn serve_on(&self, listener: tokio::net::TcpListener) -> Result<()> {
        self.api_server().serve(listener).await
    }

    fn api_server(&self) -> ApiServer {
        ApiServer::new(self.config.clone(), self.state.clone())
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        self.sweeper.abort();
        self.worker.abort();
    }
}

/// Public URL of the API, always ending in `/`
pub fn function_url(config: &RagConfig) -> String {
    let mut url = config
        .server
        .public_url
        .clone()
        .unwrap_or_else(|| format!("http://{}:{}/", config.server.host, config.server.port));
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

/// Base URL of bucket objects: the external URL, or the API's file route
pub fn bucket_base_url(config: &RagConfig) -> String {
    match &config.storage.object_base_url {
        Some(url) => url.clone(),
        None => format!(
            "{}{}/",
            function_url(config),
            FILES_PREFIX.trim_start_matches('/')
        ),
    }
}

/// Gemini embedder and model sharing one API key
pub fn gemini_providers(
    config: &RagConfig,
) -> Result<(Arc<dyn EmbeddingProvider>, Arc<dyn LlmProvider>)> {
    let api_key = ApiKeyLoader::new(config.api_key.clone()).load()?;

    let embedder = GeminiEmbedder::new(&config.embeddings, &config.llm, api_key.clone())?;
    let llm = GeminiLlm::new(&config.llm, api_key)?;
    tracing::info!(
        "Gemini providers ready: embeddings {}, generation {}",
        config.embeddings.model,
        config.llm.model
    );

    Ok((Arc::new(embedder), Arc::new(llm)))
}

/// Open the bucket and vector store and build the pipeline over them
pub fn build_pipeline(
    config: &RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
) -> Result<RagPipeline> {
    let bucket = DocumentBucket::new(config.storage.bucket_dir(), bucket_base_url(config))?;
    let store = SqliteVectorStore::new(config.storage.vector_path())?;
    tracing::info!(
        "Vector store ready: {}",
        config.storage.vector_path().display()
    );

    Ok(RagPipeline::new(
        config,
        embedder,
        llm,
        Arc::new(store),
        bucket,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::testing::{FakeEmbedder, FakeLlm};

    fn config(dir: &std::path::Path) -> RagConfig {
        RagConfig {
            storage: StorageConfig::with_data_dir(dir),
            ..RagConfig::default()
        }
    }

    #[test]
    fn test_urls() {
        let mut config = RagConfig::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 9000;
        assert_eq!(function_url(&config), "http://127.0.0.1:9000/");
        assert_eq!(bucket_base_url(&config), "http://127.0.0.1:9000/files/");

        config.server.public_url = Some("https://api.example.com".to_string());
        config.storage.object_base_url = Some("https://bucket.example.com/".to_string());
        assert_eq!(function_url(&config), "https://api.example.com/");
        assert_eq!(bucket_base_url(&config), "https://bucket.example.com/");
    }

    #[tokio::test]
    async fn test_assemble_reports_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let stack = Stack::assemble(
            config(dir.path()),
            Arc::new(FakeEmbedder),
            Arc::new(FakeLlm::new("ok")),
        )
        .unwrap();

        let outputs = stack.outputs();
        assert_eq!(outputs.bucket_path, dir.path().join("bucket"));
        assert_eq!(outputs.table_path, dir.path().join("queries.db"));
        assert!(outputs.function_url.ends_with(":8000/"));
        assert!(dir.path().join("bucket/source").is_dir());
        assert!(dir.path().join("queries.db").exists());
    }

    #[tokio::test]
    async fn test_assemble_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.chunking.chunk_overlap = config.chunking.chunk_size;

        let result = Stack::assemble(config, Arc::new(FakeEmbedder), Arc::new(FakeLlm::new("ok")));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
