//! Configuration for the question answering service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable naming an optional TOML configuration file
pub const CONFIG_PATH_ENV: &str = "PDF_QA_CONFIG";

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RagConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Bucket, table and vector store locations
    #[serde(default)]
    pub storage: StorageConfig,
    /// Embedding configuration
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    /// Generation model configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Background worker configuration
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Where the Gemini API key comes from
    #[serde(default)]
    pub api_key: ApiKeyConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
    /// Maximum size of one uploaded document in bytes (default: 2MB)
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,
    /// Maximum number of documents in one upload request
    #[serde(default = "default_max_files")]
    pub max_files_per_upload: usize,
    /// Externally visible URL of the API, reported as the function URL
    #[serde(default)]
    pub public_url: Option<String>,
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_true() -> bool { true }
fn default_max_upload_size() -> usize { 2 * 1024 * 1024 }
fn default_max_files() -> usize { 5 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            enable_cors: true,
            max_upload_size: default_max_upload_size(),
            max_files_per_upload: default_max_files(),
            public_url: None,
        }
    }
}

/// Storage configuration
///
/// Paths left unset are derived from `data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for all local state
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Document bucket directory (objects live under `source/{user_id}/`)
    #[serde(default)]
    pub bucket_dir: Option<PathBuf>,
    /// SQLite file holding query records
    #[serde(default)]
    pub table_path: Option<PathBuf>,
    /// SQLite file holding chunk embeddings
    #[serde(default)]
    pub vector_path: Option<PathBuf>,
    /// Public base URL of the bucket, e.g. `https://bucket.example.com/`.
    /// When unset the API serves the bucket itself under `/files/`.
    #[serde(default)]
    pub object_base_url: Option<String>,
    /// Lifetime of a query record in seconds (default: 6 months of 30 days)
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: i64,
    /// Interval between expired record sweeps in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("pdf-qa"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}
fn default_ttl_secs() -> i64 { 60 * 60 * 24 * 30 * 6 }
fn default_sweep_interval() -> u64 { 3600 }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            bucket_dir: None,
            table_path: None,
            vector_path: None,
            object_base_url: None,
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl StorageConfig {
    /// Keep every path under one directory
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn bucket_dir(&self) -> PathBuf {
        self.bucket_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("bucket"))
    }

    pub fn table_path(&self) -> PathBuf {
        self.table_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("queries.db"))
    }

    pub fn vector_path(&self) -> PathBuf {
        self.vector_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("chroma.db"))
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding model name
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Embedding dimensions
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Texts per batch request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_embedding_model() -> String { "models/text-embedding-004".to_string() }
fn default_dimensions() -> usize { 768 }
fn default_batch_size() -> usize { 100 }

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimensions: default_dimensions(),
            batch_size: default_batch_size(),
        }
    }
}

/// Generation model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Gemini API base URL
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Generation model name
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// Retries on rate limiting or server errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_llm_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_llm_model() -> String { "models/gemini-2.5-flash-preview-04-17".to_string() }
fn default_temperature() -> f32 { 0.7 }
fn default_llm_timeout() -> u64 { 120 }
fn default_max_retries() -> u32 { 2 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_chunk_size() -> usize { 1000 }
fn default_chunk_overlap() -> usize { 100 }

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of chunks to retrieve
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Best result must score at least this, otherwise there is no answer
    #[serde(default = "default_min_relevance")]
    pub min_relevance: f32,
}

fn default_top_k() -> usize { 5 }
fn default_min_relevance() -> f32 { 0.4 }

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_relevance: default_min_relevance(),
        }
    }
}

/// Background worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Concurrent tasks (default: CPU count, max 4)
    #[serde(default)]
    pub concurrency: Option<usize>,
    /// Timeout for one task in seconds (default: 180)
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,
    /// Pending task capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_task_timeout() -> u64 { 180 }
fn default_queue_capacity() -> usize { 1000 }

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: None,
            task_timeout_secs: default_task_timeout(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl WorkerConfig {
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency
            .unwrap_or_else(|| num_cpus::get().min(4))
            .max(1)
    }
}

/// API key source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    /// Environment variable holding the key
    #[serde(default = "default_api_key_env")]
    pub env_var: String,
    /// Secret parameter path. When set, the key is read from this file
    /// instead of the environment.
    #[serde(default)]
    pub param: Option<String>,
}

fn default_api_key_env() -> String { "GOOGLE_API_KEY".to_string() }

impl Default for ApiKeyConfig {
    fn default() -> Self {
        Self {
            env_var: default_api_key_env(),
            param: None,
        }
    }
}

impl RagConfig {
    /// Load configuration: defaults, then an optional TOML file, then
    /// environment overrides.
    ///
    /// The file is `path` when given, else the file named by `PDF_QA_CONFIG`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        let path = path.map(Path::to_path_buf).or(from_env);

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(url) = lookup("PUBLIC_URL") {
            self.server.public_url = Some(url);
        }
        if let Some(dir) = lookup("PDF_QA_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("BUCKET_DIR") {
            self.storage.bucket_dir = Some(PathBuf::from(dir));
        }
        if let Some(path) = lookup("TABLE_PATH") {
            self.storage.table_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("VECTOR_PATH") {
            self.storage.vector_path = Some(PathBuf::from(path));
        }
        if let Some(url) = lookup("OBJECT_BASE_URL") {
            self.storage.object_base_url = Some(url);
        }
        if let Some(model) = lookup("GEMINI_MODEL") {
            self.llm.model = model;
        }
        if let Some(model) = lookup("EMBEDDING_MODEL") {
            self.embeddings.model = model;
        }
        if let Some(param) = lookup("GOOGLE_API_KEY_PARAM") {
            self.api_key.param = Some(param);
        }
    }

    /// Reject settings the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be positive".to_string()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::Config("top_k must be positive".to_string()));
        }
        if self.server.max_upload_size == 0 || self.server.max_files_per_upload == 0 {
            return Err(Error::Config("upload limits must be positive".to_string()));
        }
        if self.storage.ttl_secs <= 0 {
            return Err(Error::Config("ttl_secs must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = RagConfig::default();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 100);
        assert_eq!(config.retrieval.top_k, 5);
        assert!((config.retrieval.min_relevance - 0.4).abs() < f32::EPSILON);
        assert_eq!(config.storage.ttl_secs, 15_552_000);
        assert_eq!(config.worker.task_timeout_secs, 180);
        assert_eq!(config.server.max_upload_size, 2 * 1024 * 1024);
        assert_eq!(config.server.max_files_per_upload, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: RagConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [retrieval]
            top_k = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.retrieval.top_k, 3);
        assert!((config.retrieval.min_relevance - 0.4).abs() < f32::EPSILON);
        assert_eq!(config.llm.model, "models/gemini-2.5-flash-preview-04-17");
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PORT", "8123"),
            ("PDF_QA_DATA_DIR", "/tmp/qa"),
            ("OBJECT_BASE_URL", "https://bucket.example.com/"),
            ("GOOGLE_API_KEY_PARAM", "/rag-app/google_api_key"),
            ("PORT_UNUSED", "x"),
        ]
        .into_iter()
        .collect();

        let mut config = RagConfig::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.server.port, 8123);
        assert_eq!(config.storage.bucket_dir(), PathBuf::from("/tmp/qa/bucket"));
        assert_eq!(config.storage.table_path(), PathBuf::from("/tmp/qa/queries.db"));
        assert_eq!(
            config.storage.object_base_url.as_deref(),
            Some("https://bucket.example.com/")
        );
        assert_eq!(config.api_key.param.as_deref(), Some("/rag-app/google_api_key"));
    }

    #[test]
    fn test_validate_overlap() {
        let mut config = RagConfig::default();
        config.chunking.chunk_overlap = 1000;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
