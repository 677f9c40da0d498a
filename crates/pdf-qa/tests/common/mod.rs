//! Shared fixtures for integration tests

#![allow(dead_code, unused_imports)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pdf_qa::config::{RagConfig, StorageConfig};
use pdf_qa::providers::EmbeddingProvider;
use pdf_qa::Stack;

pub use pdf_qa::testing::{pdf_bytes, FakeEmbedder, FakeLlm, StalledEmbedder};

pub fn test_config(dir: &Path) -> RagConfig {
    let mut config = RagConfig {
        storage: StorageConfig::with_data_dir(dir),
        ..RagConfig::default()
    };
    config.server.host = "127.0.0.1".to_string();
    config.server.max_upload_size = 256 * 1024;
    config.server.max_files_per_upload = 2;
    config.worker.concurrency = Some(2);
    config.worker.task_timeout_secs = 10;
    config
}

pub fn stack_with(config: RagConfig, embedder: Arc<dyn EmbeddingProvider>) -> Stack {
    Stack::assemble(config, embedder, Arc::new(FakeLlm::new("generated answer")))
        .expect("stack should assemble")
}

/// Poll `check` until it returns true or a few seconds pass
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..150 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
