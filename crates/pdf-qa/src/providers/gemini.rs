//! Gemini API clients for embeddings and answer generation
//!
//! Both clients talk to the Generative Language REST API with an API key.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

use crate::config::{EmbeddingConfig, LlmConfig};
use crate::error::{Error, Result};
use crate::providers::{EmbeddingProvider, LlmProvider};

/// Shared HTTP plumbing: API key header, timeouts and bounded retries
#[derive(Clone)]
struct GeminiHttp {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    max_retries: u32,
}

impl GeminiHttp {
    fn new(base_url: &str, api_key: String, timeout_secs: u64, max_retries: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries,
        })
    }

    /// `{base}/{model}:{method}`, accepting models with or without the
    /// `models/` prefix
    fn endpoint(&self, model: &str, method: &str) -> String {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };
        format!("{}/{}:{}", self.base_url, model, method)
    }

    /// POST with retry on 429 and 5xx, exponential backoff from 500ms
    async fn post<B, R>(&self, url: &str, body: &B, map_err: fn(String) -> Error) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let mut attempt = 0u32;

        loop {
            let response = self
                .client
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(body)
                .send()
                .await
                .map_err(|e| map_err(format!("Gemini request failed: {}", e)))?;

            let status = response.status();
            if status.is_success() {
                return response
                    .json()
                    .await
                    .map_err(|e| map_err(format!("Failed to parse Gemini response: {}", e)));
            }

            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if retryable && attempt < self.max_retries {
                let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                tracing::warn!(
                    "Gemini returned {}, retrying in {:?} (attempt {}/{})",
                    status,
                    delay,
                    attempt + 1,
                    self.max_retries
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(map_err(format!("Gemini request failed ({}): {}", status, body)));
        }
    }
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

// ============================================================================
// Embeddings
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest {
    model: String,
    content: Content,
    task_type: &'static str,
}

#[derive(Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Gemini text embeddings (`models/text-embedding-004` by default)
pub struct GeminiEmbedder {
    http: GeminiHttp,
    model: String,
    dimensions: usize,
    batch_size: usize,
}

impl GeminiEmbedder {
    pub fn new(config: &EmbeddingConfig, llm: &LlmConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            http: GeminiHttp::new(&llm.base_url, api_key, llm.timeout_secs, llm.max_retries)?,
            model: config.model.clone(),
            dimensions: config.dimensions,
            batch_size: config.batch_size.max(1),
        })
    }

    fn request(&self, text: &str, task_type: &'static str) -> EmbedRequest {
        EmbedRequest {
            model: self.model.clone(),
            content: Content::text(None, text),
            task_type,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let url = self.http.endpoint(&self.model, "embedContent");
        let response: EmbedResponse = self
            .http
            .post(&url, &self.request(text, "RETRIEVAL_QUERY"), Error::Embedding)
            .await?;
        Ok(response.embedding.values)
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self.http.endpoint(&self.model, "batchEmbedContents");
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let request = BatchEmbedRequest {
                requests: batch
                    .iter()
                    .map(|t| self.request(t, "RETRIEVAL_DOCUMENT"))
                    .collect(),
            };
            let response: BatchEmbedResponse =
                self.http.post(&url, &request, Error::Embedding).await?;

            if response.embeddings.len() != batch.len() {
                return Err(Error::embedding(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    response.embeddings.len()
                )));
            }
            embeddings.extend(response.embeddings.into_iter().map(|e| e.values));
        }

        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// Generation
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

/// Gemini answer generation
pub struct GeminiLlm {
    http: GeminiHttp,
    model: String,
    temperature: f32,
}

impl GeminiLlm {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            http: GeminiHttp::new(&config.base_url, api_key, config.timeout_secs, config.max_retries)?,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl LlmProvider for GeminiLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content::text(Some("user"), prompt)],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };

        let url = self.http.endpoint(&self.model, "generateContent");
        let response: GenerateResponse = self.http.post(&url, &request, Error::Llm).await?;

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(Error::llm("No text in Gemini response"));
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
