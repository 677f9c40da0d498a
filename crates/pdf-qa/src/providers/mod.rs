//! Embedding and generation providers
//!
//! The pipeline talks to models only through [`EmbeddingProvider`] and
//! [`LlmProvider`]; the Gemini implementations live in [`gemini`].

pub mod api_key;
pub mod embedding;
pub mod gemini;
pub mod llm;

pub use api_key::ApiKeyLoader;
pub use embedding::EmbeddingProvider;
pub use gemini::{GeminiEmbedder, GeminiLlm};
pub use llm::LlmProvider;
