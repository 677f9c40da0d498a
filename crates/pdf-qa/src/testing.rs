//! Deterministic providers and fixtures for tests
//!
//! Built for the crate's own unit tests and, with the `test-util` feature,
//! for the integration tests under `tests/`.

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use parking_lot::Mutex;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::providers::{EmbeddingProvider, LlmProvider};

const VOCABULARY: [&str; 8] = [
    "rust", "python", "ocean", "mountain", "cat", "dog", "music", "code",
];

/// Bag-of-words embedder over a fixed vocabulary
pub struct FakeEmbedder;

impl FakeEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        VOCABULARY
            .iter()
            .map(|word| {
                lower
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|token| token == word)
                    .count() as f32
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::vector(text))
    }

    fn dimensions(&self) -> usize {
        VOCABULARY.len()
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Embedder that never answers, keeping queries incomplete
pub struct StalledEmbedder;

#[async_trait]
impl EmbeddingProvider for StalledEmbedder {
    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        std::future::pending().await
    }

    fn dimensions(&self) -> usize {
        VOCABULARY.len()
    }

    fn name(&self) -> &str {
        "stalled"
    }
}

/// LLM returning a fixed answer and recording prompts
pub struct FakeLlm {
    answer: String,
    delay: Option<Duration>,
    fail: bool,
    prompts: Mutex<Vec<String>>,
}

impl FakeLlm {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            delay: None,
            fail: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("")
        }
    }

    pub fn slow(answer: &str, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(answer)
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl LlmProvider for FakeLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(Error::llm("model unavailable"));
        }
        Ok(self.answer.clone())
    }

    fn name(&self) -> &str {
        "fake"
    }

    fn model(&self) -> &str {
        "fake-model"
    }
}

/// A PDF with one page per entry of `pages`, each holding that line of text
pub fn pdf_bytes(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids = Vec::with_capacity(pages.len());
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let encoded = content.encode().expect("page content encodes");
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::from(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("in-memory PDF saves");
    bytes
}
