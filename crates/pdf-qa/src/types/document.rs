//! Page documents and chunks

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::query::Source;

/// Where a piece of text came from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageMetadata {
    /// Path of the source file as loaded
    pub source: String,
    /// 1-indexed page number
    pub page: u32,
}

/// Text of one PDF page, or a split piece of one
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageDocument {
    pub content: String,
    pub metadata: PageMetadata,
}

impl PageDocument {
    pub fn new(content: impl Into<String>, source: impl Into<String>, page: u32) -> Self {
        Self {
            content: content.into(),
            metadata: PageMetadata {
                source: source.into(),
                page,
            },
        }
    }
}

/// A stored, embeddable chunk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// `{filename}:{page}:{index}:{hash8}`
    pub id: String,
    pub content: String,
    /// Path of the source file as loaded
    pub source: String,
    pub page: u32,
}

impl Chunk {
    /// File name component of the source path
    pub fn filename(&self) -> String {
        basename(&self.source)
    }

    pub fn to_source(&self) -> Source {
        Source::new(self.filename(), self.page)
    }
}

/// Last path component, or the input when it has none
pub fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}
