//! Deterministic chunk identifiers
//!
//! A chunk id is `{filename}:{page}:{index}:{hash}` where `index` counts the
//! chunks of one page in order and `hash` is the first 8 hex digits of the
//! SHA-256 of the chunk text. Re-ingesting unchanged documents yields the same
//! ids, which is what lets the vector store skip chunks it already holds.

use sha2::{Digest, Sha256};

use crate::types::document::basename;
use crate::types::{Chunk, PageDocument};

/// Assign ids to split pages, in order
pub fn assign_chunk_ids(pieces: Vec<PageDocument>) -> Vec<Chunk> {
    let mut previous: Option<String> = None;
    let mut index = 0usize;

    pieces
        .into_iter()
        .map(|piece| {
            let source_page = format!("{}:{}", basename(&piece.metadata.source), piece.metadata.page);

            if previous.as_deref() == Some(source_page.as_str()) {
                index += 1;
            } else {
                index = 0;
            }

            let id = format!("{}:{}:{}", source_page, index, content_hash(&piece.content));
            previous = Some(source_page);

            Chunk {
                id,
                content: piece.content,
                source: piece.metadata.source,
                page: piece.metadata.page,
            }
        })
        .collect()
}

/// First 8 hex digits of the SHA-256 of `content`
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(8);
    hash
}
