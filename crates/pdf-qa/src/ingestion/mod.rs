//! Document ingestion: PDF loading, splitting and chunk ids

pub mod chunk_ids;
pub mod loader;
pub mod splitter;

pub use chunk_ids::{assign_chunk_ids, content_hash};
pub use loader::{extract_pages, is_pdf, load_documents};
pub use splitter::TextSplitter;
