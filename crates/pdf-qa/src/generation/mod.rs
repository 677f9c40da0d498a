//! Answer generation: prompt construction and the RAG pipeline

pub mod pipeline;
pub mod prompt;

pub use pipeline::{IngestReport, RagPipeline};
pub use prompt::build_prompt;
