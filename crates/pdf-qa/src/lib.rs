//! pdf-qa: question answering over uploaded PDF documents
//!
//! Users upload PDFs into a per-user area of a document bucket, submit
//! questions, and poll for answers. Answers are produced asynchronously by a
//! background worker running a retrieval-augmented-generation pipeline, and
//! every answer carries `(filename, page)` sources that resolve to citation
//! links into the bucket.
//!
//! The [`stack::Stack`] wires the pieces together: bucket, query table,
//! vector store, worker and HTTP API.

pub mod client;
pub mod config;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod processing;
pub mod providers;
pub mod retrieval;
pub mod server;
pub mod stack;
pub mod storage;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use config::RagConfig;
pub use error::{Error, Result};
pub use stack::{Stack, StackOutputs};
pub use types::{
    document::{Chunk, PageDocument},
    query::{QueryModel, QueryResponse, Source},
};
