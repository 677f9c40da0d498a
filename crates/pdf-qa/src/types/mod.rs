//! Core data types

pub mod document;
pub mod query;
pub mod upload;

pub use document::{Chunk, PageDocument, PageMetadata};
pub use query::{
    ListQueriesParams, QueryModel, QueryResponse, Source, SubmitQueryRequest, NO_MATCH_ANSWER,
};
pub use upload::UploadResponse;
