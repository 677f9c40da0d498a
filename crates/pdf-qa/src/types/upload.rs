//! Document upload response

use serde::{Deserialize, Serialize};

/// Result of a document upload
///
/// `url` is the first stored document, kept for clients that upload one
/// file at a time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadResponse {
    pub url: String,
    pub urls: Vec<String>,
    /// Id of the ingest task queued for the upload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingest_id: Option<String>,
}
