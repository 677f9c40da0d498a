//! Typed HTTP client for the API
//!
//! Covers the three client screens (submit, recent queries, view one
//! query) plus document upload.

pub mod upload;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::storage::ObjectInfo;
use crate::types::{QueryModel, SubmitQueryRequest, UploadResponse};

pub use crate::storage::citation_link;
pub use upload::{CancelHandle, CancelSignal, UploadError, UPLOAD_PIECE_SIZE};

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// The API answered with an error status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Transport failure
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Local file error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Upload rejected
    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Upload(UploadError::Status(status)) => Some(*status),
            _ => None,
        }
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// API client bound to one base URL
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn user_url(&self, user_id: &str, rest: &str) -> String {
        format!(
            "{}users/{}/{}",
            self.base_url,
            urlencoding::encode(user_id),
            rest
        )
    }

    /// Submit a question; the answer arrives later
    pub async fn submit_query(&self, user_id: &str, query_text: &str) -> ClientResult<QueryModel> {
        let response = self
            .http
            .post(self.user_url(user_id, "queries"))
            .json(&SubmitQueryRequest {
                query_text: query_text.to_string(),
            })
            .send()
            .await?;
        decode(response).await
    }

    /// A user's most recent queries, newest first
    pub async fn list_queries(&self, user_id: &str, count: usize) -> ClientResult<Vec<QueryModel>> {
        let response = self
            .http
            .get(self.user_url(user_id, "queries"))
            .query(&[("count", count)])
            .send()
            .await?;
        decode(response).await
    }

    pub async fn get_query(&self, user_id: &str, query_id: &str) -> ClientResult<QueryModel> {
        let rest = format!("queries/{}", urlencoding::encode(query_id));
        let response = self.http.get(self.user_url(user_id, &rest)).send().await?;
        decode(response).await
    }

    pub async fn list_documents(&self, user_id: &str) -> ClientResult<Vec<ObjectInfo>> {
        let response = self
            .http
            .get(self.user_url(user_id, "documents"))
            .send()
            .await?;
        decode(response).await
    }

    /// Upload one PDF, reporting progress and honouring cancellation
    ///
    /// Cancellation wins over any other outcome once it has fired.
    pub async fn upload_document<F>(
        &self,
        user_id: &str,
        path: &Path,
        on_progress: F,
        mut cancel: CancelSignal,
    ) -> ClientResult<UploadResponse>
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        let filename = upload::upload_name(path).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} has no file name", path.display()),
            )
        })?;
        let data = Bytes::from(tokio::fs::read(path).await?);

        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled.into());
        }

        let form = upload::streaming_form(&filename, data, on_progress)
            .map_err(|e| UploadError::Network(e.to_string()))?;
        let request = self
            .http
            .post(self.user_url(user_id, "documents"))
            .multipart(form);

        let transfer = async move {
            let response = request
                .send()
                .await
                .map_err(|e| UploadError::Network(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(UploadError::Status(status.as_u16()));
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| UploadError::Network(e.to_string()))?;
            serde_json::from_slice::<UploadResponse>(&body)
                .map_err(|e| UploadError::InvalidResponse(e.to_string()))
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UploadError::Cancelled),
            result = transfer => result,
        };

        match outcome {
            Ok(response) => {
                tracing::debug!("Uploaded {} to {}", filename, response.url);
                Ok(response)
            }
            Err(e) => {
                tracing::warn!("Upload of {} failed: {}", filename, e);
                Err(e.into())
            }
        }
    }
}

/// Decode a JSON body, turning error statuses into [`ClientError::Api`]
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or(body);

    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_url() {
        let client = ApiClient::new("http://localhost:8000").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000/");
        assert_eq!(
            client.user_url("nobody", "queries"),
            "http://localhost:8000/users/nobody/queries"
        );
    }

    #[test]
    fn test_error_status() {
        let err = ClientError::Api {
            status: 404,
            message: "missing".into(),
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(ClientError::from(UploadError::Status(413)).status(), Some(413));
        assert_eq!(ClientError::from(UploadError::Cancelled).status(), None);
        assert_eq!(
            ClientError::from(UploadError::Cancelled).to_string(),
            "Upload aborted"
        );
    }
}
