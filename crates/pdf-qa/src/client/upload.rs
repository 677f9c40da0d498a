//! Streaming document upload with progress and cancellation

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

use crate::server::routes::documents::DOCUMENTS_FIELD;

/// Size of each piece handed to the transport
pub const UPLOAD_PIECE_SIZE: usize = 64 * 1024;

/// Ways an upload can be rejected
#[derive(Debug, Error)]
pub enum UploadError {
    /// The server answered with a non-2xx status
    #[error("Upload failed with status {0}")]
    Status(u16),

    /// The request never completed
    #[error("Upload error: {0}")]
    Network(String),

    /// The caller aborted the upload
    #[error("Upload aborted")]
    Cancelled,

    /// The server answered 2xx with a body that is not the expected JSON
    #[error("Invalid JSON response: {0}")]
    InvalidResponse(String),
}

/// Aborts uploads holding the matching [`CancelSignal`]
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Create a handle and a signal tied to it
    pub fn channel() -> (Self, CancelSignal) {
        let (sender, receiver) = watch::channel(false);
        (
            Self {
                sender: Arc::new(sender),
            },
            CancelSignal {
                receiver: Some(receiver),
            },
        )
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

/// Resolves once the matching handle cancels
#[derive(Debug, Clone)]
pub struct CancelSignal {
    receiver: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        Self { receiver: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.receiver.as_ref().is_some_and(|r| *r.borrow())
    }

    /// Wait until cancelled
    ///
    /// Pends forever when the handle is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        let Some(receiver) = self.receiver.as_mut() else {
            return std::future::pending().await;
        };

        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}

/// Percentage of `total` that `sent` represents
pub fn percent(sent: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((sent as u128 * 100) / total as u128).min(100) as u8
}

/// Build the multipart form for one PDF, streamed in fixed-size pieces
///
/// `on_progress` is called with the percentage of the file handed to the
/// transport after each piece.
pub(crate) fn streaming_form<F>(
    filename: &str,
    data: Bytes,
    on_progress: F,
) -> reqwest::Result<Form>
where
    F: Fn(u8) + Send + Sync + 'static,
{
    let total = data.len();
    let pieces: Vec<Bytes> = (0..total)
        .step_by(UPLOAD_PIECE_SIZE)
        .map(|start| data.slice(start..(start + UPLOAD_PIECE_SIZE).min(total)))
        .collect();

    let mut sent = 0usize;
    let body = stream::iter(pieces).map(move |piece| {
        sent += piece.len();
        on_progress(percent(sent, total));
        Ok::<Bytes, std::io::Error>(piece)
    });

    let part = Part::stream_with_length(Body::wrap_stream(body), total as u64)
        .file_name(filename.to_string())
        .mime_str("application/pdf")?;

    Ok(Form::new().part(DOCUMENTS_FIELD, part))
}

/// Final path component of `path`, used as the uploaded file name
pub(crate) fn upload_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 200), 0);
        assert_eq!(percent(50, 200), 25);
        assert_eq!(percent(200, 200), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[tokio::test]
    async fn test_cancel_signal_fires() {
        let (handle, mut signal) = CancelHandle::channel();
        assert!(!signal.is_cancelled());

        let waiter = tokio::spawn(async move {
            signal.cancelled().await;
        });

        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_never_signal_pends() {
        let mut signal = CancelSignal::never();
        let result = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_dropped_handle_pends() {
        let (handle, mut signal) = CancelHandle::channel();
        drop(handle);
        let result = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(result.is_err());
    }
}
