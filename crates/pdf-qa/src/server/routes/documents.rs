//! Document upload and listing endpoints

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    Json,
};
use std::path::Path as FsPath;

use crate::error::{Error, Result};
use crate::ingestion::is_pdf;
use crate::processing::WorkerTask;
use crate::server::state::AppState;
use crate::storage::bucket::{sanitize_filename, validate_user_id};
use crate::storage::ObjectInfo;
use crate::types::UploadResponse;

/// Multipart field carrying uploaded files
pub const DOCUMENTS_FIELD: &str = "documents";

const PDF_CONTENT_TYPE: &str = "application/pdf";

fn multipart_error(err: MultipartError) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge(err.body_text())
    } else {
        Error::bad_request(format!("Failed to read multipart body: {}", err.body_text()))
    }
}

struct UploadedFile {
    filename: String,
    data: bytes::Bytes,
}

/// POST /users/:user_id/documents - Store PDFs and queue ingestion
pub async fn upload_documents(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    validate_user_id(&user_id)?;
    let limits = &state.config().server;
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(DOCUMENTS_FIELD) {
            continue;
        }

        if files.len() >= limits.max_files_per_upload {
            return Err(Error::bad_request(format!(
                "At most {} documents per upload",
                limits.max_files_per_upload
            )));
        }

        let raw_name = field
            .file_name()
            .map(|s| s.to_string())
            .ok_or_else(|| Error::bad_request("Uploaded document has no filename"))?;
        let declared_pdf = field.content_type() == Some(PDF_CONTENT_TYPE);

        let mut filename = sanitize_filename(&raw_name)?;
        if !is_pdf(FsPath::new(&filename)) {
            if !declared_pdf {
                return Err(Error::UnsupportedFileType(filename));
            }
            filename.push_str(".pdf");
        }

        let data = field.bytes().await.map_err(multipart_error)?;

        if data.len() > limits.max_upload_size {
            return Err(Error::PayloadTooLarge(format!(
                "{} is {} bytes, the limit is {}",
                filename,
                data.len(),
                limits.max_upload_size
            )));
        }

        files.push(UploadedFile { filename, data });
    }

    if files.is_empty() {
        return Err(Error::bad_request(format!(
            "No documents in field '{}'",
            DOCUMENTS_FIELD
        )));
    }

    let mut urls = Vec::with_capacity(files.len());
    for file in &files {
        let info = state
            .bucket()
            .put_object(&user_id, &file.filename, &file.data)
            .await?;
        urls.push(info.url);
    }

    let ingest_id = match state.job_queue().invoke(WorkerTask::Ingest {
        user_id: user_id.clone(),
        reset: false,
    }) {
        Ok(id) => Some(id.simple().to_string()),
        Err(e) => {
            tracing::warn!("Stored upload for {} but could not queue ingest: {}", user_id, e);
            None
        }
    };

    tracing::info!("Uploaded {} documents for {}", urls.len(), user_id);

    Ok(Json(UploadResponse {
        url: urls[0].clone(),
        urls,
        ingest_id,
    }))
}

/// GET /users/:user_id/documents
pub async fn list_documents(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<ObjectInfo>>> {
    let objects = state.bucket().list_objects(&user_id).await?;
    Ok(Json(objects))
}
