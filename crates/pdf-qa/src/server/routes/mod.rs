//! API routes

pub mod documents;
pub mod legacy;
pub mod queries;

use axum::{
    extract::{DefaultBodyLimit, State},
    routing::get,
    Json, Router,
};

use crate::processing::QueueStats;
use crate::server::state::AppState;

/// Headroom for multipart boundaries and headers
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build all API routes
pub fn api_routes(max_upload_size: usize, max_files: usize) -> Router<AppState> {
    let body_limit = max_upload_size
        .saturating_mul(max_files.max(1))
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/", get(index))
        .route(
            "/users/:user_id/queries",
            get(queries::list_queries).post(queries::submit_query),
        )
        .route("/users/:user_id/queries/:query_id", get(queries::get_query))
        .route(
            "/users/:user_id/documents",
            get(documents::list_documents)
                .post(documents::upload_documents)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/query", get(legacy::get_query).post(legacy::submit_query))
        .route("/stats", get(stats))
        .route("/info", get(info))
}

/// GET /
async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "Hello": "World" }))
}

/// GET /stats - Worker queue statistics
async fn stats(State(state): State<AppState>) -> Json<QueueStats> {
    Json(state.job_queue().stats())
}

/// API info endpoint
async fn info() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "pdf-qa",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Question answering over uploaded PDF documents with page citations",
        "endpoints": {
            "POST /users/:user_id/queries": "Submit a question (answered in the background)",
            "GET /users/:user_id/queries?count=N": "Recent queries, newest first",
            "GET /users/:user_id/queries/:query_id": "One query and its answer",
            "POST /users/:user_id/documents": "Upload PDFs (multipart field 'documents')",
            "GET /users/:user_id/documents": "List uploaded documents",
            "POST /query": "Submit a question as the default user",
            "GET /query?query_id=": "Fetch a default user query",
            "GET /stats": "Worker queue statistics"
        }
    }))
}
