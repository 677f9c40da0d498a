//! Query submission and retrieval endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::error::Result;
use crate::server::state::AppState;
use crate::storage::bucket::validate_user_id;
use crate::types::{ListQueriesParams, QueryModel, SubmitQueryRequest};

/// POST /users/:user_id/queries - Store a question and queue it for answering
pub async fn submit_query(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<SubmitQueryRequest>,
) -> Result<Json<QueryModel>> {
    validate_user_id(&user_id)?;
    let item = state.submit_query(&user_id, &request.query_text).await?;
    Ok(Json(item))
}

/// GET /users/:user_id/queries - Most recent queries, newest first
pub async fn list_queries(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<ListQueriesParams>,
) -> Result<Json<Vec<QueryModel>>> {
    validate_user_id(&user_id)?;
    let items = state.list_queries(&user_id, params.effective_count()).await?;
    Ok(Json(items))
}

/// GET /users/:user_id/queries/:query_id
pub async fn get_query(
    State(state): State<AppState>,
    Path((user_id, query_id)): Path<(String, String)>,
) -> Result<Json<QueryModel>> {
    validate_user_id(&user_id)?;
    let item = state.get_query(&user_id, &query_id).await?;
    Ok(Json(item))
}
