//! Single-user routes kept for older clients
//!
//! Everything here acts on behalf of the default user.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{query::DEFAULT_USER_ID, QueryModel, SubmitQueryRequest};

#[derive(Debug, Deserialize)]
pub struct GetQueryParams {
    pub query_id: Option<String>,
}

/// GET /query?query_id=
pub async fn get_query(
    State(state): State<AppState>,
    Query(params): Query<GetQueryParams>,
) -> Result<Json<QueryModel>> {
    let query_id = params
        .query_id
        .ok_or_else(|| Error::bad_request("query_id is required"))?;
    let item = state.get_query(DEFAULT_USER_ID, &query_id).await?;
    Ok(Json(item))
}

/// POST /query
pub async fn submit_query(
    State(state): State<AppState>,
    Json(request): Json<SubmitQueryRequest>,
) -> Result<Json<QueryModel>> {
    let item = state.submit_query(DEFAULT_USER_ID, &request.query_text).await?;
    Ok(Json(item))
}
