//! Ingestion status endpoint

use axum::{
    extract::{Query, State},
    Json,
};
use lostfound_core::ItemId;

use crate::{
    error::ApiResult,
    middleware::Caller,
    models::{StatusQuery, StatusResponse},
    state::AppState,
};

/// Poll the ingestion status of an uploaded item
///
/// Unknown ids (never submitted, or already pruned) answer with
/// `exists: false` rather than an error, so polling clients can stop.
#[utoipa::path(
    get,
    path = "/status",
    params(StatusQuery),
    responses(
        (status = 200, description = "Current ingestion status", body = StatusResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer" = []))
)]
pub async fn ingestion_status(
    State(state): State<AppState>,
    Caller(_identity): Caller,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<StatusResponse>> {
    let id = ItemId::from(query.image_id.as_str());
    let response = match state.status.get(&id) {
        Some(status) => StatusResponse::from(status),
        None => StatusResponse::unknown(&query.image_id),
    };
    Ok(Json(response))
}
