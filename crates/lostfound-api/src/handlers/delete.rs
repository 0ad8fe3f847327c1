//! Item deletion endpoint

use axum::{extract::State, Json};
use lostfound_core::ItemId;

use crate::{
    error::{ApiError, ApiResult},
    middleware::Caller,
    models::{DeleteRequest, DeleteResponse},
    state::AppState,
};

/// Delete an item and its image
///
/// Only the submitter or a moderator may delete an item.
#[utoipa::path(
    post,
    path = "/delete",
    request_body = DeleteRequest,
    responses(
        (status = 200, description = "Item deleted", body = DeleteResponse),
        (status = 400, description = "File name does not match the item"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Caller may not delete this item"),
        (status = 404, description = "Item not found"),
        (status = 500, description = "Store failure")
    ),
    security(("bearer" = []))
)]
pub async fn delete_item(
    State(state): State<AppState>,
    Caller(identity): Caller,
    request: Result<Json<DeleteRequest>, axum::extract::rejection::JsonRejection>,
) -> ApiResult<Json<DeleteResponse>> {
    let Json(request) = request?;
    if request.item_id.trim().is_empty() {
        return Err(ApiError::BadRequest("itemId is required".to_string()));
    }

    let outcome = state
        .deletion
        .delete_with_file_name(
            &ItemId::from(request.item_id),
            request.file_name.as_deref(),
            &identity,
        )
        .await?;

    Ok(Json(DeleteResponse {
        success: true,
        item_id: outcome.item_id.to_string(),
        blob_removed: outcome.blob_removed,
    }))
}
