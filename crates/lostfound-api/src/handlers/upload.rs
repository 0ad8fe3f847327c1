//! Found-item upload endpoint

use axum::{
    extract::{Multipart, State},
    Json,
};
use lostfound_core::Submission;

use crate::{
    error::{ApiError, ApiResult},
    middleware::Caller,
    models::{UploadForm, UploadResponse, UploadedItem},
    state::AppState,
};

/// Read the multipart form into a submission.
pub(crate) async fn read_submission(multipart: &mut Multipart) -> ApiResult<Submission> {
    let mut title = None;
    let mut description = String::new();
    let mut location = String::new();
    let mut image = None;
    let mut content_type = None;

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("title") => title = Some(field.text().await?),
            Some("description") => description = field.text().await?,
            Some("location") => location = field.text().await?,
            Some("image") => {
                content_type = field.content_type().map(str::to_string);
                image = Some(field.bytes().await?.to_vec());
            }
            other => tracing::debug!("Ignoring multipart field {:?}", other),
        }
    }

    Ok(Submission {
        title: title.ok_or_else(|| ApiError::BadRequest("title is required".to_string()))?,
        description,
        location,
        image: image.ok_or_else(|| ApiError::BadRequest("image is required".to_string()))?,
        content_type,
    })
}

/// Submit a found item
#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Item stored", body = UploadResponse),
        (status = 400, description = "Invalid submission"),
        (status = 401, description = "Missing or invalid token"),
        (status = 500, description = "Storage or embedding failure")
    ),
    security(("bearer" = []))
)]
pub async fn upload(
    State(state): State<AppState>,
    Caller(identity): Caller,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let submission = read_submission(&mut multipart).await?;

    let item = if state.config.server.async_ingest {
        let title = submission.title.trim().to_string();
        let description = submission.description.trim().to_string();
        let location = submission.location.trim().to_string();
        let id = state.pipeline.submit(submission, &identity)?;
        UploadedItem {
            id: id.to_string(),
            title,
            description,
            location,
            image_url: None,
            status: "pending".to_string(),
        }
    } else {
        let record = state.pipeline.ingest(submission, &identity).await?;
        UploadedItem::from(&record)
    };

    Ok(Json(UploadResponse {
        success: true,
        item,
    }))
}
