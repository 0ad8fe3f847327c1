//! Search endpoints

use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::header::CONTENT_TYPE,
    Json,
};
use lostfound_core::{ItemId, TopK};

use crate::{
    error::{ApiError, ApiResult},
    middleware::Caller,
    models::{ImageUrlSearchRequest, SearchResponse, SimilarSearchRequest, TextSearchRequest},
    state::AppState,
};

/// Search by text description
#[utoipa::path(
    post,
    path = "/search/text",
    request_body = TextSearchRequest,
    responses(
        (status = 200, description = "Ranked matches", body = SearchResponse),
        (status = 400, description = "Invalid parameters"),
        (status = 401, description = "Missing or invalid token"),
        (status = 500, description = "Embedding or store failure")
    ),
    security(("bearer" = []))
)]
pub async fn search_text(
    State(state): State<AppState>,
    Caller(_identity): Caller,
    request: Result<Json<TextSearchRequest>, axum::extract::rejection::JsonRejection>,
) -> ApiResult<Json<SearchResponse>> {
    let Json(request) = request?;
    let params = state.search_params(request.min_similarity, request.top_k);
    let items = state.search.search_by_text(&request.query, params).await?;
    Ok(Json(SearchResponse::from_items(items)))
}

/// Search by image
///
/// Accepts either a multipart upload (`image`, optional `minSimilarity` and
/// `topK` fields) or a JSON body referencing a stored image.
#[utoipa::path(
    post,
    path = "/search/image",
    request_body(
        content = ImageUrlSearchRequest,
        description = "JSON image reference, or multipart/form-data with an image field"
    ),
    responses(
        (status = 200, description = "Ranked matches", body = SearchResponse),
        (status = 400, description = "Invalid image or parameters"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Referenced image not found"),
        (status = 500, description = "Embedding or store failure")
    ),
    security(("bearer" = []))
)]
pub async fn search_image(
    State(state): State<AppState>,
    Caller(_identity): Caller,
    request: Request,
) -> ApiResult<Json<SearchResponse>> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    let items = if is_multipart {
        let mut multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        let mut image = None;
        let mut content_type = None;
        let mut min_similarity = None;
        let mut top_k = None;
        while let Some(field) = multipart.next_field().await? {
            match field.name() {
                Some("image") => {
                    content_type = field.content_type().map(str::to_string);
                    image = Some(field.bytes().await?.to_vec());
                }
                Some("minSimilarity") => {
                    let text = field.text().await?;
                    min_similarity = Some(text.trim().parse::<f32>().map_err(|_| {
                        ApiError::BadRequest(format!("minSimilarity is not a number: {text}"))
                    })?);
                }
                Some("topK") => top_k = Some(parse_top_k(&field.text().await?)?),
                _ => {}
            }
        }

        let image = image.ok_or_else(|| ApiError::BadRequest("image is required".to_string()))?;
        let params = state.search_params(min_similarity, top_k);
        state
            .search
            .search_by_image(&image, content_type.as_deref(), params)
            .await?
    } else {
        let Json(body) = Json::<ImageUrlSearchRequest>::from_request(request, &state).await?;
        let params = state.search_params(body.min_similarity, body.top_k);
        state
            .search
            .search_by_image_url(&body.image_url, params)
            .await?
    };

    Ok(Json(SearchResponse::from_items(items)))
}

/// Find items similar to a stored item
#[utoipa::path(
    post,
    path = "/search/similar",
    request_body = SimilarSearchRequest,
    responses(
        (status = 200, description = "Ranked matches excluding the item itself", body = SearchResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Item not found")
    ),
    security(("bearer" = []))
)]
pub async fn search_similar(
    State(state): State<AppState>,
    Caller(_identity): Caller,
    request: Result<Json<SimilarSearchRequest>, axum::extract::rejection::JsonRejection>,
) -> ApiResult<Json<SearchResponse>> {
    let Json(request) = request?;
    let params = state.search_params(request.min_similarity, request.top_k);
    let items = state
        .search
        .search_similar_to_item(&ItemId::from(request.item_id), params)
        .await?;
    Ok(Json(SearchResponse::from_items(items)))
}

fn parse_top_k(text: &str) -> ApiResult<TopK> {
    serde_json::from_value(serde_json::Value::String(text.trim().to_string()))
        .map_err(|e| ApiError::BadRequest(format!("topK: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_top_k() {
        assert_eq!(parse_top_k("5").unwrap(), TopK::Limit(5));
        assert_eq!(parse_top_k(" all ").unwrap(), TopK::All);
        assert!(parse_top_k("lots").is_err());
    }
}
