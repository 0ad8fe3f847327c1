//! API route definitions

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::{
    handlers::{delete, health, search, status, upload},
    middleware::logging_middleware,
    state::AppState,
};

/// API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/upload", post(upload::upload))
        .route("/search/text", post(search::search_text))
        .route("/search/image", post(search::search_image))
        .route("/search/similar", post(search::search_similar))
        .route("/status", get(status::ingestion_status))
        .route("/delete", post(delete::delete_item))
        .route("/api-docs/openapi.json", get(openapi_json))
}

/// Combined routes with blob serving and middleware
pub fn all_routes(state: AppState) -> Router {
    let mut router = api_routes();

    // only local prefixes can be served from the blob root
    let prefix = state.config.blob.public_prefix.trim_end_matches('/');
    if prefix.starts_with('/') && prefix.len() > 1 {
        router = router.nest_service(prefix, ServeDir::new(&state.config.blob.root));
    }

    router
        .layer(DefaultBodyLimit::max(state.config.server.max_body_bytes))
        .layer(axum::middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        upload::upload,
        search::search_text,
        search::search_image,
        search::search_similar,
        status::ingestion_status,
        delete::delete_item,
    ),
    components(schemas(
        crate::models::ResultItemResponse,
        crate::models::SearchResponse,
        crate::models::TextSearchRequest,
        crate::models::ImageUrlSearchRequest,
        crate::models::SimilarSearchRequest,
        crate::models::UploadForm,
        crate::models::UploadedItem,
        crate::models::UploadResponse,
        crate::models::StatusResponse,
        crate::models::DeleteRequest,
        crate::models::DeleteResponse,
        crate::models::HealthResponse,
    )),
    modifiers(&BearerAuth),
    info(
        title = "Lost & Found API",
        version = "1.0.0",
        description = "Upload found items and search them by text or image similarity"
    )
)]
pub struct ApiDoc;
