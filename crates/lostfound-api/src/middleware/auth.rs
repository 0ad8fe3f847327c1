//! Bearer token authentication

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use lostfound_core::{AuthError, Identity, IdentityProvider};

use crate::{error::ApiError, state::AppState};

/// Verified identity of the caller.
///
/// Extracting it rejects the request with 401 when the `Authorization`
/// header is missing or the token does not verify.
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingCredentials)?
            .to_str()
            .map_err(|_| AuthError::InvalidToken("non-ASCII authorization header".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .ok_or_else(|| AuthError::InvalidToken("expected a Bearer token".to_string()))?;

        let identity = state.identity.authenticate(token).await?;
        tracing::debug!("Authenticated {} ({:?})", identity.subject, identity.role);
        Ok(Caller(identity))
    }
}
