//! Caller identity and the Auth Provider seam.
//!
//! The HTTP layer hands a bearer token to an [`IdentityProvider`] and gets back
//! a verified [`Identity`]. Administrative override for moderation is carried
//! as an explicit [`Role`] on the identity.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{config::AuthConfig, error::AuthError};

/// Role attached to a verified identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular user; may delete only their own items.
    #[default]
    Member,
    /// Moderator; may delete any item.
    Moderator,
}

impl Role {
    /// Whether this role may act on items owned by someone else.
    pub fn can_moderate(&self) -> bool {
        matches!(self, Role::Moderator)
    }
}

/// Verified caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
}

impl Identity {
    /// A member identity.
    pub fn member(subject: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            email: email.into(),
            role: Role::Member,
        }
    }

    /// A moderator identity.
    pub fn moderator(subject: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            email: email.into(),
            role: Role::Moderator,
        }
    }
}

/// Issues and validates caller identities.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify a bearer token and return the identity it carries.
    async fn authenticate(&self, token: &str) -> Result<Identity, AuthError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    #[serde(default)]
    role: Role,
    exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<String>,
}

/// HS256 JWT identity provider.
pub struct JwtIdentityProvider {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: Option<String>,
    token_ttl_seconds: i64,
}

impl JwtIdentityProvider {
    /// Build a provider from the auth configuration section.
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.leeway_seconds;
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer.as_str()]);
        }
        Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            token_ttl_seconds: config.token_ttl_seconds,
        }
    }

    /// Mint a token for an identity. Used by tooling and tests.
    pub fn issue(&self, identity: &Identity) -> Result<String, AuthError> {
        let claims = Claims {
            sub: identity.subject.clone(),
            email: identity.email.clone(),
            role: identity.role,
            exp: Utc::now().timestamp() + self.token_ttl_seconds,
            iss: self.issuer.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        if data.claims.sub.trim().is_empty() {
            return Err(AuthError::InvalidToken("empty subject".to_string()));
        }
        Ok(Identity {
            subject: data.claims.sub,
            email: data.claims.email,
            role: data.claims.role,
        })
    }
}
