use axum::{body::Body, http::Request, middleware::Next, response::Response};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::ApiError;
use crate::AppState;

/// Identity of the authenticated caller, stored in request extensions.
#[derive(Clone, Debug)]
pub struct OwnerContext(pub String);

/// Claims carried by a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Expiry as seconds since the Unix epoch.
    pub exp: u64,
}

/// Verifies HS256 bearer tokens signed by the external token issuer.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn from_secret(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Returns the user id named by a valid, unexpired token.
    pub fn verify(&self, token: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let data = decode::<Claims>(token, &self.key, &self.validation)?;
        Ok(data.claims.user_id)
    }
}

/// Middleware to authenticate requests via `Authorization: Bearer <token>`.
///
/// On success the owner id is inserted as an [`OwnerContext`] extension.
/// Any missing, malformed, expired, or wrongly signed token yields 401.
pub async fn auth_middleware(mut req: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Unauthorized)?
        .to_string();

    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .ok_or_else(|| ApiError::InternalServerError("server misconfigured".to_string()))?
        .clone();

    let owner_id = state.tokens.verify(&token).map_err(|e| {
        tracing::debug!(error = %e, "rejected bearer token");
        ApiError::Unauthorized
    })?;

    if owner_id.trim().is_empty() {
        return Err(ApiError::Unauthorized);
    }

    req.extensions_mut().insert(OwnerContext(owner_id));
    Ok(next.run(req).await)
}
