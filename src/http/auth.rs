//! Bearer token identity.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use crate::http::error::ApiError;
use crate::http::routes::AppState;
use crate::util::token::Claims;

/// The verified caller. Handlers take the acting player from here and
/// nowhere else.
#[derive(Debug, Clone)]
pub struct Identity(pub Claims);

#[async_trait]
impl FromRequestParts<AppState> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthenticated)?;
        state.tokens.verify(token.trim()).map(Identity).map_err(|err| {
            tracing::debug!(%err, "bearer token rejected");
            ApiError::Unauthenticated
        })
    }
}
