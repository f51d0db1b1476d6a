//! Error to response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::game::GameError;

#[derive(Debug)]
pub enum ApiError {
    Game(GameError),
    /// Missing or unverifiable bearer token.
    Unauthenticated,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub code: &'static str,
}

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self { ApiError::Game(err) }
}

pub fn status_for(err: &GameError) -> StatusCode {
    match err {
        GameError::Unauthorized(_) => StatusCode::FORBIDDEN,
        GameError::InvalidState(_) | GameError::ResourceExhausted(_) | GameError::Conflict(_) => StatusCode::CONFLICT,
        GameError::NotFound(_) => StatusCode::NOT_FOUND,
        GameError::Validation(_) => StatusCode::BAD_REQUEST,
        GameError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, code) = match self {
            ApiError::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, "missing or invalid token".to_string(), "UNAUTHENTICATED")
            }
            ApiError::Game(err) => {
                if err.is_internal() {
                    tracing::error!(?err, "request failed");
                }
                (status_for(&err), err.public_message(), err.code())
            }
        };
        (status, Json(ErrorBody { success: false, error, code })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(status_for(&GameError::unauthorized("x")), StatusCode::FORBIDDEN);
        assert_eq!(status_for(&GameError::exhausted("x")), StatusCode::CONFLICT);
        assert_eq!(status_for(&GameError::validation("x")), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&GameError::not_found("x")), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Unauthenticated.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn internal_details_stay_server_side() {
        let resp = ApiError::from(GameError::internal("disk on fire")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
