//! Domain error type shared by the guard, the processor and the store.
//!
//! Every rejected action comes back as one of these values; nothing is
//! thrown across the room-state boundary and no variant ever carries another
//! player's cards.

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    /// Caller is not a room member, not the host, or not the current player.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Action is incompatible with the current phase, status or held card.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Drawing from an empty pile.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Malformed input such as an out of range hand index.
    #[error("validation error: {0}")]
    Validation(String),
    /// The stored record moved on between read and commit.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Storage or invariant failure. The detail is for logs only.
    #[error("internal error")]
    Internal(String),
}

impl GameError {
    pub fn unauthorized(detail: impl Into<String>) -> Self { Self::Unauthorized(detail.into()) }
    pub fn invalid_state(detail: impl Into<String>) -> Self { Self::InvalidState(detail.into()) }
    pub fn exhausted(detail: impl Into<String>) -> Self { Self::ResourceExhausted(detail.into()) }
    pub fn not_found(detail: impl Into<String>) -> Self { Self::NotFound(detail.into()) }
    pub fn validation(detail: impl Into<String>) -> Self { Self::Validation(detail.into()) }
    pub fn conflict(detail: impl Into<String>) -> Self { Self::Conflict(detail.into()) }
    pub fn internal(detail: impl Into<String>) -> Self { Self::Internal(detail.into()) }

    /// Stable machine-readable code, SCREAMING_SNAKE_CASE.
    pub fn code(&self) -> &'static str {
        match self {
            GameError::Unauthorized(_) => "UNAUTHORIZED",
            GameError::InvalidState(_) => "INVALID_STATE",
            GameError::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
            GameError::NotFound(_) => "NOT_FOUND",
            GameError::Validation(_) => "VALIDATION_ERROR",
            GameError::Conflict(_) => "CONFLICT",
            GameError::Internal(_) => "INTERNAL",
        }
    }

    /// Message safe to hand to a client.
    pub fn public_message(&self) -> String {
        match self {
            GameError::Unauthorized(d)
            | GameError::InvalidState(d)
            | GameError::ResourceExhausted(d)
            | GameError::NotFound(d)
            | GameError::Validation(d)
            | GameError::Conflict(d) => d.clone(),
            GameError::Internal(_) => "internal error".to_string(),
        }
    }

    pub fn is_internal(&self) -> bool { matches!(self, GameError::Internal(_)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_detail_is_not_public() {
        let err = GameError::internal("store shard poisoned at 0xdeadbeef");
        assert_eq!(err.public_message(), "internal error");
        assert_eq!(err.to_string(), "internal error");
        assert!(err.is_internal());
    }

    #[test]
    fn domain_errors_keep_their_detail() {
        let err = GameError::exhausted("the deck is empty");
        assert_eq!(err.code(), "RESOURCE_EXHAUSTED");
        assert_eq!(err.public_message(), "the deck is empty");
    }
}
