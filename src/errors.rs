//! Typed error hierarchy for the board backend.
//!
//! `BoardError` is what every board operation returns. The HTTP layer maps
//! each variant to a status code in `board::api::ApiError`.

use thiserror::Error;

/// Errors from board operations (ordering engine and board services).
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Not authorized to modify this board")]
    NotAuthorized,

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),
}

impl BoardError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

pub type BoardResult<T> = std::result::Result<T, BoardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_carries_kind_and_id() {
        let err = BoardError::not_found("Card", "abc");
        match &err {
            BoardError::NotFound { kind, id } => {
                assert_eq!(*kind, "Card");
                assert_eq!(id, "abc");
            }
            _ => panic!("Expected NotFound"),
        }
        assert_eq!(err.to_string(), "Card abc not found");
    }

    #[test]
    fn database_error_keeps_source() {
        let err = BoardError::Database(anyhow::anyhow!("disk I/O error"));
        assert!(err.to_string().contains("disk I/O error"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn auth_errors_have_fixed_messages() {
        assert_eq!(BoardError::NotAuthenticated.to_string(), "Not authenticated");
        assert_eq!(
            BoardError::NotAuthorized.to_string(),
            "Not authorized to modify this board"
        );
    }
}
