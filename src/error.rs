// src/error.rs
use thiserror::Error;
use warp::http::StatusCode;
use warp::reject::Reject;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("User not found")]
    UserNotFound,
    #[error("Username already exists")]
    UsernameTaken,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Invalid stock symbol: {0}")]
    InvalidSymbol(String),
    #[error("Quote unavailable: {0}")]
    QuoteUnavailable(String),
    #[error("Insufficient balance")]
    InsufficientFunds,
    #[error("Insufficient stock quantity")]
    InsufficientHoldings,
    #[error("Portfolio is empty")]
    EmptyPortfolio,
    #[error("{0}")]
    ValidationError(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::ValidationError(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_)
            | AppError::InvalidSymbol(_)
            | AppError::InsufficientFunds
            | AppError::InsufficientHoldings
            | AppError::EmptyPortfolio
            | AppError::UsernameTaken => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::UserNotFound => StatusCode::NOT_FOUND,
            AppError::QuoteUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand back to a client; infrastructure details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl Reject for AppError {}

impl From<scylla::transport::errors::QueryError> for AppError {
    fn from(err: scylla::transport::errors::QueryError) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_map_to_client_statuses() {
        assert_eq!(AppError::InsufficientFunds.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::UsernameTaken.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::UserNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::QuoteUnavailable("timeout".into()).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn infrastructure_errors_hide_details() {
        let err = AppError::Database("connection refused to 10.0.0.3".into());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Internal server error");
        assert_eq!(
            AppError::InvalidSymbol("ZZZZ".into()).public_message(),
            "Invalid stock symbol: ZZZZ"
        );
    }
}
