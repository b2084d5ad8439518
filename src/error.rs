use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{crypto::CipherError, verification::CodeSubject};

/// Message returned for every verification failure, whatever the cause.
pub const VERIFICATION_FAILED_MESSAGE: &str = "Invalid or expired code";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("card {0} not found")]
    CardNotFound(i64),

    #[error("not authenticated")]
    Unauthorized,

    #[error("verification code does not match")]
    InvalidCode,

    #[error("no pending verification for {0}")]
    NoPendingVerification(CodeSubject),

    #[error("verification code expired")]
    CodeExpired,

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("code delivery failed: {0}")]
    Delivery(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error(transparent)]
    Cipher(#[from] CipherError),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidCode | Self::NoPendingVerification(_) | Self::CodeExpired
        )
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) | Self::CardNotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized
            | Self::InvalidCode
            | Self::NoPendingVerification(_)
            | Self::CodeExpired => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Delivery(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) | Self::Cipher(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The text a client is allowed to see.
    fn public_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::NotFound(what) => format!("{what} not found"),
            Self::CardNotFound(_) => "Card not found".to_string(),
            Self::Unauthorized => "Not authenticated".to_string(),
            Self::InvalidCode | Self::NoPendingVerification(_) | Self::CodeExpired => {
                VERIFICATION_FAILED_MESSAGE.to_string()
            }
            Self::RateLimited { .. } => "Too many attempts, try again later".to_string(),
            Self::Delivery(_) => "Verification code could not be sent".to_string(),
            Self::Storage(_) => "Storage temporarily unavailable".to_string(),
            Self::Cipher(_) => "Internal error".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            Self::Cipher(err) => tracing::error!(error = %err, "stored card data could not be decrypted"),
            Self::Storage(err) => tracing::error!(error = %err, "storage failure"),
            Self::Delivery(err) => tracing::error!(error = %err, "code delivery failed"),
            err if err.is_verification_failure() => {
                tracing::warn!(reason = %err, "verification rejected")
            }
            err => tracing::debug!(error = %err, "request failed"),
        }

        let status = self.status();
        let body = ErrorBody {
            success: false,
            message: self.public_message(),
            retryable: matches!(self, Self::Storage(_) | Self::Delivery(_)),
        };
        let mut response = (status, Json(body)).into_response();

        if let Self::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_failures_share_one_message() {
        let errors = [
            AppError::InvalidCode,
            AppError::NoPendingVerification(CodeSubject::Card(7)),
            AppError::NoPendingVerification(CodeSubject::AdminLogin),
            AppError::CodeExpired,
        ];
        for err in errors {
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(err.public_message(), VERIFICATION_FAILED_MESSAGE);
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::CardNotFound(1).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::RateLimited { retry_after_secs: 3 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::Storage(sqlx::Error::PoolTimedOut).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(AppError::Delivery("smtp down".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            AppError::Cipher(CipherError::Decryption).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = AppError::RateLimited { retry_after_secs: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }

    #[tokio::test]
    async fn test_storage_error_is_retryable_500() {
        let response = AppError::Storage(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["retryable"], true);
        assert!(!body.to_string().contains("PoolTimedOut"));
    }

    #[test]
    fn test_internal_detail_is_not_exposed() {
        let err = AppError::Cipher(CipherError::MalformedToken("missing delimiter"));
        assert_eq!(err.public_message(), "Internal error");
    }
}
