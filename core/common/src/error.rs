// core/common/src/error.rs
// Standardized error responses and handling

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(rename = "requiresAccount", skip_serializing_if = "Option::is_none")]
    pub requires_account: Option<String>,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Unauthorized access")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    /// The payer or receiver has no registered payment account for the rail.
    /// Carries the lowercase role name so clients can prompt the right party.
    #[error("{role} needs to add a payment account for this method first")]
    MissingAccount { role: String },
    /// Remote payment rail rejected or failed the call; the remote message is
    /// surfaced verbatim.
    #[error("{0}")]
    ExternalRail(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation_error",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Unauthorized => "unauthorized",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::MissingAccount { .. } => "missing_payment_account",
            ServiceError::ExternalRail(_) => "payment_rail_error",
            ServiceError::Database(_) => "database_error",
            ServiceError::Internal(_) => "internal_error",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::MissingAccount { .. } => StatusCode::BAD_REQUEST,
            // Rail failures are surfaced as client-visible 400s with the
            // remote message, matching the settlement failure policy.
            ServiceError::ExternalRail(_) => StatusCode::BAD_REQUEST,
            ServiceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.error_code().to_string(),
            message: self.to_string(),
            requires_account: match self {
                ServiceError::MissingAccount { role } => Some(role.clone()),
                _ => None,
            },
        }
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        self.http_status()
    }

    fn error_response(&self) -> HttpResponse {
        // 5xx detail stays in the logs; clients get a stable message.
        if self.http_status().is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "request failed");
            return HttpResponse::build(self.http_status()).json(ErrorResponse {
                error: self.error_code().to_string(),
                message: "Internal server error".to_string(),
                requires_account: None,
            });
        }
        HttpResponse::build(self.http_status()).json(self.to_error_response())
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::Database(err.to_string())
    }
}

impl From<crate::validation::ValidationError> for ServiceError {
    fn from(err: crate::validation::ValidationError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl From<crate::auth::AuthError> for ServiceError {
    fn from(_: crate::auth::AuthError) -> Self {
        ServiceError::Unauthorized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_400() {
        let err = ServiceError::Validation("amount must be positive".to_string());
        assert_eq!(err.error_code(), "validation_error");
        assert_eq!(err.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "amount must be positive");
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let err = ServiceError::NotFound("Loan not found".to_string());
        assert_eq!(err.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), "not_found");
    }

    #[test]
    fn test_missing_account_carries_role() {
        let err = ServiceError::MissingAccount {
            role: "borrower".to_string(),
        };
        assert_eq!(err.http_status(), StatusCode::BAD_REQUEST);
        let body = err.to_error_response();
        assert_eq!(body.requires_account.as_deref(), Some("borrower"));
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"requiresAccount\":\"borrower\""));
    }

    #[test]
    fn test_rail_error_is_client_visible() {
        let err = ServiceError::ExternalRail("card declined".to_string());
        assert_eq!(err.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "card declined");
    }

    #[test]
    fn test_database_error_is_500() {
        let err = ServiceError::Database("connection refused".to_string());
        assert_eq!(err.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_requires_account_omitted_when_absent() {
        let err = ServiceError::Conflict("already linked".to_string());
        let json = serde_json::to_string(&err.to_error_response()).unwrap();
        assert!(!json.contains("requiresAccount"));
    }
}
