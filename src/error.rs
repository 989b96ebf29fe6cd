//! Service error types with HTTP status code mapping.
//!
//! [`GuaranteeError`] is the central error type. Each variant maps to a
//! specific HTTP status code and structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::EnrollmentStatus;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2002,
///     "message": "enrollment ... already decided: refunded",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Service error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                     |
/// |-----------|-----------------|---------------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request / 401           |
/// | 2000–2999 | State/Not Found | 404 Not Found / 409 Conflict    |
/// | 3000–3999 | Server          | 500 / 503                       |
#[derive(Debug, Clone, thiserror::Error)]
pub enum GuaranteeError {
    /// Bad input to an operation, rejected before any mutation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown value in a list filter.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// No acting admin identity on the request.
    #[error("missing admin identity")]
    Unauthorized,

    /// Enrollment with the given ID does not exist.
    #[error("enrollment not found: {0}")]
    EnrollmentNotFound(uuid::Uuid),

    /// The enrollment has already left `pending`.
    #[error("enrollment {id} already decided: {status}")]
    AlreadyDecided {
        /// Enrollment identifier.
        id: uuid::Uuid,
        /// Status found at decision time.
        status: EnrollmentStatus,
    },

    /// An enrollment already exists for this purchase.
    #[error("purchase {0} is already enrolled")]
    DuplicatePurchase(String),

    /// Some enrollments failed during an aggregation run of one or more days.
    #[error("aggregation failed for {} enrollment-day(s)", .failed.len())]
    AggregationPartialFailure {
        /// Failed `(day, enrollment)` pairs and their error messages.
        failed: Vec<(NaiveDate, uuid::Uuid, String)>,
    },

    /// Underlying persistence or read failure.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GuaranteeError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Validation(_) => 1001,
            Self::InvalidFilter(_) => 1002,
            Self::Unauthorized => 1003,
            Self::EnrollmentNotFound(_) => 2001,
            Self::AlreadyDecided { .. } => 2002,
            Self::DuplicatePurchase(_) => 2003,
            Self::Internal(_) => 3000,
            Self::DataUnavailable(_) => 3001,
            Self::AggregationPartialFailure { .. } => 3002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidFilter(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::EnrollmentNotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyDecided { .. } | Self::DuplicatePurchase(_) => StatusCode::CONFLICT,
            Self::DataUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::AggregationPartialFailure { .. } | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns extra detail for the response body, if any.
    #[must_use]
    pub fn details(&self) -> Option<String> {
        match self {
            Self::AggregationPartialFailure { failed } => Some(
                failed
                    .iter()
                    .map(|(day, id, err)| format!("{day} {id}: {err}"))
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for GuaranteeError {
    fn from(err: sqlx::Error) -> Self {
        Self::DataUnavailable(err.to_string())
    }
}

impl IntoResponse for GuaranteeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: self.details(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_decided_is_a_conflict() {
        let err = GuaranteeError::AlreadyDecided {
            id: uuid::Uuid::new_v4(),
            status: EnrollmentStatus::Refunded,
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.error_code(), 2002);
        assert!(err.to_string().contains("refunded"));
    }

    #[test]
    fn validation_is_bad_request() {
        let err = GuaranteeError::Validation("reason is required".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.details().is_none());
    }

    #[test]
    fn partial_failure_lists_failed_enrollments() {
        let id = uuid::Uuid::new_v4();
        let day = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap_or_default();
        let err = GuaranteeError::AggregationPartialFailure {
            failed: vec![(day, id, "timeout".to_string())],
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let details = err.details().unwrap_or_default();
        assert!(details.contains(&id.to_string()));
        assert!(details.contains("2025-06-01"));
        assert!(details.contains("timeout"));
    }

    #[test]
    fn sqlx_errors_become_data_unavailable() {
        let err = GuaranteeError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, GuaranteeError::DataUnavailable(_)));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
