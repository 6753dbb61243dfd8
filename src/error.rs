//! Error types for the Biblioteca server

use std::collections::BTreeMap;

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Stable error codes returned to API clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NotFound = 4,
    BookNotAvailable = 5,
    Duplicate = 6,
    BadValue = 7,
    InvalidTransition = 8,
    TooManyAttempts = 9,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A single rejected input field
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// Field-level validation failures, surfaced to the originating form
    #[error("Invalid fields: {0}")]
    Fields(#[from] validator::ValidationErrors),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// No copy of the book can be handed out
    #[error("Not available: {0}")]
    NotAvailable(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Business rule violation: {0}")]
    BusinessRule(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Too many login attempts, retry in {retry_after_secs} seconds")]
    TooManyAttempts { retry_after_secs: u64 },
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
    /// Per-field messages for validation failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, Vec<String>>>,
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    fn status_and_code(&self) -> (StatusCode, ErrorCode) {
        match self {
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized),
            AppError::Authorization(_) => (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NotFound),
            AppError::Validation { .. } => (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::BadValue),
            AppError::Fields(_) => (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::BadValue),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::DbFailure),
            AppError::Conflict(_) => (StatusCode::CONFLICT, ErrorCode::Duplicate),
            AppError::NotAvailable(_) => (StatusCode::CONFLICT, ErrorCode::BookNotAvailable),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Failure),
            AppError::BusinessRule(_) => (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::Failure),
            AppError::InvalidTransition { .. } => {
                (StatusCode::CONFLICT, ErrorCode::InvalidTransition)
            }
            AppError::TooManyAttempts { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, ErrorCode::TooManyAttempts)
            }
        }
    }
}

/// Flatten validator errors into `field -> [messages]`
fn field_messages(errors: &validator::ValidationErrors) -> BTreeMap<String, Vec<String>> {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value ({})", e.code))
                })
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let (message, fields) = match &self {
            AppError::Database(e) => {
                // Unique violations are user errors, everything else stays opaque
                if let sqlx::Error::Database(db) = e {
                    if db.is_unique_violation() {
                        let body = Json(ErrorResponse {
                            code: ErrorCode::Duplicate as u32,
                            error: format!("{:?}", ErrorCode::Duplicate),
                            message: "A record with the same unique value already exists"
                                .to_string(),
                            fields: None,
                        });
                        return (StatusCode::CONFLICT, body).into_response();
                    }
                    if db.is_foreign_key_violation() {
                        let body = Json(ErrorResponse {
                            code: ErrorCode::BadValue as u32,
                            error: format!("{:?}", ErrorCode::BadValue),
                            message: "A referenced record does not exist".to_string(),
                            fields: None,
                        });
                        return (StatusCode::UNPROCESSABLE_ENTITY, body).into_response();
                    }
                }
                tracing::error!("Database error: {:?}", e);
                ("Database error".to_string(), None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ("Internal server error".to_string(), None)
            }
            AppError::Fields(errors) => {
                ("Some fields are invalid".to_string(), Some(field_messages(errors)))
            }
            AppError::Validation { field, message } => (
                message.clone(),
                Some(BTreeMap::from([(field.clone(), vec![message.clone()])])),
            ),
            AppError::TooManyAttempts { retry_after_secs } => (
                format!(
                    "Too many login attempts. Please try again in {} seconds.",
                    retry_after_secs
                ),
                None,
            ),
            AppError::InvalidTransition { .. } => (self.to_string(), None),
            AppError::Authentication(msg)
            | AppError::Authorization(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::NotAvailable(msg)
            | AppError::BadRequest(msg)
            | AppError::BusinessRule(msg) => (msg.clone(), None),
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
            fields,
        });

        let mut response = (status, body).into_response();
        if let AppError::TooManyAttempts { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Form {
        #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
        password: String,
    }

    #[test]
    fn maps_domain_errors_to_statuses() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::Authorization("x".into()), StatusCode::FORBIDDEN),
            (AppError::NotAvailable("x".into()), StatusCode::CONFLICT),
            (
                AppError::InvalidTransition {
                    from: "rejected".into(),
                    to: "approved".into(),
                },
                StatusCode::CONFLICT,
            ),
            (AppError::BusinessRule("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn lockout_sets_retry_after_header() {
        let response = AppError::TooManyAttempts { retry_after_secs: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "42");
    }

    #[test]
    fn validation_errors_keep_field_messages() {
        let errors = Form {
            password: "short".into(),
        }
        .validate()
        .unwrap_err();

        let fields = field_messages(&errors);
        assert_eq!(
            fields.get("password").unwrap(),
            &vec!["Password must be at least 8 characters".to_string()]
        );

        let response = AppError::from(errors).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn single_field_errors_are_unprocessable_with_field_messages() {
        let response = AppError::validation(
            "planned_return_date",
            "Planned return date must be in the future",
        )
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], ErrorCode::BadValue as u32);
        assert_eq!(
            body["fields"]["planned_return_date"][0],
            "Planned return date must be in the future"
        );
    }

    #[test]
    fn bad_requests_stay_400() {
        let response = AppError::BadRequest("Missing file field".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
