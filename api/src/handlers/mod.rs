pub mod admin;
pub mod auth;
pub mod billing;
pub mod business;
pub mod customers;
pub mod health;
pub mod lead_forms;
pub mod metrics;
pub mod notes;
pub mod oauth;
pub mod pages;
pub mod profile;
pub mod reminders;
pub mod tasks;

// Common response types
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::errors::{
    ApiError, AuthError, BillingError, DatabaseError, MailError, PlanError, ValidationError,
};
use common::lead_form::CaptureError;
use serde::Serialize;

/// Standard API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub trace_id: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn not_found(what: &str) -> Self {
        Self::new("not_found", format!("{} not found", what))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    pub fn internal() -> Self {
        Self::new("internal_error", "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.as_str() {
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "forbidden" | "upgrade_required" => StatusCode::FORBIDDEN,
            "not_found" => StatusCode::NOT_FOUND,
            "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limit_exceeded" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<ApiError> for ErrorResponse {
    fn from(err: ApiError) -> Self {
        let response = Self::new(err.code.to_ascii_lowercase(), err.message);
        match err.details {
            Some(details) => response.with_details(details),
            None => response,
        }
    }
}

impl From<DatabaseError> for ErrorResponse {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => Self::new("not_found", msg),
            DatabaseError::DuplicateKey(_) => Self::new("conflict", "Record already exists"),
            DatabaseError::ForeignKeyViolation(_) => {
                Self::validation("Referenced record does not exist")
            }
            other => {
                tracing::error!(error = %other, "Database error");
                Self::internal()
            }
        }
    }
}

impl From<AuthError> for ErrorResponse {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Internal(ref msg) => {
                tracing::error!(error = %msg, "Authentication backend failure");
                Self::internal()
            }
            AuthError::Validation(e) => e.into(),
            AuthError::UserNotFound(_) => Self::new("unauthorized", "Invalid credentials"),
            AuthError::InvalidToken(_) | AuthError::TokenExpired => {
                Self::new("unauthorized", "Invalid or expired token")
            }
            other => ApiError::from(other).into(),
        }
    }
}

impl From<ValidationError> for ErrorResponse {
    fn from(err: ValidationError) -> Self {
        ApiError::from(err).into()
    }
}

impl From<PlanError> for ErrorResponse {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::Database(e) => e.into(),
            other => ApiError::from(other).into(),
        }
    }
}

impl From<MailError> for ErrorResponse {
    fn from(err: MailError) -> Self {
        tracing::error!(error = %err, "Email delivery failed");
        Self::new("mail_error", "Failed to send email. Please try again later.")
    }
}

impl From<BillingError> for ErrorResponse {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Storage(e) => e.into(),
            BillingError::Provider(ref msg) => {
                tracing::error!(error = %msg, "Payment provider request failed");
                Self::new("billing_error", "Payment provider request failed")
            }
            other => ApiError::from(other).into(),
        }
    }
}

impl From<CaptureError> for ErrorResponse {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::FormNotFound => Self::not_found("Form"),
            CaptureError::RateLimited => Self::new("rate_limit_exceeded", err.to_string()),
            CaptureError::DuplicateBlocked => Self::validation(err.to_string()),
            CaptureError::Invalid(e) => e.into(),
            CaptureError::Database(e) => e.into(),
        }
    }
}

/// Standard API success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            message: None,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            data,
            message: Some(message.into()),
        }
    }
}

impl<T: Serialize> IntoResponse for SuccessResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Same as `SuccessResponse` but answered with 201
pub struct Created<T: Serialize>(pub T);

impl<T: Serialize> IntoResponse for Created<T> {
    fn into_response(self) -> Response {
        (StatusCode::CREATED, Json(SuccessResponse::new(self.0))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_map_to_status() {
        assert_eq!(ErrorResponse::new("unauthorized", "x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorResponse::new("upgrade_required", "x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorResponse::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrorResponse::new("rate_limit_exceeded", "x").status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ErrorResponse::new("payment_not_configured", "x").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_domain_errors_convert() {
        let e: ErrorResponse = PlanError::UpgradeRequired("upgrade".into()).into();
        assert_eq!(e.error, "upgrade_required");

        let e: ErrorResponse = AuthError::EmailTaken("a@b.c".into()).into();
        assert_eq!(e.status(), StatusCode::CONFLICT);

        let e: ErrorResponse = BillingError::InvoiceNotFound("9".into()).into();
        assert_eq!(e.status(), StatusCode::NOT_FOUND);

        let e: ErrorResponse = DatabaseError::QueryFailed("secret detail".into()).into();
        assert_eq!(e.message, "Internal server error");

        let e: ErrorResponse = CaptureError::RateLimited.into();
        assert_eq!(e.status(), StatusCode::TOO_MANY_REQUESTS);

        let e: ErrorResponse = PlanError::SlugTaken("gold".into()).into();
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);

        let e: ErrorResponse = PlanError::InUse("gold".into()).into();
        assert_eq!(e.status(), StatusCode::CONFLICT);

        let e: ErrorResponse = MailError::Transport("refused".into()).into();
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!e.message.contains("refused"));
    }

    #[test]
    fn test_auth_failures_never_answer_500_for_bad_input() {
        let e: ErrorResponse = AuthError::Validation(ValidationError::MissingField("phone".into())).into();
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
        assert_eq!(e.error, "validation_error");

        let e: ErrorResponse = AuthError::AuthenticationFailed("bad".into()).into();
        assert_eq!(e.status(), StatusCode::UNAUTHORIZED);

        let e: ErrorResponse = AuthError::Internal("pool timed out".into()).into();
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.message, "Internal server error");
    }

    #[test]
    fn test_checkout_and_webhook_signatures_map_differently() {
        let e: ErrorResponse = BillingError::InvalidSignature.into();
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
        assert_eq!(e.error, "validation_error");

        let e: ErrorResponse = BillingError::InvalidWebhookSignature.into();
        assert_eq!(e.status(), StatusCode::UNAUTHORIZED);
    }
}
