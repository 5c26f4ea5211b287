// Error handling framework

use thiserror::Error;

/// Authentication and authorization errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid JWT token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Insufficient permissions: required {0}")]
    InsufficientPermissions(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Account disabled")]
    AccountDisabled,

    #[error("Email already registered: {0}")]
    EmailTaken(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Authentication backend failure: {0}")]
    Internal(String),
}

/// Outgoing email errors
#[derive(Error, Debug)]
pub enum MailError {
    #[error("Mail request failed: {0}")]
    Transport(String),

    #[error("Mail API rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// OAuth login errors
#[derive(Error, Debug)]
pub enum OAuthError {
    #[error("OAuth provider not configured: {0}")]
    NotConfigured(String),

    #[error("Unknown OAuth provider: {0}")]
    UnknownProvider(String),

    #[error("OAuth state mismatch")]
    StateMismatch,

    #[error("OAuth token exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("OAuth profile request failed: {0}")]
    ProfileFailed(String),

    #[error("OAuth profile has no email address")]
    MissingEmail,
}

/// Validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl ValidationError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFieldValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate key violation: {0}")]
    DuplicateKey(String),

    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Migration run errors
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Migration step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    #[error("Could not inspect schema: {0}")]
    Introspection(String),
}

/// Payment and subscription errors
#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Payment provider not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid payment signature")]
    InvalidSignature,

    #[error("Invalid webhook signature")]
    InvalidWebhookSignature,

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Plan not found: {0}")]
    PlanNotFound(String),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),

    #[error("Not allowed to modify subscription {0}")]
    NotOwner(String),

    #[error("Invalid billing cycle: {0}")]
    InvalidCycle(String),

    #[error("Payment provider request failed: {0}")]
    Provider(String),

    #[error("Billing storage failed: {0}")]
    Storage(#[from] DatabaseError),
}

/// Plan restriction errors
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("{0}")]
    UpgradeRequired(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("Plan not found: {0}")]
    NotFound(i64),

    #[error("Plan with this slug already exists")]
    SlugTaken(String),

    #[error("Plan is still assigned to users: {0}")]
    InUse(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// API response error type for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let code = match err {
            AuthError::InvalidCredentials
            | AuthError::InvalidToken(_)
            | AuthError::TokenExpired
            | AuthError::AuthenticationFailed(_) => "UNAUTHORIZED",
            AuthError::InsufficientPermissions(_) | AuthError::AccountDisabled => "FORBIDDEN",
            AuthError::EmailTaken(_) => "CONFLICT",
            AuthError::Validation(_) => "VALIDATION_ERROR",
            _ => "AUTH_ERROR",
        };
        ApiError::new(code, err.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::new("VALIDATION_ERROR", err.to_string())
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        let code = match err {
            BillingError::InvalidWebhookSignature => "UNAUTHORIZED",
            // A failed checkout signature is bad input from a signed-in user
            BillingError::InvalidSignature => "VALIDATION_ERROR",
            BillingError::NotOwner(_) => "FORBIDDEN",
            BillingError::PlanNotFound(_)
            | BillingError::SubscriptionNotFound(_)
            | BillingError::OrderNotFound(_)
            | BillingError::InvoiceNotFound(_) => "NOT_FOUND",
            BillingError::InvalidCycle(_) | BillingError::InvalidPayload(_) => "VALIDATION_ERROR",
            BillingError::NotConfigured(_) => "PAYMENT_NOT_CONFIGURED",
            _ => "BILLING_ERROR",
        };
        ApiError::new(code, err.to_string())
    }
}

impl From<PlanError> for ApiError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::UpgradeRequired(msg) => ApiError::new("UPGRADE_REQUIRED", msg),
            PlanError::Invalid(e) => e.into(),
            PlanError::NotFound(id) => ApiError::new("NOT_FOUND", format!("Plan {} not found", id)),
            PlanError::SlugTaken(_) => {
                ApiError::new("VALIDATION_ERROR", "Plan with this slug already exists")
            }
            PlanError::InUse(slug) => ApiError::new(
                "CONFLICT",
                format!("Plan {} is assigned to users and cannot be deleted", slug),
            ),
            PlanError::Database(e) => ApiError::new("DATABASE_ERROR", e.to_string()),
        }
    }
}

// MySQL server error numbers
const ER_TABLE_EXISTS: u16 = 1050;
const ER_DUP_FIELDNAME: u16 = 1060;
const ER_DUP_KEYNAME: u16 = 1061;
const ER_DUP_ENTRY: u16 = 1062;
const ER_ROW_IS_REFERENCED: u16 = 1451;
const ER_NO_REFERENCED_ROW: u16 = 1452;

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err
                    .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                    .map(|e| e.number())
                {
                    Some(ER_DUP_ENTRY) => DatabaseError::DuplicateKey(message),
                    Some(ER_NO_REFERENCED_ROW) | Some(ER_ROW_IS_REFERENCED) => {
                        DatabaseError::ForeignKeyViolation(message)
                    }
                    Some(ER_TABLE_EXISTS) | Some(ER_DUP_FIELDNAME) | Some(ER_DUP_KEYNAME) => {
                        DatabaseError::AlreadyExists(message)
                    }
                    _ => DatabaseError::QueryFailed(message),
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseError::ConnectionFailed(err.to_string())
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl DatabaseError {
    /// True for errors that mean the object a migration step wanted to create is already there.
    pub fn is_already_exists(&self) -> bool {
        match self {
            DatabaseError::AlreadyExists(_) | DatabaseError::DuplicateKey(_) => true,
            DatabaseError::QueryFailed(msg) => {
                msg.contains("Duplicate key name") || msg.contains("already exists")
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for ValidationError {
    fn from(err: serde_json::Error) -> Self {
        ValidationError::InvalidJson(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_to_api_error() {
        let err = AuthError::InvalidCredentials;
        let api_err: ApiError = err.into();
        assert_eq!(api_err.code, "UNAUTHORIZED");

        let api_err: ApiError = AuthError::EmailTaken("a@b.io".into()).into();
        assert_eq!(api_err.code, "CONFLICT");

        let api_err: ApiError = AuthError::AuthenticationFailed("bad".into()).into();
        assert_eq!(api_err.code, "UNAUTHORIZED");
    }

    #[test]
    fn test_blank_registration_field_is_validation_error() {
        let err: AuthError = ValidationError::MissingField("phone".into()).into();
        let api_err: ApiError = err.into();
        assert_eq!(api_err.code, "VALIDATION_ERROR");
        assert!(api_err.message.contains("phone"));
    }

    #[test]
    fn test_billing_error_codes() {
        let api_err: ApiError = BillingError::InvalidWebhookSignature.into();
        assert_eq!(api_err.code, "UNAUTHORIZED");

        let api_err: ApiError = BillingError::InvalidSignature.into();
        assert_eq!(api_err.code, "VALIDATION_ERROR");

        let api_err: ApiError = BillingError::NotOwner("sub_1".into()).into();
        assert_eq!(api_err.code, "FORBIDDEN");

        let api_err: ApiError = BillingError::NotConfigured("razorpay".into()).into();
        assert_eq!(api_err.code, "PAYMENT_NOT_CONFIGURED");
    }

    #[test]
    fn test_plan_admin_error_codes() {
        let api_err: ApiError = PlanError::SlugTaken("gold".into()).into();
        assert_eq!(api_err.code, "VALIDATION_ERROR");
        assert_eq!(api_err.message, "Plan with this slug already exists");

        let api_err: ApiError = PlanError::NotFound(9).into();
        assert_eq!(api_err.code, "NOT_FOUND");

        let api_err: ApiError = PlanError::InUse("gold".into()).into();
        assert_eq!(api_err.code, "CONFLICT");

        let api_err: ApiError = PlanError::Invalid(ValidationError::MissingField("name".into())).into();
        assert_eq!(api_err.code, "VALIDATION_ERROR");
    }

    #[test]
    fn test_already_exists_classification() {
        assert!(DatabaseError::AlreadyExists("t".into()).is_already_exists());
        assert!(DatabaseError::QueryFailed("Duplicate key name 'idx_x'".into()).is_already_exists());
        assert!(DatabaseError::QueryFailed("Table 'x' already exists".into()).is_already_exists());
        assert!(!DatabaseError::QueryFailed("Unknown column 'y'".into()).is_already_exists());
        assert!(!DatabaseError::ConnectionFailed("refused".into()).is_already_exists());
    }

    #[test]
    fn test_api_error_with_details() {
        let err = ApiError::new("TEST_ERROR", "Test message")
            .with_details(serde_json::json!({"field": "value"}));
        assert!(err.details.is_some());
    }
}
