/// Service-wide error types
///
/// Each concern has a small closed enum; all of them fold into `AppError`,
/// which is what handlers return. `AppError` decides the HTTP status, the
/// stable `code` clients branch on, and the log level. Storage and mail
/// faults are logged in full but reach the client as a generic message.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;
use uuid::Uuid;

use crate::cookies::purge_token_cookies;

/// Rejected user input; the payload names the offending field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyField(String),
    TooShort(String, usize),
    TooLong(String, usize),
    InvalidFormat(String),
    SuspiciousContent(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} must not be blank", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} needs at least {} characters", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} allows at most {} characters", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} is not valid", field),
            ValidationError::SuspiciousContent(field) => {
                write!(f, "{} contains characters that are not allowed", field)
            }
        }
    }
}

impl StdError for ValidationError {}

#[derive(Debug)]
pub enum DatabaseError {
    /// Message is shown to clients as is
    UniqueConstraintViolation(String),
    NotFound(String),
    QueryExecution(String),
    ConnectionPool(String),
    UnexpectedError(String),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::UniqueConstraintViolation(msg) => f.write_str(msg),
            DatabaseError::NotFound(what) => write!(f, "No such {}", what),
            DatabaseError::QueryExecution(msg) => write!(f, "query failed: {}", msg),
            DatabaseError::ConnectionPool(msg) => write!(f, "storage unreachable: {}", msg),
            DatabaseError::UnexpectedError(msg) => write!(f, "storage error: {}", msg),
        }
    }
}

impl StdError for DatabaseError {}

#[derive(Debug, Clone)]
pub enum EmailError {
    SendFailed(String),
    InvalidRecipient(String),
    ServiceUnavailable(String),
}

impl fmt::Display for EmailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmailError::SendFailed(msg) => write!(f, "mail delivery failed: {}", msg),
            EmailError::InvalidRecipient(addr) => write!(f, "cannot mail {:?}", addr),
            EmailError::ServiceUnavailable(msg) => write!(f, "mail service unreachable: {}", msg),
        }
    }
}

impl StdError for EmailError {}

/// Startup-time configuration problems
#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
    ParseError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(key) => write!(f, "{} must be configured", key),
            ConfigError::InvalidValue(msg) => write!(f, "bad configuration: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "configuration unreadable: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

/// Failure to decode a token
///
/// Deliberately coarse: a revoked or replayed refresh token is reported as
/// `Invalid`, exactly like a forged one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    Expired,
    Invalid,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::Expired => f.write_str("Token has expired"),
            TokenError::Invalid => f.write_str("Invalid token"),
        }
    }
}

impl StdError for TokenError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    InvalidCredentials,
    TokenExpired,
    TokenInvalid,
    MissingToken,
    EmailNotConfirmed,
    InsufficientRole,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AuthError::InvalidCredentials => "Invalid username or password",
            AuthError::TokenExpired => "Token has expired",
            AuthError::TokenInvalid => "Invalid token",
            AuthError::MissingToken => "No token was supplied",
            AuthError::EmailNotConfirmed => "Email address is not confirmed",
            AuthError::InsufficientRole => "You are not allowed to do this",
        };
        f.write_str(text)
    }
}

impl StdError for AuthError {}

#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Database(DatabaseError),
    Email(EmailError),
    Auth(AuthError),
    Config(ConfigError),
    Internal(String),
}

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::Database(DatabaseError::NotFound(what.into()))
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        AppError::Database(DatabaseError::UniqueConstraintViolation(what.into()))
    }

    /// Stable machine-readable code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => "CONFLICT",
            AppError::Database(DatabaseError::NotFound(_)) => "NOT_FOUND",
            AppError::Database(DatabaseError::ConnectionPool(_)) => "SERVICE_UNAVAILABLE",
            AppError::Database(_) => "INTERNAL_ERROR",
            AppError::Email(_) => "EMAIL_SERVICE_ERROR",
            AppError::Auth(AuthError::InvalidCredentials) => "INVALID_CREDENTIALS",
            AppError::Auth(AuthError::TokenExpired) => "TOKEN_EXPIRED",
            AppError::Auth(AuthError::TokenInvalid) => "TOKEN_INVALID",
            AppError::Auth(AuthError::MissingToken) => "MISSING_TOKEN",
            AppError::Auth(AuthError::EmailNotConfirmed) => "EMAIL_NOT_CONFIRMED",
            AppError::Auth(AuthError::InsufficientRole) => "INSUFFICIENT_ROLE",
            AppError::Config(_) | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// What the client is told; backend detail stays in the logs
    pub fn client_message(&self) -> String {
        match self {
            AppError::Validation(e) => e.to_string(),
            AppError::Auth(e) => e.to_string(),
            AppError::Database(
                e @ (DatabaseError::UniqueConstraintViolation(_) | DatabaseError::NotFound(_)),
            ) => e.to_string(),
            AppError::Database(DatabaseError::ConnectionPool(_)) => {
                "Storage temporarily unavailable".to_string()
            }
            AppError::Email(_) => "Mail service temporarily unavailable".to_string(),
            AppError::Database(_) | AppError::Config(_) | AppError::Internal(_) => {
                "Internal server error".to_string()
            }
        }
    }

    /// Client mistakes are warnings, everything on our side is an error
    fn log(&self, error_id: &Uuid) {
        match self {
            AppError::Database(DatabaseError::NotFound(_)) => {
                tracing::info!(%error_id, error = %self, "Lookup missed");
            }
            AppError::Validation(_)
            | AppError::Auth(_)
            | AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => {
                tracing::warn!(%error_id, code = self.code(), error = %self, "Request rejected");
            }
            _ => {
                tracing::error!(%error_id, code = self.code(), error = %self, "Request failed");
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Database(e) => write!(f, "{}", e),
            AppError::Email(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "internal: {}", msg),
        }
    }
}

impl StdError for AppError {}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::Database(err)
    }
}

impl From<EmailError> for AppError {
    fn from(err: EmailError) -> Self {
        AppError::Email(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::Invalid => AuthError::TokenInvalid,
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::Auth(err.into())
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

/// Unique violations are told apart by constraint name so the client
/// learns which field collided.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        let classified = match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("record".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                let message = match db_err.constraint() {
                    Some("accounts_username_key") => "Username already exists",
                    Some("accounts_email_key") => "Email already exists",
                    _ => "Duplicate entry",
                };
                DatabaseError::UniqueConstraintViolation(message.to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseError::ConnectionPool(err.to_string())
            }
            sqlx::Error::Database(db_err) => DatabaseError::QueryExecution(db_err.to_string()),
            other => DatabaseError::UnexpectedError(other.to_string()),
        };
        AppError::Database(classified)
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("blocking task failed: {}", err))
    }
}

/// JSON body of every error response
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Matches the `error_id` field of the server-side log line
    pub error_id: String,
    pub message: String,
    pub code: &'static str,
    pub status: u16,
    pub timestamp: String,
}

impl ErrorResponse {
    fn for_error(error: &AppError, error_id: Uuid) -> Self {
        Self {
            error_id: error_id.to_string(),
            message: error.client_message(),
            code: error.code(),
            status: error.status_code().as_u16(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let error_id = Uuid::new_v4();
        self.log(&error_id);

        let mut response =
            HttpResponse::build(self.status_code()).json(ErrorResponse::for_error(self, error_id));

        // A tampered token means whatever the client holds is worthless
        if matches!(self, AppError::Auth(AuthError::TokenInvalid)) {
            purge_token_cookies(&mut response);
        }
        response
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => StatusCode::CONFLICT,
            AppError::Database(DatabaseError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Database(DatabaseError::ConnectionPool(_)) | AppError::Email(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Auth(AuthError::EmailNotConfirmed | AuthError::InsufficientRole) => {
                StatusCode::FORBIDDEN
            }
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Database(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Correlates the log lines of one handler invocation
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub operation: &'static str,
}

impl RequestContext {
    pub fn new(operation: &'static str) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            operation,
        }
    }

    /// Log `error` against this request and hand it back for `?`
    pub fn report(&self, error: AppError) -> AppError {
        tracing::warn!(
            request_id = %self.request_id,
            operation = self.operation,
            code = error.code(),
            error = %error,
            "Operation failed"
        );
        error
    }
}
