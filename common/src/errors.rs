//! Error taxonomy for the admin engine.
//!
//! Every failure surfaced to a caller is an [`AppError`]. Transient
//! connection-level failures are the only retryable class; everything else
//! propagates immediately so the presentation layer can decide how to
//! inform the user.

use thiserror::Error;

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Application error kinds.
#[derive(Debug, Error)]
pub enum AppError {
    /// Transient connection-level failure (broken pipe, refused, timeout).
    /// The executor retries these with linear backoff.
    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    /// Credentials rejected by the server. Fatal, never retried.
    #[error("authentication failure: {0}")]
    AuthenticationFailure(String),

    /// Pool saturated and the acquire timeout elapsed.
    #[error("connection pool exhausted: {0}")]
    PoolExhausted(String),

    /// A precondition check failed before any mutating statement ran.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A referenced role does not exist on the server.
    #[error("role not found: {0}")]
    RoleNotFound(String),

    /// Input rejected by local validation (weak password, bad identifier).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Server-reported SQL error (permission denied, constraint violation,
    /// syntax error). Surfaced verbatim, never swallowed.
    #[error("statement failed: {0}")]
    Statement(String),

    /// Bad connection target or settings at construction time.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl AppError {
    /// Whether the executor may retry the failed call.
    ///
    /// Only connection-level failures qualify; syntax errors, constraint
    /// violations and permission errors must surface immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::ConnectionFailure(_))
    }
}

/// Maps a PostgreSQL SQLSTATE code to an error kind.
///
/// Class 08 is connection exceptions, class 28 is authentication, class 57
/// covers operator intervention (including statement timeout) and 53300 is
/// the server-side connection limit. All of those are connection-level;
/// everything else is a statement failure reported as-is.
pub fn classify_sqlstate(code: &str, message: &str) -> AppError {
    if code.starts_with("08") || code.starts_with("57") || code == "53300" {
        AppError::ConnectionFailure(message.to_string())
    } else if code.starts_with("28") {
        AppError::AuthenticationFailure(message.to_string())
    } else {
        AppError::Statement(format!("[{code}] {message}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => {
                AppError::PoolExhausted("acquire timed out".to_string())
            }
            sqlx::Error::PoolClosed => {
                AppError::ConnectionFailure("pool is closed".to_string())
            }
            sqlx::Error::Io(e) => AppError::ConnectionFailure(e.to_string()),
            sqlx::Error::Tls(e) => AppError::ConnectionFailure(e.to_string()),
            sqlx::Error::Protocol(e) => AppError::ConnectionFailure(e),
            sqlx::Error::Configuration(e) => AppError::Configuration(e.to_string()),
            sqlx::Error::Database(db) => match db.code() {
                Some(code) => classify_sqlstate(&code, db.message()),
                None => AppError::Statement(db.message().to_string()),
            },
            other => AppError::Statement(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_class_is_transient() {
        assert!(classify_sqlstate("08006", "connection failure").is_transient());
        assert!(classify_sqlstate("08001", "cannot connect").is_transient());
        assert!(classify_sqlstate("57014", "statement timeout").is_transient());
        assert!(classify_sqlstate("53300", "too many connections").is_transient());
    }

    #[test]
    fn auth_errors_are_not_retried() {
        let err = classify_sqlstate("28P01", "password authentication failed");
        assert!(matches!(err, AppError::AuthenticationFailure(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn statement_errors_are_not_retried() {
        for code in ["42501", "23505", "42601", "3D000"] {
            let err = classify_sqlstate(code, "boom");
            assert!(matches!(err, AppError::Statement(_)), "code {code}");
            assert!(!err.is_transient());
        }
    }

    #[test]
    fn statement_error_keeps_sqlstate_and_message() {
        let err = classify_sqlstate("42501", "permission denied for table users");
        assert_eq!(
            err.to_string(),
            "statement failed: [42501] permission denied for table users"
        );
    }
}
