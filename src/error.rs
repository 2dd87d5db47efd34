//! Error types for tollgate.
//!
//! Uses thiserror for derive macros. Every variant is a typed admission,
//! lookup or store failure; callers decide whether to retry, the engine never
//! does.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for tollgate operations.
///
/// Each variant maps to a process exit code for the CLI and to an HTTP-style
/// status for API layers built on top of the engine.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// Malformed identifiers or empty required fields.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The target already has a running event.
    #[error("event locked: {0}")]
    Locked(String),

    /// An active block forbids the operation.
    #[error("event blocked: {0}")]
    Blocked(String),

    /// Lookup miss for an event.
    #[error("not found: {0}")]
    NotFound(String),

    /// No active block carries the given identity.
    #[error("active block not found: {0}")]
    ActiveBlockNotFound(String),

    /// Cancellation requested on a closed, non-cancelable or already
    /// cancel-pending event.
    #[error("event not cancelable: {0}")]
    NotCancelable(String),

    /// The delegated authorization predicate returned false.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Reading or writing the shared store failed.
    #[error("{0}")]
    Store(String),

    /// The guarded work itself failed or was canceled.
    #[error("operation failed: {0}")]
    OperationFailed(String),
}

impl TollgateError {
    /// Returns the process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            TollgateError::InvalidInput(_) => exit_codes::USER_ERROR,
            TollgateError::Store(_) => exit_codes::USER_ERROR,
            TollgateError::NotFound(_) => exit_codes::NOT_FOUND,
            TollgateError::ActiveBlockNotFound(_) => exit_codes::NOT_FOUND,
            TollgateError::Unauthorized(_) => exit_codes::UNAUTHORIZED,
            TollgateError::Locked(_) => exit_codes::LOCK_FAILURE,
            TollgateError::Blocked(_) => exit_codes::BLOCKED,
            TollgateError::NotCancelable(_) => exit_codes::NOT_CANCELABLE,
            TollgateError::OperationFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Returns the client-facing HTTP status an API layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            TollgateError::InvalidInput(_) => 400,
            TollgateError::Blocked(_) => 400,
            TollgateError::NotCancelable(_) => 400,
            TollgateError::NotFound(_) => 404,
            TollgateError::ActiveBlockNotFound(_) => 404,
            TollgateError::Unauthorized(_) => 401,
            TollgateError::Locked(_) => 409,
            TollgateError::Store(_) => 500,
            TollgateError::OperationFailed(_) => 500,
        }
    }

    /// Whether a caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TollgateError::Locked(_))
    }
}

/// Result type alias for tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_errors_have_distinct_exit_codes() {
        let locked = TollgateError::Locked("app:foo".to_string());
        let blocked = TollgateError::Blocked("maintenance".to_string());
        let not_cancelable = TollgateError::NotCancelable("closed".to_string());

        assert_eq!(locked.exit_code(), exit_codes::LOCK_FAILURE);
        assert_eq!(blocked.exit_code(), exit_codes::BLOCKED);
        assert_eq!(not_cancelable.exit_code(), exit_codes::NOT_CANCELABLE);
        assert_ne!(locked.exit_code(), blocked.exit_code());
    }

    #[test]
    fn lookup_misses_share_not_found_code() {
        let err = TollgateError::NotFound("event".to_string());
        assert_eq!(err.exit_code(), exit_codes::NOT_FOUND);
        assert_eq!(err.http_status(), 404);

        let err = TollgateError::ActiveBlockNotFound("block".to_string());
        assert_eq!(err.exit_code(), exit_codes::NOT_FOUND);
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn http_statuses_separate_client_and_server_failures() {
        assert_eq!(TollgateError::InvalidInput(String::new()).http_status(), 400);
        assert_eq!(TollgateError::Unauthorized(String::new()).http_status(), 401);
        assert_eq!(TollgateError::Locked(String::new()).http_status(), 409);
        assert_eq!(TollgateError::Store(String::new()).http_status(), 500);
    }

    #[test]
    fn only_locked_is_retryable() {
        assert!(TollgateError::Locked(String::new()).is_retryable());
        assert!(!TollgateError::Blocked(String::new()).is_retryable());
        assert!(!TollgateError::NotCancelable(String::new()).is_retryable());
    }

    #[test]
    fn error_messages_are_descriptive() {
        let err = TollgateError::Blocked("block 1 (maintenance)".to_string());
        assert_eq!(err.to_string(), "event blocked: block 1 (maintenance)");

        let err = TollgateError::Store("disk full".to_string());
        assert_eq!(err.to_string(), "disk full");
    }
}
