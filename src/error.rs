//! Error types for the action execution engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, ActionError>;

#[derive(Error, Debug)]
pub enum ActionError {

    // =============================
    // Directive Errors
    // =============================

    #[error("{0}")]
    Validation(String),

    #[error("Unknown action type: {0}")]
    UnknownAction(String),

    // =============================
    // Surface Errors
    // =============================

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Surface error: {0}")]
    Surface(String),

    // =============================
    // Engine Bookkeeping Errors
    // =============================

    #[error("Undo error: {0}")]
    Undo(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Audit error: {0}")]
    Audit(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ActionError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Typed surface errors carry their own class. Only untyped failures
    /// are classified by their rendered message.
    pub fn is_retryable(&self) -> bool {
        match self {
            ActionError::Network(_) | ActionError::Timeout(_) | ActionError::RateLimited(_) => true,
            ActionError::Surface(_) | ActionError::Http(_) | ActionError::Internal(_) => {
                crate::retry::classify_error(&self.to_string()).is_retryable()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_errors_keep_their_class() {
        assert!(ActionError::Timeout("fetching https://example.com/invalid-items".into()).is_retryable());
        assert!(ActionError::Network(
            "fetching https://shop.example/forbidden-city: connection reset".into()
        )
        .is_retryable());
        assert!(ActionError::RateLimited("https://example.com/not-found returned 429".into()).is_retryable());

        assert!(!ActionError::NotFound("https://example.com/timeout returned 404".into()).is_retryable());
        assert!(!ActionError::Forbidden("https://example.com/retry returned 403".into()).is_retryable());
        assert!(!ActionError::PermissionDenied("network tabs".into()).is_retryable());
        assert!(!ActionError::Validation("timeout".into()).is_retryable());
        assert!(!ActionError::UnknownAction("FLY".into()).is_retryable());
    }

    #[test]
    fn test_untyped_errors_are_classified_by_message() {
        assert!(ActionError::Surface("connection reset by peer".into()).is_retryable());
        assert!(!ActionError::Surface("tab not found".into()).is_retryable());
        assert!(!ActionError::Internal("something odd happened".into()).is_retryable());
    }
}
