//! Service-level error type shared by every SmartClause operation.
//!
//! Stores and HTTP clients report failures as [`anyhow::Error`]; the service
//! layer classifies them into [`ServiceError`] so that the server can pick
//! an HTTP status without inspecting message text.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Invalid input (400).
    #[error("{0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("{0}")]
    Unauthorized(String),

    /// Unknown or foreign resource (404).
    #[error("{0}")]
    NotFound(String),

    /// Uniqueness violation (409).
    #[error("{0}")]
    Conflict(String),

    /// The analyzer or chat service failed (502).
    #[error("upstream service error: {0}")]
    Upstream(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_wraps_anyhow() {
        let err: ServiceError = anyhow::anyhow!("pool timed out").into();
        assert!(matches!(err, ServiceError::Internal(_)));
        assert_eq!(err.to_string(), "pool timed out");
    }

    #[test]
    fn test_upstream_message() {
        let err = ServiceError::upstream("analyzer returned 503");
        assert_eq!(err.to_string(), "upstream service error: analyzer returned 503");
    }
}
