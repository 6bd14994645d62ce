//! Service error taxonomy

use thiserror::Error;

/// Errors raised by the remote service client
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode service response: {0}")]
    Decode(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ServiceError::Status {
            status: 503,
            message: "scheduler unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "service returned HTTP 503: scheduler unavailable");

        let err = ServiceError::NotFound("pipeline 'pl-123'".to_string());
        assert_eq!(err.to_string(), "pipeline 'pl-123' not found");
    }
}
