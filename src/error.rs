use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidInput,
    NotFound,
    Parse,
    StoreUnavailable,
    Io,
    Internal,
}

/// Failures that abort a bundle or a batch. Expected data-quality problems are
/// never reported this way; they become evaluations instead.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{code:?}: {message}")]
pub struct ReconcileError {
    pub code: ErrorCode,
    pub message: String,
}

impl ReconcileError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Parse, message)
    }

    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StoreUnavailable, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Io, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Errors after which no further ticket in the batch can be processed.
    pub fn aborts_batch(&self) -> bool {
        self.code == ErrorCode::StoreUnavailable
    }
}

impl From<std::io::Error> for ReconcileError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_json::Error> for ReconcileError {
    fn from(err: serde_json::Error) -> Self {
        Self::parse(format!("JSON: {err}"))
    }
}

impl From<csv::Error> for ReconcileError {
    fn from(err: csv::Error) -> Self {
        Self::parse(format!("CSV: {err}"))
    }
}

impl From<reqwest::Error> for ReconcileError {
    fn from(err: reqwest::Error) -> Self {
        Self::io(format!("HTTP: {err}"))
    }
}

impl From<String> for ReconcileError {
    fn from(err: String) -> Self {
        Self::internal(err)
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_code() {
        let err = ReconcileError::not_found("genome 'Trixie'");
        assert_eq!(err.to_string(), "NotFound: genome 'Trixie'");
    }

    #[test]
    fn test_only_store_failures_abort_batch() {
        assert!(ReconcileError::store_unavailable("down").aborts_batch());
        assert!(!ReconcileError::parse("bad record").aborts_batch());
        let io: ReconcileError = std::io::Error::other("disk").into();
        assert_eq!(io.code, ErrorCode::Io);
    }
}
