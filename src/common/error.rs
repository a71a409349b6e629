//! Error types for ringkv

use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === Request Errors ===
    #[error("Invalid request: {0}")]
    Validation(String),

    // === Placement Errors ===
    #[error("Placement failed: {0}")]
    Placement(String),

    // === Replication Errors ===
    #[error(transparent)]
    Quorum(#[from] QuorumError),

    #[error("Transport error talking to {node}: {reason}")]
    Transport { node: String, reason: String },

    #[error("Malformed payload: {0}")]
    Serialization(String),

    // === Storage Errors ===
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

/// Why a quorum operation stopped short of its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuorumFailure {
    /// Every target answered and too few succeeded.
    InsufficientAcks,
    /// The effective deadline elapsed first.
    Timeout,
    /// The caller cancelled the operation.
    Cancelled,
}

impl fmt::Display for QuorumFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuorumFailure::InsufficientAcks => f.write_str("insufficient acknowledgements"),
            QuorumFailure::Timeout => f.write_str("timed out"),
            QuorumFailure::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Aggregate failure of a quorum read or write, with the per-node causes attached.
#[derive(Debug, Clone, Error)]
#[error("{op} quorum {kind} for key '{key}': needed {needed}, got {got}{}", fmt_failed(.failed))]
pub struct QuorumError {
    pub op: QuorumOp,
    pub kind: QuorumFailure,
    pub key: String,
    pub needed: usize,
    pub got: usize,
    /// `(node, reason)` for every target that failed before the operation ended.
    pub failed: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuorumOp {
    Read,
    Write,
}

impl fmt::Display for QuorumOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuorumOp::Read => f.write_str("read"),
            QuorumOp::Write => f.write_str("write"),
        }
    }
}

fn fmt_failed(failed: &[(String, String)]) -> String {
    if failed.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = failed
        .iter()
        .map(|(node, reason)| format!("{} ({})", node, reason))
        .collect();
    format!("; failed nodes: {}", parts.join(", "))
}

impl QuorumError {
    /// Node ids that failed, without their reasons.
    pub fn failed_nodes(&self) -> Vec<&str> {
        self.failed.iter().map(|(node, _)| node.as_str()).collect()
    }
}

impl Error {
    /// Could another attempt, or the next layer of the read path, still succeed?
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Quorum(q) => q.kind != QuorumFailure::Cancelled,
            Error::Transport { .. } => true,
            _ => false,
        }
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::Validation(_) | Error::Serialization(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Placement(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Quorum(q) => match q.kind {
                QuorumFailure::Timeout => StatusCode::GATEWAY_TIMEOUT,
                QuorumFailure::Cancelled => StatusCode::REQUEST_TIMEOUT,
                QuorumFailure::InsufficientAcks => StatusCode::SERVICE_UNAVAILABLE,
            },
            Error::Transport { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn quorum(kind: QuorumFailure) -> Error {
        Error::Quorum(QuorumError {
            op: QuorumOp::Write,
            kind,
            key: "foo".into(),
            needed: 1,
            got: 0,
            failed: vec![("node-b".into(), "connection refused".into())],
        })
    }

    #[test]
    fn test_quorum_error_lists_failed_nodes() {
        let msg = quorum(QuorumFailure::InsufficientAcks).to_string();
        assert!(msg.contains("write quorum insufficient acknowledgements"));
        assert!(msg.contains("node-b (connection refused)"));
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(
            Error::Validation("empty".into()).to_http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            quorum(QuorumFailure::Timeout).to_http_status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            Error::NotFound("k".into()).to_http_status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_retryable() {
        assert!(quorum(QuorumFailure::Timeout).is_retryable());
        assert!(!quorum(QuorumFailure::Cancelled).is_retryable());
        assert!(!Error::Validation("x".into()).is_retryable());
    }
}
