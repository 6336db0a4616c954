//! Error types for the token relay.

use axum::http::StatusCode;

/// Result type alias for upstream calls.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Failures raised by the upstream client.
///
/// Display output carries the status and the decode reason only. Bodies and
/// credentials never appear in it, so the error is safe to log.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// No upstream response exists: connect, send or body read failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The token endpoint responded but its body could not be decoded
    /// according to its declared content type.
    #[error("Undecodable upstream response ({status}): {reason}")]
    Undecodable {
        status: StatusCode,
        content_type: Option<String>,
        body: String,
        reason: String,
    },
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        // Strip the URL so query strings never reach the logs.
        RelayError::Transport(e.without_url().to_string())
    }
}

/// Failures of the refresh token cipher.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CipherError {
    /// The configured algorithm name is not supported.
    #[error("unsupported cipher algorithm '{0}' (expected aes-128-ctr, aes-192-ctr or aes-256-ctr)")]
    UnsupportedAlgorithm(String),

    /// The key does not match the algorithm's key size.
    #[error("{algorithm} requires a {expected}-byte key, got {actual} bytes")]
    InvalidKeyLength {
        algorithm: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The token is not in `<hex_iv>:<hex_ciphertext>` form.
    #[error("malformed encrypted token: {0}")]
    Malformed(&'static str),

    /// Decryption produced bytes that are not valid UTF-8.
    #[error("encrypted token did not decrypt to valid text")]
    InvalidPlaintext,
}
