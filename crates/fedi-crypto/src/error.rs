use thiserror::Error;

/// Errors produced while binding credentials or signing a request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignError {
    #[error("unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("account {0} is not logged in")]
    Unauthorized(String),

    #[error("invalid header value: {0}")]
    Header(String),
}

/// Convenience alias for signing operations.
pub type SignResult<T> = Result<T, SignError>;
