use fedi_crypto::SignError;
use fedi_protocol::ProtocolError;
use fedi_sync::SyncError;
use fedi_types::TypeError;
use thiserror::Error;

/// The single error every repository operation returns.
///
/// [`SdkError::status_code`] classifies it the way an HTTP response would,
/// so a presentation layer can answer without knowing protocol details.
#[derive(Debug, Error)]
pub enum SdkError {
    #[error("invalid account: {0}")]
    InvalidAccount(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("remote rejected the request ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SdkError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidAccount(_) => 401,
            Self::NotFound(_) => 404,
            Self::InvalidInput(_) => 400,
            Self::Remote { status, .. } => *status,
            Self::Timeout(_) => 504,
            Self::Transport(_) => 502,
            Self::Decode(_) | Self::UnsupportedAlgorithm(_) | Self::Config(_) | Self::Internal(_) => {
                500
            }
        }
    }
}

impl From<SyncError> for SdkError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Timeout { .. } => Self::Timeout(err.to_string()),
            SyncError::Transport(message) => Self::Transport(message),
            SyncError::NotFound(iri) => Self::NotFound(iri),
            SyncError::Remote { status, message } => Self::Remote { status, message },
            SyncError::Decode(e) => e.into(),
            SyncError::Sign(e) => e.into(),
        }
    }
}

impl From<SignError> for SdkError {
    fn from(err: SignError) -> Self {
        match err {
            SignError::Unauthorized(handle) => Self::InvalidAccount(format!("{handle} is not logged in")),
            SignError::UnsupportedAlgorithm(algorithm) => Self::UnsupportedAlgorithm(algorithm),
            SignError::InvalidKey(_) | SignError::Header(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<ProtocolError> for SdkError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidEntity(reason) => Self::InvalidInput(reason),
            other => Self::Decode(other.to_string()),
        }
    }
}

impl From<TypeError> for SdkError {
    fn from(err: TypeError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
