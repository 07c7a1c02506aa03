use fedi_crypto::SignError;
use fedi_protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("timed out after {after_ms}ms fetching {iri}")]
    Timeout { iri: String, after_ms: u64 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("remote rejected the request ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("decode error: {0}")]
    Decode(#[from] ProtocolError),

    #[error("signing error: {0}")]
    Sign(#[from] SignError),
}

pub type SyncResult<T> = Result<T, SyncError>;
