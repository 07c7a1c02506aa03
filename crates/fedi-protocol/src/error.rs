use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unable to decode {entity}: {reason}")]
    Decode { entity: &'static str, reason: String },

    #[error("unsupported object type {0}")]
    UnsupportedType(String),

    #[error("reply chain loops back to {0}")]
    CyclicChain(String),

    #[error("reply chain deeper than {0} levels")]
    ChainTooDeep(usize),

    #[error("invalid entity: {0}")]
    InvalidEntity(String),
}

impl ProtocolError {
    pub fn decode(entity: &'static str, reason: impl Into<String>) -> Self {
        Self::Decode {
            entity,
            reason: reason.into(),
        }
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
