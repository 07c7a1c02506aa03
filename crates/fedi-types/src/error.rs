use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid IRI {iri}: {reason}")]
    InvalidIri { iri: String, reason: String },

    #[error("IRI has no host: {0}")]
    MissingHost(String),
}
