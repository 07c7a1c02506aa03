use std::fmt;

use serde::{Deserialize, Serialize};

use crate::wire::PUBLIC_NS;

/// Hash of the anonymous sentinel account.
pub const ANONYMOUS_HASH: &str = "anonymous";
/// Hash of the system sentinel account.
pub const SYSTEM_HASH: &str = "system";

/// Stable content hash of an entity.
///
/// The hash is the last non-empty path segment of the entity's wire identifier,
/// with any query string and fragment removed. Two entities that share a wire
/// identifier always share a hash.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hash(String);

impl Hash {
    /// Derive the hash of a wire identifier.
    pub fn from_iri(iri: &str) -> Self {
        if iri == PUBLIC_NS {
            return Self::anonymous();
        }
        match url::Url::parse(iri) {
            Ok(url) => url
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(|segment| Self(segment.to_string()))
                .unwrap_or_default(),
            // relative references and bare hashes
            Err(_) => {
                let end = iri.find(['?', '#']).unwrap_or(iri.len());
                let segment = iri[..end].trim_end_matches('/').rsplit('/').next();
                Self(segment.unwrap_or_default().to_string())
            }
        }
    }

    /// Wrap an already derived hash value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn anonymous() -> Self {
        Self(ANONYMOUS_HASH.to_string())
    }

    pub fn system() -> Self {
        Self(SYSTEM_HASH.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS_HASH
    }

    pub fn is_system(&self) -> bool {
        self.0 == SYSTEM_HASH
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form used in logs and CLI output.
    pub fn short(&self) -> &str {
        let end = self.0.char_indices().nth(8).map_or(self.0.len(), |(i, _)| i);
        &self.0[..end]
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Hash {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
