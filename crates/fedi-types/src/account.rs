use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::{Hash, ANONYMOUS_HASH, SYSTEM_HASH};
use crate::vote::Vote;
use crate::wire::WireItem;

/// Image reference with its MIME type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub uri: String,
    pub mime_type: String,
}

/// Key algorithm tag stored alongside account key material.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    #[default]
    #[serde(rename = "id-rsa")]
    Rsa,
    #[serde(rename = "id-ecdsa")]
    Ecdsa,
    #[serde(untagged)]
    Other(String),
}

impl KeyAlgorithm {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Rsa => "id-rsa",
            Self::Ecdsa => "id-ecdsa",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// DER encoded key pair. The private half is never serialized.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMaterial {
    pub algorithm: KeyAlgorithm,
    #[serde(default)]
    pub public: Vec<u8>,
    #[serde(default, skip_serializing)]
    pub private: Vec<u8>,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("algorithm", &self.algorithm)
            .field("public", &format_args!("<{} bytes>", self.public.len()))
            .field("private", &"<redacted>")
            .finish()
    }
}

/// Remote-derived account details.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMetadata {
    /// Wire identifier of the actor.
    pub id: Option<String>,
    pub url: Option<String>,
    pub name: Option<String>,
    pub blurb: Option<String>,
    pub icon: Option<ImageMetadata>,
    pub inbox: Option<String>,
    pub outbox: Option<String>,
    pub followers: Option<String>,
    pub following: Option<String>,
    pub liked: Option<String>,
    pub key: Option<KeyMaterial>,
    /// PEM of the actor's published public key.
    pub public_key_pem: Option<String>,
    #[serde(default, skip_serializing)]
    pub oauth_token: Option<String>,
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
}

impl fmt::Debug for AccountMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountMetadata")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("inbox", &self.inbox)
            .field("outbox", &self.outbox)
            .field("key", &self.key)
            .field("oauth_token", &self.oauth_token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

/// A local or federated actor.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Account {
    pub hash: Hash,
    pub handle: String,
    pub email: String,
    pub deleted: bool,
    /// Originates on a remote instance.
    pub federated: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub created_by: Option<Box<Account>>,
    pub metadata: AccountMetadata,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub votes: Vec<Vote>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub followers: Vec<Account>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub following: Vec<Account>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked: Vec<Account>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignored: Vec<Account>,
    #[serde(skip)]
    pub wire: Option<Arc<WireItem>>,
}

impl Account {
    /// The anonymous sentinel, standing for logged-out callers and deleted authors.
    pub fn anonymous() -> Self {
        Self {
            hash: Hash::anonymous(),
            handle: ANONYMOUS_HASH.to_string(),
            ..Self::default()
        }
    }

    /// The system sentinel, i.e. the protocol endpoint's service actor.
    pub fn system() -> Self {
        Self {
            hash: Hash::system(),
            handle: SYSTEM_HASH.to_string(),
            ..Self::default()
        }
    }

    /// Stub account carrying only a reference.
    pub fn from_iri(iri: &str) -> Self {
        Self {
            hash: Hash::from_iri(iri),
            metadata: AccountMetadata {
                id: Some(iri.to_string()),
                ..AccountMetadata::default()
            },
            ..Self::default()
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.hash.is_anonymous()
    }

    pub fn is_system(&self) -> bool {
        self.hash.is_system()
    }

    pub fn is_valid(&self) -> bool {
        !self.hash.is_empty()
    }

    /// A valid, non-sentinel account holding a token or a private key.
    pub fn is_logged(&self) -> bool {
        if !self.is_valid() || self.is_anonymous() || self.is_system() {
            return false;
        }
        let has_token = self.metadata.oauth_token.as_deref().is_some_and(|t| !t.is_empty());
        let has_key = self.metadata.key.as_ref().is_some_and(|k| !k.private.is_empty());
        has_token || has_key
    }

    pub fn has_metadata(&self) -> bool {
        self.metadata.id.is_some()
    }

    /// Wire identifier, if known.
    pub fn iri(&self) -> Option<&str> {
        self.metadata.id.as_deref()
    }

    /// Equal by hash, or by handle when either hash is missing.
    pub fn same_as(&self, other: &Account) -> bool {
        if !self.hash.is_empty() && !other.hash.is_empty() {
            return self.hash == other.hash;
        }
        !self.handle.is_empty() && self.handle == other.handle
    }

    /// Display name, falling back to the handle.
    pub fn display_name(&self) -> &str {
        self.metadata
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.handle)
    }
}

impl PartialEq for Account {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_valid_but_not_logged() {
        for account in [Account::anonymous(), Account::system()] {
            assert!(account.is_valid());
            assert!(!account.is_logged());
        }
        assert!(!Account::default().is_valid());
    }

    #[test]
    fn logged_requires_token_or_private_key() {
        let mut account = Account::from_iri("https://fedbox.git/actors/alice");
        assert!(!account.is_logged());

        account.metadata.oauth_token = Some("t0k3n".into());
        assert!(account.is_logged());

        account.metadata.oauth_token = None;
        account.metadata.key = Some(KeyMaterial {
            algorithm: KeyAlgorithm::Rsa,
            public: vec![1],
            private: vec![2],
        });
        assert!(account.is_logged());
    }

    #[test]
    fn equality_falls_back_to_handle() {
        let a = Account {
            handle: "alice".into(),
            ..Account::default()
        };
        let b = Account {
            handle: "alice".into(),
            hash: Hash::new("h1"),
            ..Account::default()
        };
        assert_eq!(a, b);
        assert_ne!(b, Account::from_iri("https://fedbox.git/actors/h2"));
    }

    #[test]
    fn private_key_is_redacted_and_not_serialized() {
        let key = KeyMaterial {
            algorithm: KeyAlgorithm::Rsa,
            public: vec![1, 2],
            private: vec![3, 4, 5],
        };
        assert!(format!("{key:?}").contains("<redacted>"));
        let json = serde_json::to_value(&key).unwrap();
        assert!(json.get("private").is_none());
        assert_eq!(json["algorithm"], "id-rsa");
    }

    #[test]
    fn key_algorithm_keeps_unknown_names() {
        let alg: KeyAlgorithm = serde_json::from_str("\"id-ed25519\"").unwrap();
        assert_eq!(alg, KeyAlgorithm::Other("id-ed25519".into()));
        let alg: KeyAlgorithm = serde_json::from_str("\"id-ecdsa\"").unwrap();
        assert_eq!(alg, KeyAlgorithm::Ecdsa);
    }
}
