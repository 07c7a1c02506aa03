use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::follow::ActivityMetadata;
use crate::hash::Hash;
use crate::item::Item;
use crate::wire::WireItem;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationKind {
    Flag,
    Block,
    Ignore,
}

/// What a moderation operation acts on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ModerationTarget {
    Item(Box<Item>),
    Account(Box<Account>),
    /// A reference that has not been resolved to an entity.
    Unresolved(String),
}

impl ModerationTarget {
    pub fn iri(&self) -> Option<&str> {
        match self {
            Self::Item(item) => item.iri(),
            Self::Account(account) => account.iri(),
            Self::Unresolved(iri) => Some(iri),
        }
    }

    pub fn hash(&self) -> Hash {
        match self {
            Self::Item(item) => item.hash.clone(),
            Self::Account(account) => account.hash.clone(),
            Self::Unresolved(iri) => Hash::from_iri(iri),
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unresolved(_))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModerationOp {
    pub hash: Hash,
    pub kind: ModerationKind,
    pub submitted_by: Option<Box<Account>>,
    pub object: ModerationTarget,
    pub reason: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub metadata: ActivityMetadata,
    #[serde(skip)]
    pub wire: Option<Arc<WireItem>>,
}

impl ModerationOp {
    pub fn new(kind: ModerationKind, object: ModerationTarget) -> Self {
        Self {
            hash: Hash::default(),
            kind,
            submitted_by: None,
            object,
            reason: None,
            submitted_at: None,
            updated_at: None,
            metadata: ActivityMetadata::default(),
            wire: None,
        }
    }
}

impl PartialEq for ModerationOp {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}
