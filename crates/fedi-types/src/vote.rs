use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::hash::Hash;
use crate::item::Item;
use crate::wire::WireItem;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteMetadata {
    /// Identifier of the activity that expressed the vote.
    pub iri: Option<String>,
    /// For retractions, the identifier of the retracted activity.
    pub original_iri: Option<String>,
}

/// An appreciation of an item.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Vote {
    pub hash: Hash,
    pub submitted_by: Option<Box<Account>>,
    pub item: Option<Box<Item>>,
    /// +1 like, -1 dislike, 0 retracted.
    pub weight: i64,
    pub submitted_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub metadata: VoteMetadata,
    #[serde(skip)]
    pub wire: Option<Arc<WireItem>>,
}

impl Vote {
    pub fn is_retraction(&self) -> bool {
        self.weight == 0
    }

    pub fn is_valid(&self) -> bool {
        self.item.as_ref().is_some_and(|i| i.is_valid())
            && self.submitted_by.as_ref().is_some_and(|a| a.is_valid())
    }

    /// Hash of the voted item, if known.
    pub fn item_hash(&self) -> Option<&Hash> {
        self.item.as_deref().map(|i| &i.hash)
    }
}

impl PartialEq for Vote {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}
