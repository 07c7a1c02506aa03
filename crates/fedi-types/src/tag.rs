use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::hash::Hash;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    #[default]
    Tag,
    Mention,
}

/// Hashtag or mention attached to an item.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub hash: Hash,
    pub name: String,
    /// Target of the tag: a tag page or the mentioned actor.
    pub url: String,
    pub kind: TagKind,
    pub submitted_by: Option<Box<Account>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub id: Option<String>,
}

impl Tag {
    pub fn hashtag(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            kind: TagKind::Tag,
            ..Self::default()
        }
    }

    pub fn mention(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            kind: TagKind::Mention,
            ..Self::default()
        }
    }

    pub fn is_mention(&self) -> bool {
        self.kind == TagKind::Mention
    }
}
