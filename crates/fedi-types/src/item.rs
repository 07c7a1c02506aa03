use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::{Account, ImageMetadata};
use crate::hash::Hash;
use crate::tag::Tag;
use crate::wire::WireItem;

pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_HTML: &str = "text/html";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_URL: &str = "application/url";

/// Format of an item's body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MimeType {
    Markdown,
    #[default]
    Html,
    Text,
    /// The body is a link to external content.
    Url,
    Other(String),
}

impl MimeType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Markdown => MIME_MARKDOWN,
            Self::Html => MIME_HTML,
            Self::Text => MIME_TEXT,
            Self::Url => MIME_URL,
            Self::Other(other) => other,
        }
    }
}

impl From<&str> for MimeType {
    fn from(value: &str) -> Self {
        match value {
            MIME_MARKDOWN => Self::Markdown,
            MIME_HTML => Self::Html,
            MIME_TEXT => Self::Text,
            MIME_URL => Self::Url,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for MimeType {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<MimeType> for String {
    fn from(value: MimeType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// Wire identifier of the object.
    pub id: Option<String>,
    pub url: Option<String>,
    /// Identifier of the author, kept even before the author is resolved.
    pub author_uri: Option<String>,
    pub icon: Option<ImageMetadata>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<Account>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<Account>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<Tag>,
}

/// A content unit: top-level submission or comment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Item {
    pub hash: Hash,
    pub title: String,
    pub data: String,
    pub mime_type: MimeType,
    pub visibility: Visibility,
    pub deleted: bool,
    pub score: i64,
    pub submitted_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub submitted_by: Option<Box<Account>>,
    pub updated_by: Option<Box<Account>>,
    /// Immediate reply target.
    pub parent: Option<Box<Item>>,
    /// Root of the reply chain.
    pub op: Option<Box<Item>>,
    /// Generator IRI, absent for items without one.
    pub generator: Option<String>,
    pub metadata: ItemMetadata,
    #[serde(skip)]
    pub wire: Option<Arc<WireItem>>,
}

impl Item {
    /// Stub item carrying only a reference.
    pub fn from_iri(iri: &str) -> Self {
        Self {
            hash: Hash::from_iri(iri),
            metadata: ItemMetadata {
                id: Some(iri.to_string()),
                ..ItemMetadata::default()
            },
            ..Self::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.hash.is_empty()
    }

    pub fn iri(&self) -> Option<&str> {
        self.metadata.id.as_deref()
    }

    pub fn is_private(&self) -> bool {
        self.visibility == Visibility::Private
    }

    pub fn is_top(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_link(&self) -> bool {
        self.mime_type == MimeType::Url
    }

    /// Mark deleted: keep hash and timestamps, drop body and authorship.
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
        self.title.clear();
        self.data.clear();
        self.submitted_by = Some(Box::new(Account::anonymous()));
    }

    pub fn author(&self) -> Option<&Account> {
        self.submitted_by.as_deref()
    }

    /// Ancestors from the immediate parent up to the root.
    ///
    /// Stops at the first repeated hash, so a malformed chain cannot loop.
    pub fn parent_chain(&self) -> Vec<&Item> {
        let mut seen = HashSet::new();
        let mut chain = Vec::new();
        let mut current = self.parent.as_deref();
        while let Some(parent) = current {
            if !parent.hash.is_empty() && !seen.insert(&parent.hash) {
                break;
            }
            chain.push(parent);
            current = parent.parent.as_deref();
        }
        chain
    }

    /// The root of the reply chain, if this item is a reply.
    pub fn origin(&self) -> Option<&Item> {
        self.op.as_deref().or(self.parent.as_deref())
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_to(parent: Item, iri: &str) -> Item {
        Item {
            parent: Some(Box::new(parent)),
            ..Item::from_iri(iri)
        }
    }

    #[test]
    fn mime_type_round_trips_through_strings() {
        for mime in [MimeType::Markdown, MimeType::Html, MimeType::Text, MimeType::Url] {
            assert_eq!(MimeType::from(mime.as_str()), mime);
        }
        assert_eq!(
            MimeType::from("image/png"),
            MimeType::Other("image/png".into())
        );
        assert_eq!(
            serde_json::to_string(&MimeType::Markdown).unwrap(),
            "\"text/markdown\""
        );
    }

    #[test]
    fn parent_chain_walks_to_the_root() {
        let root = Item::from_iri("https://x/objects/root");
        let middle = reply_to(root, "https://x/objects/middle");
        let leaf = reply_to(middle, "https://x/objects/leaf");
        let chain: Vec<_> = leaf.parent_chain().iter().map(|i| i.hash.to_string()).collect();
        assert_eq!(chain, ["middle", "root"]);
    }

    #[test]
    fn deleting_keeps_hash_and_timestamps() {
        let mut item = Item {
            title: "t".into(),
            data: "body".into(),
            submitted_at: Some(Utc::now()),
            submitted_by: Some(Box::new(Account::from_iri("https://x/actors/a"))),
            ..Item::from_iri("https://x/objects/1")
        };
        item.mark_deleted();
        assert!(item.deleted);
        assert!(item.data.is_empty());
        assert_eq!(item.hash.as_str(), "1");
        assert!(item.submitted_at.is_some());
        assert!(item.author().is_some_and(Account::is_anonymous));
    }

    #[test]
    fn origin_defaults_to_parent() {
        let leaf = reply_to(Item::from_iri("https://x/objects/p"), "https://x/objects/c");
        assert_eq!(leaf.origin().map(|o| o.hash.as_str()), Some("p"));
        assert!(Item::from_iri("https://x/objects/p").origin().is_none());
    }
}
