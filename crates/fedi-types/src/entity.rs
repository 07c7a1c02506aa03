use std::cmp::Reverse;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::follow::FollowRequest;
use crate::hash::Hash;
use crate::item::Item;
use crate::moderation::ModerationOp;
use crate::vote::Vote;
use crate::wire::WireItem;

/// Capability shared by every domain entity.
pub trait Renderable {
    /// Stable content hash.
    fn hash(&self) -> &Hash;

    /// Timestamp used for ordering.
    fn date(&self) -> Option<DateTime<Utc>>;

    /// Cached wire representation, for link reuse.
    fn wire(&self) -> Option<&Arc<WireItem>>;

    fn is_valid(&self) -> bool {
        !self.hash().is_empty()
    }
}

impl Renderable for Account {
    fn hash(&self) -> &Hash {
        &self.hash
    }

    fn date(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn wire(&self) -> Option<&Arc<WireItem>> {
        self.wire.as_ref()
    }
}

impl Renderable for Item {
    fn hash(&self) -> &Hash {
        &self.hash
    }

    fn date(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    fn wire(&self) -> Option<&Arc<WireItem>> {
        self.wire.as_ref()
    }
}

impl Renderable for Vote {
    fn hash(&self) -> &Hash {
        &self.hash
    }

    fn date(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    fn wire(&self) -> Option<&Arc<WireItem>> {
        self.wire.as_ref()
    }
}

impl Renderable for FollowRequest {
    fn hash(&self) -> &Hash {
        &self.hash
    }

    fn date(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    fn wire(&self) -> Option<&Arc<WireItem>> {
        self.wire.as_ref()
    }
}

impl Renderable for ModerationOp {
    fn hash(&self) -> &Hash {
        &self.hash
    }

    fn date(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    fn wire(&self) -> Option<&Arc<WireItem>> {
        self.wire.as_ref()
    }
}

/// Discriminant of [`Entity`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Item,
    Account,
    Vote,
    FollowRequest,
    Moderation,
}

/// Any decoded domain entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "entity", rename_all = "snake_case")]
pub enum Entity {
    Item(Item),
    Account(Account),
    Vote(Vote),
    FollowRequest(FollowRequest),
    Moderation(ModerationOp),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Item(_) => EntityKind::Item,
            Self::Account(_) => EntityKind::Account,
            Self::Vote(_) => EntityKind::Vote,
            Self::FollowRequest(_) => EntityKind::FollowRequest,
            Self::Moderation(_) => EntityKind::Moderation,
        }
    }

    fn as_renderable(&self) -> &dyn Renderable {
        match self {
            Self::Item(e) => e,
            Self::Account(e) => e,
            Self::Vote(e) => e,
            Self::FollowRequest(e) => e,
            Self::Moderation(e) => e,
        }
    }

    pub fn as_item(&self) -> Option<&Item> {
        match self {
            Self::Item(item) => Some(item),
            _ => None,
        }
    }

    pub fn as_account(&self) -> Option<&Account> {
        match self {
            Self::Account(account) => Some(account),
            _ => None,
        }
    }
}

impl Renderable for Entity {
    fn hash(&self) -> &Hash {
        self.as_renderable().hash()
    }

    fn date(&self) -> Option<DateTime<Utc>> {
        self.as_renderable().date()
    }

    fn wire(&self) -> Option<&Arc<WireItem>> {
        self.as_renderable().wire()
    }
}

/// Sort newest first; undated entities go last. The sort is stable.
pub fn sort_by_date_desc<T: Renderable>(entities: &mut [T]) {
    entities.sort_by_key(|e| Reverse(e.date()));
}

/// A materialized, ordered page of entities.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub items: Vec<Entity>,
    /// Token for the previous page.
    pub before: Option<String>,
    /// Token for the next page.
    pub after: Option<String>,
    pub total: usize,
    /// Non-fatal problems met while resolving secondary references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Cursor {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().filter_map(Entity::as_item)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.items.iter().filter_map(Entity::as_account)
    }
}
