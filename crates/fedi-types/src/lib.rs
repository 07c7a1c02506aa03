//! Foundation types for the federated repository.
//!
//! This crate holds the domain model the application works with, the loosely
//! typed ActivityStreams wire shape exchanged with the protocol endpoint, and
//! the small helpers that tie the two together. Every other `fedi-*` crate
//! depends on `fedi-types`.
//!
//! # Key Types
//!
//! - [`Hash`] - Stable content hash derived from a wire identifier
//! - [`WireObject`] / [`WireItem`] - ActivityStreams object or reference
//! - [`Account`], [`Item`], [`Vote`], [`FollowRequest`], [`ModerationOp`], [`Tag`] - Domain entities
//! - [`Entity`] / [`Cursor`] - Heterogeneous, timestamp-ordered results
//! - [`ServiceUrls`] - Endpoint and application base URLs

pub mod account;
pub mod entity;
pub mod error;
pub mod follow;
pub mod hash;
pub mod item;
pub mod moderation;
pub mod tag;
pub mod urls;
pub mod vote;
pub mod wire;

pub use account::{Account, AccountMetadata, ImageMetadata, KeyAlgorithm, KeyMaterial};
pub use entity::{sort_by_date_desc, Cursor, Entity, EntityKind, Renderable};
pub use error::TypeError;
pub use follow::{ActivityMetadata, FollowRequest, FollowStatus};
pub use hash::Hash;
pub use item::{Item, ItemMetadata, MimeType, Visibility};
pub use moderation::{ModerationKind, ModerationOp, ModerationTarget};
pub use tag::{Tag, TagKind};
pub use urls::{host_of, CollectionKind, ReferenceKind, ServiceUrls};
pub use vote::{Vote, VoteMetadata};
pub use wire::{Endpoints, ObjectType, PublicKey, Source, WireItem, WireObject, PUBLIC_NS};
