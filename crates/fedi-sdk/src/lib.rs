//! Client-side repository over a remote ActivityPub endpoint.
//!
//! The entry point for applications: one [`Repository`] per endpoint loads
//! items, accounts, votes, follow requests and moderation operations, and
//! submits signed activities on behalf of logged-in accounts.
//!
//! # Key Types
//!
//! - [`Repository`] - reads and writes against one endpoint
//! - [`ClientConfig`] - endpoint URLs, timeouts and paging, loadable from TOML
//! - [`HttpTransport`] - the production transport over `reqwest`
//! - [`NodeInfo`] - application details, cached per repository
//! - [`SdkError`] - errors with an HTTP-like status code

pub mod client;
pub mod config;
pub mod error;
pub mod info;
pub mod repository;

pub use client::{HttpTransport, ACTIVITY_JSON};
pub use config::ClientConfig;
pub use error::{SdkError, SdkResult};
pub use info::{InfoCache, NodeInfo};
pub use repository::Repository;

// Re-export key types
pub use fedi_protocol::{CompStr, Filters};
pub use fedi_types::{
    Account, Cursor, Entity, FollowRequest, FollowStatus, Item, ModerationKind, ModerationOp,
    ModerationTarget, ObjectType, Vote,
};
