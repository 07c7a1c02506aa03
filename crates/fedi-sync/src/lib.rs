//! Collection walking and aggregation over a remote ActivityPub endpoint.
//!
//! Reads go through a [`RemoteTransport`]. A [`PageCursor`] follows one
//! collection page by page under a per-page timeout; an [`Aggregator`] runs
//! several walks concurrently, merges their results, resolves what the
//! pages only referenced, and returns a newest-first [`Cursor`].
//!
//! # Key Types
//!
//! - [`RemoteTransport`] - Collection, object and outbox access
//! - [`PageCursor`] / [`Step`] - One paginated walk
//! - [`Aggregator`] - Concurrent walks plus secondary resolution passes
//! - [`Viewer`] / [`valid_item`] - Visibility post-filter
//! - [`InMemoryTransport`] - In-process endpoint for tests
//!
//! [`Cursor`]: fedi_types::Cursor

pub mod aggregate;
pub mod cursor;
pub mod error;
pub mod memory;
pub mod transport;
pub mod visibility;

pub use aggregate::{AggregateOptions, Aggregator, DEFAULT_AUTHOR_BATCH};
pub use cursor::{page_tokens, PageCursor, Step, DEFAULT_PAGE_TIMEOUT};
pub use error::{SyncError, SyncResult};
pub use memory::{InMemoryTransport, Submission, DEFAULT_PAGE_SIZE};
pub use transport::RemoteTransport;
pub use visibility::{valid_item, Viewer};
