//! Entity codec for the federated repository.
//!
//! Converts between the domain entities of `fedi-types` and the loosely typed
//! ActivityStreams objects exchanged with the protocol endpoint, and builds
//! the activities the repository submits on writes.
//!
//! # Key Types
//!
//! - [`Codec`] - Type-directed decode and encode, bound to the service URLs
//! - [`Filters`] - Collection queries, rendered as query parameters or evaluated locally
//! - [`ProtocolError`] - Decode and encode failures

pub mod codec;
pub mod decode;
pub mod encode;
pub mod error;
pub mod filters;

pub use codec::Codec;
pub use decode::MAX_REPLY_DEPTH;
pub use encode::ARTICLE_WORD_THRESHOLD;
pub use error::{ProtocolError, ProtocolResult};
pub use filters::{CompStr, Filters, Operator, NIL_IRI};
