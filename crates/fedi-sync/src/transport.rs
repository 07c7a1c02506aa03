use async_trait::async_trait;
use fedi_crypto::RequestSigner;
use fedi_protocol::Filters;
use fedi_types::{WireItem, WireObject};

use crate::error::SyncResult;

/// Access to a remote ActivityPub endpoint.
///
/// Reads are anonymous at this level; the implementation decides which
/// identity, if any, the process reads as. Writes carry the signer of the
/// acting account.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// One page of the collection at `iri`, narrowed by `filters`.
    ///
    /// Pagination tokens travel in `filters.next` / `filters.prev`.
    async fn collection(&self, iri: &str, filters: &Filters) -> SyncResult<WireObject>;

    /// A single actor, object or activity.
    async fn fetch(&self, iri: &str) -> SyncResult<WireItem>;

    /// Post an activity to an outbox and return it as stored by the endpoint.
    async fn submit(
        &self,
        outbox: &str,
        activity: &WireObject,
        signer: &RequestSigner,
    ) -> SyncResult<WireItem>;
}
