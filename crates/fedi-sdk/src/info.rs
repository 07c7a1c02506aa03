//! Node information about the application and its protocol endpoint.

use fedi_sync::{RemoteTransport, SyncError, SyncResult};
use fedi_types::{ServiceUrls, WireObject};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub title: String,
    pub summary: String,
    pub url: String,
    pub version: String,
}

impl NodeInfo {
    /// Describe the application from the endpoint's service actor.
    pub fn from_service(service: &WireObject, urls: &ServiceUrls) -> Self {
        let title = service
            .name
            .clone()
            .or_else(|| service.preferred_username.clone())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| urls.host());
        Self {
            title,
            summary: service.summary.clone().unwrap_or_default(),
            url: urls.base_url.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Node information, fetched on first use and kept for the lifetime of the
/// owning repository. A failed load is not cached.
#[derive(Debug, Default)]
pub struct InfoCache {
    cell: OnceCell<NodeInfo>,
}

impl InfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&NodeInfo> {
        self.cell.get()
    }

    pub async fn get_or_load(
        &self,
        transport: &dyn RemoteTransport,
        urls: &ServiceUrls,
    ) -> SyncResult<&NodeInfo> {
        self.cell
            .get_or_try_init(|| async {
                debug!(iri = %urls.api_url, "loading node info");
                let service = transport.fetch(&urls.api_url).await?;
                let service = service
                    .as_object()
                    .ok_or_else(|| SyncError::NotFound(urls.api_url.clone()))?;
                Ok(NodeInfo::from_service(service, urls))
            })
            .await
    }
}
