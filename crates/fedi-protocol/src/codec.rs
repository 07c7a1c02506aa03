use fedi_types::{Account, Item, ServiceUrls, PUBLIC_NS};

/// Type-directed conversion between domain entities and wire objects.
///
/// Decoding lives in [`crate::decode`], encoding in [`crate::encode`]. The
/// codec only needs the service URLs: they identify the system account, tell
/// local from federated identifiers, and address outgoing activities.
#[derive(Clone, Debug)]
pub struct Codec {
    urls: ServiceUrls,
}

impl Codec {
    pub fn new(urls: ServiceUrls) -> Self {
        Self { urls }
    }

    pub fn urls(&self) -> &ServiceUrls {
        &self.urls
    }

    /// Wire identifier of an account. Invalid accounts map to the public sentinel.
    pub fn actor_id(&self, account: &Account) -> String {
        if !account.is_valid() {
            return PUBLIC_NS.to_string();
        }
        fedi_crypto::actor_iri(account, &self.urls)
    }

    /// Wire identifier of an item, absent for items never persisted.
    pub fn item_id(&self, item: &Item) -> Option<String> {
        if let Some(id) = item.iri().filter(|id| !id.is_empty()) {
            return Some(id.to_string());
        }
        (!item.hash.is_empty()).then(|| self.urls.object(&item.hash))
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(ServiceUrls::default())
    }
}
