//! In-memory protocol endpoint for tests and offline use.
//!
//! [`InMemoryTransport`] keeps objects in a `HashMap` behind a `RwLock` and
//! serves ordered, filtered, paged collections the way the remote endpoint
//! does. Submitted activities are stored, recorded, and fanned into the
//! collections they affect (outbox, service inbox, `likes`, `followers`).
//! Failures and delays can be injected per collection.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use fedi_crypto::RequestSigner;
use fedi_protocol::Filters;
use fedi_types::{
    CollectionKind, Hash, ObjectType, ReferenceKind, ServiceUrls, WireItem, WireObject,
};
use tracing::debug;
use url::Url;

use crate::error::{SyncError, SyncResult};
use crate::transport::RemoteTransport;

/// Page size used when a request does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// One activity received on an outbox.
#[derive(Clone, Debug, PartialEq)]
pub struct Submission {
    pub outbox: String,
    pub activity: WireObject,
    /// Whether the request carried credentials.
    pub signed: bool,
}

#[derive(Debug, Default)]
struct EndpointState {
    objects: HashMap<String, WireItem>,
    collections: HashMap<String, Vec<String>>,
    failures: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    requests: HashMap<String, usize>,
    submissions: Vec<Submission>,
    sequence: u64,
}

#[derive(Debug, Default)]
pub struct InMemoryTransport {
    state: RwLock<EndpointState>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, EndpointState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, EndpointState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store an object and everything with an identifier embedded in it.
    ///
    /// Actors, objects and activities also become members of the endpoint's
    /// top-level `/actors`, `/objects` or `/activities` collection.
    pub fn insert(&self, object: WireObject) {
        self.write().store(object);
    }

    /// Store an object and append it to `collection`.
    pub fn push(&self, collection: &str, object: WireObject) {
        let mut state = self.write();
        let id = state.store(object);
        state.append(collection, &id);
    }

    /// Make every request to `collection` fail.
    pub fn fail(&self, collection: &str, message: &str) {
        self.write()
            .failures
            .insert(collection.to_string(), message.to_string());
    }

    /// Hold every request to `collection` for `delay` before answering.
    pub fn delay(&self, collection: &str, delay: Duration) {
        self.write().delays.insert(collection.to_string(), delay);
    }

    /// Number of page requests served for `collection`, failed ones included.
    pub fn requests(&self, collection: &str) -> usize {
        self.read().requests.get(collection).copied().unwrap_or(0)
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.read().submissions.clone()
    }

    /// Identifiers of the members of `collection`, in order.
    pub fn members(&self, collection: &str) -> Vec<String> {
        self.read()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get(&self, iri: &str) -> Option<WireItem> {
        self.read().objects.get(iri).cloned()
    }

    /// Count the request, then apply an injected delay or failure.
    async fn gate(&self, iri: &str) -> SyncResult<()> {
        let delay = {
            let mut state = self.write();
            *state.requests.entry(iri.to_string()).or_default() += 1;
            state.delays.get(iri).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.read().failures.get(iri) {
            Some(message) => Err(SyncError::Transport(message.clone())),
            None => Ok(()),
        }
    }
}

impl EndpointState {
    fn store(&mut self, object: WireObject) -> String {
        let embedded: Vec<WireObject> = [&object.object, &object.actor]
            .into_iter()
            .flatten()
            .filter(|nested| !nested.is_link())
            .filter_map(WireItem::as_object)
            .filter(|inner| inner.id.is_some())
            .cloned()
            .collect();
        for inner in embedded {
            self.store(inner);
        }
        let id = object.link().to_string();
        if let Some(top) = top_level_collection(&id, object.kind) {
            self.append(&top, &id);
        }
        self.objects.insert(id.clone(), WireItem::object(object));
        id
    }

    fn append(&mut self, collection: &str, id: &str) {
        let members = self.collections.entry(collection.to_string()).or_default();
        if !members.iter().any(|m| m == id) {
            members.push(id.to_string());
        }
    }

    fn remove_everywhere(&mut self, id: &str) {
        for members in self.collections.values_mut() {
            members.retain(|m| m != id);
        }
    }

    fn next_id(&mut self, origin: &str, path: &str) -> String {
        self.sequence += 1;
        format!("{origin}/{path}/{:012x}", self.sequence)
    }

    fn page(&self, iri: &str, filters: &Filters) -> WireObject {
        let matching: Vec<WireItem> = self
            .collections
            .get(iri)
            .into_iter()
            .flatten()
            .map(|id| self.objects.get(id).cloned().unwrap_or_else(|| WireItem::iri(id.clone())))
            .filter(|member| filters.matches(member))
            .collect();

        let size = filters.max_items.filter(|s| *s > 0).unwrap_or(DEFAULT_PAGE_SIZE);
        let position = |token: &str| {
            matching
                .iter()
                .position(|m| Hash::from_iri(m.link()).as_str() == token)
        };
        let (start, end) = match (&filters.next, &filters.prev) {
            (Some(after), _) => {
                let start = position(after).map_or(matching.len(), |p| p + 1);
                (start, (start + size).min(matching.len()))
            }
            (None, Some(before)) => {
                let end = position(before).unwrap_or(0);
                (end.saturating_sub(size), end)
            }
            (None, None) => (0, size.min(matching.len())),
        };

        let mut page = WireObject::with_id(ObjectType::OrderedCollectionPage, iri);
        page.total_items = u64::try_from(matching.len()).ok();
        page.ordered_items = matching[start..end].to_vec();
        if end < matching.len() && end > 0 {
            let last = Hash::from_iri(matching[end - 1].link());
            page.next = Some(WireItem::iri(format!("{iri}?after={last}&maxItems={size}")));
        }
        if start > 0 && start < matching.len() {
            let first = Hash::from_iri(matching[start].link());
            page.prev = Some(WireItem::iri(format!("{iri}?before={first}&maxItems={size}")));
        }
        page
    }

    /// Assign identifiers, store, and fan the activity into its collections.
    fn accept(&mut self, outbox: &str, mut activity: WireObject) -> SyncResult<WireObject> {
        let origin = origin_of(outbox)?;
        if activity.id.is_none() {
            activity.id = Some(self.next_id(&origin, "activities"));
        }
        let activity_id = activity.link().to_string();
        let actor = activity.actor.as_ref().map(|a| a.link().to_string()).unwrap_or_default();
        let target = activity.object.as_ref().map(|o| o.link().to_string()).unwrap_or_default();

        match activity.kind {
            ObjectType::Create => {
                if let Some(WireItem::Object(object)) = activity.object.as_mut() {
                    if object.id.is_none() {
                        let path = if object.kind.is_actor() { "actors" } else { "objects" };
                        object.id = Some(self.next_id(&origin, path));
                    }
                    if object.published.is_none() {
                        object.published = activity.published;
                    }
                }
            }
            ObjectType::Delete => {
                if let Some(WireItem::Object(former)) = self.objects.get(&target).cloned() {
                    let mut tombstone = WireObject::with_id(ObjectType::Tombstone, target.clone());
                    tombstone.former_type = Some(former.kind);
                    tombstone.published = former.published;
                    tombstone.deleted = activity.published.or(former.updated);
                    tombstone.in_reply_to = former.in_reply_to.clone();
                    tombstone.context = former.context.clone();
                    self.objects.insert(target.clone(), WireItem::object(tombstone));
                }
            }
            ObjectType::Like | ObjectType::Dislike => {
                self.append(&ServiceUrls::collection(&target, CollectionKind::Likes), &activity_id);
                self.append(&ServiceUrls::collection(&actor, CollectionKind::Liked), &activity_id);
            }
            ObjectType::Undo => self.remove_everywhere(&target),
            ObjectType::Follow => {
                self.append(&ServiceUrls::collection(&target, CollectionKind::Inbox), &activity_id);
            }
            ObjectType::Accept => {
                if let Some(WireItem::Object(follow)) = self.objects.get(&target).cloned() {
                    let follower = follow.actor.as_ref().map(|a| a.link().to_string()).unwrap_or_default();
                    let followed = follow.object.as_ref().map(|o| o.link().to_string()).unwrap_or_default();
                    self.append(&ServiceUrls::collection(&followed, CollectionKind::Followers), &follower);
                    self.append(&ServiceUrls::collection(&follower, CollectionKind::Following), &followed);
                }
            }
            _ => {}
        }

        self.store(activity.clone());
        self.append(outbox, &activity_id);
        self.append(&format!("{origin}/inbox"), &activity_id);
        Ok(activity)
    }
}

/// Which of the endpoint's top-level collections an identifier belongs in.
fn top_level_collection(id: &str, kind: ObjectType) -> Option<String> {
    if id.is_empty() || kind.is_collection() {
        return None;
    }
    let origin = origin_of(id).ok()?;
    let name = match ReferenceKind::of(id)? {
        ReferenceKind::Actor if kind.is_actor() || kind == ObjectType::Tombstone => "actors",
        ReferenceKind::Object if !kind.is_activity() => "objects",
        ReferenceKind::Activity if kind.is_activity() => "activities",
        _ => return None,
    };
    Some(format!("{origin}/{name}"))
}

fn origin_of(iri: &str) -> SyncResult<String> {
    let url = Url::parse(iri).map_err(|e| SyncError::Transport(format!("{iri}: {e}")))?;
    Ok(url.origin().ascii_serialization())
}

#[async_trait]
impl RemoteTransport for InMemoryTransport {
    async fn collection(&self, iri: &str, filters: &Filters) -> SyncResult<WireObject> {
        self.gate(iri).await?;
        Ok(self.read().page(iri, filters))
    }

    async fn fetch(&self, iri: &str) -> SyncResult<WireItem> {
        self.gate(iri).await?;
        self.read()
            .objects
            .get(iri)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(iri.to_string()))
    }

    async fn submit(
        &self,
        outbox: &str,
        activity: &WireObject,
        signer: &RequestSigner,
    ) -> SyncResult<WireItem> {
        self.gate(outbox).await?;
        let mut state = self.write();
        let stored = state.accept(outbox, activity.clone())?;
        debug!(outbox = %outbox, kind = stored.kind.as_str(), id = stored.link(), "activity accepted");
        state.submissions.push(Submission {
            outbox: outbox.to_string(),
            activity: stored.clone(),
            signed: !signer.is_anonymous(),
        });
        Ok(WireItem::object(stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const API: &str = "https://fedbox.example";

    fn actor(hash: &str) -> WireObject {
        WireObject::with_id(ObjectType::Person, format!("{API}/actors/{hash}"))
    }

    #[tokio::test]
    async fn serves_filtered_pages() {
        let endpoint = InMemoryTransport::new();
        endpoint.insert(actor("alice"));
        endpoint.insert(actor("bob"));
        endpoint.insert(WireObject::with_id(ObjectType::Note, format!("{API}/objects/n1")));

        let actors = format!("{API}/actors");
        let page = endpoint
            .collection(&actors, &Filters::new().with_iri(format!("{API}/actors/bob")))
            .await
            .unwrap();
        assert_eq!(page.total_items, Some(1));
        assert_eq!(page.members()[0].link(), format!("{API}/actors/bob"));
        assert_eq!(endpoint.members(&format!("{API}/objects")).len(), 1);
    }

    #[tokio::test]
    async fn embedded_objects_are_stored() {
        let endpoint = InMemoryTransport::new();
        let mut create = WireObject::with_id(ObjectType::Create, format!("{API}/activities/c1"));
        create.object = Some(WireItem::object(WireObject::with_id(
            ObjectType::Note,
            format!("{API}/objects/n1"),
        )));
        endpoint.push(&format!("{API}/actors/alice/outbox"), create);

        assert!(endpoint.get(&format!("{API}/objects/n1")).is_some());
        assert_eq!(endpoint.members(&format!("{API}/activities")), [format!("{API}/activities/c1")]);
    }

    #[tokio::test]
    async fn submission_assigns_ids_and_records() {
        let endpoint = InMemoryTransport::new();
        let outbox = format!("{API}/actors/alice/outbox");
        let mut create = WireObject::new(ObjectType::Create);
        create.actor = Some(WireItem::iri(format!("{API}/actors/alice")));
        create.object = Some(WireItem::object(WireObject::new(ObjectType::Note)));

        let stored = endpoint
            .submit(&outbox, &create, &RequestSigner::Bearer("t".into()))
            .await
            .unwrap();
        let stored = stored.as_object().unwrap();
        assert!(stored.link().starts_with(&format!("{API}/activities/")));
        let note = stored.object.as_ref().unwrap().link().to_string();
        assert!(note.starts_with(&format!("{API}/objects/")));
        assert!(endpoint.get(&note).is_some());

        let submissions = endpoint.submissions();
        assert_eq!(submissions.len(), 1);
        assert!(submissions[0].signed);
        assert_eq!(endpoint.members(&outbox).len(), 1);
        assert_eq!(endpoint.members(&format!("{API}/inbox")).len(), 1);
    }

    #[tokio::test]
    async fn likes_follow_the_vote_lifecycle() {
        let endpoint = InMemoryTransport::new();
        let item = format!("{API}/objects/n1");
        let mut like = WireObject::new(ObjectType::Like);
        like.actor = Some(WireItem::iri(format!("{API}/actors/alice")));
        like.object = Some(WireItem::iri(item.clone()));
        let outbox = format!("{API}/actors/alice/outbox");
        let stored = endpoint
            .submit(&outbox, &like, &RequestSigner::Anonymous)
            .await
            .unwrap();
        let likes = format!("{item}/likes");
        assert_eq!(endpoint.members(&likes), [stored.link().to_string()]);

        let mut undo = WireObject::new(ObjectType::Undo);
        undo.object = Some(WireItem::iri(stored.link()));
        endpoint.submit(&outbox, &undo, &RequestSigner::Anonymous).await.unwrap();
        assert!(endpoint.members(&likes).is_empty());
    }

    #[tokio::test]
    async fn missing_objects_are_not_found() {
        let endpoint = InMemoryTransport::new();
        let err = endpoint.fetch(&format!("{API}/objects/nope")).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn injected_failures_apply_per_collection() {
        let endpoint = InMemoryTransport::new();
        endpoint.fail(&format!("{API}/actors"), "boom");
        assert!(endpoint.collection(&format!("{API}/actors"), &Filters::new()).await.is_err());
        assert!(endpoint.collection(&format!("{API}/objects"), &Filters::new()).await.is_ok());
        assert_eq!(endpoint.requests(&format!("{API}/actors")), 1);
    }
}
