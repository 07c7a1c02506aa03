use std::future::Future;
use std::slice;
use std::sync::Arc;

use chrono::Utc;
use fedi_crypto::RequestSigner;
use fedi_protocol::{Codec, CompStr, Filters};
use fedi_sync::{valid_item, Aggregator, RemoteTransport, SyncError, SyncResult, Viewer};
use fedi_types::{
    sort_by_date_desc, Account, CollectionKind, Cursor, Entity, FollowRequest, Item,
    ModerationKind, ModerationOp, ModerationTarget, ObjectType, ServiceUrls, Vote, VoteMetadata,
    WireItem, WireObject,
};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::client::HttpTransport;
use crate::config::ClientConfig;
use crate::error::{SdkError, SdkResult};
use crate::info::{InfoCache, NodeInfo};

/// Repository façade over one protocol endpoint.
///
/// Reads take the account they are made for, `None` meaning anonymous, and
/// drop what that account may not see. Writes take the acting account, which
/// must be logged in; they are refused before anything is sent otherwise.
/// Every operation runs under the configured request deadline.
pub struct Repository {
    transport: Arc<dyn RemoteTransport>,
    codec: Codec,
    config: ClientConfig,
    info: InfoCache,
}

impl Repository {
    /// Repository talking HTTP to `config.api_url`.
    pub fn new(config: ClientConfig) -> SdkResult<Self> {
        let transport = HttpTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn RemoteTransport>) -> SdkResult<Self> {
        let codec = Codec::new(config.urls()?);
        Ok(Self {
            transport,
            codec,
            config,
            info: InfoCache::new(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn urls(&self) -> &ServiceUrls {
        self.codec.urls()
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    fn aggregator<'a>(&'a self, viewer: Option<&'a Account>) -> Aggregator<'a> {
        Aggregator::new(self.transport.as_ref(), &self.codec, self.viewer(viewer))
            .with_options(self.config.aggregate_options())
    }

    fn viewer<'a>(&'a self, account: Option<&'a Account>) -> Viewer<'a> {
        Viewer::new(account, &self.codec.urls().base_url)
    }

    /// Apply the default page size to filters that do not set one.
    fn paged(&self, filters: Filters) -> Filters {
        match filters.max_items {
            Some(_) => filters,
            None => filters.with_max_items(self.config.max_items),
        }
    }

    fn paged_all(&self, filters: Vec<Filters>) -> Vec<Filters> {
        if filters.is_empty() {
            return vec![self.paged(Filters::new())];
        }
        filters.into_iter().map(|f| self.paged(f)).collect()
    }

    /// One of the account's collections, as declared or derived from its IRI.
    fn collection_of(&self, account: &Account, kind: CollectionKind) -> String {
        let declared = match kind {
            CollectionKind::Inbox => account.metadata.inbox.as_deref(),
            CollectionKind::Outbox => account.metadata.outbox.as_deref(),
            CollectionKind::Followers => account.metadata.followers.as_deref(),
            CollectionKind::Following => account.metadata.following.as_deref(),
            CollectionKind::Liked => account.metadata.liked.as_deref(),
            _ => None,
        };
        declared
            .filter(|iri| !iri.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| ServiceUrls::collection(&self.codec.actor_id(account), kind))
    }

    async fn within<T, F>(&self, operation: &'static str, work: F) -> SdkResult<T>
    where
        F: Future<Output = SdkResult<T>>,
    {
        match timeout(self.config.request_timeout(), work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, deadline_ms = self.config.request_timeout_ms, "deadline exceeded");
                Err(SdkError::Timeout(format!(
                    "{operation} exceeded {}ms",
                    self.config.request_timeout_ms
                )))
            }
        }
    }

    // ---- Reads ----

    /// A single item by IRI, with its authors and score.
    ///
    /// A direct lookup counts as asking for the item's own generator, so
    /// only the recipient rule can hide it.
    pub async fn load_item(&self, viewer: Option<&Account>, iri: &str) -> SdkResult<Item> {
        self.within("load item", async {
            let wire = self.transport.fetch(iri).await?;
            let mut item = self.codec.decode_item(&wire)?;

            let mut allowed = Filters::new();
            if let Some(generator) = &item.generator {
                allowed.generator.push(CompStr::equals(generator.clone()));
            }
            if !valid_item(&item, &allowed, &self.viewer(viewer)) {
                debug!(iri, "item hidden from viewer");
                return Err(SdkError::NotFound(iri.to_string()));
            }

            let aggregator = self.aggregator(viewer);
            let items = slice::from_mut(&mut item);
            best_effort("item authors", aggregator.resolve_item_authors(items).await);
            best_effort("item votes", aggregator.resolve_item_votes(items).await);
            Ok::<_, SdkError>(item)
        })
        .await
    }

    /// Items from the objects collection, newest first.
    pub async fn load_items(&self, viewer: Option<&Account>, filters: Vec<Filters>) -> SdkResult<Vec<Item>> {
        self.within("load items", async {
            let filters = self.paged_all(filters);
            let aggregator = self.aggregator(viewer);
            let mut items = aggregator.objects(filters.clone()).await?;
            let who = self.viewer(viewer);
            items.retain(|item| filters.iter().any(|f| valid_item(item, f, &who)));

            best_effort("item authors", aggregator.resolve_item_authors(&mut items).await);
            best_effort("item votes", aggregator.resolve_item_votes(&mut items).await);
            sort_by_date_desc(&mut items);
            Ok::<_, SdkError>(items)
        })
        .await
    }

    /// The first account matching `filters`.
    pub async fn load_account(&self, viewer: Option<&Account>, filters: Filters) -> SdkResult<Account> {
        let description = format!("{:?}", filters.to_query_pairs());
        self.load_accounts(viewer, vec![filters])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SdkError::NotFound(format!("account matching {description}")))
    }

    pub async fn load_account_by_iri(&self, iri: &str) -> SdkResult<Account> {
        self.within("load account", async {
            let wire = self.transport.fetch(iri).await?;
            let mut account = self.codec.decode_account(&wire)?;
            best_effort(
                "account authors",
                self.aggregator(None)
                    .resolve_account_authors(slice::from_mut(&mut account))
                    .await,
            );
            Ok::<_, SdkError>(account)
        })
        .await
    }

    /// Accounts matching any of the filter sets, with the votes they cast.
    pub async fn load_accounts(
        &self,
        viewer: Option<&Account>,
        filters: Vec<Filters>,
    ) -> SdkResult<Vec<Account>> {
        self.within("load accounts", async {
            let filters = self
                .paged_all(filters)
                .into_iter()
                .map(|f| if f.kind.is_empty() { f.with_types(ObjectType::ACTORS) } else { f })
                .collect();
            let aggregator = self.aggregator(viewer);
            let mut accounts = aggregator.accounts(filters).await?;
            best_effort("account authors", aggregator.resolve_account_authors(&mut accounts).await);
            best_effort("account votes", aggregator.resolve_account_votes(&mut accounts).await);
            Ok::<_, SdkError>(accounts)
        })
        .await
    }

    /// Fill in followers, following, votes, blocked and ignored accounts.
    ///
    /// Each part is loaded independently; failures are logged and leave that
    /// part as it was.
    pub async fn load_account_details(&self, account: &mut Account) {
        let aggregator = self.aggregator(None);

        let followers = self.collection_of(account, CollectionKind::Followers);
        match self.within("load followers", self.member_accounts(&aggregator, &followers)).await {
            Ok(found) => account.followers = found,
            Err(e) => warn!(handle = %account.handle, error = %e, "unable to load followers"),
        }
        let following = self.collection_of(account, CollectionKind::Following);
        match self.within("load following", self.member_accounts(&aggregator, &following)).await {
            Ok(found) => account.following = found,
            Err(e) => warn!(handle = %account.handle, error = %e, "unable to load following"),
        }

        let outbox = self.collection_of(account, CollectionKind::Outbox);
        let mut wanted = ObjectType::APPRECIATIONS.to_vec();
        wanted.extend([ObjectType::Block, ObjectType::Ignore]);
        let filters = vec![Filters::new().with_types(&wanted)];
        let cursor = self
            .within("load outbox", async {
                aggregator.collection(&outbox, filters).await.map_err(SdkError::from)
            })
            .await;
        let cursor = match cursor {
            Ok(cursor) => cursor,
            Err(e) => {
                warn!(handle = %account.handle, error = %e, "unable to load outbox");
                return;
            }
        };
        for entity in cursor.items {
            match entity {
                Entity::Vote(vote) => {
                    if !account.votes.iter().any(|v| v.hash == vote.hash) {
                        account.votes.push(vote);
                    }
                }
                Entity::Moderation(op) => {
                    let ModerationTarget::Account(target) = op.object else {
                        continue;
                    };
                    let list = match op.kind {
                        ModerationKind::Block => &mut account.blocked,
                        ModerationKind::Ignore => &mut account.ignored,
                        ModerationKind::Flag => continue,
                    };
                    if !list.iter().any(|a| a.same_as(&target)) {
                        list.push(*target);
                    }
                }
                _ => {}
            }
        }
    }

    async fn member_accounts(&self, aggregator: &Aggregator<'_>, iri: &str) -> SdkResult<Vec<Account>> {
        let mut accounts: Vec<Account> = aggregator
            .entities(iri, Filters::new())
            .await?
            .into_iter()
            .filter_map(|entity| match entity {
                Entity::Account(account) => Some(account),
                _ => None,
            })
            .collect();
        aggregator.resolve_accounts(&mut accounts).await?;
        Ok(accounts)
    }

    /// The actor's outbox with its appreciations moved into `actor.votes`.
    pub async fn load_account_with_details(
        &self,
        viewer: Option<&Account>,
        actor: &mut Account,
        filters: Vec<Filters>,
    ) -> SdkResult<Cursor> {
        let mut cursor = self.load_actor_outbox(viewer, actor, filters).await?;
        let mut remaining = Vec::with_capacity(cursor.items.len());
        for entity in cursor.items.drain(..) {
            match entity {
                Entity::Vote(vote) => {
                    if !actor.votes.iter().any(|v| v.hash == vote.hash) {
                        actor.votes.push(vote);
                    }
                }
                other => remaining.push(other),
            }
        }
        cursor.total = remaining.len();
        cursor.items = remaining;
        Ok(cursor)
    }

    /// The service-wide activity stream.
    pub async fn load_activities(&self, viewer: Option<&Account>, filters: Vec<Filters>) -> SdkResult<Cursor> {
        let iri = self.codec.urls().activities();
        self.load_collection("load activities", viewer, iri, filters).await
    }

    pub async fn load_actor_inbox(
        &self,
        viewer: Option<&Account>,
        actor: &Account,
        filters: Vec<Filters>,
    ) -> SdkResult<Cursor> {
        let iri = self.collection_of(actor, CollectionKind::Inbox);
        self.load_collection("load inbox", viewer, iri, filters).await
    }

    pub async fn load_actor_outbox(
        &self,
        viewer: Option<&Account>,
        actor: &Account,
        filters: Vec<Filters>,
    ) -> SdkResult<Cursor> {
        let iri = self.collection_of(actor, CollectionKind::Outbox);
        self.load_collection("load outbox", viewer, iri, filters).await
    }

    async fn load_collection(
        &self,
        operation: &'static str,
        viewer: Option<&Account>,
        iri: String,
        filters: Vec<Filters>,
    ) -> SdkResult<Cursor> {
        self.within(operation, async {
            let cursor = self.aggregator(viewer).collection(&iri, self.paged_all(filters)).await?;
            debug!(iri = %iri, count = cursor.len(), warnings = cursor.warnings.len(), "collection loaded");
            Ok::<_, SdkError>(cursor)
        })
        .await
    }

    /// Follow requests awaiting an answer.
    ///
    /// With `followed` set, reads that account's inbox and leaves out requests
    /// from accounts that already follow it; otherwise reads the service-wide
    /// activities. Requests default to the `Follow` type.
    pub async fn load_follow_requests(
        &self,
        viewer: Option<&Account>,
        followed: Option<&Account>,
        filters: Filters,
    ) -> SdkResult<Vec<FollowRequest>> {
        self.within("load follow requests", async {
            let mut filters = self.paged(filters);
            if filters.kind.is_empty() {
                filters = filters.with_types(&[ObjectType::Follow]);
            }
            let iri = match followed {
                Some(account) => self.collection_of(account, CollectionKind::Inbox),
                None => self.codec.urls().activities(),
            };
            let aggregator = self.aggregator(viewer);
            let cursor = aggregator.collection(&iri, vec![filters]).await?;
            let mut requests: Vec<FollowRequest> = cursor
                .items
                .into_iter()
                .filter_map(|entity| match entity {
                    Entity::FollowRequest(request) => Some(request),
                    _ => None,
                })
                .collect();

            if let Some(account) = followed {
                let followers = self.collection_of(account, CollectionKind::Followers);
                match self.member_accounts(&aggregator, &followers).await {
                    Ok(followers) => requests.retain(|request| {
                        !request
                            .submitted_by
                            .as_deref()
                            .is_some_and(|by| followers.iter().any(|f| f.same_as(by)))
                    }),
                    Err(e) => warn!(handle = %account.handle, error = %e, "unable to load followers"),
                }
            }
            Ok::<_, SdkError>(requests)
        })
        .await
    }

    /// Node information, loaded once per repository.
    pub async fn load_info(&self) -> SdkResult<NodeInfo> {
        self.within("load info", async {
            let info = self
                .info
                .get_or_load(self.transport.as_ref(), self.codec.urls())
                .await?;
            Ok::<_, SdkError>(info.clone())
        })
        .await
    }

    // ---- Writes ----

    /// Credentials of an acting account; refuses anyone not logged in.
    fn signer_for(&self, account: &Account) -> SdkResult<RequestSigner> {
        if !account.is_logged() {
            return Err(SdkError::InvalidAccount(format!(
                "{} is not logged in",
                account.display_name()
            )));
        }
        Ok(RequestSigner::for_account(account, self.codec.urls())?)
    }

    async fn dispatch(
        &self,
        actor: &Account,
        activity: &WireObject,
        signer: &RequestSigner,
    ) -> SdkResult<WireItem> {
        let outbox = self.collection_of(actor, CollectionKind::Outbox);
        let stored = self.transport.submit(&outbox, activity, signer).await?;
        info!(
            handle = %actor.handle,
            kind = activity.kind.as_str(),
            id = %stored.link(),
            "activity submitted"
        );
        Ok(stored)
    }

    /// Create, update or delete an item on behalf of `author`.
    ///
    /// Mentioned accounts and, for public top-level items, the author's
    /// followers are copied in.
    pub async fn save_item(&self, author: &Account, item: Item) -> SdkResult<Item> {
        let signer = self.signer_for(author)?;
        self.within("save item", async {
            let aggregator = self.aggregator(Some(author));
            let mut cc = Vec::new();

            let lookups: Vec<Filters> = item
                .metadata
                .mentions
                .iter()
                .filter_map(|mention| mention_handle(&mention.name))
                .map(|handle| Filters::new().with_types(ObjectType::ACTORS).with_name(handle))
                .collect();
            if !lookups.is_empty() {
                match aggregator.accounts(lookups).await {
                    Ok(mentioned) => cc.extend(mentioned.iter().map(|a| self.codec.actor_id(a))),
                    Err(e) => warn!(error = %e, "unable to resolve mentions"),
                }
            }
            if !item.is_private() && item.is_top() {
                cc.push(self.collection_of(author, CollectionKind::Followers));
            }

            let activity = self.codec.item_activity(&item, author, &cc)?;
            let stored = self.dispatch(author, &activity, &signer).await?;
            let mut saved = self.codec.decode_item(&stored)?;
            if !saved.deleted {
                best_effort(
                    "item authors",
                    aggregator.resolve_item_authors(slice::from_mut(&mut saved)).await,
                );
            }
            Ok::<_, SdkError>(saved)
        })
        .await
    }

    /// Create, update or delete an account, submitted through `actor`.
    pub async fn save_account(&self, actor: &Account, account: Account) -> SdkResult<Account> {
        let signer = self.signer_for(actor)?;
        self.within("save account", async {
            let activity = self.codec.account_activity(&account, Utc::now())?;
            let stored = self.dispatch(actor, &activity, &signer).await?;
            let mut saved = self.codec.decode_account(&stored)?;
            if !saved.deleted {
                best_effort(
                    "account authors",
                    self.aggregator(Some(actor))
                        .resolve_account_authors(slice::from_mut(&mut saved))
                        .await,
                );
            }
            Ok::<_, SdkError>(saved)
        })
        .await
    }

    /// Record the voter's appreciation of an item.
    ///
    /// A vote the voter already cast on the item is undone first. A new
    /// Like or Dislike follows unless the requested weight is zero or
    /// equals the weight just undone, so voting the same way twice retracts.
    pub async fn save_vote(&self, vote: Vote) -> SdkResult<Vote> {
        let voter = vote
            .submitted_by
            .as_deref()
            .cloned()
            .ok_or_else(|| SdkError::InvalidInput("vote has no author".into()))?;
        let signer = self.signer_for(&voter)?;
        let item = vote
            .item
            .as_deref()
            .cloned()
            .ok_or_else(|| SdkError::InvalidInput("vote has no item".into()))?;
        let item_iri = self
            .codec
            .item_id(&item)
            .ok_or_else(|| SdkError::InvalidInput("voted item has no id".into()))?;

        self.within("save vote", async {
            let likes = ServiceUrls::collection(&item_iri, CollectionKind::Likes);
            let mine = Filters::new()
                .with_types(ObjectType::APPRECIATIONS)
                .with_actor(Filters::new().with_iri(self.codec.actor_id(&voter)));
            let mut existing = match self.aggregator(Some(&voter)).votes(&likes, mine).await {
                Ok(votes) => votes,
                Err(SyncError::NotFound(_)) => Vec::new(),
                Err(e) => return Err(e.into()),
            };
            sort_by_date_desc(&mut existing);

            let mut result = None;
            let mut retracted = None;
            if let Some(prior) = existing.into_iter().find(|v| v.weight != 0) {
                let undo = Vote {
                    weight: 0,
                    submitted_by: Some(Box::new(voter.clone())),
                    item: Some(Box::new(item.clone())),
                    metadata: VoteMetadata {
                        iri: None,
                        original_iri: prior.metadata.iri.clone(),
                    },
                    ..Vote::default()
                };
                let activity = self.codec.vote_activity(&undo)?;
                let stored = self.dispatch(&voter, &activity, &signer).await?;
                result = Some(self.codec.decode_vote(&stored)?);
                retracted = Some(prior.weight.signum());
            }

            if vote.weight == 0 || retracted == Some(vote.weight.signum()) {
                return Ok(result.unwrap_or(vote));
            }

            let cast = Vote {
                weight: vote.weight.signum(),
                submitted_by: Some(Box::new(voter.clone())),
                item: Some(Box::new(item.clone())),
                ..Vote::default()
            };
            let activity = self.codec.vote_activity(&cast)?;
            let stored = self.dispatch(&voter, &activity, &signer).await?;
            let mut saved = self.codec.decode_vote(&stored)?;
            saved.submitted_by = Some(Box::new(voter.clone()));
            saved.item = Some(Box::new(item.clone()));
            Ok::<_, SdkError>(saved)
        })
        .await
    }

    pub async fn follow_account(
        &self,
        follower: &Account,
        followed: &Account,
        reason: Option<&Item>,
    ) -> SdkResult<FollowRequest> {
        let signer = self.signer_for(follower)?;
        self.within("follow account", async {
            let activity = self.codec.follow_activity(follower, followed, reason);
            let stored = self.dispatch(follower, &activity, &signer).await?;
            let mut request = self.codec.decode_follow(&stored)?;
            best_effort(
                "follow authors",
                self.aggregator(Some(follower))
                    .resolve_follow_authors(slice::from_mut(&mut request))
                    .await,
            );
            Ok::<_, SdkError>(request)
        })
        .await
    }

    /// Accept or reject a follow request addressed to `actor`.
    pub async fn send_follow_response(
        &self,
        actor: &Account,
        request: &FollowRequest,
        accept: bool,
        reason: Option<&Item>,
    ) -> SdkResult<FollowRequest> {
        let signer = self.signer_for(actor)?;
        if !request.object.as_deref().is_some_and(|o| o.same_as(actor)) {
            return Err(SdkError::InvalidInput(format!(
                "follow request is not addressed to {}",
                actor.handle
            )));
        }
        self.within("send follow response", async {
            let activity = self.codec.follow_response(request, accept, reason)?;
            let stored = self.dispatch(actor, &activity, &signer).await?;
            let response = self.codec.decode_follow(&stored)?;

            let mut answered = request.clone();
            answered.status = response.status;
            answered.updated_at = response.updated_at.or(answered.updated_at);
            Ok::<_, SdkError>(answered)
        })
        .await
    }

    pub async fn block_account(
        &self,
        actor: &Account,
        target: &Account,
        reason: Option<&Item>,
    ) -> SdkResult<ModerationOp> {
        let target = ModerationTarget::Account(Box::new(target.clone()));
        self.moderate(ModerationKind::Block, actor, target, reason).await
    }

    pub async fn block_item(&self, actor: &Account, item: &Item, reason: Option<&Item>) -> SdkResult<ModerationOp> {
        let target = ModerationTarget::Item(Box::new(item.clone()));
        self.moderate(ModerationKind::Block, actor, target, reason).await
    }

    pub async fn report_account(
        &self,
        actor: &Account,
        target: &Account,
        reason: Option<&Item>,
    ) -> SdkResult<ModerationOp> {
        let target = ModerationTarget::Account(Box::new(target.clone()));
        self.moderate(ModerationKind::Flag, actor, target, reason).await
    }

    pub async fn report_item(&self, actor: &Account, item: &Item, reason: Option<&Item>) -> SdkResult<ModerationOp> {
        let target = ModerationTarget::Item(Box::new(item.clone()));
        self.moderate(ModerationKind::Flag, actor, target, reason).await
    }

    async fn moderate(
        &self,
        kind: ModerationKind,
        actor: &Account,
        target: ModerationTarget,
        reason: Option<&Item>,
    ) -> SdkResult<ModerationOp> {
        let signer = self.signer_for(actor)?;
        self.within("moderate", async {
            let target_actor = match &target {
                ModerationTarget::Account(account) => Some(&**account),
                ModerationTarget::Item(item) => item.author(),
                ModerationTarget::Unresolved(_) => None,
            };
            let mut cc: Vec<String> = Vec::new();
            let creators = [actor.created_by.as_deref(), target_actor.and_then(|a| a.created_by.as_deref())];
            for creator in creators.into_iter().flatten() {
                if !creator.is_valid() || creator.is_anonymous() {
                    continue;
                }
                let iri = self.codec.actor_id(creator);
                if !cc.contains(&iri) {
                    cc.push(iri);
                }
            }

            let activity = self.codec.moderation_activity(kind, actor, &target, &cc, reason)?;
            let stored = self.dispatch(actor, &activity, &signer).await?;
            let mut op = self.codec.decode_moderation(&stored)?;
            if op.object.hash() == target.hash() {
                op.object = target;
            }
            op.submitted_by = Some(Box::new(actor.clone()));
            Ok::<_, SdkError>(op)
        })
        .await
    }
}

fn best_effort(pass: &str, result: SyncResult<()>) {
    if let Err(e) = result {
        warn!(pass, error = %e, "secondary pass failed");
    }
}

/// `@name` or `@name@host` to `name`.
fn mention_handle(name: &str) -> Option<String> {
    name.trim_start_matches('@')
        .split('@')
        .next()
        .filter(|handle| !handle.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedi_sync::InMemoryTransport;
    use fedi_types::{
        AccountMetadata, FollowStatus, Hash, ItemMetadata, MimeType, Tag, Visibility, PUBLIC_NS,
    };
    use serde_json::json;
    use std::time::Duration;

    const API: &str = "https://fedbox.example";
    const BASE: &str = "https://littr.example";

    fn config() -> ClientConfig {
        ClientConfig {
            api_url: API.into(),
            base_url: BASE.into(),
            ..ClientConfig::default()
        }
    }

    fn wire(value: serde_json::Value) -> WireObject {
        serde_json::from_value(value).unwrap()
    }

    fn actor(handle: &str) -> WireObject {
        wire(json!({
            "id": format!("{API}/actors/{handle}"),
            "type": "Person",
            "preferredUsername": handle,
        }))
    }

    fn note(hash: &str, author: &str, published: &str) -> WireObject {
        wire(json!({
            "id": format!("{API}/objects/{hash}"),
            "type": "Note",
            "content": format!("note {hash}"),
            "attributedTo": format!("{API}/actors/{author}"),
            "to": [PUBLIC_NS],
            "published": published,
        }))
    }

    fn logged(handle: &str) -> Account {
        Account {
            hash: Hash::new(handle),
            handle: handle.to_string(),
            metadata: AccountMetadata {
                id: Some(format!("{API}/actors/{handle}")),
                oauth_token: Some(format!("{handle}-token")),
                ..AccountMetadata::default()
            },
            ..Account::default()
        }
    }

    fn setup() -> (Arc<InMemoryTransport>, Repository) {
        let endpoint = Arc::new(InMemoryTransport::new());
        for handle in ["alice", "bob", "carol"] {
            endpoint.insert(actor(handle));
        }
        let repository = Repository::with_transport(config(), endpoint.clone()).unwrap();
        (endpoint, repository)
    }

    fn kinds(endpoint: &InMemoryTransport) -> Vec<ObjectType> {
        endpoint.submissions().iter().map(|s| s.activity.kind).collect()
    }

    #[tokio::test]
    async fn load_item_resolves_author_and_score() {
        let (endpoint, repository) = setup();
        endpoint.insert(note("n1", "alice", "2024-01-01T00:00:00Z"));
        endpoint.push(
            &format!("{API}/inbox"),
            wire(json!({
                "id": format!("{API}/activities/l1"),
                "type": "Like",
                "actor": format!("{API}/actors/bob"),
                "object": format!("{API}/objects/n1"),
            })),
        );

        let item = repository
            .load_item(None, &format!("{API}/objects/n1"))
            .await
            .unwrap();
        assert_eq!(item.data, "note n1");
        assert_eq!(item.author().unwrap().handle, "alice");
        assert_eq!(item.score, 1);
    }

    #[tokio::test]
    async fn private_items_are_not_found_for_strangers() {
        let (endpoint, repository) = setup();
        endpoint.insert(wire(json!({
            "id": format!("{API}/objects/secret"),
            "type": "Note",
            "content": "psst",
            "attributedTo": format!("{API}/actors/alice"),
            "to": [format!("{API}/actors/bob")],
        })));
        let iri = format!("{API}/objects/secret");

        let err = repository.load_item(None, &iri).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
        let carol = logged("carol");
        assert!(repository.load_item(Some(&carol), &iri).await.is_err());

        let bob = logged("bob");
        let item = repository.load_item(Some(&bob), &iri).await.unwrap();
        assert_eq!(item.visibility, Visibility::Private);
    }

    #[tokio::test]
    async fn load_items_is_newest_first() {
        let (endpoint, repository) = setup();
        endpoint.insert(note("n1", "alice", "2024-01-01T00:00:00Z"));
        endpoint.insert(note("n2", "bob", "2024-01-02T00:00:00Z"));
        endpoint.insert(wire(json!({
            "id": format!("{API}/objects/elsewhere"),
            "type": "Note",
            "content": "federated",
            "generator": "https://other.example",
            "to": [PUBLIC_NS],
        })));

        let items = repository
            .load_items(None, vec![Filters::new().with_types(ObjectType::ITEMS)])
            .await
            .unwrap();
        let hashes: Vec<&str> = items.iter().map(|i| i.hash.as_str()).collect();
        assert_eq!(hashes, ["n2", "n1"]);
        assert_eq!(items[0].author().unwrap().handle, "bob");
    }

    #[tokio::test]
    async fn accounts_come_with_their_votes() {
        let (endpoint, repository) = setup();
        endpoint.insert(note("n1", "bob", "2024-01-01T00:00:00Z"));
        endpoint.push(
            &format!("{API}/inbox"),
            wire(json!({
                "id": format!("{API}/activities/l1"),
                "type": "Like",
                "actor": format!("{API}/actors/alice"),
                "object": format!("{API}/objects/n1"),
            })),
        );

        let alice = repository
            .load_account(None, Filters::new().with_name("alice"))
            .await
            .unwrap();
        assert_eq!(alice.handle, "alice");
        assert_eq!(alice.votes.len(), 1);
        assert_eq!(alice.votes[0].weight, 1);

        let missing = repository
            .load_account(None, Filters::new().with_name("nobody"))
            .await
            .unwrap_err();
        assert!(matches!(missing, SdkError::NotFound(_)));
    }

    #[tokio::test]
    async fn writes_need_a_logged_in_account() {
        let (endpoint, repository) = setup();
        let item = Item {
            data: "hello".into(),
            submitted_by: Some(Box::new(Account::anonymous())),
            ..Item::default()
        };

        let err = repository
            .save_item(&Account::anonymous(), item.clone())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 401);

        let stub = Account::from_iri(&format!("{API}/actors/alice"));
        let err = repository.save_item(&stub, item).await.unwrap_err();
        assert!(matches!(err, SdkError::InvalidAccount(_)));

        let vote = Vote {
            weight: 1,
            submitted_by: Some(Box::new(stub.clone())),
            item: Some(Box::new(Item::from_iri(&format!("{API}/objects/n1")))),
            ..Vote::default()
        };
        assert!(matches!(
            repository.save_vote(vote).await,
            Err(SdkError::InvalidAccount(_))
        ));
        assert!(repository.block_account(&stub, &logged("bob"), None).await.is_err());

        assert!(endpoint.submissions().is_empty());
        assert_eq!(endpoint.requests(&format!("{API}/actors/alice/outbox")), 0);
    }

    #[tokio::test]
    async fn save_item_addresses_mentions_and_followers() {
        let (endpoint, repository) = setup();
        let alice = logged("alice");
        let item = Item {
            data: "hi @bob".into(),
            mime_type: MimeType::Text,
            submitted_by: Some(Box::new(alice.clone())),
            metadata: ItemMetadata {
                mentions: vec![Tag::mention("@bob", format!("{API}/actors/bob"))],
                ..ItemMetadata::default()
            },
            ..Item::default()
        };

        let saved = repository.save_item(&alice, item).await.unwrap();

        let submissions = endpoint.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].outbox, format!("{API}/actors/alice/outbox"));
        assert!(submissions[0].signed);
        let activity = &submissions[0].activity;
        assert_eq!(activity.kind, ObjectType::Create);
        let cc: Vec<&str> = activity.cc.iter().map(WireItem::link).collect();
        assert!(cc.contains(&format!("{API}/actors/bob").as_str()));
        assert!(cc.contains(&format!("{API}/actors/alice/followers").as_str()));

        assert!(!saved.hash.is_empty());
        assert_eq!(saved.data, "hi @bob");
        assert_eq!(saved.author().unwrap().handle, "alice");
    }

    #[tokio::test]
    async fn deleting_an_item_sends_only_its_id() {
        let (endpoint, repository) = setup();
        endpoint.insert(note("n1", "alice", "2024-01-01T00:00:00Z"));
        let alice = logged("alice");
        let item = Item {
            deleted: true,
            submitted_by: Some(Box::new(alice.clone())),
            ..Item::from_iri(&format!("{API}/objects/n1"))
        };

        let saved = repository.save_item(&alice, item).await.unwrap();
        assert!(saved.deleted);
        assert_eq!(saved.hash.as_str(), "n1");

        let activity = &endpoint.submissions()[0].activity;
        assert_eq!(activity.kind, ObjectType::Delete);
        assert_eq!(activity.object, Some(WireItem::iri(format!("{API}/objects/n1"))));
        let stored = endpoint.get(&format!("{API}/objects/n1")).unwrap();
        assert_eq!(stored.kind(), Some(ObjectType::Tombstone));
    }

    fn vote(voter: &Account, weight: i64) -> Vote {
        Vote {
            weight,
            submitted_by: Some(Box::new(voter.clone())),
            item: Some(Box::new(Item::from_iri(&format!("{API}/objects/n1")))),
            ..Vote::default()
        }
    }

    #[tokio::test]
    async fn changing_a_vote_undoes_the_previous_one() {
        let (endpoint, repository) = setup();
        endpoint.insert(note("n1", "bob", "2024-01-01T00:00:00Z"));
        let alice = logged("alice");

        repository.save_vote(vote(&alice, -1)).await.unwrap();
        let saved = repository.save_vote(vote(&alice, 1)).await.unwrap();

        assert_eq!(
            kinds(&endpoint),
            [ObjectType::Dislike, ObjectType::Undo, ObjectType::Like]
        );
        let submissions = endpoint.submissions();
        let undone = submissions[1].activity.object.as_ref().unwrap().link();
        assert_eq!(undone, submissions[0].activity.link());

        assert_eq!(saved.weight, 1);
        assert_eq!(saved.item.as_deref().unwrap().hash.as_str(), "n1");
        assert_eq!(
            endpoint.members(&format!("{API}/objects/n1/likes")),
            [submissions[2].activity.link().to_string()]
        );
    }

    #[tokio::test]
    async fn repeating_a_vote_retracts_it() {
        let (endpoint, repository) = setup();
        endpoint.insert(note("n1", "bob", "2024-01-01T00:00:00Z"));
        let alice = logged("alice");

        repository.save_vote(vote(&alice, 1)).await.unwrap();
        let retraction = repository.save_vote(vote(&alice, 1)).await.unwrap();

        assert_eq!(kinds(&endpoint), [ObjectType::Like, ObjectType::Undo]);
        assert_eq!(retraction.weight, 0);
        assert!(retraction.metadata.original_iri.is_some());
        assert!(endpoint.members(&format!("{API}/objects/n1/likes")).is_empty());
    }

    #[tokio::test]
    async fn follow_requests_until_accepted() {
        let (endpoint, repository) = setup();
        let alice = logged("alice");
        let bob = logged("bob");

        let request = repository.follow_account(&bob, &alice, None).await.unwrap();
        assert_eq!(request.status, FollowStatus::Pending);
        assert_eq!(request.submitted_by.as_deref().unwrap().handle, "bob");

        let pending = repository
            .load_follow_requests(None, Some(&alice), Filters::new())
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].submitted_by.as_deref().unwrap().handle, "bob");

        let answered = repository
            .send_follow_response(&alice, &pending[0], true, None)
            .await
            .unwrap();
        assert_eq!(answered.status, FollowStatus::Accepted);
        assert_eq!(
            endpoint.members(&format!("{API}/actors/alice/followers")),
            [format!("{API}/actors/bob")]
        );

        let pending = repository
            .load_follow_requests(None, Some(&alice), Filters::new())
            .await
            .unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn only_the_followed_account_can_answer() {
        let (endpoint, repository) = setup();
        let alice = logged("alice");
        let bob = logged("bob");
        let request = repository.follow_account(&bob, &alice, None).await.unwrap();

        let err = repository
            .send_follow_response(&logged("carol"), &request, false, None)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(kinds(&endpoint), [ObjectType::Follow]);
    }

    #[tokio::test]
    async fn blocking_copies_known_creators() {
        let (endpoint, repository) = setup();
        let alice = logged("alice");
        let bob = Account {
            created_by: Some(Box::new(Account::from_iri(&format!("{API}/actors/admin")))),
            ..logged("bob")
        };
        let reason = Item {
            data: "spam".into(),
            mime_type: MimeType::Text,
            ..Item::default()
        };

        let op = repository.block_account(&alice, &bob, Some(&reason)).await.unwrap();

        let activity = &endpoint.submissions()[0].activity;
        assert_eq!(activity.kind, ObjectType::Block);
        assert_eq!(activity.content.as_deref(), Some("spam"));
        assert!(activity.cc.iter().any(|c| c.link() == format!("{API}/actors/admin")));
        assert_eq!(activity.object, Some(WireItem::iri(format!("{API}/actors/bob"))));

        assert_eq!(op.kind, ModerationKind::Block);
        assert_eq!(op.reason.as_deref(), Some("spam"));
        match &op.object {
            ModerationTarget::Account(target) => assert_eq!(target.handle, "bob"),
            other => panic!("unexpected target {other:?}"),
        }
    }

    #[tokio::test]
    async fn reporting_an_item_flags_it() {
        let (endpoint, repository) = setup();
        endpoint.insert(note("n1", "bob", "2024-01-01T00:00:00Z"));
        let alice = logged("alice");
        let item = repository
            .load_item(Some(&alice), &format!("{API}/objects/n1"))
            .await
            .unwrap();

        let op = repository.report_item(&alice, &item, None).await.unwrap();
        assert_eq!(op.kind, ModerationKind::Flag);
        assert!(matches!(&op.object, ModerationTarget::Item(i) if i.hash.as_str() == "n1"));

        let activity = &endpoint.submissions()[0].activity;
        assert_eq!(activity.kind, ObjectType::Flag);
        assert_eq!(activity.object, Some(WireItem::iri(format!("{API}/objects/n1"))));

        let flags = repository
            .load_activities(None, vec![Filters::new().with_types(ObjectType::MODERATIONS)])
            .await
            .unwrap();
        assert_eq!(flags.len(), 1);
    }

    #[tokio::test]
    async fn account_details_are_loaded() {
        let (endpoint, repository) = setup();
        endpoint.push(&format!("{API}/actors/alice/followers"), actor("bob"));
        endpoint.push(&format!("{API}/actors/alice/following"), actor("carol"));
        endpoint.push(
            &format!("{API}/actors/alice/outbox"),
            wire(json!({
                "id": format!("{API}/activities/b1"),
                "type": "Block",
                "actor": format!("{API}/actors/alice"),
                "object": format!("{API}/actors/carol"),
            })),
        );

        let mut alice = logged("alice");
        repository.load_account_details(&mut alice).await;

        let handles = |list: &[Account]| list.iter().map(|a| a.handle.clone()).collect::<Vec<_>>();
        assert_eq!(handles(&alice.followers), ["bob"]);
        assert_eq!(handles(&alice.following), ["carol"]);
        assert_eq!(handles(&alice.blocked), ["carol"]);
        assert!(alice.ignored.is_empty());
    }

    #[tokio::test]
    async fn account_details_survive_failures() {
        let (endpoint, repository) = setup();
        endpoint.fail(&format!("{API}/actors/alice/followers"), "unavailable");
        endpoint.push(&format!("{API}/actors/alice/following"), actor("carol"));

        let mut alice = logged("alice");
        repository.load_account_details(&mut alice).await;
        assert!(alice.followers.is_empty());
        assert_eq!(alice.following.len(), 1);
    }

    #[tokio::test]
    async fn outbox_votes_move_to_the_account() {
        let (endpoint, repository) = setup();
        let outbox = format!("{API}/actors/alice/outbox");
        endpoint.insert(note("n2", "bob", "2024-01-01T00:00:00Z"));
        endpoint.push(
            &outbox,
            wire(json!({
                "id": format!("{API}/activities/c1"),
                "type": "Create",
                "actor": format!("{API}/actors/alice"),
                "published": "2024-01-02T00:00:00Z",
                "object": note("n1", "alice", "2024-01-02T00:00:00Z"),
            })),
        );
        endpoint.push(
            &outbox,
            wire(json!({
                "id": format!("{API}/activities/l1"),
                "type": "Like",
                "actor": format!("{API}/actors/alice"),
                "object": format!("{API}/objects/n2"),
                "published": "2024-01-03T00:00:00Z",
            })),
        );

        let mut alice = logged("alice");
        let cursor = repository
            .load_account_with_details(None, &mut alice, vec![])
            .await
            .unwrap();
        assert_eq!(cursor.len(), 1);
        assert_eq!(cursor.total, 1);
        assert_eq!(cursor.items().next().unwrap().hash.as_str(), "n1");
        assert_eq!(alice.votes.len(), 1);
        assert_eq!(alice.votes[0].item_hash().map(Hash::as_str), Some("n2"));
    }

    #[tokio::test]
    async fn node_info_is_cached() {
        let (endpoint, repository) = setup();
        let mut service = WireObject::with_id(ObjectType::Service, API);
        service.name = Some("littr".into());
        endpoint.insert(service);

        assert_eq!(repository.load_info().await.unwrap().title, "littr");
        assert_eq!(repository.load_info().await.unwrap().url, BASE);
        assert_eq!(endpoint.requests(API), 1);
    }

    #[tokio::test]
    async fn operations_respect_the_deadline() {
        let endpoint = Arc::new(InMemoryTransport::new());
        endpoint.delay(&format!("{API}/objects"), Duration::from_secs(5));
        let repository = Repository::with_transport(
            ClientConfig {
                request_timeout_ms: 100,
                ..config()
            },
            endpoint,
        )
        .unwrap();

        let err = repository.load_items(None, vec![]).await.unwrap_err();
        assert!(matches!(err, SdkError::Timeout(_)));
        assert_eq!(err.status_code(), 504);
    }

    #[test]
    fn mention_handles() {
        assert_eq!(mention_handle("@bob").as_deref(), Some("bob"));
        assert_eq!(mention_handle("@bob@littr.example").as_deref(), Some("bob"));
        assert_eq!(mention_handle("@"), None);
    }
}
