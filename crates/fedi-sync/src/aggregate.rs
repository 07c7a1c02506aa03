//! Concurrent aggregation of collection walks.
//!
//! One [`PageCursor`] walk runs per filter set, all of them concurrently.
//! Each walk keeps its own results and hands them over in a single locked
//! merge when it finishes. The first failing walk fails the aggregation and
//! drops the others, so no partial result escapes.
//!
//! After the primary walks, secondary passes fill in what the pages only
//! referenced: items and actors behind bare links, authors, vote scores,
//! and moderation targets. Those passes are best effort. A failure becomes a
//! warning on the returned [`Cursor`] and the entity keeps its stub.

use std::time::Duration;

use fedi_protocol::{Codec, CompStr, Filters};
use fedi_types::{
    sort_by_date_desc, Account, CollectionKind, Cursor, Entity, EntityKind, FollowRequest, Hash,
    Item, ModerationOp, ModerationTarget, ObjectType, ReferenceKind, Vote, WireItem, WireObject,
};
use futures::future::try_join_all;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cursor::{PageCursor, Step, DEFAULT_PAGE_TIMEOUT};
use crate::error::{SyncError, SyncResult};
use crate::transport::RemoteTransport;
use crate::visibility::{valid_item, Viewer};

/// Hashes per account lookup filter.
pub const DEFAULT_AUTHOR_BATCH: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AggregateOptions {
    pub page_timeout: Duration,
    pub author_batch_size: usize,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            page_timeout: DEFAULT_PAGE_TIMEOUT,
            author_batch_size: DEFAULT_AUTHOR_BATCH,
        }
    }
}

/// A top-level activity and the entity it contributes to a feed.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Relation {
    activity: Hash,
    kind: EntityKind,
    target: Hash,
}

/// An object known only by its IRI, with the filter sets of the walks that
/// referenced it.
#[derive(Debug)]
struct Deferred {
    iri: String,
    filters: Vec<Filters>,
}

/// Results of one or more walks, split by entity kind.
#[derive(Debug, Default)]
struct Buckets {
    items: Vec<Item>,
    accounts: Vec<Account>,
    votes: Vec<Vote>,
    follows: Vec<FollowRequest>,
    moderations: Vec<ModerationOp>,
    relations: Vec<Relation>,
    deferred_items: Vec<Deferred>,
    deferred_actors: Vec<String>,
    warnings: Vec<String>,
}

impl Buckets {
    fn relate(&mut self, activity: &Hash, kind: EntityKind, target: &Hash) {
        if target.is_empty() || self.relations.iter().any(|r| r.kind == kind && r.target == *target) {
            return;
        }
        self.relations.push(Relation {
            activity: activity.clone(),
            kind,
            target: target.clone(),
        });
    }

    /// Remember a bare reference to fetch once the walks are done. Objects
    /// are later checked against the filters of the walk that found them.
    fn defer(&mut self, iri: &str, filters: &Filters) {
        match ReferenceKind::of(iri) {
            Some(ReferenceKind::Actor) => {
                if !self.deferred_actors.iter().any(|q| q == iri) {
                    self.deferred_actors.push(iri.to_string());
                }
            }
            Some(ReferenceKind::Object) => {
                match self.deferred_items.iter_mut().find(|d| d.iri == iri) {
                    Some(deferred) if !deferred.filters.contains(filters) => {
                        deferred.filters.push(filters.clone());
                    }
                    Some(_) => {}
                    None => self.deferred_items.push(Deferred {
                        iri: iri.to_string(),
                        filters: vec![filters.clone()],
                    }),
                }
            }
            _ => debug!(iri, "reference left unresolved"),
        }
    }

    fn skip(&mut self, member: &WireItem, error: &dyn std::fmt::Display) {
        debug!(iri = %member.link(), error = %error, "skipping undecodable member");
        self.warnings.push(format!("{}: {error}", member.link()));
    }

    fn entities(&self) -> Vec<Entity> {
        fn find<T: Clone>(list: &[T], hash: &Hash, key: fn(&T) -> &Hash) -> Option<T> {
            list.iter().find(|e| key(e) == hash).cloned()
        }
        self.relations
            .iter()
            .filter_map(|r| match r.kind {
                EntityKind::Item => find(&self.items, &r.target, |e| &e.hash).map(Entity::Item),
                EntityKind::Account => find(&self.accounts, &r.target, |e| &e.hash).map(Entity::Account),
                EntityKind::Vote => find(&self.votes, &r.target, |e| &e.hash).map(Entity::Vote),
                EntityKind::FollowRequest => {
                    find(&self.follows, &r.target, |e| &e.hash).map(Entity::FollowRequest)
                }
                EntityKind::Moderation => {
                    find(&self.moderations, &r.target, |e| &e.hash).map(Entity::Moderation)
                }
            })
            .collect()
    }

    /// Point votes and moderation operations at the full entities fetched.
    fn attach(&mut self) {
        for vote in &mut self.votes {
            let found = vote
                .item_hash()
                .and_then(|hash| self.items.iter().find(|i| i.hash == *hash));
            if let Some(item) = found {
                vote.item = Some(Box::new(item.clone()));
            }
        }
        for op in &mut self.moderations {
            if let Some(target) = resolved_target(&op.object, &self.items, &self.accounts) {
                op.object = target;
            }
        }
    }
}

/// Per-walk results folded into the shared output.
trait Gathered: Default {
    fn count(&self) -> usize;
    fn absorb(&mut self, other: Self);
}

impl<T> Gathered for Vec<T> {
    fn count(&self) -> usize {
        self.len()
    }

    fn absorb(&mut self, other: Self) {
        self.extend(other);
    }
}

impl Gathered for Buckets {
    fn count(&self) -> usize {
        self.relations.len()
    }

    fn absorb(&mut self, other: Self) {
        self.items.extend(other.items);
        self.accounts.extend(other.accounts);
        self.votes.extend(other.votes);
        self.follows.extend(other.follows);
        self.moderations.extend(other.moderations);
        for relation in other.relations {
            self.relate(&relation.activity, relation.kind, &relation.target);
        }
        for deferred in other.deferred_items {
            for filters in &deferred.filters {
                self.defer(&deferred.iri, filters);
            }
        }
        for iri in other.deferred_actors {
            if !self.deferred_actors.contains(&iri) {
                self.deferred_actors.push(iri);
            }
        }
        self.warnings.extend(other.warnings);
    }
}

#[derive(Debug, Default)]
struct Walked<A> {
    results: A,
    before: Option<String>,
    after: Option<String>,
}

/// Runs concurrent walks against one endpoint and assembles their results.
pub struct Aggregator<'a> {
    transport: &'a dyn RemoteTransport,
    codec: &'a Codec,
    viewer: Viewer<'a>,
    options: AggregateOptions,
}

impl<'a> Aggregator<'a> {
    pub fn new(transport: &'a dyn RemoteTransport, codec: &'a Codec, viewer: Viewer<'a>) -> Self {
        Self {
            transport,
            codec,
            viewer,
            options: AggregateOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AggregateOptions) -> Self {
        self.options = options;
        self
    }

    fn cursor(&self, iri: &str, filters: Filters) -> PageCursor {
        PageCursor::new(iri, filters).with_page_timeout(self.options.page_timeout)
    }

    /// Walk `iri` once per filter set, concurrently, merging what `collect`
    /// gathers from every member. A walk ends early once it gathered the
    /// filter's `max_items`.
    async fn fan_out<A, C>(&self, iri: &str, filters: Vec<Filters>, collect: C) -> SyncResult<Walked<A>>
    where
        A: Gathered,
        C: Fn(&WireItem, &Filters, &mut A),
    {
        let filters = if filters.is_empty() {
            vec![Filters::new()]
        } else {
            filters
        };
        let merged = Mutex::new(Walked::<A>::default());
        let merged_ref = &merged;
        let collect = &collect;

        let walks = filters.into_iter().map(|filter| async move {
            let limit = filter.max_items;
            let mut local = A::default();
            let mut cursor = self.cursor(iri, filter.clone());
            cursor
                .walk(self.transport, |page: &WireObject| {
                    for member in page.members() {
                        collect(member, &filter, &mut local);
                    }
                    let full = limit.is_some_and(|max| local.count() >= max);
                    Ok(if full { Step::Stop } else { Step::Continue })
                })
                .await?;

            let mut merged = merged_ref.lock().await;
            merged.results.absorb(local);
            if let Some(after) = &cursor.filters().next {
                merged.after = Some(after.clone());
            }
            if let Some(before) = &cursor.filters().prev {
                merged.before = Some(before.clone());
            }
            Ok::<(), SyncError>(())
        });
        try_join_all(walks).await?;
        Ok(merged.into_inner())
    }

    /// The heterogeneous, newest-first feed of an actor or service collection.
    pub async fn collection(&self, iri: &str, filters: Vec<Filters>) -> SyncResult<Cursor> {
        let walked = self
            .fan_out(iri, filters, |member, filters, found: &mut Buckets| {
                self.classify(member, filters, found)
            })
            .await?;
        let mut found = walked.results;

        if let Err(e) = self.fetch_deferred(&mut found).await {
            note(&mut found.warnings, "deferred references", &e);
        }
        if let Err(e) = self.resolve_item_authors(&mut found.items).await {
            note(&mut found.warnings, "item authors", &e);
        }
        if let Err(e) = self.resolve_item_votes(&mut found.items).await {
            note(&mut found.warnings, "item votes", &e);
        }
        if let Err(e) = self.resolve_follow_authors(&mut found.follows).await {
            note(&mut found.warnings, "follow authors", &e);
        }
        if let Err(e) = self.resolve_account_authors(&mut found.accounts).await {
            note(&mut found.warnings, "account authors", &e);
        }
        if let Err(e) = self.moderation_details(&mut found).await {
            note(&mut found.warnings, "moderation targets", &e);
        }
        found.attach();

        let mut items = found.entities();
        sort_by_date_desc(&mut items);
        Ok(Cursor {
            total: items.len(),
            items,
            before: walked.before,
            after: walked.after,
            warnings: found.warnings,
        })
    }

    fn classify(&self, member: &WireItem, filters: &Filters, found: &mut Buckets) {
        let Some(activity) = member.as_object() else {
            return;
        };
        let activity_hash = Hash::from_iri(activity.link());
        match activity.kind {
            ObjectType::Create => self.classify_create(member, activity, filters, found),
            ObjectType::Follow => match self.codec.decode_follow(member) {
                Ok(follow) => {
                    found.relate(&activity_hash, EntityKind::FollowRequest, &follow.hash);
                    found.follows.push(follow);
                }
                Err(e) => found.skip(member, &e),
            },
            ObjectType::Flag | ObjectType::Block | ObjectType::Ignore => {
                match self.codec.decode_moderation(member) {
                    Ok(op) => {
                        if let ModerationTarget::Unresolved(iri) = &op.object {
                            found.defer(iri, filters);
                        }
                        found.relate(&activity_hash, EntityKind::Moderation, &op.hash);
                        found.moderations.push(op);
                    }
                    Err(e) => found.skip(member, &e),
                }
            }
            ObjectType::Like | ObjectType::Dislike | ObjectType::Undo => {
                match self.codec.decode_vote(member) {
                    Ok(vote) => {
                        let by_reference = activity.object.as_ref().is_some_and(WireItem::is_link);
                        if by_reference && !vote.is_retraction() {
                            if let Some(iri) = vote.item.as_deref().and_then(Item::iri) {
                                found.defer(iri, filters);
                            }
                        }
                        found.relate(&activity_hash, EntityKind::Vote, &vote.hash);
                        found.votes.push(vote);
                    }
                    Err(e) => found.skip(member, &e),
                }
            }
            _ => {}
        }
    }

    fn classify_create(
        &self,
        member: &WireItem,
        activity: &WireObject,
        filters: &Filters,
        found: &mut Buckets,
    ) {
        let activity_hash = Hash::from_iri(activity.link());
        let Some(object) = activity.object.as_ref() else {
            return;
        };
        if object.is_link() {
            let iri = object.link();
            let kind = match ReferenceKind::of(iri) {
                Some(ReferenceKind::Actor) => EntityKind::Account,
                _ => EntityKind::Item,
            };
            found.defer(iri, filters);
            found.relate(&activity_hash, kind, &Hash::from_iri(iri));
            return;
        }
        match self.codec.decode_entity(member) {
            Ok(Entity::Item(item)) => {
                if valid_item(&item, filters, &self.viewer) {
                    found.relate(&activity_hash, EntityKind::Item, &item.hash);
                    found.items.push(item);
                }
            }
            Ok(Entity::Account(account)) => {
                found.relate(&activity_hash, EntityKind::Account, &account.hash);
                found.accounts.push(account);
            }
            Ok(_) => {}
            Err(e) => found.skip(member, &e),
        }
    }

    async fn fetch_deferred(&self, found: &mut Buckets) -> SyncResult<()> {
        if !found.deferred_items.is_empty() {
            let iris: Vec<String> = found.deferred_items.iter().map(|d| d.iri.clone()).collect();
            for item in self.objects_by_iri(&iris).await? {
                let admitted = found
                    .deferred_items
                    .iter()
                    .filter(|d| Hash::from_iri(&d.iri) == item.hash)
                    .flat_map(|d| d.filters.iter())
                    .any(|f| valid_item(&item, f, &self.viewer));
                if admitted && !found.items.iter().any(|i| i.hash == item.hash) {
                    found.items.push(item);
                }
            }
        }
        if !found.deferred_actors.is_empty() {
            let hashes: Vec<Hash> = found.deferred_actors.iter().map(|iri| Hash::from_iri(iri)).collect();
            for account in self.accounts_by_hash(&hashes).await? {
                if !found.accounts.iter().any(|a| a.hash == account.hash) {
                    found.accounts.push(account);
                }
            }
        }
        Ok(())
    }

    /// Resolve moderation submitters and any target still only referenced.
    async fn moderation_details(&self, found: &mut Buckets) -> SyncResult<()> {
        let mut hashes = Vec::new();
        let mut object_iris = Vec::new();
        for op in &found.moderations {
            if let Some(submitter) = op.submitted_by.as_deref().filter(|a| unresolved(a)) {
                push_unique(&mut hashes, submitter.hash.clone());
            }
            if resolved_target(&op.object, &found.items, &found.accounts).is_some() {
                continue;
            }
            match &op.object {
                ModerationTarget::Unresolved(iri) => match ReferenceKind::of(iri) {
                    Some(ReferenceKind::Object) => push_unique(&mut object_iris, iri.clone()),
                    Some(ReferenceKind::Actor) => push_unique(&mut hashes, op.object.hash()),
                    _ => {}
                },
                ModerationTarget::Account(account) if unresolved(account) => {
                    push_unique(&mut hashes, account.hash.clone());
                }
                _ => {}
            }
        }
        if !object_iris.is_empty() {
            found.items.extend(self.objects_by_iri(&object_iris).await?);
        }
        if !hashes.is_empty() {
            let accounts = self.accounts_by_hash(&hashes).await?;
            for op in &mut found.moderations {
                if let Some(submitter) = op.submitted_by.as_deref_mut() {
                    back_fill(submitter, &accounts);
                }
            }
            found.accounts.extend(accounts);
        }
        Ok(())
    }

    /// Actors matching any of the filter sets.
    pub async fn accounts(&self, filters: Vec<Filters>) -> SyncResult<Vec<Account>> {
        let iri = self.codec.urls().actors();
        let walked = self
            .fan_out(&iri, filters, |member, _, found: &mut Vec<Account>| {
                if !member.kind().is_some_and(ObjectType::is_actor) {
                    return;
                }
                match self.codec.decode_account(member) {
                    Ok(account) => found.push(account),
                    Err(e) => debug!(iri = %member.link(), error = %e, "skipping actor"),
                }
            })
            .await?;
        Ok(dedup_by_hash(walked.results, |a| &a.hash))
    }

    /// Objects matching any of the filter sets.
    pub async fn objects(&self, filters: Vec<Filters>) -> SyncResult<Vec<Item>> {
        let iri = self.codec.urls().objects();
        let walked = self
            .fan_out(&iri, filters, |member, _, found: &mut Vec<Item>| {
                let wanted = member
                    .kind()
                    .is_some_and(|k| k.is_item() || k == ObjectType::Tombstone);
                if !wanted {
                    return;
                }
                match self.codec.decode_item(member) {
                    Ok(item) => found.push(item),
                    Err(e) => debug!(iri = %member.link(), error = %e, "skipping object"),
                }
            })
            .await?;
        Ok(dedup_by_hash(walked.results, |i| &i.hash))
    }

    /// Every member of one collection decoded into its entity, undecodable
    /// members skipped.
    pub async fn entities(&self, iri: &str, filters: Filters) -> SyncResult<Vec<Entity>> {
        let walked = self
            .fan_out(iri, vec![filters], |member, _, found: &mut Vec<Entity>| {
                match self.codec.decode_entity(member) {
                    Ok(entity) => found.push(entity),
                    Err(e) => debug!(iri = %member.link(), error = %e, "skipping member"),
                }
            })
            .await?;
        Ok(walked.results)
    }

    /// Appreciations in one collection.
    pub async fn votes(&self, iri: &str, filters: Filters) -> SyncResult<Vec<Vote>> {
        let walked = self
            .fan_out(iri, vec![filters], |member, _, found: &mut Vec<Vote>| {
                if let Ok(vote) = self.codec.decode_vote(member) {
                    found.push(vote);
                }
            })
            .await?;
        Ok(dedup_by_hash(walked.results, |v| &v.hash))
    }

    /// One lookup per batch of hashes, all batches concurrently.
    async fn accounts_by_hash(&self, hashes: &[Hash]) -> SyncResult<Vec<Account>> {
        let filters = hashes
            .chunks(self.options.author_batch_size.max(1))
            .map(|batch| {
                let mut filter = Filters::new().with_types(ObjectType::ACTORS);
                filter.iri = batch.iter().map(|h| CompStr::like(h.as_str())).collect();
                filter
            })
            .collect();
        self.accounts(filters).await
    }

    async fn objects_by_iri(&self, iris: &[String]) -> SyncResult<Vec<Item>> {
        let filters = iris
            .chunks(self.options.author_batch_size.max(1))
            .map(|batch| Filters {
                iri: batch.iter().map(|iri| CompStr::equals(iri.as_str())).collect(),
                ..Filters::default()
            })
            .collect();
        self.objects(filters).await
    }

    /// Complete accounts that are only references.
    pub async fn resolve_accounts(&self, accounts: &mut [Account]) -> SyncResult<()> {
        let mut hashes = Vec::new();
        for account in accounts.iter().filter(|a| unresolved(a)) {
            push_unique(&mut hashes, account.hash.clone());
        }
        if hashes.is_empty() {
            return Ok(());
        }
        let found = self.accounts_by_hash(&hashes).await?;
        for account in accounts.iter_mut() {
            back_fill(account, &found);
        }
        Ok(())
    }

    /// Back-fill authors and recipients that are only references.
    pub async fn resolve_item_authors(&self, items: &mut [Item]) -> SyncResult<()> {
        let mut hashes = Vec::new();
        for item in items.iter_mut() {
            for account in item_accounts(item) {
                if unresolved(account) {
                    push_unique(&mut hashes, account.hash.clone());
                }
            }
        }
        if hashes.is_empty() {
            return Ok(());
        }
        let accounts = self.accounts_by_hash(&hashes).await?;
        for item in items.iter_mut() {
            for account in item_accounts(item) {
                back_fill(account, &accounts);
            }
        }
        Ok(())
    }

    /// Sum the appreciations each item received into its score.
    pub async fn resolve_item_votes(&self, items: &mut [Item]) -> SyncResult<()> {
        let mut hashes = Vec::new();
        for item in items.iter().filter(|i| i.is_valid()) {
            push_unique(&mut hashes, item.hash.clone());
        }
        if hashes.is_empty() {
            return Ok(());
        }
        let object = Filters {
            iri: hashes.iter().map(|h| CompStr::like(h.as_str())).collect(),
            ..Filters::default()
        };
        let filters = Filters::new()
            .with_types(ObjectType::APPRECIATIONS)
            .with_object(object);
        let votes = self.votes(&self.codec.urls().inbox(), filters).await?;
        for item in items.iter_mut() {
            item.score = votes
                .iter()
                .filter(|v| v.item_hash() == Some(&item.hash))
                .map(|v| v.weight)
                .sum();
        }
        Ok(())
    }

    /// Attach to each account the appreciations it expressed.
    pub async fn resolve_account_votes(&self, accounts: &mut [Account]) -> SyncResult<()> {
        let iris: Vec<&str> = accounts.iter().filter_map(Account::iri).collect();
        if iris.is_empty() {
            return Ok(());
        }
        let actor = Filters {
            iri: iris.iter().map(|iri| CompStr::equals(*iri)).collect(),
            ..Filters::default()
        };
        let filters = Filters::new()
            .with_types(ObjectType::APPRECIATIONS)
            .with_actor(actor);
        let votes = self.votes(&self.codec.urls().inbox(), filters).await?;
        for account in accounts.iter_mut() {
            account.votes = votes
                .iter()
                .filter(|v| v.submitted_by.as_deref().is_some_and(|by| by.same_as(account)))
                .cloned()
                .collect();
        }
        Ok(())
    }

    pub async fn resolve_follow_authors(&self, follows: &mut [FollowRequest]) -> SyncResult<()> {
        let mut hashes = Vec::new();
        for follow in follows.iter() {
            for account in [&follow.submitted_by, &follow.object].into_iter().flatten() {
                if unresolved(account) {
                    push_unique(&mut hashes, account.hash.clone());
                }
            }
        }
        if hashes.is_empty() {
            return Ok(());
        }
        let accounts = self.accounts_by_hash(&hashes).await?;
        for follow in follows.iter_mut() {
            for slot in [&mut follow.submitted_by, &mut follow.object] {
                if let Some(account) = slot.as_deref_mut() {
                    back_fill(account, &accounts);
                }
            }
        }
        Ok(())
    }

    /// Resolve account creators; creators that cannot be found are taken to
    /// be the service itself.
    pub async fn resolve_account_authors(&self, accounts: &mut [Account]) -> SyncResult<()> {
        let mut hashes = Vec::new();
        for account in accounts.iter() {
            if let Some(creator) = account.created_by.as_deref().filter(|c| unresolved(c)) {
                push_unique(&mut hashes, creator.hash.clone());
            }
        }
        if hashes.is_empty() {
            return Ok(());
        }
        let creators = self.accounts_by_hash(&hashes).await?;
        for account in accounts.iter_mut() {
            if let Some(creator) = account.created_by.as_deref_mut() {
                back_fill(creator, &creators);
                if unresolved(creator) {
                    *creator = Account::system();
                }
            }
        }
        Ok(())
    }
}

fn note(warnings: &mut Vec<String>, pass: &str, error: &SyncError) {
    warn!(pass, error = %error, "secondary pass failed");
    warnings.push(format!("{pass}: {error}"));
}

/// A bare reference to a real account that a lookup could complete.
fn unresolved(account: &Account) -> bool {
    account.is_valid()
        && !account.is_anonymous()
        && !account.is_system()
        && account.handle.is_empty()
        && !account.iri().is_some_and(|iri| CollectionKind::of(iri).is_some())
}

fn back_fill(account: &mut Account, known: &[Account]) {
    if !unresolved(account) {
        return;
    }
    if let Some(found) = known.iter().find(|k| k.same_as(account)) {
        *account = found.clone();
    }
}

fn item_accounts(item: &mut Item) -> impl Iterator<Item = &mut Account> + '_ {
    item.submitted_by
        .iter_mut()
        .chain(item.updated_by.iter_mut())
        .map(|b| &mut **b)
        .chain(item.metadata.to.iter_mut())
        .chain(item.metadata.cc.iter_mut())
}

fn resolved_target(
    target: &ModerationTarget,
    items: &[Item],
    accounts: &[Account],
) -> Option<ModerationTarget> {
    let hash = target.hash();
    match target {
        ModerationTarget::Unresolved(iri) => match ReferenceKind::of(iri) {
            Some(ReferenceKind::Actor) => accounts
                .iter()
                .find(|a| a.hash == hash)
                .map(|a| ModerationTarget::Account(Box::new(a.clone()))),
            Some(ReferenceKind::Object) => items
                .iter()
                .find(|i| i.hash == hash)
                .map(|i| ModerationTarget::Item(Box::new(i.clone()))),
            _ => None,
        },
        ModerationTarget::Account(account) if unresolved(account) => accounts
            .iter()
            .find(|a| a.hash == hash)
            .map(|a| ModerationTarget::Account(Box::new(a.clone()))),
        _ => None,
    }
}

fn push_unique<T: PartialEq>(list: &mut Vec<T>, value: T) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn dedup_by_hash<T>(list: Vec<T>, key: fn(&T) -> &Hash) -> Vec<T> {
    let mut unique: Vec<T> = Vec::with_capacity(list.len());
    for entry in list {
        if !unique.iter().any(|u| key(u) == key(&entry)) {
            unique.push(entry);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryTransport;
    use async_trait::async_trait;
    use fedi_crypto::RequestSigner;
    use fedi_protocol::NIL_IRI;
    use fedi_types::{ModerationKind, ServiceUrls, PUBLIC_NS};
    use serde_json::json;

    const API: &str = "https://fedbox.example";
    const BASE: &str = "https://littr.example";

    fn codec() -> Codec {
        Codec::new(ServiceUrls::new(API, BASE).unwrap())
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

    fn seeded() -> InMemoryTransport {
        let endpoint = InMemoryTransport::new();
        for handle in ["alice", "bob", "carol"] {
            endpoint.insert(actor(handle));
        }
        endpoint
    }

    #[tokio::test]
    async fn deferred_vote_target_is_fetched_and_scored() {
        let endpoint = seeded();
        let outbox = format!("{API}/actors/alice/outbox");
        endpoint.insert(note("n2", "bob", "2024-01-01T00:00:00Z"));
        endpoint.push(
            &outbox,
            wire(json!({
                "id": format!("{API}/activities/c1"),
                "type": "Create",
                "actor": format!("{API}/actors/alice"),
                "to": [PUBLIC_NS],
                "published": "2024-01-02T00:00:00Z",
                "object": note("n1", "alice", "2024-01-02T00:00:00Z"),
            })),
        );
        let like = wire(json!({
            "id": format!("{API}/activities/l1"),
            "type": "Like",
            "actor": format!("{API}/actors/alice"),
            "object": format!("{API}/objects/n2"),
            "published": "2024-01-03T00:00:00Z",
        }));
        endpoint.push(&outbox, like.clone());
        endpoint.push(&format!("{API}/inbox"), like);

        let codec = codec();
        let aggregator = Aggregator::new(&endpoint, &codec, Viewer::anonymous(BASE));
        let cursor = aggregator.collection(&outbox, vec![Filters::new()]).await.unwrap();

        assert!(cursor.warnings.is_empty(), "{:?}", cursor.warnings);
        assert_eq!(cursor.len(), 2);
        let Entity::Vote(vote) = &cursor.items[0] else {
            panic!("expected the newest entry to be the vote");
        };
        let voted = vote.item.as_deref().unwrap();
        assert_eq!(voted.hash.as_str(), "n2");
        assert_eq!(voted.score, 1);
        assert_eq!(voted.author().unwrap().handle, "bob");

        let item = cursor.items().next().unwrap();
        assert_eq!(item.hash.as_str(), "n1");
        assert_eq!(item.author().unwrap().handle, "alice");
    }

    #[tokio::test]
    async fn deferred_federated_items_follow_the_walk_filters() {
        let endpoint = seeded();
        let outbox = format!("{API}/actors/alice/outbox");
        endpoint.insert(wire(json!({
            "id": format!("{API}/objects/fed1"),
            "type": "Note",
            "content": "note fed1",
            "attributedTo": format!("{API}/actors/bob"),
            "generator": "https://elsewhere.example",
            "to": [PUBLIC_NS],
            "published": "2024-01-01T00:00:00Z",
        })));
        let like = wire(json!({
            "id": format!("{API}/activities/l1"),
            "type": "Like",
            "actor": format!("{API}/actors/alice"),
            "object": format!("{API}/objects/fed1"),
            "published": "2024-01-03T00:00:00Z",
        }));
        endpoint.push(&outbox, like.clone());
        endpoint.push(&format!("{API}/inbox"), like);

        let codec = codec();
        let aggregator = Aggregator::new(&endpoint, &codec, Viewer::anonymous(BASE));
        let voted = |cursor: &Cursor| match cursor.items.first() {
            Some(Entity::Vote(vote)) => vote.item.as_deref().cloned().unwrap(),
            other => panic!("expected a vote, got {other:?}"),
        };

        let mut federated = Filters::new();
        federated.generator.push(CompStr::equals(NIL_IRI));
        let cursor = aggregator.collection(&outbox, vec![federated]).await.unwrap();
        let item = voted(&cursor);
        assert_eq!(item.data, "note fed1");
        assert_eq!(item.generator.as_deref(), Some("https://elsewhere.example"));
        assert_eq!(item.score, 1);

        let cursor = aggregator.collection(&outbox, vec![Filters::new()]).await.unwrap();
        let item = voted(&cursor);
        assert_eq!(item.hash.as_str(), "fed1");
        assert!(item.data.is_empty());
    }

    /// Fails any walk whose filter asks for the name `bad`.
    struct Flaky(InMemoryTransport);

    #[async_trait]
    impl RemoteTransport for Flaky {
        async fn collection(&self, iri: &str, filters: &Filters) -> SyncResult<WireObject> {
            if filters.name.iter().any(|n| n.value == "bad") {
                return Err(SyncError::Transport("connection refused".into()));
            }
            self.0.collection(iri, filters).await
        }

        async fn fetch(&self, iri: &str) -> SyncResult<WireItem> {
            self.0.fetch(iri).await
        }

        async fn submit(
            &self,
            outbox: &str,
            activity: &WireObject,
            signer: &RequestSigner,
        ) -> SyncResult<WireItem> {
            self.0.submit(outbox, activity, signer).await
        }
    }

    #[tokio::test]
    async fn one_failing_walk_fails_the_aggregation() {
        let endpoint = Flaky(seeded());
        let codec = codec();
        let aggregator = Aggregator::new(&endpoint, &codec, Viewer::anonymous(BASE));

        let ok = aggregator
            .accounts(vec![Filters::new().with_name("alice"), Filters::new().with_name("bob")])
            .await
            .unwrap();
        assert_eq!(ok.len(), 2);

        let err = aggregator
            .accounts(vec![Filters::new().with_name("alice"), Filters::new().with_name("bad")])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));
    }

    #[tokio::test]
    async fn authors_resolve_in_batches() {
        let endpoint = seeded();
        endpoint.insert(note("n1", "alice", "2024-01-01T00:00:00Z"));
        endpoint.insert(note("n2", "bob", "2024-01-02T00:00:00Z"));
        endpoint.insert(note("n3", "carol", "2024-01-03T00:00:00Z"));
        let codec = codec();
        let aggregator = Aggregator::new(&endpoint, &codec, Viewer::anonymous(BASE)).with_options(
            AggregateOptions {
                author_batch_size: 2,
                ..AggregateOptions::default()
            },
        );

        let mut items = aggregator.objects(vec![Filters::new()]).await.unwrap();
        assert_eq!(items.len(), 3);
        aggregator.resolve_item_authors(&mut items).await.unwrap();

        assert_eq!(endpoint.requests(&format!("{API}/actors")), 2);
        let mut handles: Vec<_> = items.iter().map(|i| i.author().unwrap().handle.clone()).collect();
        handles.sort();
        assert_eq!(handles, ["alice", "bob", "carol"]);
    }

    fn flag_bob() -> WireObject {
        wire(json!({
            "id": format!("{API}/activities/f1"),
            "type": "Flag",
            "actor": format!("{API}/actors/alice"),
            "object": format!("{API}/actors/bob"),
            "content": "spam",
            "published": "2024-02-01T00:00:00Z",
        }))
    }

    #[tokio::test]
    async fn moderation_targets_are_resolved() {
        let endpoint = seeded();
        endpoint.insert(flag_bob());
        let codec = codec();
        let aggregator = Aggregator::new(&endpoint, &codec, Viewer::anonymous(BASE));
        let cursor = aggregator
            .collection(
                &format!("{API}/activities"),
                vec![Filters::new().with_types(ObjectType::MODERATIONS)],
            )
            .await
            .unwrap();

        let Entity::Moderation(op) = &cursor.items[0] else {
            panic!("expected a moderation op");
        };
        assert_eq!(op.kind, ModerationKind::Flag);
        assert_eq!(op.reason.as_deref(), Some("spam"));
        match &op.object {
            ModerationTarget::Account(target) => assert_eq!(target.handle, "bob"),
            other => panic!("target not resolved: {other:?}"),
        }
        assert_eq!(op.submitted_by.as_deref().unwrap().handle, "alice");
    }

    #[tokio::test]
    async fn failed_secondary_pass_is_a_warning() {
        let endpoint = seeded();
        endpoint.insert(flag_bob());
        endpoint.fail(&format!("{API}/actors"), "actors unavailable");
        let codec = codec();
        let aggregator = Aggregator::new(&endpoint, &codec, Viewer::anonymous(BASE));
        let cursor = aggregator
            .collection(&format!("{API}/activities"), vec![Filters::new()])
            .await
            .unwrap();

        assert_eq!(cursor.len(), 1);
        assert!(!cursor.warnings.is_empty());
        let Entity::Moderation(op) = &cursor.items[0] else {
            panic!("expected a moderation op");
        };
        assert!(!op.object.is_resolved());
    }

    #[tokio::test]
    async fn private_items_are_dropped_for_strangers() {
        let endpoint = seeded();
        let outbox = format!("{API}/actors/alice/outbox");
        endpoint.push(
            &outbox,
            wire(json!({
                "id": format!("{API}/activities/c9"),
                "type": "Create",
                "actor": format!("{API}/actors/alice"),
                "to": [format!("{API}/actors/bob")],
                "object": {
                    "id": format!("{API}/objects/secret"),
                    "type": "Note",
                    "content": "psst",
                    "to": [format!("{API}/actors/bob")],
                },
            })),
        );
        let codec = codec();

        let stranger = Aggregator::new(&endpoint, &codec, Viewer::anonymous(BASE));
        assert!(stranger.collection(&outbox, vec![]).await.unwrap().is_empty());

        let bob = Account {
            hash: Hash::new("bob"),
            handle: "bob".into(),
            ..Account::default()
        };
        let recipient = Aggregator::new(&endpoint, &codec, Viewer::new(Some(&bob), BASE));
        assert_eq!(recipient.collection(&outbox, vec![]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn feed_is_newest_first_across_kinds() {
        let endpoint = seeded();
        let activities = format!("{API}/activities");
        endpoint.insert(flag_bob());
        endpoint.insert(wire(json!({
            "id": format!("{API}/activities/fo1"),
            "type": "Follow",
            "actor": format!("{API}/actors/carol"),
            "object": format!("{API}/actors/alice"),
            "published": "2024-03-01T00:00:00Z",
        })));
        endpoint.insert(wire(json!({
            "id": format!("{API}/activities/c1"),
            "type": "Create",
            "actor": format!("{API}/actors/bob"),
            "published": "2024-01-01T00:00:00Z",
            "object": note("n1", "bob", "2024-01-01T00:00:00Z"),
        })));
        let codec = codec();
        let aggregator = Aggregator::new(&endpoint, &codec, Viewer::anonymous(BASE));
        let cursor = aggregator.collection(&activities, vec![]).await.unwrap();

        let kinds: Vec<EntityKind> = cursor.items.iter().map(Entity::kind).collect();
        assert_eq!(
            kinds,
            [EntityKind::FollowRequest, EntityKind::Moderation, EntityKind::Item]
        );
        let Entity::FollowRequest(follow) = &cursor.items[0] else {
            unreachable!()
        };
        assert_eq!(follow.submitted_by.as_deref().unwrap().handle, "carol");
    }
}
