use std::collections::HashSet;
use std::sync::Arc;

use fedi_types::{
    Account, ActivityMetadata, CollectionKind, Entity, FollowRequest, FollowStatus, Hash,
    ImageMetadata, Item, MimeType, ModerationKind, ModerationOp, ModerationTarget, ObjectType,
    ReferenceKind, Tag, TagKind, Visibility, Vote, VoteMetadata, WireItem, WireObject, PUBLIC_NS,
};
use fedi_types::hash::ANONYMOUS_HASH;
use fedi_types::urls::host_of;
use tracing::debug;

use crate::codec::Codec;
use crate::error::{ProtocolError, ProtocolResult};

/// Deepest reply chain the decoder follows before giving up.
pub const MAX_REPLY_DEPTH: usize = 64;

type DecodeFn = fn(&Codec, &WireItem) -> ProtocolResult<Entity>;

/// Which decoder handles which wire type.
static ENTITY_DECODERS: &[(ObjectType, DecodeFn)] = &[
    (ObjectType::Create, content_entity as DecodeFn),
    (ObjectType::Update, content_entity as DecodeFn),
    (ObjectType::Delete, content_entity as DecodeFn),
    (ObjectType::Like, vote_entity as DecodeFn),
    (ObjectType::Dislike, vote_entity as DecodeFn),
    (ObjectType::Undo, vote_entity as DecodeFn),
    (ObjectType::Follow, follow_entity as DecodeFn),
    (ObjectType::Accept, follow_entity as DecodeFn),
    (ObjectType::Reject, follow_entity as DecodeFn),
    (ObjectType::Flag, moderation_entity as DecodeFn),
    (ObjectType::Block, moderation_entity as DecodeFn),
    (ObjectType::Ignore, moderation_entity as DecodeFn),
    (ObjectType::Article, item_entity as DecodeFn),
    (ObjectType::Note, item_entity as DecodeFn),
    (ObjectType::Page, item_entity as DecodeFn),
    (ObjectType::Document, item_entity as DecodeFn),
    (ObjectType::Image, item_entity as DecodeFn),
    (ObjectType::Video, item_entity as DecodeFn),
    (ObjectType::Audio, item_entity as DecodeFn),
    (ObjectType::Tombstone, tombstone_entity as DecodeFn),
    (ObjectType::Person, account_entity as DecodeFn),
    (ObjectType::Service, account_entity as DecodeFn),
    (ObjectType::Group, account_entity as DecodeFn),
    (ObjectType::Application, account_entity as DecodeFn),
    (ObjectType::Organization, account_entity as DecodeFn),
];

fn item_entity(codec: &Codec, wire: &WireItem) -> ProtocolResult<Entity> {
    codec.decode_item(wire).map(Entity::Item)
}

fn account_entity(codec: &Codec, wire: &WireItem) -> ProtocolResult<Entity> {
    codec.decode_account(wire).map(Entity::Account)
}

fn vote_entity(codec: &Codec, wire: &WireItem) -> ProtocolResult<Entity> {
    codec.decode_vote(wire).map(Entity::Vote)
}

fn follow_entity(codec: &Codec, wire: &WireItem) -> ProtocolResult<Entity> {
    codec.decode_follow(wire).map(Entity::FollowRequest)
}

fn moderation_entity(codec: &Codec, wire: &WireItem) -> ProtocolResult<Entity> {
    codec.decode_moderation(wire).map(Entity::Moderation)
}

fn tombstone_entity(codec: &Codec, wire: &WireItem) -> ProtocolResult<Entity> {
    let former = wire.as_object().and_then(|o| o.former_type);
    if former.is_some_and(ObjectType::is_actor) {
        account_entity(codec, wire)
    } else {
        item_entity(codec, wire)
    }
}

/// Create, Update and Delete wrap either an item or an actor.
fn content_entity(codec: &Codec, wire: &WireItem) -> ProtocolResult<Entity> {
    let wraps_actor = wire
        .as_object()
        .and_then(|activity| activity.object.as_ref())
        .and_then(WireItem::as_object)
        .is_some_and(|o| o.kind.is_actor() || o.former_type.is_some_and(ObjectType::is_actor));
    if wraps_actor {
        account_entity(codec, wire)
    } else {
        item_entity(codec, wire)
    }
}

impl Codec {
    /// Decode any wire value into the matching domain entity.
    pub fn decode_entity(&self, wire: &WireItem) -> ProtocolResult<Entity> {
        let object = match wire {
            WireItem::Object(object) if !wire.is_link() => object,
            _ => {
                let link = wire.link();
                return Ok(match ReferenceKind::of(link) {
                    Some(ReferenceKind::Actor) => Entity::Account(self.decode_account(wire)?),
                    _ => Entity::Item(self.decode_item(wire)?),
                });
            }
        };
        let decoder = ENTITY_DECODERS
            .iter()
            .find(|(kind, _)| *kind == object.kind)
            .map(|(_, decoder)| *decoder)
            .ok_or_else(|| ProtocolError::UnsupportedType(object.kind.as_str().to_string()))?;
        decoder(self, wire)
    }

    // ----- accounts -----

    pub fn decode_account(&self, wire: &WireItem) -> ProtocolResult<Account> {
        let mut account = match wire {
            WireItem::Link(iri) => self.account_ref(iri),
            WireItem::Object(object) => match object.kind {
                ObjectType::Link | ObjectType::Mention => self.account_ref(object.link()),
                ObjectType::Create | ObjectType::Update | ObjectType::Delete => {
                    return self.account_from_activity(object);
                }
                ObjectType::Tombstone => self.account_from_object(object, true),
                kind if kind.is_actor() => self.account_from_object(object, true),
                kind => {
                    return Err(ProtocolError::decode(
                        "account",
                        format!("invalid actor type {}", kind.as_str()),
                    ))
                }
            },
        };
        account.wire = Some(Arc::new(wire.clone()));
        Ok(account)
    }

    fn account_from_activity(&self, activity: &WireObject) -> ProtocolResult<Account> {
        let target = activity
            .object
            .as_ref()
            .filter(|o| o.as_object().is_some_and(|o| o.kind.is_actor() || o.kind == ObjectType::Tombstone));
        let mut account = match (target, activity.actor.as_ref()) {
            (Some(object), _) => self.decode_account(object)?,
            (None, Some(actor)) => self.decode_account(actor)?,
            (None, None) => return Err(ProtocolError::decode("account", "activity has no actor")),
        };
        if activity.kind == ObjectType::Delete {
            account.deleted = true;
            account.handle = ANONYMOUS_HASH.to_string();
        }
        Ok(account)
    }

    /// Stub account for a bare reference, recognizing the two sentinels.
    fn account_ref(&self, iri: &str) -> Account {
        let mut account = if iri == PUBLIC_NS {
            Account::anonymous()
        } else if iri.trim_end_matches('/') == self.urls().api_url {
            Account::system()
        } else {
            Account {
                hash: Hash::from_iri(iri),
                federated: !iri.is_empty() && !self.urls().is_local(iri),
                ..Account::default()
            }
        };
        account.metadata.id = Some(iri.to_string()).filter(|id| !id.is_empty());
        account
    }

    fn account_from_object(&self, object: &WireObject, follow_creator: bool) -> Account {
        let id = object.link();
        let name = object.name.clone().unwrap_or_default();
        let mut account = Account {
            hash: Hash::from_iri(id),
            handle: object
                .preferred_username
                .clone()
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| name.clone()),
            created_at: object.published,
            updated_at: object.updated,
            ..Account::default()
        };

        let meta = &mut account.metadata;
        if !id.is_empty() {
            meta.id = Some(id.to_string());
            meta.url = object
                .url
                .as_ref()
                .map(|u| u.link().to_string())
                .filter(|u| !u.is_empty() && u != id);
            account.federated = !self.urls().is_local(id);
            if account.federated && !name.is_empty() {
                meta.name = Some(name);
            }
        }
        meta.blurb = object.summary.clone().filter(|s| !s.is_empty());
        meta.icon = object.icon.as_ref().and_then(image_metadata);
        meta.inbox = link_of(&object.inbox);
        meta.outbox = link_of(&object.outbox);
        meta.followers = link_of(&object.followers);
        meta.following = link_of(&object.following);
        meta.liked = link_of(&object.liked);
        meta.public_key_pem = object
            .public_key
            .as_ref()
            .map(|k| k.public_key_pem.clone())
            .filter(|pem| !pem.is_empty());
        if let Some(endpoints) = &object.endpoints {
            meta.authorization_endpoint = endpoints.oauth_authorization_endpoint.clone();
            meta.token_endpoint = endpoints.oauth_token_endpoint.clone();
        }
        if let Some(host) = meta.url.as_deref().and_then(host_of) {
            account.email = format!("{}@{}", account.handle, host);
        }

        if let Some(creator) = &object.attributed_to {
            let created_by = match creator.as_object() {
                Some(o) if follow_creator && o.kind.is_actor() => self.account_from_object(o, false),
                _ => self.account_ref(creator.link()),
            };
            account.created_by = Some(Box::new(created_by));
        }
        if object.kind == ObjectType::Tombstone {
            account.deleted = true;
            account.handle = ANONYMOUS_HASH.to_string();
            account.updated_at = object.deleted.or(account.updated_at);
        }
        account
    }

    /// Lenient author decode: anything unreadable becomes a bare reference.
    fn author_of(&self, wire: &WireItem) -> Account {
        match self.decode_account(wire) {
            Ok(account) => account,
            Err(e) => {
                debug!(iri = %wire.link(), error = %e, "author kept as reference");
                self.account_ref(wire.link())
            }
        }
    }

    // ----- items -----

    pub fn decode_item(&self, wire: &WireItem) -> ProtocolResult<Item> {
        let mut item = self.item_inner(wire, true)?;
        if item.wire.is_none() {
            item.wire = Some(Arc::new(wire.clone()));
        }
        Ok(item)
    }

    /// Decode an item; `with_chain` controls whether reply ancestors are followed.
    fn item_inner(&self, wire: &WireItem, with_chain: bool) -> ProtocolResult<Item> {
        let object = match wire {
            WireItem::Object(object) if !wire.is_link() => object,
            _ => return Ok(Item::from_iri(wire.link())),
        };
        match object.kind {
            ObjectType::Create | ObjectType::Update => self.item_from_activity(object, with_chain),
            ObjectType::Delete => {
                let target = object
                    .object
                    .as_ref()
                    .ok_or_else(|| ProtocolError::decode("item", "delete without object"))?;
                let mut item = self.item_inner(target, with_chain)?;
                item.mark_deleted();
                item.updated_at = object.published.or(object.updated).or(item.updated_at);
                Ok(item)
            }
            ObjectType::Tombstone => self.item_from_tombstone(object, with_chain),
            kind if kind.is_item() => self.item_from_object(object, with_chain),
            kind => Err(ProtocolError::UnsupportedType(kind.as_str().to_string())),
        }
    }

    fn item_from_activity(&self, activity: &WireObject, with_chain: bool) -> ProtocolResult<Item> {
        let target = activity
            .object
            .as_ref()
            .ok_or_else(|| ProtocolError::decode("item", "activity without object"))?;
        let mut item = self.item_inner(target, with_chain)?;

        if let Some(actor) = &activity.actor {
            let author = self.author_of(actor);
            if activity.kind == ObjectType::Update {
                item.updated_by = Some(Box::new(author.clone()));
            }
            if activity.kind == ObjectType::Create || item.submitted_by.is_none() {
                item.metadata.author_uri = Some(actor.link().to_string());
                item.submitted_by = Some(Box::new(author));
            }
        }
        item.submitted_at = item.submitted_at.or(activity.published);
        item.updated_at = item.updated_at.or(activity.updated);
        if !activity.to.is_empty() || !activity.cc.is_empty() {
            self.load_recipients(&mut item, activity);
        }
        Ok(item)
    }

    fn item_from_object(&self, object: &WireObject, with_chain: bool) -> ProtocolResult<Item> {
        let id = object.link();
        let mut item = Item {
            hash: Hash::from_iri(id),
            title: object.name.clone().unwrap_or_default(),
            submitted_at: object.published,
            updated_at: object.updated,
            ..Item::default()
        };

        let url = object.url.as_ref().map(WireItem::link).filter(|u| !u.is_empty());
        match (&object.content, url) {
            (None, Some(url)) => {
                item.data = url.to_string();
                item.mime_type = MimeType::Url;
            }
            (content, _) => {
                item.data = content.clone().unwrap_or_default();
                item.mime_type = object
                    .media_type
                    .as_deref()
                    .filter(|m| !m.is_empty())
                    .map(MimeType::from)
                    .unwrap_or_default();
            }
        }
        if let Some(source) = &object.source {
            if let (Some(content), Some(media_type)) = (&source.content, &source.media_type) {
                item.data = content.clone();
                item.mime_type = MimeType::from(media_type.as_str());
            }
        }
        if item.title.is_empty() && object.in_reply_to.is_empty() {
            if let Some(summary) = &object.summary {
                item.title = strip_tags(summary);
            }
        }

        if let Some(author) = &object.attributed_to {
            item.submitted_by = Some(Box::new(self.author_of(author)));
            item.metadata.author_uri = Some(author.link().to_string());
        }
        if !id.is_empty() {
            item.metadata.id = Some(id.to_string());
            item.metadata.url = url.map(str::to_string);
        }
        item.metadata.icon = object.icon.as_ref().and_then(image_metadata);
        item.generator = link_of(&object.generator);

        for tag in &object.tag {
            match self.decode_tag(tag) {
                Ok(tag) if tag.is_mention() => item.metadata.mentions.push(tag),
                Ok(tag) => item.metadata.tags.push(tag),
                Err(e) => debug!(error = %e, "skipping tag"),
            }
        }
        self.load_recipients(&mut item, object);
        if with_chain {
            self.attach_reply_chain(&mut item, object)?;
        }
        Ok(item)
    }

    fn item_from_tombstone(&self, object: &WireObject, with_chain: bool) -> ProtocolResult<Item> {
        let id = object.link();
        let mut item = Item {
            hash: Hash::from_iri(id),
            submitted_at: object.published,
            updated_at: object.deleted.or(object.updated),
            ..Item::default()
        };
        item.metadata.id = Some(id.to_string()).filter(|id| !id.is_empty());
        if with_chain {
            self.attach_reply_chain(&mut item, object)?;
        }
        item.mark_deleted();
        Ok(item)
    }

    /// Rebuild `parent` and `op` without recursion.
    ///
    /// Ancestors are decoded one at a time, nearest first. A repeated hash or a chain deeper than [`MAX_REPLY_DEPTH`]
    /// fails the decode. The origin is the explicit `context` when present,
    /// otherwise the root of the chain.
    fn attach_reply_chain(&self, item: &mut Item, object: &WireObject) -> ProtocolResult<()> {
        let explicit_op = object.context.as_ref().and_then(|c| self.reference_item(c));

        let mut seen = HashSet::new();
        if !item.hash.is_empty() {
            seen.insert(item.hash.clone());
        }
        let mut ancestors: Vec<(Item, Option<Box<Item>>)> = Vec::new();
        // Embedded ancestors nest through their own inReplyTo; bare references
        // list the remaining ancestors flat, nearest first.
        let mut level: &[WireItem] = &object.in_reply_to;
        let mut position = 0;
        while let Some(wire) = level.get(position) {
            if ancestors.len() == MAX_REPLY_DEPTH {
                return Err(ProtocolError::ChainTooDeep(MAX_REPLY_DEPTH));
            }
            let node = match self.item_inner(wire, false) {
                Ok(node) => node,
                Err(e) => {
                    debug!(iri = %wire.link(), error = %e, "reply chain cut short");
                    break;
                }
            };
            if !node.hash.is_empty() && !seen.insert(node.hash.clone()) {
                return Err(ProtocolError::CyclicChain(node.hash.to_string()));
            }
            let node_object = wire.as_object();
            let node_op = node_object
                .and_then(|o| o.context.as_ref())
                .and_then(|c| self.reference_item(c));
            match node_object.filter(|o| !o.in_reply_to.is_empty()) {
                Some(nested) => {
                    level = &nested.in_reply_to;
                    position = 0;
                }
                None => position += 1,
            }
            ancestors.push((node, node_op));
        }

        let root = ancestors.last().map(|(node, _)| Box::new(node.clone()));
        let mut parent: Option<Box<Item>> = None;
        for (mut node, node_op) in ancestors.into_iter().rev() {
            node.op = match parent {
                Some(_) => node_op.or_else(|| root.clone()),
                None => node_op,
            };
            node.parent = parent.take();
            parent = Some(Box::new(node));
        }
        item.op = explicit_op.or(root);
        item.parent = parent;
        Ok(())
    }

    fn reference_item(&self, wire: &WireItem) -> Option<Box<Item>> {
        self.item_inner(wire, false).ok().map(Box::new)
    }

    fn load_recipients(&self, item: &mut Item, object: &WireObject) {
        let (to, public_to) = self.recipients_from(&object.to);
        let (cc, public_cc) = self.recipients_from(&object.cc);
        item.metadata.to = to;
        item.metadata.cc = cc;
        item.visibility = if public_to || public_cc {
            Visibility::Public
        } else {
            Visibility::Private
        };
    }

    fn recipients_from(&self, recipients: &[WireItem]) -> (Vec<Account>, bool) {
        let mut accounts = Vec::new();
        let mut public = false;
        for recipient in recipients {
            let iri = recipient.link();
            if iri == PUBLIC_NS {
                public = true;
                continue;
            }
            match CollectionKind::of(iri) {
                Some(CollectionKind::Followers | CollectionKind::Following) => {
                    let mut account = Account::default();
                    account.metadata.id = Some(iri.to_string());
                    accounts.push(account);
                }
                // other collections do not hold accounts
                Some(_) => {}
                None => {
                    let account = self.author_of(recipient);
                    if account.is_valid() {
                        accounts.push(account);
                    }
                }
            }
        }
        (accounts, public)
    }

    // ----- tags -----

    pub fn decode_tag(&self, wire: &WireItem) -> ProtocolResult<Tag> {
        let object = match wire {
            WireItem::Object(object) => object,
            WireItem::Link(iri) => {
                return Ok(Tag {
                    hash: Hash::from_iri(iri),
                    id: Some(iri.clone()),
                    ..Tag::default()
                })
            }
        };
        let id = object.link();
        let mut tag = Tag {
            hash: Hash::from_iri(id),
            name: object.name.clone().unwrap_or_default(),
            id: Some(id.to_string()).filter(|id| !id.is_empty()),
            submitted_at: object.published,
            updated_at: object.updated,
            ..Tag::default()
        };
        match object.kind {
            ObjectType::Mention => {
                tag.kind = TagKind::Mention;
                tag.url = object.href.clone().unwrap_or_else(|| id.to_string());
            }
            ObjectType::Object | ObjectType::Link => {
                tag.url = object
                    .url
                    .as_ref()
                    .map(|u| u.link().to_string())
                    .unwrap_or_else(|| id.to_string());
                if let Some(author) = &object.attributed_to {
                    tag.submitted_by = Some(Box::new(self.author_of(author)));
                }
            }
            ObjectType::Tombstone => {
                if object.former_type == Some(ObjectType::Mention) {
                    tag.kind = TagKind::Mention;
                }
                tag.submitted_by = Some(Box::new(Account::anonymous()));
            }
            ObjectType::Delete => {
                let target = object
                    .object
                    .as_ref()
                    .ok_or_else(|| ProtocolError::decode("tag", "delete without object"))?;
                return self.decode_tag(target);
            }
            kind => return Err(ProtocolError::UnsupportedType(kind.as_str().to_string())),
        }
        Ok(tag)
    }

    // ----- activities -----

    pub fn decode_vote(&self, wire: &WireItem) -> ProtocolResult<Vote> {
        let activity = match wire {
            WireItem::Object(object) => object,
            WireItem::Link(_) => return Err(ProtocolError::decode("vote", "unable to load from IRI")),
        };
        let weight = match activity.kind {
            ObjectType::Like => 1,
            ObjectType::Dislike => -1,
            ObjectType::Undo => 0,
            kind => {
                return Err(ProtocolError::decode(
                    "vote",
                    format!("{} is not an appreciation", kind.as_str()),
                ))
            }
        };
        let id = activity.link();
        let mut vote = Vote {
            hash: Hash::from_iri(id),
            weight,
            submitted_by: activity.actor.as_ref().map(|a| Box::new(self.author_of(a))),
            submitted_at: activity.published,
            updated_at: activity.updated,
            metadata: VoteMetadata {
                iri: Some(id.to_string()).filter(|id| !id.is_empty()),
                original_iri: None,
            },
            ..Vote::default()
        };

        let object = activity
            .object
            .as_ref()
            .ok_or_else(|| ProtocolError::decode("vote", "appreciation without object"))?;
        if activity.kind == ObjectType::Undo {
            let original = object.link();
            if original.is_empty() {
                return Err(ProtocolError::decode("vote", "undo does not reference a vote"));
            }
            vote.metadata.original_iri = Some(original.to_string());
            // the retracted appreciation may embed its item
            if let Some(target) = object.as_object().and_then(|o| o.object.as_ref()) {
                vote.item = Some(Box::new(self.item_inner(target, false)?));
            }
        } else {
            vote.item = Some(Box::new(self.item_inner(object, false)?));
        }
        vote.wire = Some(Arc::new(wire.clone()));
        Ok(vote)
    }

    pub fn decode_follow(&self, wire: &WireItem) -> ProtocolResult<FollowRequest> {
        let activity = match wire {
            WireItem::Object(object) => object,
            WireItem::Link(_) => return Err(ProtocolError::decode("follow", "unable to load from IRI")),
        };
        let status = match activity.kind {
            ObjectType::Follow => FollowStatus::Pending,
            ObjectType::Accept => FollowStatus::Accepted,
            ObjectType::Reject => FollowStatus::Rejected,
            kind => return Err(ProtocolError::UnsupportedType(kind.as_str().to_string())),
        };
        let object = activity
            .object
            .as_ref()
            .ok_or_else(|| ProtocolError::decode("follow", "activity without object"))?;

        let mut request = if status == FollowStatus::Pending {
            let id = activity.link();
            FollowRequest {
                hash: Hash::from_iri(id),
                submitted_by: activity.actor.as_ref().map(|a| Box::new(self.author_of(a))),
                object: Some(Box::new(self.author_of(object))),
                reason: activity.content.clone().filter(|c| !c.is_empty()),
                submitted_at: activity.published,
                updated_at: activity.updated,
                metadata: ActivityMetadata {
                    id: Some(id.to_string()).filter(|id| !id.is_empty()),
                },
                ..FollowRequest::default()
            }
        } else {
            // a response: the object is the original follow
            let mut request = match object.kind() {
                Some(ObjectType::Follow) => self.decode_follow(object)?,
                _ => FollowRequest {
                    hash: Hash::from_iri(object.link()),
                    object: activity.actor.as_ref().map(|a| Box::new(self.author_of(a))),
                    metadata: ActivityMetadata {
                        id: Some(object.link().to_string()),
                    },
                    ..FollowRequest::default()
                },
            };
            request.updated_at = activity.published.or(activity.updated);
            request
        };
        request.status = status;
        request.wire = Some(Arc::new(wire.clone()));
        Ok(request)
    }

    pub fn decode_moderation(&self, wire: &WireItem) -> ProtocolResult<ModerationOp> {
        let activity = match wire {
            WireItem::Object(object) => object,
            WireItem::Link(_) => {
                return Err(ProtocolError::decode("moderation", "unable to load from IRI"))
            }
        };
        let kind = match activity.kind {
            ObjectType::Flag => ModerationKind::Flag,
            ObjectType::Block => ModerationKind::Block,
            ObjectType::Ignore => ModerationKind::Ignore,
            kind => return Err(ProtocolError::UnsupportedType(kind.as_str().to_string())),
        };
        let object = activity
            .object
            .as_ref()
            .ok_or_else(|| ProtocolError::decode("moderation", "activity without object"))?;
        let target = match object.kind() {
            Some(k) if k.is_actor() => ModerationTarget::Account(Box::new(self.decode_account(object)?)),
            Some(k) if k.is_item() || k == ObjectType::Tombstone => {
                ModerationTarget::Item(Box::new(self.item_inner(object, false)?))
            }
            _ => ModerationTarget::Unresolved(object.link().to_string()),
        };

        let id = activity.link();
        let mut op = ModerationOp::new(kind, target);
        op.hash = Hash::from_iri(id);
        op.metadata.id = Some(id.to_string()).filter(|id| !id.is_empty());
        op.submitted_by = activity.actor.as_ref().map(|a| Box::new(self.author_of(a)));
        op.reason = activity.content.clone().filter(|c| !c.is_empty());
        op.submitted_at = activity.published;
        op.updated_at = activity.updated;
        op.wire = Some(Arc::new(wire.clone()));
        Ok(op)
    }
}

fn link_of(value: &Option<WireItem>) -> Option<String> {
    value
        .as_ref()
        .map(|v| v.link().to_string())
        .filter(|l| !l.is_empty())
}

fn image_metadata(icon: &WireItem) -> Option<ImageMetadata> {
    let (uri, mime_type) = match icon {
        WireItem::Link(iri) => (iri.clone(), String::new()),
        WireItem::Object(o) => (
            o.url.as_ref().map(|u| u.link().to_string()).unwrap_or_default(),
            o.media_type.clone().unwrap_or_default(),
        ),
    };
    (!uri.is_empty()).then_some(ImageMetadata { uri, mime_type })
}

/// Plain text of an HTML fragment.
fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedi_types::{EntityKind, ServiceUrls};
    use serde_json::json;

    fn codec() -> Codec {
        Codec::new(ServiceUrls::new("https://fedbox.example", "https://littr.example").unwrap())
    }

    fn wire(value: serde_json::Value) -> WireItem {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn link_decodes_to_stub() {
        let item = codec().decode_item(&WireItem::iri("https://fedbox.example/objects/abc")).unwrap();
        assert_eq!(item.hash.as_str(), "abc");
        assert_eq!(item.iri(), Some("https://fedbox.example/objects/abc"));
        assert!(item.title.is_empty());
        assert!(item.wire.is_some());
    }

    #[test]
    fn create_attaches_actor_and_timestamps() {
        let activity = wire(json!({
            "id": "https://fedbox.example/activities/1",
            "type": "Create",
            "actor": "https://fedbox.example/actors/alice",
            "published": "2024-05-01T12:00:00Z",
            "to": ["https://www.w3.org/ns/activitystreams#Public"],
            "object": {
                "id": "https://fedbox.example/objects/n1",
                "type": "Note",
                "name": "Title",
                "content": "<p>body</p>",
                "mediaType": "text/html"
            }
        }));
        let item = codec().decode_item(&activity).unwrap();
        assert_eq!(item.hash.as_str(), "n1");
        assert_eq!(item.title, "Title");
        assert_eq!(item.mime_type, MimeType::Html);
        assert_eq!(item.author().map(|a| a.hash.as_str()), Some("alice"));
        assert_eq!(
            item.metadata.author_uri.as_deref(),
            Some("https://fedbox.example/actors/alice")
        );
        assert!(item.submitted_at.is_some());
        assert!(!item.is_private());
    }

    #[test]
    fn url_without_content_is_a_link_item() {
        let page = wire(json!({
            "id": "https://fedbox.example/objects/p1",
            "type": "Page",
            "url": "https://example.com/article"
        }));
        let item = codec().decode_item(&page).unwrap();
        assert_eq!(item.mime_type, MimeType::Url);
        assert_eq!(item.data, "https://example.com/article");
    }

    #[test]
    fn markdown_source_overrides_content() {
        let note = wire(json!({
            "id": "https://fedbox.example/objects/m1",
            "type": "Note",
            "content": "<em>hi</em>",
            "mediaType": "text/html",
            "source": { "content": "*hi*", "mediaType": "text/markdown" }
        }));
        let item = codec().decode_item(&note).unwrap();
        assert_eq!(item.mime_type, MimeType::Markdown);
        assert_eq!(item.data, "*hi*");
    }

    #[test]
    fn untitled_top_level_item_uses_summary() {
        let note = wire(json!({
            "id": "https://fedbox.example/objects/s1",
            "type": "Note",
            "summary": "<b>Summary</b> text",
            "content": "x"
        }));
        assert_eq!(codec().decode_item(&note).unwrap().title, "Summary text");
    }

    #[test]
    fn recipients_classify_public_and_collections() {
        let note = wire(json!({
            "id": "https://fedbox.example/objects/r1",
            "type": "Note",
            "content": "x",
            "to": [
                "https://fedbox.example/actors/bob",
                "https://fedbox.example/actors/alice/followers"
            ],
            "cc": ["https://fedbox.example/actors/alice/outbox"]
        }));
        let item = codec().decode_item(&note).unwrap();
        assert!(item.is_private());
        assert_eq!(item.metadata.to.len(), 2);
        assert_eq!(item.metadata.to[0].hash.as_str(), "bob");
        assert!(item.metadata.to[1].hash.is_empty());
        assert!(item.metadata.cc.is_empty());
    }

    #[test]
    fn parent_chain_sets_origin_to_root() {
        let note = wire(json!({
            "id": "https://fedbox.example/objects/c3",
            "type": "Note",
            "content": "leaf",
            "inReplyTo": {
                "id": "https://fedbox.example/objects/c2",
                "type": "Note",
                "content": "middle",
                "inReplyTo": {
                    "id": "https://fedbox.example/objects/c1",
                    "type": "Note",
                    "content": "root"
                }
            }
        }));
        let item = codec().decode_item(&note).unwrap();
        let chain: Vec<_> = item.parent_chain().iter().map(|i| i.hash.to_string()).collect();
        assert_eq!(chain, ["c2", "c1"]);
        assert_eq!(item.op.as_ref().map(|o| o.hash.as_str()), Some("c1"));
        let parent = item.parent.as_ref().unwrap();
        assert_eq!(parent.op.as_ref().map(|o| o.hash.as_str()), Some("c1"));
        assert!(parent.parent.as_ref().unwrap().op.is_none());
    }

    #[test]
    fn explicit_context_wins_over_chain_root() {
        let note = wire(json!({
            "id": "https://fedbox.example/objects/c2",
            "type": "Note",
            "content": "x",
            "context": "https://fedbox.example/objects/op",
            "inReplyTo": "https://fedbox.example/objects/c1"
        }));
        let item = codec().decode_item(&note).unwrap();
        assert_eq!(item.op.as_ref().map(|o| o.hash.as_str()), Some("op"));
        assert_eq!(item.parent.as_ref().map(|p| p.hash.as_str()), Some("c1"));
    }

    #[test]
    fn cyclic_chain_is_a_decode_failure() {
        let note = wire(json!({
            "id": "https://fedbox.example/objects/a",
            "type": "Note",
            "content": "x",
            "inReplyTo": {
                "id": "https://fedbox.example/objects/b",
                "type": "Note",
                "inReplyTo": {
                    "id": "https://fedbox.example/objects/a",
                    "type": "Note"
                }
            }
        }));
        assert_eq!(
            codec().decode_item(&note).unwrap_err(),
            ProtocolError::CyclicChain("a".into())
        );
    }

    #[test]
    fn overly_deep_chain_is_rejected() {
        let mut value = json!({ "id": "https://fedbox.example/objects/n0", "type": "Note" });
        for depth in 1..=MAX_REPLY_DEPTH + 1 {
            value = json!({
                "id": format!("https://fedbox.example/objects/n{depth}"),
                "type": "Note",
                "inReplyTo": value,
            });
        }
        assert_eq!(
            codec().decode_item(&wire(value)).unwrap_err(),
            ProtocolError::ChainTooDeep(MAX_REPLY_DEPTH)
        );
    }

    #[test]
    fn tombstone_is_deleted_and_anonymous() {
        let tombstone = wire(json!({
            "id": "https://fedbox.example/objects/t1",
            "type": "Tombstone",
            "formerType": "Note",
            "published": "2024-01-01T00:00:00Z",
            "deleted": "2024-02-01T00:00:00Z",
            "inReplyTo": "https://fedbox.example/objects/p"
        }));
        let item = codec().decode_item(&tombstone).unwrap();
        assert!(item.deleted);
        assert!(item.author().is_some_and(Account::is_anonymous));
        assert!(item.submitted_at.is_some());
        assert_eq!(item.updated_at.map(|d| d.to_rfc3339()), Some("2024-02-01T00:00:00+00:00".into()));
        assert_eq!(item.parent.as_ref().map(|p| p.hash.as_str()), Some("p"));
    }

    #[test]
    fn delete_activity_marks_item_deleted() {
        let delete = wire(json!({
            "type": "Delete",
            "actor": "https://fedbox.example/actors/alice",
            "object": { "id": "https://fedbox.example/objects/d1", "type": "Note", "content": "gone" }
        }));
        let item = codec().decode_item(&delete).unwrap();
        assert!(item.deleted);
        assert!(item.data.is_empty());
        assert_eq!(item.hash.as_str(), "d1");
    }

    #[test]
    fn actor_without_optional_fields_decodes() {
        let actor = wire(json!({
            "id": "https://fedbox.example/actors/quiet",
            "type": "Person",
            "preferredUsername": "quiet"
        }));
        let account = codec().decode_account(&actor).unwrap();
        assert_eq!(account.handle, "quiet");
        assert!(account.created_at.is_none());
        assert!(account.updated_at.is_none());
        assert!(account.metadata.icon.is_none());
        assert!(!account.federated);
    }

    #[test]
    fn remote_actor_is_federated_with_details() {
        let actor = wire(json!({
            "id": "https://mastodon.example/users/zed",
            "type": "Person",
            "name": "Zed Z",
            "preferredUsername": "zed",
            "url": "https://mastodon.example/@zed",
            "inbox": "https://mastodon.example/users/zed/inbox",
            "icon": { "type": "Image", "mediaType": "image/png", "url": "https://mastodon.example/z.png" },
            "publicKey": {
                "id": "https://mastodon.example/users/zed#main-key",
                "owner": "https://mastodon.example/users/zed",
                "publicKeyPem": "-----BEGIN PUBLIC KEY-----\nMII\n-----END PUBLIC KEY-----"
            },
            "attributedTo": "https://mastodon.example/users/admin"
        }));
        let account = codec().decode_account(&actor).unwrap();
        assert!(account.federated);
        assert_eq!(account.handle, "zed");
        assert_eq!(account.email, "zed@mastodon.example");
        assert_eq!(account.metadata.name.as_deref(), Some("Zed Z"));
        assert_eq!(account.metadata.icon.as_ref().map(|i| i.mime_type.as_str()), Some("image/png"));
        assert!(account.metadata.public_key_pem.is_some());
        assert_eq!(account.created_by.as_ref().map(|c| c.hash.as_str()), Some("admin"));
    }

    #[test]
    fn sentinel_references_are_recognized() {
        let c = codec();
        assert!(c.decode_account(&WireItem::iri(PUBLIC_NS)).unwrap().is_anonymous());
        assert!(c
            .decode_account(&WireItem::iri("https://fedbox.example"))
            .unwrap()
            .is_system());
    }

    #[test]
    fn tombstone_actor_is_deleted_anonymous() {
        let actor = wire(json!({
            "id": "https://fedbox.example/actors/gone",
            "type": "Tombstone",
            "formerType": "Person"
        }));
        let entity = codec().decode_entity(&actor).unwrap();
        let account = entity.as_account().unwrap();
        assert!(account.deleted);
        assert_eq!(account.handle, "anonymous");
        assert_eq!(account.hash.as_str(), "gone");
    }

    #[test]
    fn undo_yields_zero_weight_and_original_reference() {
        let undo = wire(json!({
            "id": "https://fedbox.example/activities/u1",
            "type": "Undo",
            "actor": "https://fedbox.example/actors/alice",
            "object": {
                "id": "https://fedbox.example/activities/l1",
                "type": "Like",
                "object": "https://fedbox.example/objects/o1"
            }
        }));
        let vote = codec().decode_vote(&undo).unwrap();
        assert_eq!(vote.weight, 0);
        assert_eq!(
            vote.metadata.original_iri.as_deref(),
            Some("https://fedbox.example/activities/l1")
        );
        assert_eq!(vote.item_hash().map(Hash::as_str), Some("o1"));
    }

    #[test]
    fn like_and_dislike_weights() {
        let c = codec();
        for (kind, weight) in [("Like", 1), ("Dislike", -1)] {
            let activity = wire(json!({
                "id": "https://fedbox.example/activities/v",
                "type": kind,
                "actor": "https://fedbox.example/actors/alice",
                "object": "https://fedbox.example/objects/o1"
            }));
            let vote = c.decode_vote(&activity).unwrap();
            assert_eq!(vote.weight, weight);
            assert_eq!(vote.metadata.iri.as_deref(), Some("https://fedbox.example/activities/v"));
        }
        assert!(c.decode_vote(&WireItem::iri("https://fedbox.example/activities/v")).is_err());
    }

    #[test]
    fn follow_and_response_decode() {
        let c = codec();
        let follow = json!({
            "id": "https://fedbox.example/activities/f1",
            "type": "Follow",
            "actor": "https://fedbox.example/actors/alice",
            "object": "https://fedbox.example/actors/bob",
            "content": "hi!"
        });
        let request = c.decode_follow(&wire(follow.clone())).unwrap();
        assert!(request.is_pending());
        assert_eq!(request.reason.as_deref(), Some("hi!"));
        assert_eq!(request.object.as_ref().map(|a| a.hash.as_str()), Some("bob"));

        let accept = wire(json!({
            "type": "Accept",
            "actor": "https://fedbox.example/actors/bob",
            "object": follow
        }));
        let accepted = c.decode_follow(&accept).unwrap();
        assert_eq!(accepted.status, FollowStatus::Accepted);
        assert_eq!(accepted.hash.as_str(), "f1");
    }

    #[test]
    fn moderation_target_by_shape() {
        let c = codec();
        let flag = wire(json!({
            "id": "https://fedbox.example/activities/m1",
            "type": "Flag",
            "actor": "https://fedbox.example/actors/alice",
            "object": "https://fedbox.example/objects/spam",
            "content": "spam"
        }));
        let op = c.decode_moderation(&flag).unwrap();
        assert_eq!(op.kind, ModerationKind::Flag);
        assert_eq!(op.reason.as_deref(), Some("spam"));
        assert_eq!(
            op.object,
            ModerationTarget::Unresolved("https://fedbox.example/objects/spam".into())
        );

        let block = wire(json!({
            "id": "https://fedbox.example/activities/m2",
            "type": "Block",
            "actor": "https://fedbox.example/actors/alice",
            "object": { "id": "https://fedbox.example/actors/troll", "type": "Person" }
        }));
        let op = c.decode_moderation(&block).unwrap();
        assert!(matches!(op.object, ModerationTarget::Account(ref a) if a.hash.as_str() == "troll"));
    }

    #[test]
    fn entity_dispatch_uses_type_table() {
        let c = codec();
        let like = wire(json!({
            "id": "https://fedbox.example/activities/l",
            "type": "Like",
            "object": "https://fedbox.example/objects/o"
        }));
        assert_eq!(c.decode_entity(&like).unwrap().kind(), EntityKind::Vote);

        let create_actor = wire(json!({
            "type": "Create",
            "object": { "id": "https://fedbox.example/actors/new", "type": "Person" }
        }));
        assert_eq!(c.decode_entity(&create_actor).unwrap().kind(), EntityKind::Account);

        let stub = WireItem::iri("https://fedbox.example/actors/x");
        assert_eq!(c.decode_entity(&stub).unwrap().kind(), EntityKind::Account);

        let question = wire(json!({ "type": "Question" }));
        assert_eq!(
            c.decode_entity(&question).unwrap_err(),
            ProtocolError::UnsupportedType("Unknown".into())
        );
    }

    #[test]
    fn tags_split_into_hashtags_and_mentions() {
        let note = wire(json!({
            "id": "https://fedbox.example/objects/t",
            "type": "Note",
            "content": "x",
            "tag": [
                { "type": "Mention", "name": "@bob", "href": "https://fedbox.example/actors/bob" },
                { "id": "https://littr.example/t/rust", "type": "Object", "name": "#rust" }
            ]
        }));
        let item = codec().decode_item(&note).unwrap();
        assert_eq!(item.metadata.mentions.len(), 1);
        assert_eq!(item.metadata.mentions[0].url, "https://fedbox.example/actors/bob");
        assert_eq!(item.metadata.tags.len(), 1);
        assert_eq!(item.metadata.tags[0].url, "https://littr.example/t/rust");
    }
}
