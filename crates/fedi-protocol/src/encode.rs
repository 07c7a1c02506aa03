use chrono::{DateTime, Utc};
use fedi_types::{
    Account, FollowRequest, Item, MimeType, ModerationKind, ModerationTarget, ObjectType, Source,
    Vote, WireItem, WireObject, PUBLIC_NS,
};

use crate::codec::Codec;
use crate::error::{ProtocolError, ProtocolResult};

/// Bodies with more words than this are published as articles.
pub const ARTICLE_WORD_THRESHOLD: usize = 300;

impl Codec {
    /// Wire object for an item, with its full recipient envelope.
    pub fn encode_item(&self, item: &Item) -> WireObject {
        let id = self.item_id(item);
        let kind = wire_type(item);

        let mut object = WireObject {
            id: id.clone(),
            kind,
            published: item.submitted_at,
            updated: item.updated_at,
            ..WireObject::default()
        };

        if item.deleted {
            return self.tombstone(item, id, kind);
        }

        match &item.mime_type {
            MimeType::Url => object.url = Some(WireItem::iri(item.data.clone())),
            MimeType::Markdown => {
                object.media_type = Some(MimeType::Html.to_string());
                object.content = Some(item.data.clone());
                object.source = Some(Source {
                    content: Some(item.data.clone()),
                    media_type: Some(MimeType::Markdown.to_string()),
                });
            }
            other => {
                object.media_type = Some(other.to_string());
                object.content = Some(item.data.clone());
            }
        }
        if !item.is_link() && !item.hash.is_empty() {
            object.url = Some(WireItem::iri(self.permalink(item)));
        }
        if !item.title.is_empty() {
            object.name = Some(item.title.clone());
        }
        if let Some(author) = item.author().filter(|a| a.is_valid()) {
            object.attributed_to = Some(WireItem::iri(self.actor_id(author)));
        }

        let mut to = Vec::new();
        let mut cc = Vec::new();
        let mut bcc = Vec::new();
        for (depth, ancestor) in item.parent_chain().into_iter().enumerate() {
            if let Some(id) = self.item_id(ancestor) {
                object.in_reply_to.push(WireItem::iri(id));
            }
            let Some(author) = ancestor.author().filter(|a| a.is_valid()) else {
                continue;
            };
            let author_id = self.actor_id(author);
            if author_id == PUBLIC_NS {
                continue;
            }
            if depth == 0 {
                push_unique(&mut to, author_id);
            } else {
                push_unique(&mut cc, author_id);
            }
        }
        object.context = item
            .op
            .as_deref()
            .and_then(|op| self.item_id(op))
            .map(WireItem::iri);

        if !item.is_private() {
            push_unique(&mut to, PUBLIC_NS.to_string());
            push_unique(&mut bcc, self.urls().api_url.clone());
        }
        for recipient in &item.metadata.to {
            if let Some(id) = recipient.iri() {
                push_unique(&mut to, id.to_string());
            }
        }
        for recipient in &item.metadata.cc {
            if let Some(id) = recipient.iri() {
                push_unique(&mut cc, id.to_string());
            }
        }

        for mention in &item.metadata.mentions {
            object.tag.push(tag_object(ObjectType::Mention, &mention.url, &mention.name));
        }
        for tag in &item.metadata.tags {
            object.tag.push(tag_object(ObjectType::Object, &tag.url, &tag.name));
        }

        object.to = links(to);
        object.cc = links(cc);
        object.bcc = links(bcc);
        object
    }

    fn tombstone(&self, item: &Item, id: Option<String>, former: ObjectType) -> WireObject {
        let mut tombstone = WireObject {
            id,
            kind: ObjectType::Tombstone,
            former_type: Some(former),
            deleted: item.updated_at,
            ..WireObject::default()
        };
        let op = item.op.as_deref().or(item.parent.as_deref());
        if let Some(parent) = item.parent.as_deref().and_then(|p| self.item_id(p)) {
            tombstone.in_reply_to.push(WireItem::iri(parent));
        }
        if let Some(op) = op.and_then(|op| self.item_id(op)) {
            if !tombstone.in_reply_to.iter().any(|r| r.link() == op) {
                tombstone.in_reply_to.push(WireItem::iri(op.clone()));
            }
            tombstone.context = Some(WireItem::iri(op));
        }
        tombstone
    }

    /// Public page of an item on the application.
    fn permalink(&self, item: &Item) -> String {
        let base = &self.urls().base_url;
        match item.author().filter(|a| !a.handle.is_empty() && !a.federated) {
            Some(author) => format!("{base}/~{}/{}", author.handle, item.hash),
            None => format!("{base}/item/{}", item.hash),
        }
    }

    pub fn encode_account(&self, account: &Account) -> WireObject {
        fedi_crypto::actor_representation(account, self.urls())
    }

    /// The activity submitting `item` on behalf of `author`: Create, Update or Delete.
    ///
    /// `extra_cc` carries recipients the caller resolved out of band, such as
    /// mentioned accounts or the author's followers collection.
    pub fn item_activity(
        &self,
        item: &Item,
        author: &Account,
        extra_cc: &[String],
    ) -> ProtocolResult<WireObject> {
        if !author.is_valid() {
            return Err(ProtocolError::InvalidEntity("item has no author".into()));
        }
        let mut object = self.encode_item(item);
        for iri in extra_cc {
            if !object.cc.iter().any(|c| c.link() == iri) {
                object.cc.push(WireItem::iri(iri.clone()));
            }
        }

        let mut activity = WireObject {
            actor: Some(WireItem::iri(self.actor_id(author))),
            to: object.to.clone(),
            cc: object.cc.clone(),
            bcc: object.bcc.clone(),
            ..WireObject::default()
        };
        if item.deleted {
            let id = self
                .item_id(item)
                .ok_or_else(|| ProtocolError::InvalidEntity("can not delete an item without id".into()))?;
            if !item.is_private() {
                push_link(&mut activity.to, PUBLIC_NS);
                push_link(&mut activity.bcc, &self.urls().api_url);
            }
            activity.kind = ObjectType::Delete;
            activity.object = Some(WireItem::iri(id));
        } else {
            activity.kind = if object.id.is_none() {
                ObjectType::Create
            } else {
                ObjectType::Update
            };
            activity.object = Some(WireItem::object(object));
        }
        Ok(activity.with_context())
    }

    /// Like, Dislike, or an Undo of an earlier appreciation.
    pub fn vote_activity(&self, vote: &Vote) -> ProtocolResult<WireObject> {
        let voter = vote
            .submitted_by
            .as_deref()
            .ok_or_else(|| ProtocolError::InvalidEntity("vote has no author".into()))?;
        let (kind, object) = match vote.weight {
            0 => {
                let original = vote
                    .metadata
                    .original_iri
                    .as_deref()
                    .or(vote.metadata.iri.as_deref())
                    .filter(|iri| !iri.is_empty())
                    .ok_or_else(|| {
                        ProtocolError::InvalidEntity("retraction needs the original vote".into())
                    })?;
                (ObjectType::Undo, original.to_string())
            }
            weight => {
                let item = vote
                    .item
                    .as_deref()
                    .and_then(|i| self.item_id(i))
                    .ok_or_else(|| ProtocolError::InvalidEntity("vote has no item".into()))?;
                let kind = if weight > 0 {
                    ObjectType::Like
                } else {
                    ObjectType::Dislike
                };
                (kind, item)
            }
        };
        let mut activity = self.addressed(kind, voter);
        activity.object = Some(WireItem::iri(object));
        Ok(activity.with_context())
    }

    pub fn follow_activity(
        &self,
        follower: &Account,
        followed: &Account,
        reason: Option<&Item>,
    ) -> WireObject {
        let mut follow = self.addressed(ObjectType::Follow, follower);
        follow.object = Some(WireItem::iri(self.actor_id(followed)));
        if let Some(reason) = reason {
            self.apply_reason(&mut follow, reason);
        }
        follow.with_context()
    }

    /// Accept or Reject answering a follow request, sent by the followed account.
    pub fn follow_response(
        &self,
        request: &FollowRequest,
        accept: bool,
        reason: Option<&Item>,
    ) -> ProtocolResult<WireObject> {
        let follower = request
            .submitted_by
            .as_deref()
            .ok_or_else(|| ProtocolError::InvalidEntity("follow request has no follower".into()))?;
        let followed = request
            .object
            .as_deref()
            .ok_or_else(|| ProtocolError::InvalidEntity("follow request has no object".into()))?;
        let follow_id = request
            .metadata
            .id
            .clone()
            .ok_or_else(|| ProtocolError::InvalidEntity("follow request has no id".into()))?;

        let mut response = WireObject::new(if accept {
            ObjectType::Accept
        } else {
            ObjectType::Reject
        });
        if let Some(reason) = reason {
            self.apply_reason(&mut response, reason);
        }
        response.to.push(WireItem::iri(self.actor_id(follower)));
        if accept {
            response.to.push(WireItem::iri(PUBLIC_NS));
        }
        response.bcc.push(WireItem::iri(self.urls().api_url.clone()));
        response.actor = Some(WireItem::iri(self.actor_id(followed)));
        response.object = Some(WireItem::iri(follow_id));
        Ok(response.with_context())
    }

    /// Block, Flag or Ignore aimed at an item or an account.
    ///
    /// `cc` holds the creators of the acting and target actors, resolved by
    /// the caller.
    pub fn moderation_activity(
        &self,
        kind: ModerationKind,
        actor: &Account,
        target: &ModerationTarget,
        cc: &[String],
        reason: Option<&Item>,
    ) -> ProtocolResult<WireObject> {
        let object = match target {
            ModerationTarget::Item(item) => self.item_id(item),
            ModerationTarget::Account(account) if account.is_valid() => {
                Some(self.actor_id(account))
            }
            ModerationTarget::Account(_) => None,
            ModerationTarget::Unresolved(iri) => Some(iri.clone()),
        }
        .filter(|iri| !iri.is_empty())
        .ok_or_else(|| ProtocolError::InvalidEntity("moderation target has no id".into()))?;

        let mut activity = WireObject::new(match kind {
            ModerationKind::Flag => ObjectType::Flag,
            ModerationKind::Block => ObjectType::Block,
            ModerationKind::Ignore => ObjectType::Ignore,
        });
        if let Some(reason) = reason {
            self.apply_reason(&mut activity, reason);
        }
        for iri in cc.iter().filter(|iri| iri.as_str() != PUBLIC_NS) {
            push_link(&mut activity.cc, iri);
        }
        activity.bcc = vec![WireItem::iri(self.urls().api_url.clone())];
        activity.actor = Some(WireItem::iri(self.actor_id(actor)));
        activity.object = Some(WireItem::iri(object));
        Ok(activity.with_context())
    }

    /// Create, Update or Delete of an account, on behalf of its creator or
    /// the service actor.
    pub fn account_activity(&self, account: &Account, now: DateTime<Utc>) -> ProtocolResult<WireObject> {
        let mut actor = self.encode_account(account);
        actor.published = actor.published.or(Some(now));
        actor.updated = Some(now);

        let author = account
            .created_by
            .as_deref()
            .filter(|a| a.is_valid())
            .map(|a| self.actor_id(a))
            .unwrap_or_else(|| self.urls().api_url.clone());

        let mut activity = WireObject {
            to: vec![WireItem::iri(PUBLIC_NS)],
            bcc: vec![WireItem::iri(self.urls().api_url.clone())],
            updated: Some(now),
            attributed_to: Some(WireItem::iri(author.clone())),
            actor: Some(WireItem::iri(author)),
            ..WireObject::default()
        };
        let id = account.iri().filter(|id| !id.is_empty()).map(str::to_string);
        if account.deleted {
            let id = id.ok_or_else(|| {
                ProtocolError::InvalidEntity("can not delete an account without id".into())
            })?;
            activity.kind = ObjectType::Delete;
            activity.object = Some(WireItem::iri(id));
        } else {
            activity.kind = if id.is_none() {
                ObjectType::Create
            } else {
                ObjectType::Update
            };
            actor.to = vec![WireItem::iri(PUBLIC_NS)];
            actor.bcc = vec![WireItem::iri(self.urls().api_url.clone())];
            activity.object = Some(WireItem::object(actor));
        }
        Ok(activity.with_context())
    }

    /// Copy a reason's text onto an activity.
    pub fn apply_reason(&self, activity: &mut WireObject, reason: &Item) {
        let encoded = self.encode_item(reason);
        activity.name = encoded.name;
        activity.content = encoded.content;
        activity.media_type = encoded.media_type;
        activity.source = encoded.source;
    }

    /// Public activity by `actor`, blind copied to the service.
    fn addressed(&self, kind: ObjectType, actor: &Account) -> WireObject {
        WireObject {
            kind,
            to: vec![WireItem::iri(PUBLIC_NS)],
            bcc: vec![WireItem::iri(self.urls().api_url.clone())],
            actor: Some(WireItem::iri(self.actor_id(actor))),
            ..WireObject::default()
        }
    }
}

/// Page for links, Article for long bodies, Note otherwise.
fn wire_type(item: &Item) -> ObjectType {
    if item.is_link() {
        return ObjectType::Page;
    }
    if item.data.split_whitespace().count() > ARTICLE_WORD_THRESHOLD {
        ObjectType::Article
    } else {
        ObjectType::Note
    }
}

fn tag_object(kind: ObjectType, url: &str, name: &str) -> WireItem {
    WireItem::object(WireObject {
        id: Some(url.to_string()),
        kind,
        name: Some(name.to_string()),
        ..WireObject::default()
    })
}

fn push_unique(list: &mut Vec<String>, iri: String) {
    if !iri.is_empty() && !list.contains(&iri) {
        list.push(iri);
    }
}

fn push_link(list: &mut Vec<WireItem>, iri: &str) {
    if !list.iter().any(|l| l.link() == iri) {
        list.push(WireItem::iri(iri));
    }
}

fn links(iris: Vec<String>) -> Vec<WireItem> {
    iris.into_iter().map(WireItem::Link).collect()
}
