//! Loosely-typed ActivityStreams wire representation.
//!
//! A single flat [`WireObject`] stands in for actors, objects, activities and
//! collections; the [`ObjectType`] tag tells them apart. Any property that may
//! hold either an IRI or an embedded object is a [`WireItem`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// The public addressing sentinel.
pub const PUBLIC_NS: &str = "https://www.w3.org/ns/activitystreams#Public";

/// JSON-LD context emitted on outgoing objects.
pub const ACTIVITY_STREAMS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";

/// ActivityStreams type tag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    #[default]
    Object,
    Link,
    Mention,
    Article,
    Note,
    Page,
    Document,
    Image,
    Video,
    Audio,
    Event,
    Tombstone,
    Person,
    Service,
    Group,
    Application,
    Organization,
    Activity,
    Create,
    Update,
    Delete,
    Like,
    Dislike,
    Undo,
    Follow,
    Accept,
    Reject,
    Block,
    Flag,
    Ignore,
    Announce,
    Collection,
    OrderedCollection,
    CollectionPage,
    OrderedCollectionPage,
    #[serde(other)]
    Unknown,
}

impl ObjectType {
    pub const ACTORS: &'static [ObjectType] = &[
        Self::Person,
        Self::Service,
        Self::Group,
        Self::Application,
        Self::Organization,
    ];

    pub const ITEMS: &'static [ObjectType] = &[
        Self::Article,
        Self::Note,
        Self::Page,
        Self::Document,
        Self::Image,
        Self::Video,
        Self::Audio,
    ];

    pub const APPRECIATIONS: &'static [ObjectType] = &[Self::Like, Self::Dislike];

    pub const MODERATIONS: &'static [ObjectType] = &[Self::Flag, Self::Block, Self::Ignore];

    pub const CONTENT_MANAGEMENT: &'static [ObjectType] =
        &[Self::Create, Self::Update, Self::Delete];

    pub fn is_actor(self) -> bool {
        Self::ACTORS.contains(&self)
    }

    pub fn is_item(self) -> bool {
        Self::ITEMS.contains(&self)
    }

    pub fn is_collection(self) -> bool {
        matches!(
            self,
            Self::Collection
                | Self::OrderedCollection
                | Self::CollectionPage
                | Self::OrderedCollectionPage
        )
    }

    pub fn is_page(self) -> bool {
        matches!(self, Self::CollectionPage | Self::OrderedCollectionPage)
    }

    pub fn is_activity(self) -> bool {
        matches!(
            self,
            Self::Activity
                | Self::Create
                | Self::Update
                | Self::Delete
                | Self::Like
                | Self::Dislike
                | Self::Undo
                | Self::Follow
                | Self::Accept
                | Self::Reject
                | Self::Block
                | Self::Flag
                | Self::Ignore
                | Self::Announce
        )
    }

    /// Wire spelling, used when building type filters.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Object => "Object",
            Self::Link => "Link",
            Self::Mention => "Mention",
            Self::Article => "Article",
            Self::Note => "Note",
            Self::Page => "Page",
            Self::Document => "Document",
            Self::Image => "Image",
            Self::Video => "Video",
            Self::Audio => "Audio",
            Self::Event => "Event",
            Self::Tombstone => "Tombstone",
            Self::Person => "Person",
            Self::Service => "Service",
            Self::Group => "Group",
            Self::Application => "Application",
            Self::Organization => "Organization",
            Self::Activity => "Activity",
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::Like => "Like",
            Self::Dislike => "Dislike",
            Self::Undo => "Undo",
            Self::Follow => "Follow",
            Self::Accept => "Accept",
            Self::Reject => "Reject",
            Self::Block => "Block",
            Self::Flag => "Flag",
            Self::Ignore => "Ignore",
            Self::Announce => "Announce",
            Self::Collection => "Collection",
            Self::OrderedCollection => "OrderedCollection",
            Self::CollectionPage => "CollectionPage",
            Self::OrderedCollectionPage => "OrderedCollectionPage",
            Self::Unknown => "Unknown",
        }
    }
}

/// A property value that is either a bare IRI or an embedded object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireItem {
    Link(String),
    Object(Box<WireObject>),
}

impl WireItem {
    pub fn iri(iri: impl Into<String>) -> Self {
        Self::Link(iri.into())
    }

    pub fn object(object: WireObject) -> Self {
        Self::Object(Box::new(object))
    }

    /// The identifier this value points at; empty for anonymous objects.
    pub fn link(&self) -> &str {
        match self {
            Self::Link(iri) => iri,
            Self::Object(object) => object.link(),
        }
    }

    /// True when only a reference was supplied, not a full object.
    pub fn is_link(&self) -> bool {
        match self {
            Self::Link(_) => true,
            Self::Object(object) => object.kind == ObjectType::Link,
        }
    }

    pub fn as_object(&self) -> Option<&WireObject> {
        match self {
            Self::Object(object) => Some(object),
            Self::Link(_) => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut WireObject> {
        match self {
            Self::Object(object) => Some(object),
            Self::Link(_) => None,
        }
    }

    pub fn kind(&self) -> Option<ObjectType> {
        self.as_object().map(|o| o.kind)
    }
}

impl From<WireObject> for WireItem {
    fn from(object: WireObject) -> Self {
        Self::object(object)
    }
}

/// Source block carrying the original authoring format.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKey {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub public_key_pem: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_inbox: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_authorization_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_token_endpoint: Option<String>,
}

/// Flat union of every ActivityStreams shape the repository reads or writes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireObject {
    #[serde(rename = "@context", default, skip_serializing_if = "Option::is_none")]
    pub ld_context: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: ObjectType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<WireItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<WireItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributed_to: Option<WireItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<WireItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<WireItem>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub in_reply_to: Vec<WireItem>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<WireItem>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<WireItem>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<WireItem>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub tag: Vec<WireItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub former_type: Option<ObjectType>,

    // actor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbox: Option<WireItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbox: Option<WireItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followers: Option<WireItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub following: Option<WireItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liked: Option<WireItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<PublicKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<Endpoints>,

    // activity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<WireItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<WireItem>,

    // collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_items: Option<u64>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<WireItem>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub ordered_items: Vec<WireItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<WireItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<WireItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<WireItem>,
}

impl WireObject {
    pub fn new(kind: ObjectType) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn with_id(kind: ObjectType, id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            kind,
            ..Self::default()
        }
    }

    /// The object's identifier, or its `href` for link objects.
    pub fn link(&self) -> &str {
        self.id
            .as_deref()
            .or(self.href.as_deref())
            .unwrap_or_default()
    }

    /// Members of a collection page, whichever property carries them.
    pub fn members(&self) -> &[WireItem] {
        if self.ordered_items.is_empty() {
            &self.items
        } else {
            &self.ordered_items
        }
    }

    pub fn members_mut(&mut self) -> &mut Vec<WireItem> {
        if self.ordered_items.is_empty() && !self.items.is_empty() {
            &mut self.items
        } else {
            &mut self.ordered_items
        }
    }

    /// Attach the ActivityStreams JSON-LD context.
    pub fn with_context(mut self) -> Self {
        self.ld_context = Some(serde_json::Value::String(
            ACTIVITY_STREAMS_CONTEXT.to_string(),
        ));
        self
    }

    /// True if any recipient list addresses the public sentinel.
    pub fn is_public(&self) -> bool {
        self.recipients().any(|r| r.link() == PUBLIC_NS)
    }

    /// All addressed recipients across `to`, `cc` and `bcc`.
    pub fn recipients(&self) -> impl Iterator<Item = &WireItem> {
        self.to.iter().chain(self.cc.iter()).chain(self.bcc.iter())
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<WireItem>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<WireItem>),
        One(WireItem),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::Many(items)) => items,
        Some(OneOrMany::One(item)) => vec![item],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_create_note_with_embedded_object() {
        let json = r#"{
            "@context": "https://www.w3.org/ns/activitystreams",
            "id": "https://fedbox.git/activities/a1",
            "type": "Create",
            "actor": "https://fedbox.git/actors/alice",
            "to": "https://www.w3.org/ns/activitystreams#Public",
            "object": {
                "id": "https://fedbox.git/objects/o1",
                "type": "Note",
                "content": "hello",
                "inReplyTo": "https://fedbox.git/objects/o0",
                "published": "2024-03-01T10:00:00Z"
            }
        }"#;
        let activity: WireObject = serde_json::from_str(json).unwrap();
        assert_eq!(activity.kind, ObjectType::Create);
        assert!(activity.is_public());
        let object = activity.object.as_ref().and_then(WireItem::as_object).unwrap();
        assert_eq!(object.kind, ObjectType::Note);
        assert_eq!(object.in_reply_to.len(), 1);
        assert!(object.published.is_some());
    }

    #[test]
    fn unknown_type_is_tolerated() {
        let object: WireObject =
            serde_json::from_str(r#"{"id":"https://x/objects/1","type":"Question"}"#).unwrap();
        assert_eq!(object.kind, ObjectType::Unknown);
    }

    #[test]
    fn link_and_object_items_expose_their_iri() {
        let link = WireItem::iri("https://fedbox.git/actors/a");
        let object = WireItem::object(WireObject::with_id(
            ObjectType::Person,
            "https://fedbox.git/actors/a",
        ));
        assert_eq!(link.link(), object.link());
        assert!(link.is_link());
        assert!(!object.is_link());
    }

    #[test]
    fn collection_members_prefer_ordered_items() {
        let json = r#"{
            "type": "OrderedCollectionPage",
            "totalItems": 2,
            "orderedItems": ["https://x/objects/1", "https://x/objects/2"],
            "next": "https://x/outbox?after=2"
        }"#;
        let page: WireObject = serde_json::from_str(json).unwrap();
        assert_eq!(page.members().len(), 2);
        assert!(page.kind.is_page());
        assert_eq!(page.next.as_ref().map(WireItem::link), Some("https://x/outbox?after=2"));
    }

    #[test]
    fn empty_fields_are_not_serialized() {
        let json = serde_json::to_value(WireObject::new(ObjectType::Note)).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "Note" }));
    }

    #[test]
    fn actor_fields_decode() {
        let json = r#"{
            "id": "https://fedbox.git/actors/bob",
            "type": "Person",
            "preferredUsername": "bob",
            "inbox": "https://fedbox.git/actors/bob/inbox",
            "publicKey": {
                "id": "https://fedbox.git/actors/bob#main-key",
                "owner": "https://fedbox.git/actors/bob",
                "publicKeyPem": "-----BEGIN PUBLIC KEY-----"
            }
        }"#;
        let actor: WireObject = serde_json::from_str(json).unwrap();
        assert!(actor.kind.is_actor());
        assert_eq!(actor.preferred_username.as_deref(), Some("bob"));
        assert_eq!(actor.public_key.map(|k| k.owner).unwrap(), "https://fedbox.git/actors/bob");
    }
}
