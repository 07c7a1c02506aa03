use fedi_types::{
    Account, CollectionKind, Endpoints, KeyAlgorithm, ObjectType, PublicKey, ServiceUrls,
    WireItem, WireObject,
};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::RsaPublicKey;
use tracing::debug;

/// Key identifier published for an actor.
pub fn key_id(actor_iri: &str) -> String {
    format!("{actor_iri}#main-key")
}

/// The account's wire identifier, derived from its hash when not yet known.
pub fn actor_iri(account: &Account, urls: &ServiceUrls) -> String {
    account
        .metadata
        .id
        .clone()
        .unwrap_or_else(|| urls.actor(&account.hash))
}

/// Build the wire actor for an account.
///
/// Pure function of the account and its metadata. Collection references that
/// the metadata does not carry are derived from the actor identifier, and
/// deleted accounts become tombstones.
pub fn actor_representation(account: &Account, urls: &ServiceUrls) -> WireObject {
    let id = actor_iri(account, urls);
    if account.deleted {
        let mut tombstone = WireObject::with_id(ObjectType::Tombstone, id);
        tombstone.former_type = Some(ObjectType::Person);
        tombstone.published = account.created_at;
        tombstone.deleted = account.updated_at;
        return tombstone;
    }

    let meta = &account.metadata;
    let collection = |explicit: &Option<String>, kind: CollectionKind| {
        WireItem::iri(
            explicit
                .clone()
                .unwrap_or_else(|| ServiceUrls::collection(&id, kind)),
        )
    };

    let mut actor = WireObject::with_id(ObjectType::Person, id.clone());
    if !account.handle.is_empty() {
        actor.preferred_username = Some(account.handle.clone());
    }
    actor.name = Some(account.display_name().to_string()).filter(|n| !n.is_empty());
    actor.summary = meta.blurb.clone().filter(|b| !b.is_empty());
    actor.url = meta
        .url
        .clone()
        .or_else(|| (!account.federated && !account.handle.is_empty()).then(|| profile_url(account, urls)))
        .map(WireItem::iri);
    actor.published = account.created_at;
    actor.updated = account.updated_at;
    actor.inbox = Some(collection(&meta.inbox, CollectionKind::Inbox));
    actor.outbox = Some(collection(&meta.outbox, CollectionKind::Outbox));
    actor.followers = Some(collection(&meta.followers, CollectionKind::Followers));
    actor.following = Some(collection(&meta.following, CollectionKind::Following));
    actor.liked = Some(collection(&meta.liked, CollectionKind::Liked));
    actor.attributed_to = account
        .created_by
        .as_deref()
        .and_then(Account::iri)
        .map(WireItem::iri);
    if let Some(icon) = meta.icon.as_ref().filter(|i| !i.uri.is_empty()) {
        let mut image = WireObject::new(ObjectType::Image);
        image.media_type = Some(icon.mime_type.clone()).filter(|m| !m.is_empty());
        image.url = Some(WireItem::iri(icon.uri.clone()));
        actor.icon = Some(WireItem::object(image));
    }
    if !account.federated {
        actor.generator = Some(WireItem::iri(urls.base_url.clone()));
    }
    let oauth = urls.api_url.replacen("api", "oauth", 1);
    actor.endpoints = Some(Endpoints {
        shared_inbox: Some(urls.inbox()),
        oauth_authorization_endpoint: meta
            .authorization_endpoint
            .clone()
            .or_else(|| Some(format!("{oauth}/authorize"))),
        oauth_token_endpoint: meta
            .token_endpoint
            .clone()
            .or_else(|| Some(format!("{oauth}/token"))),
    });
    actor.public_key = public_key_pem(account).map(|pem| PublicKey {
        id: key_id(&id),
        owner: id.clone(),
        public_key_pem: pem,
    });
    actor
}

/// Public profile page of a local account.
pub fn profile_url(account: &Account, urls: &ServiceUrls) -> String {
    format!("{}/~{}", urls.base_url, account.handle)
}

/// The actor standing in for logged-out callers.
pub fn anonymous_actor(urls: &ServiceUrls) -> WireObject {
    let anonymous = Account::anonymous();
    let mut actor = WireObject::with_id(ObjectType::Person, urls.actor(&anonymous.hash));
    actor.name = Some(anonymous.handle.clone());
    actor.preferred_username = Some(anonymous.handle);
    actor
}

fn public_key_pem(account: &Account) -> Option<String> {
    let from_der = account
        .metadata
        .key
        .as_ref()
        .filter(|k| k.algorithm == KeyAlgorithm::Rsa && !k.public.is_empty())
        .and_then(|k| match RsaPublicKey::from_public_key_der(&k.public) {
            Ok(key) => key.to_public_key_pem(LineEnding::LF).ok(),
            Err(e) => {
                debug!(handle = %account.handle, error = %e, "skipping unreadable public key");
                None
            }
        });
    from_der.or_else(|| account.metadata.public_key_pem.clone())
}
