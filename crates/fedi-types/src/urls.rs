use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::TypeError;
use crate::hash::Hash;

/// Standard per-actor and per-object collections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Inbox,
    Outbox,
    Followers,
    Following,
    Liked,
    Likes,
    Shares,
    Replies,
}

impl CollectionKind {
    pub const ALL: &'static [CollectionKind] = &[
        Self::Inbox,
        Self::Outbox,
        Self::Followers,
        Self::Following,
        Self::Liked,
        Self::Likes,
        Self::Shares,
        Self::Replies,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Outbox => "outbox",
            Self::Followers => "followers",
            Self::Following => "following",
            Self::Liked => "liked",
            Self::Likes => "likes",
            Self::Shares => "shares",
            Self::Replies => "replies",
        }
    }

    /// Which collection, if any, an IRI path ends in.
    pub fn of(iri: &str) -> Option<Self> {
        let last = iri.split(['?', '#']).next()?.trim_end_matches('/').rsplit('/').next()?;
        Self::ALL.iter().copied().find(|c| c.as_str() == last)
    }
}

/// What an IRI path points into, judged from its top-level segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferenceKind {
    Actor,
    Object,
    Activity,
}

impl ReferenceKind {
    pub fn of(iri: &str) -> Option<Self> {
        if iri.contains("/actors") {
            Some(Self::Actor)
        } else if iri.contains("/objects") {
            Some(Self::Object)
        } else if iri.contains("/activities") {
            Some(Self::Activity)
        } else {
            None
        }
    }
}

/// Base URLs of the protocol endpoint and of the application using it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceUrls {
    /// Protocol endpoint, e.g. `https://fedbox.example`.
    pub api_url: String,
    /// The application's own public URL.
    pub base_url: String,
}

impl ServiceUrls {
    pub fn new(api_url: &str, base_url: &str) -> Result<Self, TypeError> {
        for iri in [api_url, base_url] {
            let parsed = Url::parse(iri).map_err(|e| TypeError::InvalidIri {
                iri: iri.to_string(),
                reason: e.to_string(),
            })?;
            if parsed.host_str().is_none() {
                return Err(TypeError::MissingHost(iri.to_string()));
            }
        }
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn actors(&self) -> String {
        format!("{}/actors", self.api_url)
    }

    pub fn objects(&self) -> String {
        format!("{}/objects", self.api_url)
    }

    pub fn activities(&self) -> String {
        format!("{}/activities", self.api_url)
    }

    /// The service actor's shared inbox.
    pub fn inbox(&self) -> String {
        format!("{}/inbox", self.api_url)
    }

    pub fn actor(&self, hash: &Hash) -> String {
        format!("{}/{}", self.actors(), hash)
    }

    pub fn object(&self, hash: &Hash) -> String {
        format!("{}/{}", self.objects(), hash)
    }

    pub fn collection(base: &str, kind: CollectionKind) -> String {
        format!("{}/{}", base.trim_end_matches('/'), kind.as_str())
    }

    /// True when the IRI lives on the protocol endpoint or the application host.
    pub fn is_local(&self, iri: &str) -> bool {
        let Some(host) = host_of(iri) else {
            return false;
        };
        [&self.api_url, &self.base_url]
            .into_iter()
            .filter_map(|base| host_of(base))
            .any(|local| local == host)
    }

    /// Host name of the application, used for account e-mail style handles.
    pub fn host(&self) -> String {
        host_of(&self.base_url).unwrap_or_default()
    }
}

impl Default for ServiceUrls {
    fn default() -> Self {
        Self {
            api_url: "http://fedbox.git".to_string(),
            base_url: "http://littr.git".to_string(),
        }
    }
}

/// Host part of an IRI.
pub fn host_of(iri: &str) -> Option<String> {
    Url::parse(iri).ok()?.host_str().map(str::to_string)
}
