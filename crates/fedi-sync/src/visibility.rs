//! Post-filter dropping items the caller should not see.

use fedi_protocol::{Filters, Operator};
use fedi_types::{Account, Item, PUBLIC_NS};

/// Who is asking, and which application they are asking through.
#[derive(Clone, Copy, Debug)]
pub struct Viewer<'a> {
    pub account: Option<&'a Account>,
    /// Public URL of the application; its own generator is not "federated".
    pub base_url: &'a str,
}

impl<'a> Viewer<'a> {
    pub fn new(account: Option<&'a Account>, base_url: &'a str) -> Self {
        Self { account, base_url }
    }

    pub fn anonymous(base_url: &'a str) -> Self {
        Self::new(None, base_url)
    }

    /// True when the viewer wrote the item or is one of its explicit recipients.
    fn is_addressed_by(&self, item: &Item) -> bool {
        let Some(viewer) = self.account.filter(|a| a.is_valid() && !a.is_anonymous()) else {
            return false;
        };
        item.author().is_some_and(|author| author.same_as(viewer))
            || item
                .metadata
                .to
                .iter()
                .chain(item.metadata.cc.iter())
                .any(|recipient| recipient.same_as(viewer))
    }
}

/// Whether `item` may be returned for a query made with `filters`.
pub fn valid_item(item: &Item, filters: &Filters, viewer: &Viewer<'_>) -> bool {
    valid_recipients(item, filters, viewer) && valid_federated(item, filters, viewer)
}

/// Private items only reach their author and explicit recipients, and never
/// a query that asked for public content.
fn valid_recipients(item: &Item, filters: &Filters, viewer: &Viewer<'_>) -> bool {
    if !item.is_private() {
        return true;
    }
    let wants_public = filters
        .recipients
        .iter()
        .any(|r| r.op == Operator::Equals && r.value == PUBLIC_NS);
    !wants_public && viewer.is_addressed_by(item)
}

/// Items published through another application pass only when a generator
/// filter lets them: `-` admits any generator but this application's own,
/// anything else admits that generator. Items with no generator pass.
fn valid_federated(item: &Item, filters: &Filters, viewer: &Viewer<'_>) -> bool {
    let Some(generator) = item.generator.as_deref() else {
        return true;
    };
    for allowed in &filters.generator {
        if allowed.is_nil() {
            return generator != viewer.base_url;
        }
        if allowed.value == generator {
            return true;
        }
    }
    false
}
