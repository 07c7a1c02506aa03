//! Collection query filters.
//!
//! A [`Filters`] value is turned into query parameters for the protocol
//! endpoint (`?type=Create&object.iri=...&after=...`). The same value can be
//! evaluated locally against a wire object, which is how the in-memory
//! endpoint used in tests serves filtered collections.

use std::fmt;

use fedi_types::{ObjectType, WireItem, WireObject};
use serde::{Deserialize, Serialize};

/// Value standing for "no value": `generator=-` selects objects without a generator.
pub const NIL_IRI: &str = "-";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    #[default]
    Equals,
    /// Substring, case insensitive.
    Like,
    Not,
}

/// One comparison against a string property.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompStr {
    pub op: Operator,
    pub value: String,
}

impl CompStr {
    pub fn equals(value: impl Into<String>) -> Self {
        Self {
            op: Operator::Equals,
            value: value.into(),
        }
    }

    pub fn like(value: impl Into<String>) -> Self {
        Self {
            op: Operator::Like,
            value: value.into(),
        }
    }

    pub fn not(value: impl Into<String>) -> Self {
        Self {
            op: Operator::Not,
            value: value.into(),
        }
    }

    /// Parse the query form: `x`, `~x` or `!x`.
    pub fn parse(raw: &str) -> Self {
        if let Some(value) = raw.strip_prefix('~') {
            Self::like(value)
        } else if let Some(value) = raw.strip_prefix('!') {
            Self::not(value)
        } else {
            Self::equals(raw)
        }
    }

    pub fn is_nil(&self) -> bool {
        self.value == NIL_IRI
    }

    fn holds_for(&self, value: Option<&str>) -> bool {
        let value = value.filter(|v| !v.is_empty());
        match (self.op, self.is_nil()) {
            (Operator::Equals, true) => value.is_none(),
            (Operator::Not, true) => value.is_some(),
            (Operator::Equals, false) => value == Some(self.value.as_str()),
            (Operator::Not, false) => value != Some(self.value.as_str()),
            (Operator::Like, _) => value.is_some_and(|v| {
                v.to_lowercase().contains(&self.value.to_lowercase())
            }),
        }
    }
}

impl fmt::Display for CompStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            Operator::Equals => f.write_str(&self.value),
            Operator::Like => write!(f, "~{}", self.value),
            Operator::Not => write!(f, "!{}", self.value),
        }
    }
}

/// Positive comparisons are alternatives, negations must all hold.
fn matches_any(comps: &[CompStr], values: &[&str]) -> bool {
    if comps.is_empty() {
        return true;
    }
    let test = |c: &CompStr| {
        if values.is_empty() {
            c.holds_for(None)
        } else if c.op == Operator::Not {
            values.iter().all(|v| c.holds_for(Some(*v)))
        } else {
            values.iter().any(|v| c.holds_for(Some(*v)))
        }
    };
    let (negations, positives): (Vec<&CompStr>, Vec<&CompStr>) =
        comps.iter().partition(|c| c.op == Operator::Not);
    negations.into_iter().all(test) && (positives.is_empty() || positives.into_iter().any(test))
}

/// Query over a remote collection.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filters {
    pub iri: Vec<CompStr>,
    pub name: Vec<CompStr>,
    #[serde(rename = "type")]
    pub kind: Vec<CompStr>,
    pub attr_to: Vec<CompStr>,
    pub recipients: Vec<CompStr>,
    pub generator: Vec<CompStr>,
    pub in_reply_to: Vec<CompStr>,
    /// Conditions on an activity's object.
    pub object: Option<Box<Filters>>,
    /// Conditions on an activity's actor.
    pub actor: Option<Box<Filters>>,
    /// Pagination token for the following page.
    pub next: Option<String>,
    /// Pagination token for the preceding page.
    pub prev: Option<String>,
    pub max_items: Option<usize>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types(mut self, types: &[ObjectType]) -> Self {
        self.kind
            .extend(types.iter().map(|t| CompStr::equals(t.as_str())));
        self
    }

    pub fn with_iri(mut self, iri: impl Into<String>) -> Self {
        self.iri.push(CompStr::equals(iri));
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name.push(CompStr::equals(name));
        self
    }

    pub fn with_attributed_to(mut self, iri: impl Into<String>) -> Self {
        self.attr_to.push(CompStr::equals(iri));
        self
    }

    pub fn with_object(mut self, object: Filters) -> Self {
        self.object = Some(Box::new(object));
        self
    }

    pub fn with_actor(mut self, actor: Filters) -> Self {
        self.actor = Some(Box::new(actor));
        self
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }

    /// Object types requested by equality.
    pub fn types(&self) -> Vec<ObjectType> {
        self.kind
            .iter()
            .filter(|c| c.op == Operator::Equals)
            .filter_map(|c| serde_json::from_value(serde_json::Value::String(c.value.clone())).ok())
            .filter(|t| *t != ObjectType::Unknown)
            .collect()
    }

    /// True when the filter restricts types to some of `kinds`.
    pub fn requests_any(&self, kinds: &[ObjectType]) -> bool {
        self.types().iter().any(|t| kinds.contains(t))
    }

    /// True when there is nothing to paginate or filter on.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Query string pairs, nested filters prefixed with `object.` / `actor.`.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        self.push_pairs("", &mut pairs);
        if let Some(after) = &self.next {
            pairs.push(("after".into(), after.clone()));
        }
        if let Some(before) = &self.prev {
            pairs.push(("before".into(), before.clone()));
        }
        if let Some(max) = self.max_items {
            pairs.push(("maxItems".into(), max.to_string()));
        }
        pairs
    }

    fn push_pairs(&self, prefix: &str, pairs: &mut Vec<(String, String)>) {
        let fields: [(&str, &[CompStr]); 7] = [
            ("iri", self.iri.as_slice()),
            ("name", self.name.as_slice()),
            ("type", self.kind.as_slice()),
            ("attributedTo", self.attr_to.as_slice()),
            ("recipients", self.recipients.as_slice()),
            ("generator", self.generator.as_slice()),
            ("inReplyTo", self.in_reply_to.as_slice()),
        ];
        for (key, comps) in fields {
            for comp in comps {
                pairs.push((format!("{prefix}{key}"), comp.to_string()));
            }
        }
        if let Some(object) = &self.object {
            object.push_pairs(&format!("{prefix}object."), pairs);
        }
        if let Some(actor) = &self.actor {
            actor.push_pairs(&format!("{prefix}actor."), pairs);
        }
    }

    /// Evaluate the filter against a collection member.
    pub fn matches(&self, item: &WireItem) -> bool {
        match item {
            WireItem::Object(object) => self.matches_object(object),
            WireItem::Link(iri) => self.matches_object(&WireObject {
                id: Some(iri.clone()),
                kind: ObjectType::Link,
                ..WireObject::default()
            }),
        }
    }

    fn matches_object(&self, object: &WireObject) -> bool {
        let names: Vec<&str> = object
            .name
            .as_deref()
            .into_iter()
            .chain(object.preferred_username.as_deref())
            .collect();
        let recipients: Vec<&str> = object.recipients().map(WireItem::link).collect();
        let replies: Vec<&str> = object.in_reply_to.iter().map(WireItem::link).collect();
        let id = object.link();
        let ids: Vec<&str> = if id.is_empty() { Vec::new() } else { vec![id] };

        matches_any(&self.iri, &ids)
            && matches_any(&self.name, &names)
            && matches_any(&self.kind, &[object.kind.as_str()])
            && matches_any(&self.attr_to, &link_values(&object.attributed_to))
            && matches_any(&self.recipients, &recipients)
            && matches_any(&self.generator, &link_values(&object.generator))
            && matches_any(&self.in_reply_to, &replies)
            && nested(&self.object, &object.object)
            && nested(&self.actor, &object.actor)
    }
}

fn link_values(value: &Option<WireItem>) -> Vec<&str> {
    value.as_ref().map(WireItem::link).into_iter().collect()
}

fn nested(filter: &Option<Box<Filters>>, value: &Option<WireItem>) -> bool {
    match (filter, value) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(filter), Some(value)) => filter.matches(value),
    }
}
