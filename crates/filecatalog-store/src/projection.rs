//! Projection and pagination.
//!
//! Every read path funnels through here: a [`Projection`] decides which
//! fields of a stored document come back (never the internal row id), and a
//! [`Page`] bounds how much of a cursor is materialized.

use crate::document::{Document, RID_FIELD};
use crate::store::{DocCursor, StoreResult};
use futures::StreamExt;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Field selection for a read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keys {
    /// Every field
    All,
    /// Exactly the named fields; a dotted path selects nested members
    Fields(Vec<String>),
}

impl Keys {
    /// Build a field list from anything yielding names
    pub fn fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Fields(names.into_iter().map(Into::into).collect())
    }
}

/// A read projection: which fields of a stored document are returned.
///
/// The store-internal row id is stripped unconditionally. Dotted paths
/// narrow nested objects to the named members and apply element-wise to
/// arrays, the same traversal filters use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    /// `None` means all fields
    include: Option<BTreeMap<String, Include>>,
}

impl Projection {
    /// Build a projection from the requested keys and a per-collection
    /// default field list.
    ///
    /// No request falls back to the default list when one is given and to
    /// all fields otherwise; an explicit [`Keys::All`] always means all
    /// fields.
    #[must_use]
    pub fn build(requested: Option<Keys>, default_fields: Option<&[&str]>) -> Self {
        let include = match requested {
            None => default_fields.map(|fields| include_tree(fields.iter().copied())),
            Some(Keys::All) => None,
            Some(Keys::Fields(fields)) => Some(include_tree(fields.iter().map(String::as_str))),
        };
        Self { include }
    }

    /// Projection returning every field
    #[must_use]
    pub const fn all() -> Self {
        Self { include: None }
    }

    /// Apply to a document, producing the projected copy
    #[must_use]
    pub fn apply(&self, doc: &Document) -> Document {
        match &self.include {
            None => {
                let mut out = doc.clone();
                out.remove(RID_FIELD);
                out
            }
            Some(members) => {
                let mut out = Document::new();
                for (name, include) in members {
                    if let Some(value) =
                        doc.get(name).and_then(|held| project_field(held, include))
                    {
                        out.set(name.clone(), value);
                    }
                }
                out
            }
        }
    }
}

/// One node of the include tree a field list compiles into
#[derive(Debug, Clone, PartialEq, Eq)]
enum Include {
    /// The whole value
    Whole,
    /// Only the named members, recursively
    Members(BTreeMap<String, Include>),
}

/// Compile field paths into an include tree. A request for a whole field
/// supersedes any dotted request beneath it, and the row id cannot be
/// requested, dotted or not.
fn include_tree<'a>(fields: impl IntoIterator<Item = &'a str>) -> BTreeMap<String, Include> {
    let mut tree = BTreeMap::new();
    for field in fields {
        let segments: Vec<&str> = field.split('.').collect();
        if segments.first().copied() == Some(RID_FIELD) {
            continue;
        }
        insert_path(&mut tree, &segments);
    }
    tree
}

fn insert_path(tree: &mut BTreeMap<String, Include>, segments: &[&str]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        tree.insert((*head).to_string(), Include::Whole);
        return;
    }
    match tree
        .entry((*head).to_string())
        .or_insert_with(|| Include::Members(BTreeMap::new()))
    {
        Include::Whole => {}
        Include::Members(members) => insert_path(members, rest),
    }
}

/// Project one stored value through an include node. Objects narrow to the
/// named members; arrays apply the node to every element, so a dotted path
/// reaches each location of a record; a scalar with path segments left
/// yields nothing.
fn project_field(value: &Value, include: &Include) -> Option<Value> {
    match include {
        Include::Whole => Some(value.clone()),
        Include::Members(members) => match value {
            Value::Object(map) => {
                let mut out = Map::new();
                for (name, inner) in members {
                    if let Some(projected) =
                        map.get(name).and_then(|held| project_field(held, inner))
                    {
                        out.insert(name.clone(), projected);
                    }
                }
                Some(Value::Object(out))
            }
            Value::Array(items) => Some(Value::Array(
                items
                    .iter()
                    .filter_map(|item| project_field(item, include))
                    .collect(),
            )),
            _ => None,
        },
    }
}

/// A listing window: up to `limit` documents starting at offset `start`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Page {
    /// Maximum documents returned; `None` means unbounded
    pub limit: Option<usize>,
    /// Matches skipped before the first returned document
    pub start: usize,
}

impl Page {
    /// Create a page
    #[must_use]
    pub const fn new(limit: Option<usize>, start: usize) -> Self {
        Self { limit, start }
    }

    /// Cap the limit at `cap`; an absent limit becomes `cap`
    #[must_use]
    pub fn clamped(self, cap: usize) -> Self {
        Self {
            limit: Some(self.limit.map_or(cap, |limit| limit.min(cap))),
            start: self.start,
        }
    }
}

/// Collect the window `[page.start, page.start + page.limit)` from a cursor.
///
/// Documents before `start` are decoded and dropped one at a time, never
/// buffered, and iteration stops as soon as the window is full. Only the
/// returned window is held in memory.
pub async fn window(mut cursor: DocCursor, page: Page) -> StoreResult<Vec<Document>> {
    if page.limit == Some(0) {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    let mut skipped = 0usize;
    while let Some(doc) = cursor.next().await {
        let doc = doc?;
        if skipped < page.start {
            skipped += 1;
            continue;
        }
        out.push(doc);
        if page.limit.is_some_and(|limit| out.len() == limit) {
            break;
        }
    }
    Ok(out)
}
