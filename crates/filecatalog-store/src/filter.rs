//! Typed query filters.
//!
//! A `Filter` is a serializable expression tree evaluated in-process against
//! candidate documents. Collection queries are stored in this serialized
//! form and re-parsed at snapshot time, so the JSON encoding is part of the
//! stored data format.

use crate::document::{Document, lookup_path};
use filecatalog_common::Location;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// A query filter over catalog documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// Matches every document
    Empty,
    /// Field equals value; an array field matches when any element equals
    /// the value, and a null value matches an absent field
    Eq { field: String, value: Value },
    /// Field value is one of the given values
    In { field: String, values: Vec<Value> },
    /// Array field with at least one element matching the subfilter
    ElemMatch { field: String, filter: Box<Filter> },
    /// Field is present
    Exists { field: String },
    /// Field is strictly less than value
    Lt { field: String, value: Value },
    /// Field is less than or equal to value
    Lte { field: String, value: Value },
    /// Field is strictly greater than value
    Gt { field: String, value: Value },
    /// Field is greater than or equal to value
    Gte { field: String, value: Value },
    /// Every subfilter matches
    And(Vec<Filter>),
    /// At least one subfilter matches
    Or(Vec<Filter>),
}

impl Filter {
    /// Field equals value
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Field value is one of the given values
    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::In {
            field: field.into(),
            values,
        }
    }

    /// Array field with at least one element matching the subfilter
    pub fn elem_match(field: impl Into<String>, filter: Self) -> Self {
        Self::ElemMatch {
            field: field.into(),
            filter: Box::new(filter),
        }
    }

    /// Field is present
    pub fn exists(field: impl Into<String>) -> Self {
        Self::Exists {
            field: field.into(),
        }
    }

    /// Field is strictly less than value
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Field is less than or equal to value
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lte {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Field is strictly greater than value
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Field is greater than or equal to value
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gte {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Every subfilter matches
    #[must_use]
    pub fn and(filters: Vec<Self>) -> Self {
        Self::And(filters)
    }

    /// At least one subfilter matches
    #[must_use]
    pub fn or(filters: Vec<Self>) -> Self {
        Self::Or(filters)
    }

    /// Filter matching any record holding a location at the same site+path
    #[must_use]
    pub fn location(location: &Location) -> Self {
        Self::elem_match(
            "locations",
            Self::and(vec![
                Self::eq("site", location.site.clone()),
                Self::eq("path", location.path.clone()),
            ]),
        )
    }

    /// Parse a filter from its serialized JSON form
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Serialize to the stored JSON form
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// The uuid a plain `uuid == value` filter addresses, when the whole
    /// filter is that single equality (backends use this for point lookups)
    #[must_use]
    pub fn exact_uuid(&self) -> Option<&str> {
        match self {
            Self::Eq { field, value } if field == "uuid" => value.as_str(),
            _ => None,
        }
    }

    /// Evaluate against a document
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        self.matches_map(doc.as_map())
    }

    fn matches_map(&self, map: &Map<String, Value>) -> bool {
        match self {
            Self::Empty => true,
            Self::Eq { field, value } => match lookup_path(map, field) {
                Some(actual) => {
                    actual == value
                        || actual
                            .as_array()
                            .is_some_and(|items| items.contains(value))
                }
                None => value.is_null(),
            },
            Self::In { field, values } => match lookup_path(map, field) {
                Some(Value::Array(items)) => items.iter().any(|item| values.contains(item)),
                Some(actual) => values.contains(actual),
                None => values.iter().any(Value::is_null),
            },
            Self::ElemMatch { field, filter } => lookup_path(map, field)
                .and_then(Value::as_array)
                .is_some_and(|items| {
                    items.iter().any(|item| {
                        item.as_object()
                            .is_some_and(|element| filter.matches_map(element))
                    })
                }),
            Self::Exists { field } => lookup_path(map, field).is_some(),
            Self::Lt { field, value } => {
                Self::compare(map, field, value).is_some_and(Ordering::is_lt)
            }
            Self::Lte { field, value } => {
                Self::compare(map, field, value).is_some_and(Ordering::is_le)
            }
            Self::Gt { field, value } => {
                Self::compare(map, field, value).is_some_and(Ordering::is_gt)
            }
            Self::Gte { field, value } => {
                Self::compare(map, field, value).is_some_and(Ordering::is_ge)
            }
            Self::And(filters) => filters.iter().all(|filter| filter.matches_map(map)),
            Self::Or(filters) => filters.iter().any(|filter| filter.matches_map(map)),
        }
    }

    /// Order the stored field value against the bound. Numbers compare
    /// numerically, strings lexicographically (which orders RFC 3339
    /// timestamps correctly); mixed types never match a range.
    fn compare(map: &Map<String, Value>, field: &str, bound: &Value) -> Option<Ordering> {
        match (lookup_path(map, field)?, bound) {
            (Value::Number(actual), Value::Number(bound)) => {
                actual.as_f64()?.partial_cmp(&bound.as_f64()?)
            }
            (Value::String(actual), Value::String(bound)) => Some(actual.as_str().cmp(bound)),
            _ => None,
        }
    }
}
