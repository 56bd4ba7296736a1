//! Property values held by documents

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Live value of a document property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Single-valued text property
    Text(String),
    /// Multi-valued property
    List(Vec<String>),
}

impl PropertyValue {
    /// Create a text value.
    pub fn text(value: impl Into<String>) -> Self {
        PropertyValue::Text(value.into())
    }

    /// An empty string or an empty list carries no value.
    pub fn is_empty(&self) -> bool {
        match self {
            PropertyValue::Text(s) => s.is_empty(),
            PropertyValue::List(items) => items.iter().all(|s| s.is_empty()),
        }
    }

    /// Compare for dirty detection.
    ///
    /// Lists compare as sets: reordering entries is not a divergence.
    pub fn same_content(&self, other: &PropertyValue) -> bool {
        match (self, other) {
            (PropertyValue::Text(a), PropertyValue::Text(b)) => a == b,
            (PropertyValue::List(a), PropertyValue::List(b)) => {
                let a: BTreeSet<&String> = a.iter().collect();
                let b: BTreeSet<&String> = b.iter().collect();
                a == b
            }
            (PropertyValue::Text(a), PropertyValue::List(b))
            | (PropertyValue::List(b), PropertyValue::Text(a)) => b.len() == 1 && &b[0] == a,
        }
    }

    /// Access the text when single-valued.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            PropertyValue::List(_) => None,
        }
    }
}

/// `None` and empty values are equivalent for every automation rule.
pub fn is_present(value: Option<&PropertyValue>) -> bool {
    value.is_some_and(|v| !v.is_empty())
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Text(s) => write!(f, "{}", s),
            PropertyValue::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(value: Vec<String>) -> Self {
        PropertyValue::List(value)
    }
}
