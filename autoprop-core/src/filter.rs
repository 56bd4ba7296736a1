//! Selection queries over document metadata
//!
//! A query is either `*` or a list of clauses joined by `AND`:
//!
//! ```text
//! ecm:primaryType = 'File' AND dc:title IS NULL AND dc:source LIKE 'scan-%'
//! ```
//!
//! `ecm:primaryType`, `ecm:repository` and `ecm:facet` address document
//! metadata; any other field names a property.

use crate::{Document, PropertyValue, QueryError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

pub const FIELD_PRIMARY_TYPE: &str = "ecm:primaryType";
pub const FIELD_REPOSITORY: &str = "ecm:repository";
pub const FIELD_FACET: &str = "ecm:facet";

/// Operator for field comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    /// Equal to
    Eq,
    /// Not equal to
    Ne,
    /// SQL-style pattern, `%` matches any run of characters
    Like,
    /// Field has no value
    IsNull,
    /// Field has a value
    IsNotNull,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::Ne => "!=",
            FilterOperator::Like => "LIKE",
            FilterOperator::IsNull => "IS NULL",
            FilterOperator::IsNotNull => "IS NOT NULL",
        }
    }

    fn takes_value(&self) -> bool {
        !matches!(self, FilterOperator::IsNull | FilterOperator::IsNotNull)
    }
}

/// One clause of a selection query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterExpr {
    /// Field to filter on
    pub field: String,
    /// Operator to apply
    pub operator: FilterOperator,
    /// Literal to compare against; absent for the null checks
    pub value: Option<String>,
}

impl FilterExpr {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: Option<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::Eq, Some(value.into()))
    }

    /// Create an IS NULL filter.
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::IsNull, None)
    }

    /// Evaluate this clause against a document.
    pub fn matches(&self, doc: &Document) -> bool {
        let literal = self.value.as_deref().unwrap_or_default();
        match self.field.as_str() {
            FIELD_PRIMARY_TYPE => self.compare_text(Some(&doc.document_type), literal),
            FIELD_REPOSITORY => self.compare_text(Some(&doc.repository_id), literal),
            FIELD_FACET => match self.operator {
                FilterOperator::Eq => doc.has_facet(literal),
                FilterOperator::Ne => !doc.has_facet(literal),
                FilterOperator::Like => doc.facets.iter().any(|f| like(f, literal)),
                FilterOperator::IsNull => doc.facets.is_empty(),
                FilterOperator::IsNotNull => !doc.facets.is_empty(),
            },
            property => self.compare_value(doc.property(property), literal),
        }
    }

    fn compare_text(&self, actual: Option<&str>, literal: &str) -> bool {
        let present = actual.is_some_and(|s| !s.is_empty());
        match self.operator {
            FilterOperator::Eq => actual == Some(literal),
            FilterOperator::Ne => actual != Some(literal),
            FilterOperator::Like => actual.is_some_and(|s| like(s, literal)),
            FilterOperator::IsNull => !present,
            FilterOperator::IsNotNull => present,
        }
    }

    fn compare_value(&self, actual: Option<&PropertyValue>, literal: &str) -> bool {
        match actual {
            Some(PropertyValue::List(items)) => {
                let present = !items.iter().all(|s| s.is_empty());
                match self.operator {
                    FilterOperator::Eq => items.iter().any(|s| s == literal),
                    FilterOperator::Ne => !items.iter().any(|s| s == literal),
                    FilterOperator::Like => items.iter().any(|s| like(s, literal)),
                    FilterOperator::IsNull => !present,
                    FilterOperator::IsNotNull => present,
                }
            }
            Some(PropertyValue::Text(s)) => self.compare_text(Some(s), literal),
            None => self.compare_text(None, literal),
        }
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{} {} '{}'", self.field, self.operator.as_str(), v),
            None => write!(f, "{} {}", self.field, self.operator.as_str()),
        }
    }
}

/// Match `text` against a pattern where `%` stands for any run of characters.
fn like(text: &str, pattern: &str) -> bool {
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return text == pattern;
    }
    let (first, rest) = (parts[0], &parts[1..]);
    let Some(mut remaining) = text.strip_prefix(first) else {
        return false;
    };
    let (last, middle) = match rest.split_last() {
        Some((last, middle)) => (*last, middle),
        None => ("", &[][..]),
    };
    for part in middle {
        match remaining.find(part) {
            Some(pos) => remaining = &remaining[pos + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last)
}

/// Parsed selection query. No clauses selects every document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionQuery {
    pub clauses: Vec<FilterExpr>,
}

impl SelectionQuery {
    /// Select everything.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_clause(mut self, clause: FilterExpr) -> Self {
        self.clauses.push(clause);
        self
    }

    /// Parse the textual form.
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::all());
        }
        let clauses = split_clauses(trimmed)
            .into_iter()
            .enumerate()
            .map(|(position, clause)| parse_clause(position, clause))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { clauses })
    }

    /// Whether every clause holds for `doc`.
    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses.iter().all(|c| c.matches(doc))
    }
}

impl FromStr for SelectionQuery {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SelectionQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.clauses.is_empty() {
            return write!(f, "*");
        }
        let parts: Vec<String> = self.clauses.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join(" AND "))
    }
}

/// Split on `AND` keywords outside of quoted literals.
fn split_clauses(input: &str) -> Vec<&str> {
    let mut clauses = Vec::new();
    let mut in_quote = false;
    let mut start = 0;
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => in_quote = !in_quote,
            b' ' | b'\t' if !in_quote => {
                let tail = &input[i + 1..];
                let tail = tail.as_bytes();
                if tail.len() >= 4
                    && tail[..3].eq_ignore_ascii_case(b"and")
                    && tail[3].is_ascii_whitespace()
                {
                    clauses.push(input[start..i].trim());
                    i += 4;
                    start = i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    clauses.push(input[start..].trim());
    clauses
}

fn clause_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<field>[A-Za-z_][\w:.\-/]*)\s*(?P<rest>.*)$")
            .unwrap_or_else(|e| unreachable!("invalid clause regex: {e}"))
    })
}

fn literal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^'(?P<value>[^']*)'$")
            .unwrap_or_else(|e| unreachable!("invalid literal regex: {e}"))
    })
}

fn parse_clause(position: usize, clause: &str) -> Result<FilterExpr, QueryError> {
    let syntax = || QueryError::Syntax {
        position,
        clause: clause.to_string(),
    };
    let caps = clause_regex().captures(clause).ok_or_else(syntax)?;
    let field = &caps["field"];
    let rest = caps["rest"].trim();
    let upper = rest.to_ascii_uppercase();

    let (operator, remainder) = if upper == "IS NOT NULL" {
        (FilterOperator::IsNotNull, "")
    } else if upper == "IS NULL" {
        (FilterOperator::IsNull, "")
    } else if let Some(r) = rest.strip_prefix("!=") {
        (FilterOperator::Ne, r)
    } else if let Some(r) = rest.strip_prefix('=') {
        (FilterOperator::Eq, r)
    } else if upper.starts_with("LIKE ") || upper.starts_with("LIKE'") {
        (FilterOperator::Like, &rest[4..])
    } else {
        let operator: String = rest
            .chars()
            .take_while(|c| !c.is_whitespace() && *c != '\'')
            .collect();
        if operator.is_empty() {
            return Err(syntax());
        }
        return Err(QueryError::UnknownOperator { operator });
    };

    let value = if operator.takes_value() {
        let caps = literal_regex()
            .captures(remainder.trim())
            .ok_or_else(syntax)?;
        Some(caps["value"].to_string())
    } else {
        None
    };

    Ok(FilterExpr::new(field, operator, value))
}
