//! Per-document undo history for automated overwrites
//!
//! Entries are keyed by property, so the log holds at most one entry per
//! property and never grows past the number of properties on the document.

use crate::PropertyValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The value a property held immediately before an automated overwrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub property: String,
    pub previous_value: PropertyValue,
}

/// Keyed undo log. Last write wins per property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryLog {
    entries: BTreeMap<String, PropertyValue>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert the previous value for `property`.
    ///
    /// Returns false without touching the log when `previous` is absent or
    /// empty: only meaningful values are worth restoring.
    pub fn record(&mut self, property: &str, previous: Option<&PropertyValue>) -> bool {
        match previous {
            Some(value) if !value.is_empty() => {
                self.entries.insert(property.to_string(), value.clone());
                true
            }
            _ => false,
        }
    }

    /// Remove and return the entry for `property`.
    pub fn clear(&mut self, property: &str) -> Option<PropertyValue> {
        self.entries.remove(property)
    }

    pub fn get(&self, property: &str) -> Option<&PropertyValue> {
        self.entries.get(property)
    }

    pub fn contains(&self, property: &str) -> bool {
        self.entries.contains_key(property)
    }

    /// Entries ordered by property.
    pub fn all(&self) -> Vec<HistoryEntry> {
        self.entries
            .iter()
            .map(|(property, previous_value)| HistoryEntry {
                property: property.clone(),
                previous_value: previous_value.clone(),
            })
            .collect()
    }

    /// Replace the whole log. Later entries for the same property win.
    pub fn replace_all(&mut self, entries: impl IntoIterator<Item = HistoryEntry>) {
        self.entries.clear();
        for entry in entries {
            self.record(&entry.property, Some(&entry.previous_value));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_ignores_empty_previous() {
        let mut log = HistoryLog::new();
        assert!(!log.record("dc:title", None));
        assert!(!log.record("dc:title", Some(&PropertyValue::text(""))));
        assert!(log.is_empty());
    }

    #[test]
    fn test_record_is_last_write_wins() {
        let mut log = HistoryLog::new();
        log.record("dc:title", Some(&"first".into()));
        log.record("dc:title", Some(&"second".into()));
        assert_eq!(log.len(), 1);
        assert_eq!(log.get("dc:title"), Some(&PropertyValue::text("second")));
    }

    #[test]
    fn test_clear_returns_entry() {
        let mut log = HistoryLog::new();
        log.record("dc:format", Some(&"dog".into()));
        assert_eq!(log.clear("dc:format"), Some(PropertyValue::text("dog")));
        assert_eq!(log.clear("dc:format"), None);
    }

    #[test]
    fn test_replace_all_dedupes() {
        let mut log = HistoryLog::new();
        log.record("stale", Some(&"x".into()));
        log.replace_all(vec![
            HistoryEntry {
                property: "dc:title".into(),
                previous_value: "a".into(),
            },
            HistoryEntry {
                property: "dc:title".into(),
                previous_value: "b".into(),
            },
            HistoryEntry {
                property: "dc:nature".into(),
                previous_value: "".into(),
            },
        ]);
        let all = log.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].previous_value, PropertyValue::text("b"));
        assert!(!log.contains("stale"));
    }
}
