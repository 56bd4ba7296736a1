//! Document handle: live properties plus automation bookkeeping
//!
//! A document carries its properties, the automation state per property,
//! the attached suggestion records and the undo history. All automation
//! writes go through the engine; the setters here are the raw primitives.

use crate::{
    is_present, AutomationMarker, DocumentId, HistoryLog, PropertyValue, SuggestionSet, Timestamp,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Facet a document carries while suggestion records are attached.
pub const ENRICHABLE_FACET: &str = "Enrichable";

/// Automation bookkeeping for one property.
///
/// `applied_value` is the value the engine last wrote, used for dirty
/// detection. A state with `marker == None` is a tombstone left behind by a
/// reset that kept its bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoState {
    pub marker: AutomationMarker,
    pub applied_value: Option<PropertyValue>,
    pub note: Option<String>,
    pub applied_at: Timestamp,
}

impl AutoState {
    pub fn new(marker: AutomationMarker, applied_value: Option<PropertyValue>) -> Self {
        Self {
            marker,
            applied_value,
            note: None,
            applied_at: Utc::now(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// A content item with named properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub repository_id: String,
    pub document_type: String,
    pub facets: BTreeSet<String>,
    properties: BTreeMap<String, PropertyValue>,
    auto: BTreeMap<String, AutoState>,
    suggestions: SuggestionSet,
    history: HistoryLog,
    /// Bumped by the store on every committed save
    pub version: u64,
    pub updated_at: Timestamp,
}

impl Document {
    /// Create an empty document of `document_type` in `repository_id`.
    pub fn new(repository_id: impl Into<String>, document_type: impl Into<String>) -> Self {
        Self {
            id: DocumentId::now_v7(),
            repository_id: repository_id.into(),
            document_type: document_type.into(),
            facets: BTreeSet::new(),
            properties: BTreeMap::new(),
            auto: BTreeMap::new(),
            suggestions: SuggestionSet::new(),
            history: HistoryLog::new(),
            version: 0,
            updated_at: Utc::now(),
        }
    }

    /// Builder-style property setter.
    pub fn with_property(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.set_property(name, value.into());
        self
    }

    /// Builder-style facet setter.
    pub fn with_facet(mut self, facet: impl Into<String>) -> Self {
        self.facets.insert(facet.into());
        self
    }

    // --- properties ---------------------------------------------------------

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Whether `name` holds a non-empty value.
    pub fn has_value(&self, name: &str) -> bool {
        is_present(self.properties.get(name))
    }

    pub fn set_property(&mut self, name: &str, value: PropertyValue) {
        self.properties.insert(name.to_string(), value);
    }

    /// Remove the value of `name`, returning it.
    pub fn clear_property(&mut self, name: &str) -> Option<PropertyValue> {
        self.properties.remove(name)
    }

    pub fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    // --- facets -------------------------------------------------------------

    pub fn has_facet(&self, facet: &str) -> bool {
        self.facets.contains(facet)
    }

    pub fn add_facet(&mut self, facet: &str) -> bool {
        self.facets.insert(facet.to_string())
    }

    pub fn remove_facet(&mut self, facet: &str) -> bool {
        self.facets.remove(facet)
    }

    // --- automation ---------------------------------------------------------

    /// Current marker on `name`; unmarked properties report `None`.
    pub fn marker(&self, name: &str) -> AutomationMarker {
        self.auto
            .get(name)
            .map(|s| s.marker)
            .unwrap_or_default()
    }

    pub fn auto_state(&self, name: &str) -> Option<&AutoState> {
        self.auto.get(name)
    }

    pub fn auto_states(&self) -> &BTreeMap<String, AutoState> {
        &self.auto
    }

    pub fn set_auto_state(&mut self, name: &str, state: AutoState) {
        self.auto.insert(name.to_string(), state);
    }

    pub fn remove_auto_state(&mut self, name: &str) -> Option<AutoState> {
        self.auto.remove(name)
    }

    /// Properties whose marker is AUTO_FILLED or AUTO_CORRECTED.
    pub fn marked_properties(&self) -> BTreeSet<String> {
        self.auto
            .iter()
            .filter(|(_, s)| s.marker.is_automated())
            .map(|(p, _)| p.clone())
            .collect()
    }

    // --- suggestions / history ---------------------------------------------

    pub fn suggestions(&self) -> &SuggestionSet {
        &self.suggestions
    }

    pub fn suggestions_mut(&mut self) -> &mut SuggestionSet {
        &mut self.suggestions
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryLog {
        &mut self.history
    }

    /// Drop the enrichable facet once no records remain.
    pub fn sync_enrichable_facet(&mut self) {
        if self.suggestions.is_empty() {
            self.facets.remove(ENRICHABLE_FACET);
        } else {
            self.facets.insert(ENRICHABLE_FACET.to_string());
        }
    }

    /// Record a committed save.
    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    /// Properties whose value differs between `self` and `before`.
    pub fn changed_properties(&self, before: &Document) -> BTreeSet<String> {
        self.properties
            .keys()
            .chain(before.properties.keys())
            .filter(|name| self.properties.get(*name) != before.properties.get(*name))
            .cloned()
            .collect()
    }
}
