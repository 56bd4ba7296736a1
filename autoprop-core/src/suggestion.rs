//! Suggestion records produced by external enrichment sources, and the
//! accessor over the ordered list of records attached to a document.

use crate::{DocumentId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A candidate label with its confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub label: String,
    pub confidence: f32,
}

impl Candidate {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }

    /// A confidence outside `[0, 1]`, or NaN, makes the candidate unusable.
    pub fn is_scored(&self) -> bool {
        (0.0..=1.0).contains(&self.confidence)
    }
}

/// Candidates proposed for a single property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySuggestion {
    pub property: String,
    pub candidates: Vec<Candidate>,
}

impl PropertySuggestion {
    pub fn new(property: impl Into<String>, candidates: Vec<Candidate>) -> Self {
        Self {
            property: property.into(),
            candidates,
        }
    }

    /// Highest-confidence scored candidate. Ties go to the earlier candidate.
    pub fn top(&self) -> Option<&Candidate> {
        self.candidates
            .iter()
            .filter(|c| c.is_scored())
            .fold(None, |best: Option<&Candidate>, c| match best {
                Some(b) if b.confidence >= c.confidence => Some(b),
                _ => Some(c),
            })
    }
}

/// Free-form tag attached by a source (mirrored to search sinks elsewhere).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub kind: String,
    pub reference: Option<String>,
    pub confidence: f32,
}

/// Where a record came from and what it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionContext {
    pub document_ref: DocumentId,
    pub repository_id: String,
    pub input_properties: BTreeSet<String>,
}

/// Everything one enrichment source proposed for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionRecord {
    pub source_name: String,
    pub source_version: Option<String>,
    pub kind: String,
    pub context: SuggestionContext,
    pub property_suggestions: Vec<PropertySuggestion>,
    pub tags: Vec<Tag>,
    /// Opaque reference to the raw provider output.
    pub raw_result_ref: Option<String>,
    pub created_at: Timestamp,
}

impl SuggestionRecord {
    /// Create a record with no suggestions yet.
    pub fn new(
        source_name: impl Into<String>,
        kind: impl Into<String>,
        context: SuggestionContext,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            source_version: None,
            kind: kind.into(),
            context,
            property_suggestions: Vec::new(),
            tags: Vec::new(),
            raw_result_ref: None,
            created_at: Utc::now(),
        }
    }

    /// Add candidates for a property.
    pub fn with_suggestion(mut self, property: &str, candidates: Vec<Candidate>) -> Self {
        self.property_suggestions
            .push(PropertySuggestion::new(property, candidates));
        self
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    /// Set the source version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.source_version = Some(version.into());
        self
    }

    /// Set the raw result reference.
    pub fn with_raw_ref(mut self, raw: impl Into<String>) -> Self {
        self.raw_result_ref = Some(raw.into());
        self
    }

    /// A record with neither property suggestions nor tags carries nothing.
    pub fn is_empty(&self) -> bool {
        self.property_suggestions.iter().all(|s| s.candidates.is_empty()) && self.tags.is_empty()
    }

    /// Suggestion for `property`, if this record has one.
    pub fn suggestion_for(&self, property: &str) -> Option<&PropertySuggestion> {
        self.property_suggestions
            .iter()
            .find(|s| s.property == property && !s.candidates.is_empty())
    }
}

/// Which suggestions a removal targets. No filter at all means everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalFilter {
    pub source_name: Option<String>,
    pub properties: Option<BTreeSet<String>>,
}

impl RemovalFilter {
    /// Remove everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Remove every suggestion from one source.
    pub fn source(name: impl Into<String>) -> Self {
        Self {
            source_name: Some(name.into()),
            properties: None,
        }
    }

    /// Remove suggestions for the given properties from every source.
    pub fn properties<I, S>(properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source_name: None,
            properties: Some(properties.into_iter().map(Into::into).collect()),
        }
    }

    fn matches_source(&self, record: &SuggestionRecord) -> bool {
        self.source_name
            .as_deref()
            .map_or(true, |name| name == record.source_name)
    }

    fn matches_property(&self, property: &str) -> bool {
        self.properties
            .as_ref()
            .map_or(true, |props| props.contains(property))
    }
}

/// What a removal touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalOutcome {
    /// Records dropped entirely
    pub removed_records: usize,
    /// Properties that lost at least one suggestion
    pub affected_properties: BTreeSet<String>,
}

/// Ordered list of suggestion records attached to a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuggestionSet {
    records: Vec<SuggestionRecord>,
}

impl SuggestionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records in attachment order.
    pub fn records(&self) -> &[SuggestionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a record. A record from the same source replaces the previous
    /// one, keeping at most one active record per source.
    pub fn append(&mut self, record: SuggestionRecord) {
        self.records.retain(|r| r.source_name != record.source_name);
        self.records.push(record);
    }

    /// Names of every source with a record attached.
    pub fn sources(&self) -> BTreeSet<String> {
        self.records.iter().map(|r| r.source_name.clone()).collect()
    }

    /// Every property with at least one candidate.
    pub fn properties(&self) -> BTreeSet<String> {
        self.records
            .iter()
            .flat_map(|r| r.property_suggestions.iter())
            .filter(|s| !s.candidates.is_empty())
            .map(|s| s.property.clone())
            .collect()
    }

    /// Whether any source still proposes a candidate for `property`.
    pub fn supports(&self, property: &str) -> bool {
        self.records.iter().any(|r| r.suggestion_for(property).is_some())
    }

    /// Suggestions for `property`, paired with their record, in record order.
    pub fn for_property<'a>(
        &'a self,
        property: &'a str,
    ) -> impl Iterator<Item = (&'a SuggestionRecord, &'a PropertySuggestion)> + 'a {
        self.records
            .iter()
            .filter_map(move |r| r.suggestion_for(property).map(|s| (r, s)))
    }

    /// Remove suggestions matching `filter`.
    pub fn remove(&mut self, filter: &RemovalFilter) -> RemovalOutcome {
        let mut outcome = RemovalOutcome::default();
        let before = self.records.len();

        for record in self.records.iter_mut().filter(|r| filter.matches_source(r)) {
            if filter.properties.is_none() {
                outcome.affected_properties.extend(
                    record
                        .property_suggestions
                        .iter()
                        .filter(|s| !s.candidates.is_empty())
                        .map(|s| s.property.clone()),
                );
                record.property_suggestions.clear();
                record.tags.clear();
                continue;
            }
            record.property_suggestions.retain(|s| {
                let hit = filter.matches_property(&s.property);
                if hit && !s.candidates.is_empty() {
                    outcome.affected_properties.insert(s.property.clone());
                }
                !hit
            });
        }

        self.records.retain(|r| !r.is_empty());
        outcome.removed_records = before - self.records.len();
        outcome
    }

    /// Remove every record from `source_name`.
    pub fn remove_by_source(&mut self, source_name: &str) -> RemovalOutcome {
        self.remove(&RemovalFilter::source(source_name))
    }

    /// Remove every suggestion for `property`.
    pub fn remove_by_property(&mut self, property: &str) -> RemovalOutcome {
        self.remove(&RemovalFilter::properties([property]))
    }
}
