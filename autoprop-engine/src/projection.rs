//! Per-property view over a document's suggestion records and markers

use autoprop_core::{AutomationMarker, Candidate, Document};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A candidate together with the source that proposed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcedCandidate {
    pub source_name: String,
    pub candidate: Candidate,
}

/// Projection of one property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyProjection {
    pub marker: AutomationMarker,
    pub has_value: bool,
    /// Best candidate of each contributing source, in record order
    pub best_per_source: Vec<SourcedCandidate>,
    /// A reset left applied-value bookkeeping behind
    pub previously_applied: bool,
}

impl PropertyProjection {
    pub fn sources(&self) -> Vec<&str> {
        self.best_per_source
            .iter()
            .map(|c| c.source_name.as_str())
            .collect()
    }
}

/// Automation state of every property referenced by a suggestion record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyAutomationState {
    pub properties: BTreeMap<String, PropertyProjection>,
    pub sources: BTreeSet<String>,
    pub auto_properties: BTreeSet<String>,
}

impl PropertyAutomationState {
    pub fn get(&self, property: &str) -> Option<&PropertyProjection> {
        self.properties.get(property)
    }
}

/// Read-only queries over one document.
#[derive(Debug, Clone, Copy)]
pub struct SuggestionProjection<'a> {
    doc: &'a Document,
}

impl<'a> SuggestionProjection<'a> {
    pub fn new(doc: &'a Document) -> Self {
        Self { doc }
    }

    /// Build the full projection.
    pub fn project(&self) -> PropertyAutomationState {
        let properties = self
            .doc
            .suggestions()
            .properties()
            .into_iter()
            .map(|property| {
                let projection = PropertyProjection {
                    marker: self.doc.marker(&property),
                    has_value: self.doc.has_value(&property),
                    best_per_source: self.best_per_source(&property),
                    previously_applied: self
                        .doc
                        .auto_state(&property)
                        .is_some_and(|s| !s.marker.is_automated()),
                };
                (property, projection)
            })
            .collect();

        PropertyAutomationState {
            properties,
            sources: self.sources(),
            auto_properties: self.auto_properties(),
        }
    }

    pub fn is_auto_filled(&self, property: &str) -> bool {
        self.doc.marker(property) == AutomationMarker::AutoFilled
    }

    pub fn is_auto_corrected(&self, property: &str) -> bool {
        self.doc.marker(property) == AutomationMarker::AutoCorrected
    }

    /// No marker and a value present.
    pub fn has_human_value(&self, property: &str) -> bool {
        !self.doc.marker(property).is_automated() && self.doc.has_value(property)
    }

    /// Names of all sources with a record on the document.
    pub fn sources(&self) -> BTreeSet<String> {
        self.doc.suggestions().sources()
    }

    /// Properties carrying AUTO_FILLED or AUTO_CORRECTED.
    pub fn auto_properties(&self) -> BTreeSet<String> {
        self.doc.marked_properties()
    }

    /// Every candidate for `property`, by record then candidate order.
    pub fn suggestions_by_property(&self, property: &str) -> Vec<SourcedCandidate> {
        self.doc
            .suggestions()
            .for_property(property)
            .flat_map(|(record, suggestion)| {
                suggestion.candidates.iter().map(|c| SourcedCandidate {
                    source_name: record.source_name.clone(),
                    candidate: c.clone(),
                })
            })
            .collect()
    }

    /// Top candidate of each source proposing `property`.
    pub fn best_per_source(&self, property: &str) -> Vec<SourcedCandidate> {
        self.doc
            .suggestions()
            .for_property(property)
            .filter_map(|(record, suggestion)| {
                suggestion.top().map(|c| SourcedCandidate {
                    source_name: record.source_name.clone(),
                    candidate: c.clone(),
                })
            })
            .collect()
    }

    /// Highest-confidence candidate across sources; ties go to the earlier
    /// record.
    pub fn best_candidate(&self, property: &str) -> Option<SourcedCandidate> {
        self.best_per_source(property)
            .into_iter()
            .fold(None, |best: Option<SourcedCandidate>, c| match best {
                Some(b) if b.candidate.confidence >= c.candidate.confidence => Some(b),
                _ => Some(c),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoprop_core::{AutoState, SuggestionContext, SuggestionRecord};

    fn doc_with_sources() -> Document {
        let mut doc = Document::new("default", "File").with_property("dc:title", "Mine");
        let ctx = SuggestionContext {
            document_ref: doc.id,
            repository_id: "default".into(),
            input_properties: BTreeSet::new(),
        };
        doc.suggestions_mut().append(
            SuggestionRecord::new("a", "suggestion", ctx.clone())
                .with_suggestion(
                    "dc:format",
                    vec![Candidate::new("dog", 0.4), Candidate::new("cat", 0.8)],
                )
                .with_suggestion("dc:title", vec![Candidate::new("Theirs", 0.9)]),
        );
        doc.suggestions_mut().append(
            SuggestionRecord::new("b", "suggestion", ctx)
                .with_suggestion("dc:format", vec![Candidate::new("cow", 0.8)]),
        );
        doc
    }

    #[test]
    fn test_best_candidate_ties_go_to_earlier_record() {
        let doc = doc_with_sources();
        let p = SuggestionProjection::new(&doc);
        let best = p.best_candidate("dc:format").unwrap();
        assert_eq!(best.source_name, "a");
        assert_eq!(best.candidate.label, "cat");
        assert!(p.best_candidate("dc:nature").is_none());
    }

    #[test]
    fn test_suggestions_by_property_keeps_order() {
        let doc = doc_with_sources();
        let labels: Vec<String> = SuggestionProjection::new(&doc)
            .suggestions_by_property("dc:format")
            .into_iter()
            .map(|c| c.candidate.label)
            .collect();
        assert_eq!(labels, vec!["dog", "cat", "cow"]);
    }

    #[test]
    fn test_project_reports_markers_and_sources() {
        let mut doc = doc_with_sources();
        doc.set_property("dc:format", "cat".into());
        doc.set_auto_state(
            "dc:format",
            AutoState::new(AutomationMarker::AutoFilled, Some("cat".into())),
        );

        let p = SuggestionProjection::new(&doc);
        let state = p.project();
        assert_eq!(state.sources, BTreeSet::from(["a".to_string(), "b".to_string()]));
        assert_eq!(state.auto_properties, BTreeSet::from(["dc:format".to_string()]));

        let format = state.get("dc:format").unwrap();
        assert_eq!(format.marker, AutomationMarker::AutoFilled);
        assert!(format.has_value);
        assert_eq!(format.sources(), vec!["a", "b"]);

        let title = state.get("dc:title").unwrap();
        assert_eq!(title.marker, AutomationMarker::None);
        assert!(p.has_human_value("dc:title"));
        assert!(!p.has_human_value("dc:format"));
        assert!(p.is_auto_filled("dc:format"));
        assert!(!p.is_auto_corrected("dc:format"));
    }

    #[test]
    fn test_tombstone_reported_as_previously_applied() {
        let mut doc = doc_with_sources();
        doc.set_auto_state("dc:format", AutoState::new(AutomationMarker::None, Some("cat".into())));
        let state = SuggestionProjection::new(&doc).project();
        assert!(state.get("dc:format").unwrap().previously_applied);
        assert!(state.auto_properties.is_empty());
    }
}
