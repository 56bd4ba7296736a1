//! Auto-property state machine
//!
//! Per (document, property):
//!
//! ```text
//! UNSET          --FILL-->     AUTO_FILLED
//! UNSET | HUMAN  --CORRECT-->  AUTO_CORRECTED   (old value -> history)
//! AUTO_CORRECTED --CORRECT-->  AUTO_CORRECTED   (history entry replaced)
//! AUTO_FILLED    --CORRECT-->  no-op
//! AUTO_*         --reset-->    UNSET | HUMAN    (history consumed)
//! AUTO_*         --approve-->  HUMAN            (suggestions retired)
//! ```
//!
//! Every operation takes `&mut Document`; callers run it inside the store's
//! per-document transaction.

use crate::projection::SuggestionProjection;
use crate::thresholds::ThresholdResolver;
use autoprop_core::{
    is_present, AutoAction, AutoState, AutomationMarker, Document, EngineConfig, PropertyValue,
    RemovalFilter, RemovalOutcome, SuggestionRecord, ThresholdConfig,
};
use std::collections::BTreeSet;

/// Why a property was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// FILL on a property that already holds a value
    HasValue,
    /// The marker forbids this action (CORRECT over AUTO_FILLED)
    Ineligible,
    /// The property already holds the candidate
    Unchanged,
    /// The candidate carries no value
    EmptyCandidate,
}

/// Outcome of the transition guard for one property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Write the candidate; `previous` goes to history when present
    Apply { previous: Option<PropertyValue> },
    Skip(SkipReason),
}

/// Transition guard, defined for every (action, marker, value) input.
pub fn plan(
    action: AutoAction,
    marker: AutomationMarker,
    current: Option<&PropertyValue>,
    candidate: &PropertyValue,
) -> Transition {
    if candidate.is_empty() {
        return Transition::Skip(SkipReason::EmptyCandidate);
    }
    match (action, marker) {
        (AutoAction::Fill, AutomationMarker::AutoCorrected) => {
            Transition::Skip(SkipReason::Ineligible)
        }
        (AutoAction::Fill, _) if is_present(current) => Transition::Skip(SkipReason::HasValue),
        (AutoAction::Fill, _) => Transition::Apply { previous: None },
        (AutoAction::Correct, AutomationMarker::AutoFilled) => {
            Transition::Skip(SkipReason::Ineligible)
        }
        (AutoAction::Correct, _) if current.is_some_and(|c| c.same_content(candidate)) => {
            Transition::Skip(SkipReason::Unchanged)
        }
        (AutoAction::Correct, _) => Transition::Apply {
            previous: current.filter(|c| !c.is_empty()).cloned(),
        },
    }
}

/// Shape a candidate label like the value it replaces.
fn candidate_value(current: Option<&PropertyValue>, label: &str) -> PropertyValue {
    match current {
        Some(PropertyValue::List(_)) => PropertyValue::List(vec![label.to_string()]),
        _ => PropertyValue::text(label),
    }
}

/// Result of an ingest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    pub attached: bool,
    pub applied: Vec<String>,
}

/// Result of a suggestion removal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalReport {
    pub outcome: RemovalOutcome,
    /// Properties whose automation was rolled back
    pub rolled_back: Vec<String>,
}

/// Applies suggestions to documents under FILL / CORRECT semantics.
#[derive(Debug, Clone, Default)]
pub struct AutoPropertyEngine {
    resolver: ThresholdResolver,
    config: EngineConfig,
}

impl AutoPropertyEngine {
    pub fn new(resolver: ThresholdResolver, config: EngineConfig) -> Self {
        Self { resolver, config }
    }

    pub fn with_thresholds(thresholds: ThresholdConfig) -> Self {
        Self::new(ThresholdResolver::new(thresholds), EngineConfig::default())
    }

    pub fn resolver(&self) -> &ThresholdResolver {
        &self.resolver
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Apply `action` to every property whose best candidate clears its
    /// threshold. Returns the properties that changed.
    pub fn calculate_properties(&self, doc: &mut Document, action: AutoAction) -> Vec<String> {
        let mut applied = Vec::new();

        for property in doc.suggestions().properties() {
            let Some(best) = SuggestionProjection::new(doc).best_candidate(&property) else {
                continue;
            };
            let threshold = self.resolver.threshold(doc, &property, action);
            if !best.candidate.is_scored() || best.candidate.confidence < threshold {
                continue;
            }

            let marker = doc.marker(&property);
            let value = candidate_value(doc.property(&property), &best.candidate.label);
            match plan(action, marker, doc.property(&property), &value) {
                Transition::Apply { previous } => {
                    doc.set_property(&property, value);
                    let target = AutomationMarker::for_action(action);
                    self.update_auto(doc, target, &property, previous.as_ref(), None);
                    tracing::debug!(
                        document_id = %doc.id,
                        property = %property,
                        action = ?action,
                        source = %best.source_name,
                        confidence = best.candidate.confidence,
                        "Applied suggestion"
                    );
                    applied.push(property);
                }
                Transition::Skip(reason) => {
                    tracing::trace!(
                        document_id = %doc.id,
                        property = %property,
                        action = ?action,
                        reason = ?reason,
                        "Skipped suggestion"
                    );
                }
            }
        }

        applied
    }

    /// FILL then CORRECT, so FILL claims empty properties first.
    pub fn apply_all(&self, doc: &mut Document) -> Vec<String> {
        let mut applied = self.calculate_properties(doc, AutoAction::Fill);
        applied.extend(self.calculate_properties(doc, AutoAction::Correct));
        applied
    }

    /// Set `marker` on `property`, snapshot the live value as the applied
    /// value, and upsert history when `previous` is non-empty.
    pub fn update_auto(
        &self,
        doc: &mut Document,
        marker: AutomationMarker,
        property: &str,
        previous: Option<&PropertyValue>,
        note: Option<&str>,
    ) {
        debug_assert!(
            !(marker == AutomationMarker::AutoCorrected
                && doc.marker(property) == AutomationMarker::AutoFilled),
            "AUTO_CORRECTED over AUTO_FILLED on {property}"
        );
        debug_assert!(
            !(marker == AutomationMarker::AutoFilled && is_present(previous)),
            "AUTO_FILLED destroyed a value on {property}"
        );

        let note = note.unwrap_or(self.config.default_note.as_str());
        let state = AutoState::new(marker, doc.property(property).cloned()).with_note(note);
        doc.set_auto_state(property, state);
        doc.history_mut().record(property, previous);
    }

    /// Undo automation on `property` if it carries `marker`.
    ///
    /// Restores the recorded previous value, or clears the property when
    /// none was recorded. With `discard_history` the bookkeeping is dropped;
    /// otherwise an unmarked tombstone stays behind.
    pub fn reset_auto(
        &self,
        doc: &mut Document,
        marker: AutomationMarker,
        property: &str,
        discard_history: bool,
    ) -> bool {
        if !marker.is_automated() || doc.marker(property) != marker {
            return false;
        }

        match doc.history_mut().clear(property) {
            Some(previous) => doc.set_property(property, previous),
            None => {
                doc.clear_property(property);
            }
        }

        match doc.remove_auto_state(property) {
            Some(mut state) if !discard_history => {
                state.marker = AutomationMarker::None;
                doc.set_auto_state(property, state);
            }
            _ => {}
        }

        tracing::debug!(
            document_id = %doc.id,
            property = %property,
            marker = %marker,
            discard_history,
            "Reset automated property"
        );
        true
    }

    /// Turn an automated value into a human one and retire its suggestions.
    pub fn approve_auto_property(&self, doc: &mut Document, property: &str) -> bool {
        if !doc.marker(property).is_automated() {
            return false;
        }

        doc.remove_auto_state(property);
        doc.history_mut().clear(property);
        doc.suggestions_mut().remove_by_property(property);
        doc.sync_enrichable_facet();

        tracing::debug!(document_id = %doc.id, property = %property, "Approved automated property");
        true
    }

    /// Whether a marked property no longer holds the value last applied.
    pub fn is_dirty(&self, doc: &Document, property: &str) -> bool {
        let Some(state) = doc.auto_state(property) else {
            return false;
        };
        if !state.marker.is_automated() {
            return false;
        }
        !matches!(
            (doc.property(property), state.applied_value.as_ref()),
            (Some(live), Some(applied)) if live.same_content(applied)
        )
    }

    pub fn dirty_properties(&self, doc: &Document) -> BTreeSet<String> {
        doc.marked_properties()
            .into_iter()
            .filter(|p| self.is_dirty(doc, p))
            .collect()
    }

    /// Approve every dirty property.
    pub fn auto_approve_dirty_properties(&self, doc: &mut Document) -> Vec<String> {
        let dirty = self.dirty_properties(doc);
        dirty
            .into_iter()
            .filter(|p| self.approve_auto_property(doc, p))
            .collect()
    }

    /// Remove matching suggestions, rolling back properties left without
    /// support.
    pub fn remove_suggestions(&self, doc: &mut Document, filter: &RemovalFilter) -> RemovalReport {
        let outcome = doc.suggestions_mut().remove(filter);
        let mut rolled_back = Vec::new();

        for property in &outcome.affected_properties {
            if doc.suggestions().supports(property) {
                continue;
            }
            let marker = doc.marker(property);
            if self.reset_auto(doc, marker, property, true) {
                rolled_back.push(property.clone());
            } else {
                doc.remove_auto_state(property);
            }
        }
        doc.sync_enrichable_facet();

        RemovalReport {
            outcome,
            rolled_back,
        }
    }

    /// Attach a record. Empty records are dropped; a record from a source
    /// already on the document replaces it.
    pub fn ingest(&self, doc: &mut Document, record: SuggestionRecord) -> IngestOutcome {
        if record.is_empty() {
            tracing::debug!(
                document_id = %doc.id,
                source = %record.source_name,
                "Discarding empty suggestion record"
            );
            return IngestOutcome::default();
        }

        doc.suggestions_mut().append(record);
        doc.sync_enrichable_facet();

        let applied = if self.config.auto_apply_on_ingest {
            self.apply_all(doc)
        } else {
            Vec::new()
        };
        IngestOutcome {
            attached: true,
            applied,
        }
    }
}
