//! By-id operations through a document store
//!
//! Each call is one save on one document. A missing document surfaces as
//! `StorageError::NotFound` and nothing is written.

use crate::engine::{AutoPropertyEngine, IngestOutcome, RemovalReport};
use crate::monitor::DirtyPropertyMonitor;
use crate::projection::{PropertyAutomationState, SuggestionProjection};
use autoprop_core::{
    AutoAction, AutoPropResult, AutomationMarker, Document, DocumentId, PropertyValue,
    RemovalFilter, StorageError, SuggestionRecord,
};
use autoprop_storage::DocumentStore;
use std::sync::Arc;

/// Engine bound to a store, with the dirty-property monitor installed.
#[derive(Clone)]
pub struct DocumentService {
    store: Arc<dyn DocumentStore>,
    engine: Arc<AutoPropertyEngine>,
}

impl DocumentService {
    /// Bind `engine` to `store` and register its save hook.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        engine: Arc<AutoPropertyEngine>,
    ) -> AutoPropResult<Self> {
        store.register_hook(Arc::new(DirtyPropertyMonitor::new(Arc::clone(&engine))))?;
        Ok(Self { store, engine })
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn engine(&self) -> &Arc<AutoPropertyEngine> {
        &self.engine
    }

    fn mutate<T>(
        &self,
        id: DocumentId,
        mut op: impl FnMut(&AutoPropertyEngine, &mut Document) -> T,
    ) -> AutoPropResult<(T, Document)> {
        let mut result = None;
        let doc = self.store.document_mutate(id, &mut |doc| {
            result = Some(op(&self.engine, doc));
            Ok(())
        })?;
        result.map(|value| (value, doc)).ok_or_else(|| {
            StorageError::TransactionFailed {
                id,
                reason: "mutation was not applied".to_string(),
            }
            .into()
        })
    }

    /// Attach a suggestion record to the document it names.
    pub fn ingest(&self, record: SuggestionRecord) -> AutoPropResult<IngestOutcome> {
        let id = record.context.document_ref;
        let source = record.source_name.clone();
        let mut record = Some(record);

        let result = self.mutate(id, |engine, doc| match record.take() {
            Some(r) => engine.ingest(doc, r),
            None => IngestOutcome::default(),
        });
        match result {
            Ok((outcome, _)) => Ok(outcome),
            Err(e) => {
                if e.is_not_found() {
                    tracing::warn!(
                        document_id = %id,
                        source = %source,
                        "Suggestion target not found"
                    );
                }
                Err(e)
            }
        }
    }

    pub fn calculate_properties(
        &self,
        id: DocumentId,
        action: AutoAction,
    ) -> AutoPropResult<Vec<String>> {
        self.mutate(id, |engine, doc| engine.calculate_properties(doc, action))
            .map(|(applied, _)| applied)
    }

    /// FILL then CORRECT in a single save.
    pub fn apply(&self, id: DocumentId) -> AutoPropResult<Vec<String>> {
        self.mutate(id, |engine, doc| engine.apply_all(doc))
            .map(|(applied, _)| applied)
    }

    pub fn reset_auto(
        &self,
        id: DocumentId,
        marker: AutomationMarker,
        property: &str,
        discard_history: bool,
    ) -> AutoPropResult<bool> {
        self.mutate(id, |engine, doc| {
            engine.reset_auto(doc, marker, property, discard_history)
        })
        .map(|(reset, _)| reset)
    }

    pub fn approve_auto_property(&self, id: DocumentId, property: &str) -> AutoPropResult<bool> {
        self.mutate(id, |engine, doc| engine.approve_auto_property(doc, property))
            .map(|(approved, _)| approved)
    }

    pub fn auto_approve_dirty_properties(&self, id: DocumentId) -> AutoPropResult<Vec<String>> {
        self.mutate(id, |engine, doc| engine.auto_approve_dirty_properties(doc))
            .map(|(approved, _)| approved)
    }

    pub fn remove_suggestions(
        &self,
        id: DocumentId,
        filter: &RemovalFilter,
    ) -> AutoPropResult<RemovalReport> {
        self.mutate(id, |engine, doc| engine.remove_suggestions(doc, filter))
            .map(|(report, _)| report)
    }

    /// Plain property write, as a human editor would save it.
    pub fn set_property(
        &self,
        id: DocumentId,
        property: &str,
        value: PropertyValue,
    ) -> AutoPropResult<Document> {
        self.mutate(id, |_, doc| doc.set_property(property, value.clone()))
            .map(|(_, doc)| doc)
    }

    pub fn get(&self, id: DocumentId) -> AutoPropResult<Option<Document>> {
        self.store.document_get(id)
    }

    /// Projection of a committed document; `None` when it does not exist.
    pub fn project(&self, id: DocumentId) -> AutoPropResult<Option<PropertyAutomationState>> {
        Ok(self
            .store
            .document_get(id)?
            .map(|doc| SuggestionProjection::new(&doc).project()))
    }
}
