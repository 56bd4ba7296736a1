//! Save-time detection of human overrides

use crate::engine::AutoPropertyEngine;
use autoprop_core::{AutoPropResult, Document};
use autoprop_storage::SaveHook;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Demotes automated properties a save has overwritten.
///
/// Only properties changed by the save are checked. Engine writes refresh
/// the applied value, so they never read as dirty, and demotion does not
/// save again.
#[derive(Debug, Clone)]
pub struct DirtyPropertyMonitor {
    engine: Arc<AutoPropertyEngine>,
}

impl DirtyPropertyMonitor {
    pub fn new(engine: Arc<AutoPropertyEngine>) -> Self {
        Self { engine }
    }
}

impl SaveHook for DirtyPropertyMonitor {
    fn on_save(&self, doc: &mut Document, changed: &BTreeSet<String>) -> AutoPropResult<()> {
        let view: &Document = doc;
        let dirty: Vec<String> = changed
            .iter()
            .filter(|p| self.engine.is_dirty(view, p))
            .cloned()
            .collect();

        for property in dirty {
            if self.engine.approve_auto_property(doc, &property) {
                tracing::debug!(
                    document_id = %doc.id,
                    property = %property,
                    "Human edit demoted automated property"
                );
            }
        }
        Ok(())
    }
}
