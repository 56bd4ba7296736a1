//! Threshold resolution
//!
//! Lookup order for each of fill and correct, independently:
//! 1. exact (document type, property)
//! 2. exact (facet, property), facets in name order
//! 3. document-type default
//! 4. facet default
//! 5. global default

use autoprop_core::{AutoAction, Document, ThresholdConfig, ThresholdPair};
use std::sync::Arc;

/// Resolved thresholds for one property.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub fill: f32,
    pub correct: f32,
}

impl Thresholds {
    pub fn for_action(&self, action: AutoAction) -> f32 {
        match action {
            AutoAction::Fill => self.fill,
            AutoAction::Correct => self.correct,
        }
    }
}

/// Maps (document type, property) to thresholds. Never fails.
#[derive(Debug, Clone, Default)]
pub struct ThresholdResolver {
    config: Arc<ThresholdConfig>,
}

impl ThresholdResolver {
    pub fn new(config: ThresholdConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    /// Resolve by document type alone.
    pub fn resolve(&self, document_type: &str, property: &str) -> Thresholds {
        self.resolve_keys(std::iter::once(document_type), property)
    }

    /// Resolve for a document, consulting its type then its facets.
    pub fn resolve_for(&self, doc: &Document, property: &str) -> Thresholds {
        let keys = std::iter::once(doc.document_type.as_str())
            .chain(doc.facets.iter().map(String::as_str));
        self.resolve_keys(keys, property)
    }

    pub fn threshold(&self, doc: &Document, property: &str, action: AutoAction) -> f32 {
        self.resolve_for(doc, property).for_action(action)
    }

    fn resolve_keys<'a>(
        &self,
        keys: impl Iterator<Item = &'a str> + Clone,
        property: &str,
    ) -> Thresholds {
        let exact = keys
            .clone()
            .filter_map(|k| self.config.property_entry(k, property).copied());
        let defaults = keys.filter_map(|k| self.config.type_entry(k));
        let chain: Vec<ThresholdPair> = exact.chain(defaults).collect();

        Thresholds {
            fill: chain
                .iter()
                .find_map(|p| p.fill)
                .unwrap_or(self.config.global_fill),
            correct: chain
                .iter()
                .find_map(|p| p.correct)
                .unwrap_or(self.config.global_correct),
        }
    }
}
