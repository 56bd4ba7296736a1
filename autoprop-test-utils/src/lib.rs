//! autoprop Test Utilities
//!
//! Shared test infrastructure for the autoprop workspace:
//! - Proptest generators for documents and suggestion records
//! - Fixtures for the common lifecycle scenarios
//! - Assertions for automation invariants
//! - Test logging setup

// Re-export mock storage from its source crate
pub use autoprop_storage::{DocumentStore, MockStorage};

// Re-export core types for convenience
pub use autoprop_core::{
    AutoPropError, AutoPropResult, AutomationMarker, Candidate, Document, DocumentId, EntityType,
    PropertyValue, StorageError, SuggestionContext, SuggestionRecord, Tag, ThresholdConfig,
};

use std::collections::BTreeSet;
use std::sync::OnceLock;

// ============================================================================
// LOGGING
// ============================================================================

/// Install a fmt subscriber writing through the test harness.
///
/// Honors `RUST_LOG`, defaulting to `autoprop=debug`. Safe to call from
/// every test.
pub fn init_test_logging() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("autoprop=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for autoprop entities.

    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    /// Properties the generators draw from. Small on purpose so that
    /// records and documents overlap.
    pub const PROPERTIES: &[&str] = &["dc:title", "dc:format", "dc:nature", "dc:coverage"];

    pub const LABELS: &[&str] = &["cat", "dog", "report", "invoice", "scan"];

    pub const SOURCES: &[&str] = &["stest", "vision", "textract"];

    /// Generate a random DocumentId.
    pub fn arb_document_id() -> impl Strategy<Value = DocumentId> {
        any::<[u8; 16]>().prop_map(|b| DocumentId::new(Uuid::from_bytes(b)))
    }

    pub fn arb_property() -> impl Strategy<Value = &'static str> {
        proptest::sample::select(PROPERTIES)
    }

    /// A label from [`LABELS`], occasionally the empty string.
    pub fn arb_label() -> impl Strategy<Value = &'static str> {
        prop_oneof![9 => proptest::sample::select(LABELS), 1 => Just("")]
    }

    pub fn arb_source() -> impl Strategy<Value = &'static str> {
        proptest::sample::select(SOURCES)
    }

    /// Confidence scores in [0, 1], biased toward both sides of 0.7.
    pub fn arb_confidence() -> impl Strategy<Value = f32> {
        prop_oneof![0.0f32..=1.0f32, 0.65f32..=0.75f32, Just(0.7f32)]
    }

    pub fn arb_candidate() -> impl Strategy<Value = Candidate> {
        (arb_label(), arb_confidence()).prop_map(|(l, c)| Candidate::new(l, c))
    }

    pub fn arb_property_value() -> impl Strategy<Value = PropertyValue> {
        prop_oneof![
            3 => arb_label().prop_map(PropertyValue::text),
            1 => Just(PropertyValue::text("")),
        ]
    }

    pub fn arb_marker() -> impl Strategy<Value = AutomationMarker> {
        prop_oneof![
            Just(AutomationMarker::None),
            Just(AutomationMarker::AutoFilled),
            Just(AutomationMarker::AutoCorrected),
        ]
    }

    /// A record from `source` targeting `document_ref`.
    pub fn arb_suggestion_record(
        document_ref: DocumentId,
        source: &'static str,
    ) -> impl Strategy<Value = SuggestionRecord> {
        proptest::collection::btree_map(
            arb_property(),
            proptest::collection::vec(arb_candidate(), 1..3),
            1..4,
        )
        .prop_map(move |suggestions| {
            suggestions.into_iter().fold(
                SuggestionRecord::new(source, "suggestion", fixtures::context(document_ref)),
                |record, (property, candidates)| record.with_suggestion(property, candidates),
            )
        })
    }

    /// A document with a random set of human values.
    pub fn arb_document() -> impl Strategy<Value = Document> {
        proptest::collection::btree_map(arb_property(), arb_property_value(), 0..4).prop_map(
            |values| {
                values
                    .into_iter()
                    .fold(Document::new("default", "File"), |doc, (p, v)| {
                        doc.with_property(p, v)
                    })
            },
        )
    }

    /// A document with records from one to three distinct sources attached.
    pub fn arb_document_with_suggestions() -> impl Strategy<Value = Document> {
        (arb_document(), proptest::sample::subsequence(SOURCES, 1..=SOURCES.len()))
            .prop_flat_map(|(doc, sources)| {
                let id = doc.id;
                let records: Vec<_> = sources
                    .into_iter()
                    .map(|s| arb_suggestion_record(id, s))
                    .collect();
                (Just(doc), records)
            })
            .prop_map(|(mut doc, records)| {
                for record in records {
                    doc.suggestions_mut().append(record);
                }
                doc.sync_enrichable_facet();
                doc
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;

    /// First source in the two-source scenarios.
    pub const SOURCE_A: &str = "stest";
    /// Second source in the two-source scenarios.
    pub const SOURCE_B: &str = "stest-secondary";

    pub fn context(document_ref: DocumentId) -> SuggestionContext {
        SuggestionContext {
            document_ref,
            repository_id: "default".to_string(),
            input_properties: BTreeSet::from(["file:content".to_string()]),
        }
    }

    /// An empty File document with no dc:title or dc:format.
    pub fn blank_file() -> Document {
        Document::new("default", "File")
    }

    /// Source A: dc:format "cat" at 0.9, dc:title "A cat" at 0.8.
    pub fn record_a(document_ref: DocumentId) -> SuggestionRecord {
        SuggestionRecord::new(SOURCE_A, "suggestion", context(document_ref))
            .with_version("1.0")
            .with_suggestion(
                "dc:format",
                vec![Candidate::new("cat", 0.9), Candidate::new("dog", 0.2)],
            )
            .with_suggestion("dc:title", vec![Candidate::new("A cat", 0.8)])
            .with_tag(Tag {
                name: "cat".to_string(),
                kind: "/tagging".to_string(),
                reference: None,
                confidence: 0.9,
            })
    }

    /// Source B: dc:format "cat" at 0.75, dc:title "Cat picture" at 0.85.
    pub fn record_b(document_ref: DocumentId) -> SuggestionRecord {
        SuggestionRecord::new(SOURCE_B, "suggestion", context(document_ref))
            .with_suggestion("dc:format", vec![Candidate::new("cat", 0.75)])
            .with_suggestion("dc:title", vec![Candidate::new("Cat picture", 0.85)])
    }

    /// A blank file with both sources attached.
    pub fn two_source_document() -> Document {
        let mut doc = blank_file();
        let id = doc.id;
        doc.suggestions_mut().append(record_a(id));
        doc.suggestions_mut().append(record_b(id));
        doc.sync_enrichable_facet();
        doc
    }

    /// Insert `count` two-source documents, returning their ids.
    pub fn seed_corpus(store: &dyn DocumentStore, count: usize) -> AutoPropResult<Vec<DocumentId>> {
        (0..count)
            .map(|_| {
                let doc = two_source_document();
                store.document_insert(&doc)?;
                Ok(doc.id)
            })
            .collect()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for automation invariants.

    use super::*;

    /// Assert that a result is a NotFound storage error.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &AutoPropResult<T>) {
        match result {
            Err(AutoPropError::Storage(StorageError::NotFound { entity_type, .. })) => {
                assert_eq!(*entity_type, EntityType::Document, "Wrong entity type in NotFound error");
            }
            other => panic!("Expected NotFound error, got: {:?}", other),
        }
    }

    /// Assert the marker on `property`.
    #[track_caller]
    pub fn assert_marker(doc: &Document, property: &str, expected: AutomationMarker) {
        assert_eq!(
            doc.marker(property),
            expected,
            "unexpected marker on {}",
            property
        );
    }

    /// Assert the document-level automation invariants.
    ///
    /// - AUTO_FILLED properties hold a value and never have a history entry
    /// - every history entry belongs to an AUTO_CORRECTED property
    /// - marked properties carry the value last applied
    #[track_caller]
    pub fn assert_automation_invariants(doc: &Document) {
        for (property, state) in doc.auto_states() {
            if state.marker == AutomationMarker::AutoFilled {
                assert!(
                    !doc.history().contains(property),
                    "AUTO_FILLED {} has a history entry",
                    property
                );
            }
            if state.marker.is_automated() {
                let live = doc.property(property);
                let applied = state.applied_value.as_ref();
                assert!(
                    matches!((live, applied), (Some(l), Some(a)) if l.same_content(a)),
                    "marked {} diverged from applied value: {:?} vs {:?}",
                    property,
                    live,
                    applied
                );
                assert!(
                    applied.is_some_and(|a| !a.is_empty()),
                    "marked {} holds no value",
                    property
                );
            }
        }
        for entry in doc.history().all() {
            assert_eq!(
                doc.marker(&entry.property),
                AutomationMarker::AutoCorrected,
                "history entry for {} without AUTO_CORRECTED",
                entry.property
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_two_source_fixture() {
        let doc = fixtures::two_source_document();
        assert_eq!(doc.suggestions().len(), 2);
        assert!(doc.suggestions().supports("dc:format"));
        assert!(!doc.has_value("dc:format"));
        assertions::assert_automation_invariants(&doc);
    }

    #[test]
    fn test_seed_corpus() {
        let store = MockStorage::new();
        let ids = fixtures::seed_corpus(&store, 10).unwrap();
        assert_eq!(ids.len(), 10);
        assert_eq!(store.len(), 10);
    }

    #[test]
    fn test_init_test_logging_is_idempotent() {
        init_test_logging();
        init_test_logging();
        tracing::debug!(target: "autoprop", "logging initialized");
    }

    #[test]
    fn test_assertion_not_found() {
        let result: AutoPropResult<()> = Err(AutoPropError::Storage(StorageError::NotFound {
            entity_type: EntityType::Document,
            id: DocumentId::now_v7(),
        }));
        assertions::assert_not_found(&result);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_generated_records_are_not_empty(doc in generators::arb_document_with_suggestions()) {
            prop_assert!(!doc.suggestions().is_empty());
            for record in doc.suggestions().records() {
                prop_assert!(!record.is_empty());
                prop_assert_eq!(record.context.document_ref, doc.id);
            }
        }

        #[test]
        fn prop_generated_confidence_in_range(c in generators::arb_confidence()) {
            prop_assert!((0.0..=1.0).contains(&c));
        }
    }
}
