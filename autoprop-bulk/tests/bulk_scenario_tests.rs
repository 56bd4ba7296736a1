//! Bulk coordinator scenarios over an in-memory corpus

use autoprop_bulk::{BulkCommand, BulkCoordinator};
use autoprop_core::{
    AutoPropResult, AutomationMarker, BulkConfig, BulkState, Document, DocumentId,
    SelectionQuery, ENRICHABLE_FACET,
};
use autoprop_engine::{AutoPropertyEngine, DocumentService, SuggestionProjection};
use autoprop_storage::{Mutation, SaveHook};
use autoprop_test_utils::{fixtures, init_test_logging, DocumentStore, MockStorage};
use std::collections::BTreeSet;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(10);
const FILES: &str = "ecm:primaryType = 'File'";

/// Store whose saves block until the gate opens.
struct GatedStore {
    inner: MockStorage,
    open: Mutex<bool>,
    turnstile: Condvar,
}

impl GatedStore {
    fn closed() -> Self {
        Self {
            inner: MockStorage::new(),
            open: Mutex::new(false),
            turnstile: Condvar::new(),
        }
    }

    fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.turnstile.notify_all();
    }
}

impl DocumentStore for GatedStore {
    fn document_insert(&self, doc: &Document) -> AutoPropResult<()> {
        self.inner.document_insert(doc)
    }

    fn document_get(&self, id: DocumentId) -> AutoPropResult<Option<Document>> {
        self.inner.document_get(id)
    }

    fn document_mutate(
        &self,
        id: DocumentId,
        mutation: &mut Mutation<'_>,
    ) -> AutoPropResult<Document> {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.turnstile.wait(open).unwrap();
        }
        drop(open);
        self.inner.document_mutate(id, mutation)
    }

    fn document_delete(&self, id: DocumentId) -> AutoPropResult<()> {
        self.inner.document_delete(id)
    }

    fn document_query(&self, query: &SelectionQuery) -> AutoPropResult<Vec<DocumentId>> {
        self.inner.document_query(query)
    }

    fn register_hook(&self, hook: Arc<dyn SaveHook>) -> AutoPropResult<()> {
        self.inner.register_hook(hook)
    }
}

fn coordinator_over(store: Arc<dyn DocumentStore>, config: BulkConfig) -> BulkCoordinator {
    init_test_logging();
    let service = DocumentService::new(store, Arc::new(AutoPropertyEngine::default())).unwrap();
    BulkCoordinator::new(service, config).unwrap()
}

fn serial() -> BulkConfig {
    BulkConfig {
        worker_count: 1,
        batch_size: 1,
        ..BulkConfig::default()
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let started = tokio::time::Instant::now();
    while !condition() {
        assert!(started.elapsed() < WAIT, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn run(coordinator: &BulkCoordinator, command: BulkCommand) -> autoprop_bulk::BulkStatus {
    let id = coordinator.submit(command).unwrap();
    assert!(coordinator.await_completion(id, WAIT).await.unwrap());
    coordinator.status(id).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_apply_then_remove_across_corpus() {
    let store = Arc::new(MockStorage::new());
    let ids = fixtures::seed_corpus(store.as_ref(), 100).unwrap();
    let coordinator = coordinator_over(store.clone(), BulkConfig::default());

    let status = run(&coordinator, BulkCommand::apply(FILES, "admin")).await;
    assert_eq!(status.state, BulkState::Completed);
    assert_eq!(status.total, 100);
    assert_eq!(status.items_processed, 100);
    assert_eq!(status.items_errored, 0);
    assert!(status.completed_at.is_some());

    let both = BTreeSet::from([fixtures::SOURCE_A.to_string(), fixtures::SOURCE_B.to_string()]);
    for id in &ids {
        let doc = store.document_get(*id).unwrap().unwrap();
        let projection = SuggestionProjection::new(&doc);
        assert_eq!(projection.sources(), both);
        assert!(projection.is_auto_filled("dc:format"));
        assert!(projection.is_auto_filled("dc:title"));
    }

    let status = run(
        &coordinator,
        BulkCommand::remove(FILES, "admin").with_source_filter(fixtures::SOURCE_B),
    )
    .await;
    assert_eq!(status.items_processed, 100);
    for id in &ids {
        let doc = store.document_get(*id).unwrap().unwrap();
        let projection = SuggestionProjection::new(&doc);
        assert_eq!(
            projection.sources(),
            BTreeSet::from([fixtures::SOURCE_A.to_string()])
        );
        assert_eq!(projection.auto_properties().len(), 2);
        assert!(projection
            .suggestions_by_property("dc:title")
            .iter()
            .all(|c| c.source_name == fixtures::SOURCE_A));
    }

    let status = run(&coordinator, BulkCommand::remove("*", "admin")).await;
    assert_eq!(status.items_processed, 100);
    for id in &ids {
        let doc = store.document_get(*id).unwrap().unwrap();
        assert!(doc.suggestions().is_empty());
        assert!(doc.marked_properties().is_empty());
        assert!(doc.history().is_empty());
        assert!(!doc.has_value("dc:format"));
        assert!(!doc.has_facet(ENRICHABLE_FACET));
    }

    let metrics = coordinator.metrics();
    assert_eq!(metrics.commands_submitted, 3);
    assert_eq!(metrics.commands_completed, 3);
    assert_eq!(metrics.items_processed, 300);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_remove_by_property_rolls_back_that_property() {
    let store = Arc::new(MockStorage::new());
    let ids = fixtures::seed_corpus(store.as_ref(), 20).unwrap();
    let coordinator = coordinator_over(store.clone(), BulkConfig::default());

    run(&coordinator, BulkCommand::apply("*", "admin")).await;
    let status = run(
        &coordinator,
        BulkCommand::remove("*", "admin").with_property_filter(["dc:title"]),
    )
    .await;
    assert_eq!(status.items_processed, 20);

    for id in &ids {
        let doc = store.document_get(*id).unwrap().unwrap();
        assert_eq!(doc.marker("dc:title"), AutomationMarker::None);
        assert!(!doc.has_value("dc:title"));
        assert!(!doc.suggestions().supports("dc:title"));
        assert_eq!(doc.marker("dc:format"), AutomationMarker::AutoFilled);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reapply_converges() {
    let store = Arc::new(MockStorage::new());
    let ids = fixtures::seed_corpus(store.as_ref(), 30).unwrap();
    let config = BulkConfig {
        worker_count: 3,
        batch_size: 7,
        ..BulkConfig::default()
    };
    let coordinator = coordinator_over(store.clone(), config);

    run(&coordinator, BulkCommand::apply("*", "admin")).await;
    let first: Vec<Document> = ids
        .iter()
        .map(|id| store.document_get(*id).unwrap().unwrap())
        .collect();

    let status = run(&coordinator, BulkCommand::apply("*", "admin")).await;
    assert_eq!(status.items_processed, 30);
    for before in first {
        let after = store.document_get(before.id).unwrap().unwrap();
        assert_eq!(after.properties(), before.properties());
        assert_eq!(after.auto_states(), before.auto_states());
        assert_eq!(after.history(), before.history());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_selection_narrows_targets() {
    let store = Arc::new(MockStorage::new());
    fixtures::seed_corpus(store.as_ref(), 5).unwrap();
    let note = Document::new("default", "Note");
    store.document_insert(&note).unwrap();
    let coordinator = coordinator_over(store, BulkConfig::default());

    let status = run(&coordinator, BulkCommand::apply(FILES, "admin")).await;
    assert_eq!(status.total, 5);

    let status = run(&coordinator, BulkCommand::apply("ecm:primaryType = 'Picture'", "admin")).await;
    assert_eq!(status.total, 0);
    assert_eq!(status.state, BulkState::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_missing_documents_are_counted_not_fatal() {
    let store = Arc::new(GatedStore::closed());
    let ids = fixtures::seed_corpus(store.as_ref(), 10).unwrap();
    let coordinator = coordinator_over(store.clone(), serial());

    let id = coordinator.submit(BulkCommand::apply("*", "admin")).unwrap();
    for doomed in &ids[..3] {
        store.document_delete(*doomed).unwrap();
    }
    store.open();

    assert!(coordinator.await_completion(id, WAIT).await.unwrap());
    let status = coordinator.status(id).unwrap();
    assert_eq!(status.state, BulkState::Completed);
    assert_eq!(status.items_processed, 7);
    assert_eq!(status.items_errored, 3);
    assert_eq!(status.remaining(), 0);
    assert_eq!(coordinator.metrics().items_errored, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_stops_further_items() {
    let store = Arc::new(GatedStore::closed());
    fixtures::seed_corpus(store.as_ref(), 20).unwrap();
    let coordinator = coordinator_over(store.clone(), serial());

    let id = coordinator.submit(BulkCommand::apply("*", "admin")).unwrap();
    assert!(coordinator.cancel(id).unwrap());
    assert!(!coordinator.cancel(id).unwrap());

    let status = coordinator.status(id).unwrap();
    assert_eq!(status.state, BulkState::Failed);
    assert!(status.error.as_deref().unwrap_or_default().contains("cancelled"));

    store.open();
    assert!(!coordinator.await_completion(id, WAIT).await.unwrap());
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = coordinator.status(id).unwrap();
    assert_eq!(status.state, BulkState::Failed);
    assert!(status.items_processed <= 1);
    assert_eq!(coordinator.metrics().commands_failed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_deadline_fails_command() {
    let store = Arc::new(GatedStore::closed());
    fixtures::seed_corpus(store.as_ref(), 5).unwrap();
    let config = BulkConfig {
        command_deadline: Duration::from_millis(50),
        ..serial()
    };
    let coordinator = coordinator_over(store.clone(), config);

    let id = coordinator.submit(BulkCommand::apply("*", "admin")).unwrap();
    assert!(!coordinator.await_completion(id, WAIT).await.unwrap());
    store.open();

    let status = coordinator.status(id).unwrap();
    assert_eq!(status.state, BulkState::Failed);
    assert!(status.error.as_deref().unwrap_or_default().contains("deadline"));
    assert!(status.items_processed <= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lost_bookkeeping_fails_command() {
    let store = Arc::new(GatedStore::closed());
    fixtures::seed_corpus(store.as_ref(), 5).unwrap();
    let coordinator = coordinator_over(store.clone(), serial());

    let id = coordinator.submit(BulkCommand::apply("*", "admin")).unwrap();
    let last = coordinator.forget(id).unwrap().unwrap();
    assert_eq!(last.state, BulkState::Running);
    assert!(coordinator.status(id).is_err());

    store.open();
    wait_until(|| coordinator.metrics().commands_failed == 1).await;

    let metrics = coordinator.metrics();
    assert_eq!(metrics.commands_completed, 0);
    assert!(metrics.items_processed <= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_status_while_running() {
    let store = Arc::new(GatedStore::closed());
    fixtures::seed_corpus(store.as_ref(), 3).unwrap();
    let coordinator = coordinator_over(store.clone(), serial());

    let id = coordinator
        .submit(BulkCommand::remove("*", "ops").with_source_filter(fixtures::SOURCE_A))
        .unwrap();
    let status = coordinator.status(id).unwrap();
    assert_eq!(status.state, BulkState::Running);
    assert_eq!(status.total, 3);
    assert_eq!(status.remaining(), 3);
    assert_eq!(status.submitter, "ops");
    assert!(!coordinator.await_completion(id, Duration::from_millis(20)).await.unwrap());
    assert_eq!(coordinator.metrics().commands_running(), 1);

    store.open();
    assert!(coordinator.await_completion(id, WAIT).await.unwrap());
    assert_eq!(coordinator.status(id).unwrap().items_processed, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_eviction_spares_running_commands() {
    let store = Arc::new(GatedStore::closed());
    fixtures::seed_corpus(store.as_ref(), 3).unwrap();
    let config = BulkConfig {
        finished_retention: Duration::ZERO,
        ..serial()
    };
    let coordinator = coordinator_over(store.clone(), config);

    let running = coordinator.submit(BulkCommand::apply("*", "admin")).unwrap();
    let cancelled = coordinator.submit(BulkCommand::apply("*", "admin")).unwrap();
    assert!(coordinator.cancel(cancelled).unwrap());

    assert_eq!(coordinator.evict_finished().unwrap(), 1);
    assert!(coordinator.status(cancelled).is_err());
    assert_eq!(coordinator.status(running).unwrap().state, BulkState::Running);

    store.open();
    assert!(coordinator.await_completion(running, WAIT).await.unwrap());
    assert_eq!(coordinator.evict_finished().unwrap(), 1);
    assert!(coordinator.status(running).is_err());
}
