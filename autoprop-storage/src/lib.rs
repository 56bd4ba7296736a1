//! autoprop Storage - Document Store Trait and Mock Implementation
//!
//! Defines the document-store collaborator the engine reads and writes
//! through. Hosts provide their own implementation; `MockStorage` is the
//! in-memory one used by tests and the bulk coordinator's scenarios.

use autoprop_core::{
    AutoPropError, AutoPropResult, Document, DocumentId, EntityType, SelectionQuery, StorageError,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

// ============================================================================
// SAVE HOOK
// ============================================================================

/// Callback run synchronously inside every save transaction.
///
/// Hooks see the mutated document before it is committed and may change it
/// further; their changes are committed in the same save. A hook error
/// aborts the save.
pub trait SaveHook: Send + Sync {
    /// `changed` holds the properties whose value differs from the last
    /// committed version.
    fn on_save(&self, doc: &mut Document, changed: &BTreeSet<String>) -> AutoPropResult<()>;
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Closure applied to a document inside a save transaction.
pub type Mutation<'a> = dyn FnMut(&mut Document) -> AutoPropResult<()> + 'a;

/// Document store abstraction.
///
/// Every mutation of one document runs under that document's own lock, so
/// read-modify-write sequences on markers and history never interleave.
/// Different documents never contend.
pub trait DocumentStore: Send + Sync {
    /// Insert a new document.
    fn document_insert(&self, doc: &Document) -> AutoPropResult<()>;

    /// Get a committed snapshot of a document.
    fn document_get(&self, id: DocumentId) -> AutoPropResult<Option<Document>>;

    /// Apply `mutation` to the document as a single save.
    ///
    /// Save hooks run after the mutation. Nothing is committed when the
    /// mutation or a hook fails. Returns the committed document.
    fn document_mutate(&self, id: DocumentId, mutation: &mut Mutation<'_>)
        -> AutoPropResult<Document>;

    /// Remove a document.
    fn document_delete(&self, id: DocumentId) -> AutoPropResult<()>;

    /// Ids of every document matching `query`, in id order.
    fn document_query(&self, query: &SelectionQuery) -> AutoPropResult<Vec<DocumentId>>;

    /// Register a hook to run on every save.
    fn register_hook(&self, hook: Arc<dyn SaveHook>) -> AutoPropResult<()>;

    /// Number of documents matching `query`.
    fn document_count(&self, query: &SelectionQuery) -> AutoPropResult<usize> {
        Ok(self.document_query(query)?.len())
    }
}

fn not_found(id: DocumentId) -> AutoPropError {
    StorageError::NotFound {
        entity_type: EntityType::Document,
        id,
    }
    .into()
}

fn poisoned<T>(_: T) -> AutoPropError {
    StorageError::LockPoisoned.into()
}

// ============================================================================
// MOCK STORAGE
// ============================================================================

/// In-memory document store.
#[derive(Default)]
pub struct MockStorage {
    documents: RwLock<BTreeMap<DocumentId, Arc<Mutex<Document>>>>,
    hooks: RwLock<Vec<Arc<dyn SaveHook>>>,
}

impl MockStorage {
    /// Create a new mock storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all stored documents. Hooks stay registered.
    pub fn clear(&self) -> AutoPropResult<()> {
        self.documents.write().map_err(poisoned)?.clear();
        Ok(())
    }

    /// Get count of stored documents.
    pub fn len(&self) -> usize {
        self.documents.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, id: DocumentId) -> AutoPropResult<Arc<Mutex<Document>>> {
        let documents = self.documents.read().map_err(poisoned)?;
        documents.get(&id).cloned().ok_or_else(|| not_found(id))
    }

    fn run_hooks(&self, doc: &mut Document, changed: &BTreeSet<String>) -> AutoPropResult<()> {
        let hooks: Vec<Arc<dyn SaveHook>> = self.hooks.read().map_err(poisoned)?.clone();
        for hook in hooks {
            hook.on_save(doc, changed)?;
        }
        Ok(())
    }
}

impl fmt::Debug for MockStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockStorage")
            .field("documents", &self.len())
            .field("hooks", &self.hooks.read().map(|h| h.len()).unwrap_or(0))
            .finish()
    }
}

impl DocumentStore for MockStorage {
    fn document_insert(&self, doc: &Document) -> AutoPropResult<()> {
        let mut documents = self.documents.write().map_err(poisoned)?;
        if documents.contains_key(&doc.id) {
            return Err(StorageError::InsertFailed {
                entity_type: EntityType::Document,
                reason: format!("document {} already exists", doc.id),
            }
            .into());
        }
        documents.insert(doc.id, Arc::new(Mutex::new(doc.clone())));
        Ok(())
    }

    fn document_get(&self, id: DocumentId) -> AutoPropResult<Option<Document>> {
        let slot = match self.slot(id) {
            Ok(slot) => slot,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let doc = slot.lock().map_err(poisoned)?;
        Ok(Some(doc.clone()))
    }

    fn document_mutate(
        &self,
        id: DocumentId,
        mutation: &mut Mutation<'_>,
    ) -> AutoPropResult<Document> {
        let slot = self.slot(id)?;
        let mut committed = slot.lock().map_err(poisoned)?;

        let mut working = committed.clone();
        mutation(&mut working)?;
        let changed = working.changed_properties(&committed);
        self.run_hooks(&mut working, &changed)?;

        working.touch();
        *committed = working;
        Ok(committed.clone())
    }

    fn document_delete(&self, id: DocumentId) -> AutoPropResult<()> {
        let mut documents = self.documents.write().map_err(poisoned)?;
        documents.remove(&id).map(|_| ()).ok_or_else(|| not_found(id))
    }

    fn document_query(&self, query: &SelectionQuery) -> AutoPropResult<Vec<DocumentId>> {
        let slots: Vec<(DocumentId, Arc<Mutex<Document>>)> = {
            let documents = self.documents.read().map_err(poisoned)?;
            documents.iter().map(|(id, s)| (*id, Arc::clone(s))).collect()
        };
        let mut ids = Vec::new();
        for (id, slot) in slots {
            let doc = slot.lock().map_err(poisoned)?;
            if query.matches(&doc) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn register_hook(&self, hook: Arc<dyn SaveHook>) -> AutoPropResult<()> {
        self.hooks.write().map_err(poisoned)?.push(hook);
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
