//! Bulk command execution
//!
//! `submit` resolves the selection query, records the expected total and
//! returns. A driver task hands batches of document ids to blocking
//! workers, at most `worker_count` at a time. A command is COMPLETED once
//! every selected document is counted as processed or errored, and FAILED
//! on cancellation, lost bookkeeping or an expired deadline. Items already
//! processed are never rolled back.
//!
//! Finished commands stay queryable for `finished_retention`, then are
//! evicted by the next `submit` or by `evict_finished`.

use crate::command::{BulkCommand, BulkStatus};
use crate::metrics::{BulkMetrics, BulkMetricsSnapshot};
use autoprop_core::{
    AutoPropResult, BulkConfig, BulkError, BulkKind, BulkState, CommandId, DocumentId,
    RemovalFilter, SelectionQuery, StorageError, Timestamp,
};
use autoprop_engine::DocumentService;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

#[derive(Debug, Clone)]
struct Phase {
    state: BulkState,
    completed_at: Option<Timestamp>,
    /// Monotonic twin of `completed_at`, for retention
    finished: Option<Instant>,
    error: Option<String>,
}

/// Command-scoped bookkeeping shared by the driver and its workers.
struct Tracker {
    id: CommandId,
    command: BulkCommand,
    filter: RemovalFilter,
    total: u64,
    submitted_at: Timestamp,
    deadline: Instant,
    processed: AtomicU64,
    errored: AtomicU64,
    /// processed + errored, bumped after either
    settled: AtomicU64,
    halted: AtomicBool,
    phase: watch::Sender<Phase>,
}

impl Tracker {
    fn status(&self) -> BulkStatus {
        let phase = self.phase.borrow().clone();
        BulkStatus {
            command_id: self.id,
            state: phase.state,
            items_processed: self.processed.load(Ordering::Acquire),
            items_errored: self.errored.load(Ordering::Acquire),
            total: self.total,
            kind: self.command.kind,
            submitter: self.command.submitter.clone(),
            submitted_at: self.submitted_at,
            completed_at: phase.completed_at,
            error: phase.error,
        }
    }

    fn finished_for(&self, retention: Duration) -> bool {
        self.phase
            .borrow()
            .finished
            .is_some_and(|at| at.elapsed() >= retention)
    }

    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Move to a terminal state; only the first call has any effect.
    fn transition(&self, state: BulkState, error: Option<String>) -> bool {
        if state == BulkState::Failed {
            self.halted.store(true, Ordering::Release);
        }
        self.phase.send_if_modified(|phase| {
            if phase.state.is_terminal() {
                return false;
            }
            phase.state = state;
            phase.completed_at = Some(chrono::Utc::now());
            phase.finished = Some(Instant::now());
            phase.error = error;
            true
        })
    }
}

struct Shared {
    service: DocumentService,
    config: BulkConfig,
    commands: RwLock<HashMap<CommandId, Arc<Tracker>>>,
    metrics: BulkMetrics,
}

impl Shared {
    fn tracker(&self, id: CommandId) -> AutoPropResult<Arc<Tracker>> {
        let commands = self
            .commands
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        commands
            .get(&id)
            .cloned()
            .ok_or_else(|| BulkError::CommandNotFound { command_id: id }.into())
    }

    /// Whether `tracker` may keep processing items.
    fn check(&self, tracker: &Tracker) -> Result<(), BulkError> {
        let tracked = self
            .commands
            .read()
            .map(|commands| commands.contains_key(&tracker.id))
            .unwrap_or(false);
        if !tracked {
            return Err(BulkError::BookkeepingLost {
                command_id: tracker.id,
            });
        }
        if Instant::now() >= tracker.deadline {
            return Err(BulkError::DeadlineExceeded {
                command_id: tracker.id,
            });
        }
        Ok(())
    }

    /// Drop trackers that finished more than `finished_retention` ago.
    fn evict_finished(&self) -> AutoPropResult<usize> {
        let retention = self.config.finished_retention;
        let mut commands = self
            .commands
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let before = commands.len();
        commands.retain(|_, tracker| !tracker.finished_for(retention));
        let evicted = before - commands.len();
        if evicted > 0 {
            tracing::debug!(evicted, tracked = commands.len(), "Evicted finished bulk commands");
        }
        Ok(evicted)
    }

    fn complete(&self, tracker: &Tracker) {
        if tracker.transition(BulkState::Completed, None) {
            BulkMetrics::incr(&self.metrics.commands_completed);
            tracing::info!(
                command_id = %tracker.id,
                kind = %tracker.command.kind,
                total = tracker.total,
                items_processed = tracker.processed.load(Ordering::Acquire),
                items_errored = tracker.errored.load(Ordering::Acquire),
                "Bulk command completed"
            );
        }
    }

    fn fail(&self, tracker: &Tracker, reason: String) -> bool {
        if !tracker.transition(BulkState::Failed, Some(reason.clone())) {
            return false;
        }
        BulkMetrics::incr(&self.metrics.commands_failed);
        tracing::error!(
            command_id = %tracker.id,
            kind = %tracker.command.kind,
            total = tracker.total,
            settled = tracker.settled.load(Ordering::Acquire),
            reason = %reason,
            "Bulk command failed"
        );
        true
    }
}

/// Runs bulk APPLY / REMOVE commands over a document store.
#[derive(Clone)]
pub struct BulkCoordinator {
    shared: Arc<Shared>,
}

impl BulkCoordinator {
    pub fn new(service: DocumentService, config: BulkConfig) -> AutoPropResult<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                service,
                config,
                commands: RwLock::new(HashMap::new()),
                metrics: BulkMetrics::new(),
            }),
        })
    }

    pub fn config(&self) -> &BulkConfig {
        &self.shared.config
    }

    pub fn metrics(&self) -> BulkMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Select the target documents and start processing them.
    ///
    /// Must be called from within a tokio runtime. Returns once the
    /// command is registered; a selection with no documents completes
    /// immediately.
    pub fn submit(&self, command: BulkCommand) -> AutoPropResult<CommandId> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| BulkError::Rejected {
            reason: format!("no async runtime: {e}"),
        })?;
        let query = SelectionQuery::parse(&command.selection_query)?;
        let deadline = Instant::now()
            .checked_add(self.shared.config.command_deadline)
            .ok_or_else(|| BulkError::Rejected {
                reason: format!(
                    "command deadline {:?} is out of range",
                    self.shared.config.command_deadline
                ),
            })?;
        let ids = self.shared.service.store().document_query(&query)?;
        self.shared.evict_finished()?;

        let id = CommandId::now_v7();
        let (phase, _) = watch::channel(Phase {
            state: BulkState::Running,
            completed_at: None,
            finished: None,
            error: None,
        });
        let tracker = Arc::new(Tracker {
            id,
            filter: command.removal_filter(),
            command,
            total: ids.len() as u64,
            submitted_at: chrono::Utc::now(),
            deadline,
            processed: AtomicU64::new(0),
            errored: AtomicU64::new(0),
            settled: AtomicU64::new(0),
            halted: AtomicBool::new(false),
            phase,
        });

        self.shared
            .commands
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .insert(id, Arc::clone(&tracker));
        BulkMetrics::incr(&self.shared.metrics.commands_submitted);

        tracing::info!(
            command_id = %id,
            kind = %tracker.command.kind,
            query = %query,
            total = tracker.total,
            submitter = %tracker.command.submitter,
            "Bulk command started"
        );

        if ids.is_empty() {
            self.shared.complete(&tracker);
        } else {
            runtime.spawn(drive(Arc::clone(&self.shared), tracker, ids));
        }
        Ok(id)
    }

    pub fn status(&self, id: CommandId) -> AutoPropResult<BulkStatus> {
        Ok(self.shared.tracker(id)?.status())
    }

    /// Wait until the command reaches a terminal state or `timeout` elapses.
    ///
    /// Returns `true` only when the command COMPLETED.
    pub async fn await_completion(&self, id: CommandId, timeout: Duration) -> AutoPropResult<bool> {
        let mut phase = self.shared.tracker(id)?.phase.subscribe();
        let waited = tokio::time::timeout(timeout, phase.wait_for(|p| p.state.is_terminal())).await;
        Ok(match waited {
            Ok(Ok(p)) => p.state == BulkState::Completed,
            Ok(Err(_)) | Err(_) => false,
        })
    }

    /// Ask a running command to stop. Returns `false` when it had already
    /// finished.
    pub fn cancel(&self, id: CommandId) -> AutoPropResult<bool> {
        let tracker = self.shared.tracker(id)?;
        let reason = BulkError::Cancelled { command_id: id }.to_string();
        Ok(self.shared.fail(&tracker, reason))
    }

    /// Evict commands that finished more than `finished_retention` ago.
    /// Returns how many were dropped; running commands are never evicted.
    pub fn evict_finished(&self) -> AutoPropResult<usize> {
        self.shared.evict_finished()
    }

    /// Drop a command's bookkeeping, returning its last status.
    ///
    /// A command still running fails at its next item.
    pub fn forget(&self, id: CommandId) -> AutoPropResult<Option<BulkStatus>> {
        let removed = self
            .shared
            .commands
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .remove(&id);
        Ok(removed.map(|tracker| tracker.status()))
    }
}

fn deadline_exceeded(tracker: &Tracker) -> String {
    BulkError::DeadlineExceeded {
        command_id: tracker.id,
    }
    .to_string()
}

async fn drive(shared: Arc<Shared>, tracker: Arc<Tracker>, ids: Vec<DocumentId>) {
    let semaphore = Arc::new(Semaphore::new(shared.config.worker_count));
    let deadline = tokio::time::Instant::from_std(tracker.deadline);
    let mut workers = JoinSet::new();

    for batch in ids.chunks(shared.config.batch_size) {
        let permit = tokio::select! {
            permit = Arc::clone(&semaphore).acquire_owned() => permit,
            _ = tokio::time::sleep_until(deadline) => {
                shared.fail(&tracker, deadline_exceeded(&tracker));
                break;
            }
        };
        let Ok(permit) = permit else {
            break;
        };
        if tracker.is_halted() {
            break;
        }
        if let Err(e) = shared.check(&tracker) {
            shared.fail(&tracker, e.to_string());
            break;
        }

        let batch = batch.to_vec();
        let worker_shared = Arc::clone(&shared);
        let worker_tracker = Arc::clone(&tracker);
        workers.spawn_blocking(move || {
            let _permit = permit;
            process_batch(&worker_shared, &worker_tracker, &batch);
        });
    }

    let expiry = tokio::time::sleep_until(deadline);
    tokio::pin!(expiry);
    let mut watch_deadline = !tracker.is_halted();
    loop {
        tokio::select! {
            joined = workers.join_next() => match joined {
                None => break,
                Some(Ok(())) => {}
                Some(Err(e)) => {
                    shared.fail(&tracker, format!("bulk worker failed: {e}"));
                }
            },
            _ = &mut expiry, if watch_deadline => {
                watch_deadline = false;
                shared.fail(&tracker, deadline_exceeded(&tracker));
            }
        }
    }

    let settled = tracker.settled.load(Ordering::Acquire);
    if settled == tracker.total {
        shared.complete(&tracker);
    } else {
        shared.fail(
            &tracker,
            format!("{settled} of {} items accounted for", tracker.total),
        );
    }
}

fn process_batch(shared: &Shared, tracker: &Tracker, batch: &[DocumentId]) {
    for &id in batch {
        if tracker.is_halted() {
            return;
        }
        if let Err(e) = shared.check(tracker) {
            shared.fail(tracker, e.to_string());
            return;
        }

        let result = match tracker.command.kind {
            BulkKind::Apply => shared.service.apply(id).map(|applied| {
                tracing::debug!(
                    command_id = %tracker.id,
                    document_id = %id,
                    applied = applied.len(),
                    "Applied suggestions"
                );
            }),
            BulkKind::Remove => shared
                .service
                .remove_suggestions(id, &tracker.filter)
                .map(|report| {
                    tracing::debug!(
                        command_id = %tracker.id,
                        document_id = %id,
                        rolled_back = report.rolled_back.len(),
                        "Removed suggestions"
                    );
                }),
        };

        match result {
            Ok(()) => {
                tracker.processed.fetch_add(1, Ordering::AcqRel);
                BulkMetrics::incr(&shared.metrics.items_processed);
            }
            Err(e) => {
                tracker.errored.fetch_add(1, Ordering::AcqRel);
                BulkMetrics::incr(&shared.metrics.items_errored);
                tracing::warn!(
                    command_id = %tracker.id,
                    document_id = %id,
                    error = %e,
                    "Bulk item failed"
                );
            }
        }

        if tracker.settled.fetch_add(1, Ordering::AcqRel) + 1 == tracker.total {
            shared.complete(tracker);
        }
    }
}
