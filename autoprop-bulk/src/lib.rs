//! autoprop Bulk - Bulk Apply/Remove Coordinator
//!
//! Applies or removes suggestions across every document a selection query
//! matches, with per-command progress counters and completion tracking.
//!
//! ```ignore
//! let coordinator = BulkCoordinator::new(service, BulkConfig::from_env())?;
//! let id = coordinator.submit(BulkCommand::apply("ecm:primaryType = 'File'", "admin"))?;
//! let done = coordinator.await_completion(id, Duration::from_secs(30)).await?;
//! ```

mod command;
mod coordinator;
mod metrics;

pub use command::{BulkCommand, BulkStatus};
pub use coordinator::BulkCoordinator;
pub use metrics::{BulkMetrics, BulkMetricsSnapshot};
