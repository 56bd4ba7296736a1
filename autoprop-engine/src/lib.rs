//! autoprop Engine - Suggestion Resolution and Auto-Property Lifecycle
//!
//! Decides per property whether a suggestion is filled in, applied as a
//! correction, or left alone:
//! - Threshold resolution per (document type or facet, property)
//! - Per-property projection of suggestions and automation markers
//! - The FILL / CORRECT state machine with undo history
//! - Save-time demotion of automated values a human overwrote
//! - By-id operations through a document store

mod engine;
mod monitor;
mod projection;
mod service;
mod thresholds;

pub use engine::{plan, AutoPropertyEngine, IngestOutcome, RemovalReport, SkipReason, Transition};
pub use monitor::DirtyPropertyMonitor;
pub use projection::{
    PropertyAutomationState, PropertyProjection, SourcedCandidate, SuggestionProjection,
};
pub use service::DocumentService;
pub use thresholds::{ThresholdResolver, Thresholds};
