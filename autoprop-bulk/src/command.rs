//! Bulk command and status types

use autoprop_core::{BulkKind, BulkState, CommandId, RemovalFilter, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A request to apply or remove suggestions across a queried document set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkCommand {
    pub kind: BulkKind,
    /// Selection query text, `*` for every document
    pub selection_query: String,
    /// REMOVE only: restrict to one source
    pub source_name_filter: Option<String>,
    /// REMOVE only: restrict to these properties
    pub property_filter: Option<BTreeSet<String>>,
    pub submitter: String,
}

impl BulkCommand {
    pub fn apply(selection_query: impl Into<String>, submitter: impl Into<String>) -> Self {
        Self::new(BulkKind::Apply, selection_query, submitter)
    }

    /// REMOVE with no filters removes everything.
    pub fn remove(selection_query: impl Into<String>, submitter: impl Into<String>) -> Self {
        Self::new(BulkKind::Remove, selection_query, submitter)
    }

    fn new(
        kind: BulkKind,
        selection_query: impl Into<String>,
        submitter: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            selection_query: selection_query.into(),
            source_name_filter: None,
            property_filter: None,
            submitter: submitter.into(),
        }
    }

    pub fn with_source_filter(mut self, source_name: impl Into<String>) -> Self {
        self.source_name_filter = Some(source_name.into());
        self
    }

    pub fn with_property_filter<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.property_filter = Some(properties.into_iter().map(Into::into).collect());
        self
    }

    pub fn removal_filter(&self) -> RemovalFilter {
        RemovalFilter {
            source_name: self.source_name_filter.clone(),
            properties: self.property_filter.clone(),
        }
    }
}

/// Point-in-time view of a bulk command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkStatus {
    pub command_id: CommandId,
    pub state: BulkState,
    pub items_processed: u64,
    pub items_errored: u64,
    /// Documents selected at submission
    pub total: u64,
    pub kind: BulkKind,
    pub submitter: String,
    pub submitted_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    /// Failure reason when FAILED
    pub error: Option<String>,
}

impl BulkStatus {
    /// Items not yet accounted for.
    pub fn remaining(&self) -> u64 {
        self.total
            .saturating_sub(self.items_processed + self.items_errored)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removal_filter_from_command() {
        let cmd = BulkCommand::remove("*", "admin")
            .with_source_filter("stest")
            .with_property_filter(["dc:title"]);
        let filter = cmd.removal_filter();
        assert_eq!(filter.source_name.as_deref(), Some("stest"));
        assert_eq!(filter.properties, Some(BTreeSet::from(["dc:title".to_string()])));

        assert_eq!(BulkCommand::remove("*", "admin").removal_filter(), RemovalFilter::all());
    }

    #[test]
    fn test_command_serde() {
        let cmd = BulkCommand::apply("ecm:primaryType = 'File'", "admin");
        let json = serde_json::to_string(&cmd).unwrap();
        let back: BulkCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
        assert_eq!(back.kind, BulkKind::Apply);
    }
}
