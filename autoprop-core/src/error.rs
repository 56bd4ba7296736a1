//! Error types for autoprop operations

use crate::{CommandId, DocumentId, EntityType};
use thiserror::Error;

/// Document store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_type:?} with id {id}")]
    NotFound { entity_type: EntityType, id: DocumentId },

    #[error("Insert failed for {entity_type:?}: {reason}")]
    InsertFailed { entity_type: EntityType, reason: String },

    #[error("Transaction failed on document {id}: {reason}")]
    TransactionFailed { id: DocumentId, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },
}

/// Selection query errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Syntax error in selection query at clause {position}: {clause}")]
    Syntax { position: usize, clause: String },

    #[error("Unknown operator '{operator}' in selection query")]
    UnknownOperator { operator: String },
}

/// Bulk command errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BulkError {
    #[error("Bulk command not found: {command_id}")]
    CommandNotFound { command_id: CommandId },

    #[error("Bookkeeping for bulk command {command_id} is no longer available")]
    BookkeepingLost { command_id: CommandId },

    #[error("Bulk command {command_id} was cancelled")]
    Cancelled { command_id: CommandId },

    #[error("Bulk command {command_id} exceeded its deadline")]
    DeadlineExceeded { command_id: CommandId },

    #[error("Bulk command rejected: {reason}")]
    Rejected { reason: String },
}

/// Master error type for all autoprop errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AutoPropError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Bulk error: {0}")]
    Bulk(#[from] BulkError),
}

impl AutoPropError {
    /// Whether this error is the not-found condition for a document.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AutoPropError::Storage(StorageError::NotFound { .. }))
    }
}

/// Result type alias for autoprop operations.
pub type AutoPropResult<T> = Result<T, AutoPropError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::NotFound {
            entity_type: EntityType::Document,
            id: DocumentId::new(Uuid::nil()),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Entity not found"));
        assert!(msg.contains("Document"));
        assert!(msg.contains("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "global_fill".to_string(),
            value: "1.5".to_string(),
            reason: "must be between 0.0 and 1.0".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("global_fill"));
        assert!(msg.contains("1.5"));
        assert!(msg.contains("between 0.0 and 1.0"));
    }

    #[test]
    fn test_bulk_error_display_bookkeeping_lost() {
        let id = CommandId::new(Uuid::nil());
        let msg = format!("{}", BulkError::BookkeepingLost { command_id: id });
        assert!(msg.contains("no longer available"));
        assert!(msg.contains("00000000"));
    }

    #[test]
    fn test_master_error_from_variants() {
        let storage = AutoPropError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, AutoPropError::Storage(_)));

        let config = AutoPropError::from(ConfigError::MissingRequired {
            field: "worker_count".to_string(),
        });
        assert!(matches!(config, AutoPropError::Config(_)));

        let query = AutoPropError::from(QueryError::UnknownOperator {
            operator: "~=".to_string(),
        });
        assert!(matches!(query, AutoPropError::Query(_)));

        let bulk = AutoPropError::from(BulkError::Rejected {
            reason: "empty".to_string(),
        });
        assert!(matches!(bulk, AutoPropError::Bulk(_)));
    }

    #[test]
    fn test_is_not_found() {
        let err: AutoPropError = StorageError::NotFound {
            entity_type: EntityType::Document,
            id: DocumentId::new(Uuid::nil()),
        }
        .into();
        assert!(err.is_not_found());
        assert!(!AutoPropError::from(StorageError::LockPoisoned).is_not_found());
    }
}
