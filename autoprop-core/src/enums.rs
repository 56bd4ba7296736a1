//! Enum types for autoprop entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CORE ENUMS
// ============================================================================

/// Entity type discriminator for error reporting and polymorphic references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Document,
    SuggestionRecord,
    BulkCommand,
}

/// Semantics under which a suggestion is applied to a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AutoAction {
    /// Populate a property that currently has no value
    Fill,
    /// Overwrite a property that may already hold a value
    Correct,
}

/// Per-property record of where the current value came from.
///
/// A single tagged value per property: a property can never be both
/// auto-filled and auto-corrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AutomationMarker {
    /// No automation. With a value present, the value is human-authored.
    #[default]
    None,
    /// Value written by FILL on an empty property
    AutoFilled,
    /// Value written by CORRECT, possibly over a previous value
    AutoCorrected,
}

impl AutomationMarker {
    /// Whether this marker records an automated value.
    pub fn is_automated(&self) -> bool {
        !matches!(self, AutomationMarker::None)
    }

    /// The marker an action produces when it applies.
    pub fn for_action(action: AutoAction) -> Self {
        match action {
            AutoAction::Fill => AutomationMarker::AutoFilled,
            AutoAction::Correct => AutomationMarker::AutoCorrected,
        }
    }

    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            AutomationMarker::None => "NONE",
            AutomationMarker::AutoFilled => "AUTO_FILLED",
            AutomationMarker::AutoCorrected => "AUTO_CORRECTED",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" | "" => Ok(AutomationMarker::None),
            "AUTO_FILLED" => Ok(AutomationMarker::AutoFilled),
            "AUTO_CORRECTED" => Ok(AutomationMarker::AutoCorrected),
            _ => Err(EnumParseError {
                kind: "AutomationMarker",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for AutomationMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for AutomationMarker {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Kind of bulk command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BulkKind {
    /// FILL then CORRECT on every selected item
    Apply,
    /// Remove suggestions (optionally filtered) and roll back automation
    Remove,
}

impl BulkKind {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            BulkKind::Apply => "APPLY",
            BulkKind::Remove => "REMOVE",
        }
    }
}

impl fmt::Display for BulkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

/// Lifecycle state of a bulk command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BulkState {
    Running,
    Completed,
    Failed,
}

impl BulkState {
    /// Whether the command has stopped processing items.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BulkState::Running)
    }

    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            BulkState::Running => "RUNNING",
            BulkState::Completed => "COMPLETED",
            BulkState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for BulkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

/// Error when parsing an invalid enum string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumParseError {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for EnumParseError {}
