//! Configuration types
//!
//! Configuration is passed around as immutable values. Thresholds load from
//! TOML; engine and bulk settings read from the environment.

use crate::{AutoPropResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Fallback threshold for both FILL and CORRECT.
pub const DEFAULT_THRESHOLD: f32 = 0.7;

pub const DEFAULT_BULK_WORKERS: usize = 4;
pub const DEFAULT_BULK_BATCH_SIZE: usize = 50;
pub const DEFAULT_BULK_DEADLINE_SECS: u64 = 3600;
pub const DEFAULT_BULK_RETENTION_SECS: u64 = 3600;

/// Upper bound for bulk durations (7 days).
pub const MAX_BULK_DURATION_SECS: u64 = 7 * 24 * 3600;

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

// ============================================================================
// THRESHOLDS
// ============================================================================

/// Fill/correct thresholds for one key. Unset sides fall through to the next
/// level of lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPair {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct: Option<f32>,
}

impl ThresholdPair {
    pub fn both(threshold: f32) -> Self {
        Self {
            fill: Some(threshold),
            correct: Some(threshold),
        }
    }
}

/// Thresholds for a document type or facet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeThresholds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct: Option<f32>,
    #[serde(default)]
    pub properties: BTreeMap<String, ThresholdPair>,
}

impl TypeThresholds {
    /// Type-level default.
    pub fn defaults(&self) -> ThresholdPair {
        ThresholdPair {
            fill: self.fill,
            correct: self.correct,
        }
    }
}

/// Threshold table keyed by (document type or facet, property).
///
/// ```toml
/// global_fill = 0.7
/// global_correct = 0.8
///
/// [types.File]
/// fill = 0.6
///
/// [types.File.properties."dc:format"]
/// correct = 0.9
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default = "default_threshold")]
    pub global_fill: f32,
    #[serde(default = "default_threshold")]
    pub global_correct: f32,
    #[serde(default)]
    pub types: BTreeMap<String, TypeThresholds>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            global_fill: DEFAULT_THRESHOLD,
            global_correct: DEFAULT_THRESHOLD,
            types: BTreeMap::new(),
        }
    }
}

impl ThresholdConfig {
    /// Parse and validate a TOML threshold table.
    pub fn from_toml_str(input: &str) -> AutoPropResult<Self> {
        let config: Self = toml::from_str(input).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML threshold table from disk.
    pub fn from_path(path: impl AsRef<Path>) -> AutoPropResult<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&input)
    }

    /// Validate that every threshold is a probability.
    pub fn validate(&self) -> AutoPropResult<()> {
        check_threshold("global_fill", self.global_fill)?;
        check_threshold("global_correct", self.global_correct)?;

        for (type_name, entry) in &self.types {
            check_pair(type_name, &entry.defaults())?;
            for (property, pair) in &entry.properties {
                check_pair(&format!("{}.{}", type_name, property), pair)?;
            }
        }
        Ok(())
    }

    /// Set both fill and correct thresholds for (type, property).
    pub fn set_threshold(&mut self, type_name: &str, property: &str, threshold: f32) {
        let pair = self.pair_mut(type_name, property);
        pair.fill = Some(threshold);
        pair.correct = Some(threshold);
    }

    pub fn set_fill_threshold(&mut self, type_name: &str, property: &str, threshold: f32) {
        self.pair_mut(type_name, property).fill = Some(threshold);
    }

    pub fn set_correct_threshold(&mut self, type_name: &str, property: &str, threshold: f32) {
        self.pair_mut(type_name, property).correct = Some(threshold);
    }

    /// Set the type-level default for both actions.
    pub fn set_type_default(&mut self, type_name: &str, threshold: f32) {
        let entry = self.types.entry(type_name.to_string()).or_default();
        entry.fill = Some(threshold);
        entry.correct = Some(threshold);
    }

    /// Exact (type, property) entry.
    pub fn property_entry(&self, type_name: &str, property: &str) -> Option<&ThresholdPair> {
        self.types.get(type_name)?.properties.get(property)
    }

    /// Type-level default entry.
    pub fn type_entry(&self, type_name: &str) -> Option<ThresholdPair> {
        self.types.get(type_name).map(TypeThresholds::defaults)
    }

    fn pair_mut(&mut self, type_name: &str, property: &str) -> &mut ThresholdPair {
        self.types
            .entry(type_name.to_string())
            .or_default()
            .properties
            .entry(property.to_string())
            .or_default()
    }
}

fn check_pair(key: &str, pair: &ThresholdPair) -> AutoPropResult<()> {
    if let Some(fill) = pair.fill {
        check_threshold(&format!("{}.fill", key), fill)?;
    }
    if let Some(correct) = pair.correct {
        check_threshold(&format!("{}.correct", key), correct)?;
    }
    Ok(())
}

fn check_threshold(field: &str, value: f32) -> AutoPropResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: "threshold must be between 0.0 and 1.0".to_string(),
        }
        .into());
    }
    Ok(())
}

// ============================================================================
// ENGINE
// ============================================================================

/// Engine behavior switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Run FILL then CORRECT when a suggestion record is ingested
    pub auto_apply_on_ingest: bool,
    /// Note stored with automation bookkeeping when the caller gives none
    pub default_note: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_apply_on_ingest: false,
            default_note: "automated".to_string(),
        }
    }
}

impl EngineConfig {
    /// Create EngineConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `AUTOPROP_AUTO_APPLY_ON_INGEST`: apply suggestions on ingest (default: false)
    /// - `AUTOPROP_DEFAULT_NOTE`: bookkeeping note (default: "automated")
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let auto_apply_on_ingest = std::env::var("AUTOPROP_AUTO_APPLY_ON_INGEST")
            .ok()
            .map(|s| matches!(s.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.auto_apply_on_ingest);
        let default_note = std::env::var("AUTOPROP_DEFAULT_NOTE")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.default_note);

        Self {
            auto_apply_on_ingest,
            default_note,
        }
    }

    pub fn with_auto_apply(mut self, enabled: bool) -> Self {
        self.auto_apply_on_ingest = enabled;
        self
    }
}

// ============================================================================
// BULK
// ============================================================================

/// Bulk coordinator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkConfig {
    /// Concurrent batches in flight (default: 4)
    pub worker_count: usize,
    /// Documents per batch (default: 50)
    pub batch_size: usize,
    /// A command still running after this is failed (default: 1 hour)
    pub command_deadline: Duration,
    /// Finished commands are evicted once they have been terminal this long
    /// (default: 1 hour)
    pub finished_retention: Duration,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_BULK_WORKERS,
            batch_size: DEFAULT_BULK_BATCH_SIZE,
            command_deadline: Duration::from_secs(DEFAULT_BULK_DEADLINE_SECS),
            finished_retention: Duration::from_secs(DEFAULT_BULK_RETENTION_SECS),
        }
    }
}

impl BulkConfig {
    /// Create BulkConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `AUTOPROP_BULK_WORKERS`: concurrent batches (default: 4)
    /// - `AUTOPROP_BULK_BATCH_SIZE`: documents per batch (default: 50)
    /// - `AUTOPROP_BULK_DEADLINE_SECS`: command deadline (default: 3600)
    /// - `AUTOPROP_BULK_RETENTION_SECS`: finished command retention (default: 3600)
    pub fn from_env() -> Self {
        let worker_count = std::env::var("AUTOPROP_BULK_WORKERS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_BULK_WORKERS);

        let batch_size = std::env::var("AUTOPROP_BULK_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_BULK_BATCH_SIZE);

        let command_deadline = Duration::from_secs(
            std::env::var("AUTOPROP_BULK_DEADLINE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BULK_DEADLINE_SECS),
        );

        let finished_retention = Duration::from_secs(
            std::env::var("AUTOPROP_BULK_RETENTION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BULK_RETENTION_SECS),
        );

        Self {
            worker_count,
            batch_size,
            command_deadline,
            finished_retention,
        }
    }

    pub fn validate(&self) -> AutoPropResult<()> {
        if self.worker_count == 0 {
            return Err(ConfigError::InvalidValue {
                field: "worker_count".to_string(),
                value: "0".to_string(),
                reason: "worker_count must be greater than 0".to_string(),
            }
            .into());
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batch_size".to_string(),
                value: "0".to_string(),
                reason: "batch_size must be greater than 0".to_string(),
            }
            .into());
        }
        if self.command_deadline.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "command_deadline".to_string(),
                value: "0s".to_string(),
                reason: "command_deadline must be positive".to_string(),
            }
            .into());
        }
        let max = Duration::from_secs(MAX_BULK_DURATION_SECS);
        for (field, value) in [
            ("command_deadline", self.command_deadline),
            ("finished_retention", self.finished_retention),
        ] {
            if value > max {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: format!("{}s", value.as_secs()),
                    reason: format!("{field} must not exceed {MAX_BULK_DURATION_SECS}s"),
                }
                .into());
            }
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AutoPropError;

    #[test]
    fn test_threshold_defaults() {
        let config = ThresholdConfig::default();
        assert_eq!(config.global_fill, DEFAULT_THRESHOLD);
        assert_eq!(config.global_correct, DEFAULT_THRESHOLD);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_threshold_from_toml() {
        let config = ThresholdConfig::from_toml_str(
            r#"
            global_correct = 0.8

            [types.File]
            fill = 0.6

            [types.File.properties."dc:format"]
            correct = 0.9
            "#,
        )
        .unwrap();

        assert_eq!(config.global_fill, DEFAULT_THRESHOLD);
        assert_eq!(config.global_correct, 0.8);
        assert_eq!(config.type_entry("File").unwrap().fill, Some(0.6));
        let pair = config.property_entry("File", "dc:format").unwrap();
        assert_eq!(pair.fill, None);
        assert_eq!(pair.correct, Some(0.9));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let err = ThresholdConfig::from_toml_str(
            r#"
            [types.Picture.properties."dc:title"]
            fill = 1.5
            "#,
        )
        .unwrap_err();
        match err {
            AutoPropError::Config(ConfigError::InvalidValue { field, .. }) => {
                assert_eq!(field, "Picture.dc:title.fill");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_threshold_bad_toml() {
        let err = ThresholdConfig::from_toml_str("global_fill = 'high'").unwrap_err();
        assert!(matches!(err, AutoPropError::Config(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_set_threshold_sets_both() {
        let mut config = ThresholdConfig::default();
        config.set_threshold("File", "dc:title", 0.5);
        config.set_correct_threshold("File", "dc:title", 0.95);
        let pair = config.property_entry("File", "dc:title").unwrap();
        assert_eq!(pair.fill, Some(0.5));
        assert_eq!(pair.correct, Some(0.95));
    }

    #[test]
    fn test_bulk_config_validate() {
        assert!(BulkConfig::default().validate().is_ok());
        let config = BulkConfig {
            worker_count: 0,
            ..BulkConfig::default()
        };
        assert!(config.validate().is_err());
        let config = BulkConfig {
            command_deadline: Duration::ZERO,
            ..BulkConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bulk_config_rejects_unbounded_durations() {
        let config = BulkConfig {
            command_deadline: Duration::from_secs(u64::MAX),
            ..BulkConfig::default()
        };
        match config.validate().unwrap_err() {
            AutoPropError::Config(ConfigError::InvalidValue { field, .. }) => {
                assert_eq!(field, "command_deadline");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let config = BulkConfig {
            finished_retention: Duration::from_secs(MAX_BULK_DURATION_SECS + 1),
            ..BulkConfig::default()
        };
        assert!(config.validate().is_err());

        let config = BulkConfig {
            command_deadline: Duration::from_secs(MAX_BULK_DURATION_SECS),
            finished_retention: Duration::ZERO,
            ..BulkConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env_defaults() {
        if std::env::var("AUTOPROP_BULK_WORKERS").is_err()
            && std::env::var("AUTOPROP_BULK_BATCH_SIZE").is_err()
            && std::env::var("AUTOPROP_BULK_DEADLINE_SECS").is_err()
            && std::env::var("AUTOPROP_BULK_RETENTION_SECS").is_err()
        {
            assert_eq!(BulkConfig::from_env(), BulkConfig::default());
        }
        assert!(!EngineConfig::from_env().default_note.is_empty());
    }
}
