//! Pipeline configuration.
//!
//! Stored as a plain JSON object on disk; every field is optional and falls
//! back to the Indego defaults:
//! ```json
//! {
//!   "data_dir": "data/csv",
//!   "file_prefix": "indego-trips",
//!   "cleaning": { "min_duration_minutes": 1.0, "max_duration_minutes": 1440.0 }
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

use crate::schema;

/// Names of the CSV columns the loader reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub trip_id: String,
    pub start_time: String,
    pub end_time: String,
    pub duration: String,
    pub start_station: String,
    pub end_station: String,
    pub bike_id: String,
    /// Read when present, ignored when the file lacks it.
    pub passholder_type: Option<String>,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            trip_id: schema::COL_TRIP_ID.to_string(),
            start_time: schema::COL_START_TIME.to_string(),
            end_time: schema::COL_END_TIME.to_string(),
            duration: schema::COL_DURATION.to_string(),
            start_station: schema::COL_START_STATION.to_string(),
            end_station: schema::COL_END_STATION.to_string(),
            bike_id: schema::COL_BIKE_ID.to_string(),
            passholder_type: Some(schema::COL_PASSHOLDER_TYPE.to_string()),
        }
    }
}

impl ColumnMap {
    /// Required columns in reading order.
    pub fn required(&self) -> [&str; 7] {
        [
            &self.trip_id,
            &self.start_time,
            &self.end_time,
            &self.duration,
            &self.start_station,
            &self.end_station,
            &self.bike_id,
        ]
    }
}

/// Plausibility thresholds applied by the cleaner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    pub min_duration_minutes: f64,
    pub max_duration_minutes: f64,
    /// `None` disables the duration / timestamp reconciliation check.
    pub duration_tolerance_minutes: Option<f64>,
    pub timestamp_formats: Vec<String>,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            min_duration_minutes: schema::MIN_TRIP_DURATION_MINUTES,
            max_duration_minutes: schema::MAX_TRIP_DURATION_MINUTES,
            duration_tolerance_minutes: Some(schema::DURATION_TOLERANCE_MINUTES),
            timestamp_formats: schema::TIMESTAMP_FORMATS
                .iter()
                .map(|f| f.to_string())
                .collect(),
        }
    }
}

/// Everything needed to run load and clean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    /// When set, only files named `<file_prefix>-YYYY-qQ.csv` are loaded.
    pub file_prefix: Option<String>,
    pub columns: ColumnMap,
    pub cleaning: CleaningConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(schema::DEFAULT_DATA_DIR),
            file_prefix: None,
            columns: ColumnMap::default(),
            cleaning: CleaningConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading config {path}"))?;
        let config: PipelineConfig =
            serde_json::from_str(&content).with_context(|| format!("parsing config {path}"))?;
        debug!(path, "Loaded pipeline config");
        Ok(config)
    }

    /// Starts from `path`, else `BIKESHARE_CONFIG`, else defaults, and
    /// applies the `BIKESHARE_*` environment overrides.
    pub fn resolve(path: Option<&str>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load(path)?,
            None => match std::env::var("BIKESHARE_CONFIG") {
                Ok(path) => Self::load(&path)?,
                Err(_) => Self::default(),
            },
        };
        config.with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(dir) = std::env::var("BIKESHARE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(prefix) = std::env::var("BIKESHARE_FILE_PREFIX") {
            self.file_prefix = Some(prefix);
        }
        if let Ok(min) = std::env::var("BIKESHARE_MIN_DURATION") {
            self.cleaning.min_duration_minutes = min
                .parse()
                .with_context(|| format!("BIKESHARE_MIN_DURATION={min}"))?;
        }
        if let Ok(max) = std::env::var("BIKESHARE_MAX_DURATION") {
            self.cleaning.max_duration_minutes = max
                .parse()
                .with_context(|| format!("BIKESHARE_MAX_DURATION={max}"))?;
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_schema() {
        let config = PipelineConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("data/csv"));
        assert_eq!(config.cleaning.min_duration_minutes, 1.0);
        assert_eq!(config.cleaning.max_duration_minutes, 1440.0);
        assert_eq!(config.columns.trip_id, "trip_id");
        assert_eq!(config.columns.required().len(), 7);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{ "file_prefix": "indego-trips", "cleaning": { "max_duration_minutes": 600 } }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.file_prefix.as_deref(), Some("indego-trips"));
        assert_eq!(config.cleaning.max_duration_minutes, 600.0);
        assert_eq!(config.cleaning.min_duration_minutes, 1.0);
        assert_eq!(config.columns, ColumnMap::default());
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(PipelineConfig::load("/nonexistent/bikeshare.json").is_err());
    }

    #[test]
    fn test_resolve_reads_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "data_dir": "trips" }"#).unwrap();

        let config = PipelineConfig::resolve(path.to_str()).unwrap();
        assert_eq!(config.cleaning, CleaningConfig::default());
        if std::env::var("BIKESHARE_DATA_DIR").is_err() {
            assert_eq!(config.data_dir, PathBuf::from("trips"));
        }
    }
}
