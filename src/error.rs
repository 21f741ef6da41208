//! Error taxonomy for the trip pipeline.
//!
//! Only [`DataNotFound`] is fatal to a caller. [`DataFormatError`]s are
//! collected per file, [`RejectReason`]s are counted per row, and
//! [`ComputationError`]s become `None` in the derived tables.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// No usable trip data could be produced.
#[derive(Debug, thiserror::Error)]
pub enum DataNotFound {
    /// The data directory does not exist or cannot be listed.
    #[error("data directory not found: {path}")]
    MissingDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The directory exists but holds no file matching the naming pattern.
    #[error("no files matching {pattern} in {path}")]
    NoMatchingFiles { path: PathBuf, pattern: &'static str },

    /// Files were found but nothing survived loading and cleaning.
    #[error("no usable trip data in {path} ({failed_files} file(s) failed to load)")]
    NoUsableData { path: PathBuf, failed_files: usize },
}

/// Failure of a cached pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    NotFound(#[from] DataNotFound),

    #[error("cannot encode cache key")]
    CacheKey(#[from] serde_json::Error),
}

/// A single trip file could not be read. The file is skipped.
#[derive(Debug, thiserror::Error)]
pub enum DataFormatError {
    #[error("cannot read {path}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("{path} is missing required column \"{column}\"")]
    MissingColumn { path: PathBuf, column: String },
}

impl DataFormatError {
    /// The file this error refers to.
    pub fn path(&self) -> &PathBuf {
        match self {
            DataFormatError::Unreadable { path, .. }
            | DataFormatError::Csv { path, .. }
            | DataFormatError::MissingColumn { path, .. } => path,
        }
    }
}

/// Why the cleaner dropped a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MissingTripId,
    InvalidStartTime,
    InvalidEndTime,
    InvalidDuration,
    EndBeforeStart,
    DurationMismatch,
    DuplicateTripId,
    DurationTooShort,
    DurationTooLong,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::MissingTripId => "missing_trip_id",
            RejectReason::InvalidStartTime => "invalid_start_time",
            RejectReason::InvalidEndTime => "invalid_end_time",
            RejectReason::InvalidDuration => "invalid_duration",
            RejectReason::EndBeforeStart => "end_before_start",
            RejectReason::DurationMismatch => "duration_mismatch",
            RejectReason::DuplicateTripId => "duplicate_trip_id",
            RejectReason::DurationTooShort => "duration_too_short",
            RejectReason::DurationTooLong => "duration_too_long",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A derived value has no defined result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ComputationError {
    /// The comparison base is zero.
    #[error("comparison base is zero")]
    ZeroBase,

    /// The comparison period is absent from the table.
    #[error("comparison period is absent")]
    MissingBase,

    /// The value being compared is itself undefined.
    #[error("value is undefined")]
    MissingValue,

    /// Fewer periods than the window requires.
    #[error("insufficient history: need {required} periods, have {available}")]
    InsufficientHistory { required: usize, available: usize },
}
