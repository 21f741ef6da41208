//! Static layout of the trip CSV files and the pipeline's named thresholds.

/// Default directory scanned for quarterly trip files.
pub const DEFAULT_DATA_DIR: &str = "data/csv";

/// Extension every trip file must carry.
pub const FILE_EXTENSION: &str = "csv";

/// Human-readable form of the accepted file name pattern.
pub const FILE_PATTERN: &str = "<prefix>-YYYY-qQ.csv";

// Indego column names. Overridable through `ColumnMap`.
pub const COL_TRIP_ID: &str = "trip_id";
pub const COL_START_TIME: &str = "start_time";
pub const COL_END_TIME: &str = "end_time";
pub const COL_DURATION: &str = "duration";
pub const COL_START_STATION: &str = "start_station";
pub const COL_END_STATION: &str = "end_station";
pub const COL_BIKE_ID: &str = "bike_id";
pub const COL_PASSHOLDER_TYPE: &str = "passholder_type";

/// Trips shorter than this many minutes are rejected.
pub const MIN_TRIP_DURATION_MINUTES: f64 = 1.0;

/// Trips longer than this many minutes (24 hours) are rejected.
pub const MAX_TRIP_DURATION_MINUTES: f64 = 1440.0;

/// Allowed gap between the recorded duration and `end - start`.
pub const DURATION_TOLERANCE_MINUTES: f64 = 2.0;

/// Accepted timestamp layouts, tried in order.
pub const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M"];

/// Upper bound of the duration histogram, in minutes.
pub const HISTOGRAM_RANGE_MINUTES: f64 = 60.0;

/// Default number of duration histogram buckets (one per minute).
pub const DEFAULT_HISTOGRAM_BUCKETS: usize = 60;

/// Default number of stations returned by the top-N ranking.
pub const DEFAULT_TOP_STATIONS: usize = 15;

/// Row cap applied to trip previews.
pub const PREVIEW_ROW_LIMIT: usize = 1000;

/// Number of quarters in a rolling year.
pub const ROLLING_WINDOW_QUARTERS: usize = 4;

/// Lifetime of a cached analysis, in seconds.
pub const CACHE_TTL_SECS: u64 = 3600;

/// Passholder types counted as members.
pub const MEMBER_PASS_TYPES: &[&str] = &["Indego30", "Indego365"];

/// Calendar quarter (1-4) containing `month` (1-12).
pub fn quarter_of_month(month: u32) -> u8 {
    ((month.saturating_sub(1)) / 3 + 1) as u8
}
