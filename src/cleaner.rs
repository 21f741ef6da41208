//! Raw rows to canonical trip records.
//!
//! Steps run in a fixed order:
//! 1. coerce fields, dropping rows whose required fields do not parse;
//! 2. drop repeated trip ids, keeping the first in load order;
//! 3. drop implausible durations and timestamps that disagree with them;
//! 4. build [`TripRecord`]s, which derive the calendar fields.
//!
//! The raw table is only read. Dropped rows are counted per [`RejectReason`].

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::config::CleaningConfig;
use crate::error::RejectReason;
use crate::loader::LoadedData;
use crate::trip::{RawTrip, SourceFile, TripRecord};

/// Row accounting for one cleaning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleaningReport {
    pub input_rows: usize,
    pub kept_rows: usize,
    pub rejected: BTreeMap<RejectReason, usize>,
}

impl CleaningReport {
    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }

    pub fn count(&self, reason: RejectReason) -> usize {
        self.rejected.get(&reason).copied().unwrap_or(0)
    }

    fn reject(&mut self, reason: RejectReason) {
        *self.rejected.entry(reason).or_default() += 1;
    }
}

/// Cleaned trips plus the report that produced them.
#[derive(Debug, Clone, Default)]
pub struct CleanedData {
    pub trips: Vec<TripRecord>,
    pub report: CleaningReport,
}

/// A row whose fields all parsed.
struct Coerced<'a> {
    raw: &'a RawTrip,
    start: NaiveDateTime,
    end: NaiveDateTime,
    duration: f64,
    /// Whether `duration` came from the file rather than `end - start`.
    recorded: bool,
}

/// Cleans everything a [`LoadedData`] holds.
pub fn clean(data: &LoadedData, config: &CleaningConfig) -> CleanedData {
    clean_rows(&data.rows, &data.sources, config)
}

#[instrument(skip_all, fields(rows = rows.len()))]
pub fn clean_rows(rows: &[RawTrip], sources: &[SourceFile], config: &CleaningConfig) -> CleanedData {
    let mut report = CleaningReport {
        input_rows: rows.len(),
        ..Default::default()
    };

    // 1. Coerce
    let mut coerced = Vec::with_capacity(rows.len());
    for raw in rows {
        match coerce(raw, config) {
            Ok(row) => coerced.push(row),
            Err(reason) => report.reject(reason),
        }
    }

    // 2. Deduplicate
    let mut seen: HashSet<&str> = HashSet::with_capacity(coerced.len());
    let mut unique = Vec::with_capacity(coerced.len());
    for row in coerced {
        if seen.insert(row.raw.trip_id.as_str()) {
            unique.push(row);
        } else {
            report.reject(RejectReason::DuplicateTripId);
        }
    }

    // 3. Plausibility
    let names: Vec<Arc<str>> = sources.iter().map(|s| Arc::from(s.name.as_str())).collect();
    let mut trips = Vec::with_capacity(unique.len());
    for row in unique {
        if let Err(reason) = check_plausible(&row, config) {
            report.reject(reason);
            continue;
        }

        // 4. Derive
        let mut trip = TripRecord::new(row.raw.trip_id.clone(), row.start, row.end, row.duration)
            .with_stations(non_empty(&row.raw.start_station), non_empty(&row.raw.end_station))
            .with_bike(non_empty(&row.raw.bike_id))
            .with_passholder_type(row.raw.passholder_type.as_deref().and_then(non_empty));
        if let Some(name) = names.get(row.raw.source) {
            trip = trip.with_source(Arc::clone(name));
        }
        trips.push(trip);
    }

    report.kept_rows = trips.len();
    for (reason, count) in &report.rejected {
        debug!(%reason, count, "Rows rejected");
    }
    info!(
        input = report.input_rows,
        kept = report.kept_rows,
        rejected = report.rejected_total(),
        "Trip records cleaned"
    );

    CleanedData { trips, report }
}

fn coerce<'a>(raw: &'a RawTrip, config: &CleaningConfig) -> Result<Coerced<'a>, RejectReason> {
    if raw.trip_id.is_empty() {
        return Err(RejectReason::MissingTripId);
    }

    let start = parse_timestamp(&raw.start_time, &config.timestamp_formats)
        .ok_or(RejectReason::InvalidStartTime)?;
    let end = parse_timestamp(&raw.end_time, &config.timestamp_formats)
        .ok_or(RejectReason::InvalidEndTime)?;

    let (duration, recorded) = if raw.duration.is_empty() {
        (span_minutes(start, end), false)
    } else {
        let value: f64 = raw
            .duration
            .parse()
            .map_err(|_| RejectReason::InvalidDuration)?;
        if !value.is_finite() {
            return Err(RejectReason::InvalidDuration);
        }
        (value, true)
    };

    Ok(Coerced {
        raw,
        start,
        end,
        duration,
        recorded,
    })
}

fn check_plausible(row: &Coerced<'_>, config: &CleaningConfig) -> Result<(), RejectReason> {
    if row.duration < config.min_duration_minutes {
        return Err(RejectReason::DurationTooShort);
    }
    if row.duration > config.max_duration_minutes {
        return Err(RejectReason::DurationTooLong);
    }
    if row.end < row.start {
        return Err(RejectReason::EndBeforeStart);
    }
    if let Some(tolerance) = config.duration_tolerance_minutes {
        if row.recorded && (row.duration - span_minutes(row.start, row.end)).abs() > tolerance {
            return Err(RejectReason::DurationMismatch);
        }
    }
    Ok(())
}

/// Parses `value` with the first matching format.
pub fn parse_timestamp(value: &str, formats: &[String]) -> Option<NaiveDateTime> {
    formats
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

fn span_minutes(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    (end - start).num_seconds() as f64 / 60.0
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str, start: &str, end: &str, duration: &str) -> RawTrip {
        RawTrip {
            source: 0,
            trip_id: id.to_string(),
            start_time: start.to_string(),
            end_time: end.to_string(),
            duration: duration.to_string(),
            start_station: "3000".to_string(),
            end_station: "3001".to_string(),
            bike_id: "b1".to_string(),
            passholder_type: None,
        }
    }

    fn ok(id: &str) -> RawTrip {
        raw(id, "2021-04-01 08:00:00", "2021-04-01 08:10:00", "10")
    }

    fn run(rows: &[RawTrip]) -> CleanedData {
        clean_rows(rows, &[], &CleaningConfig::default())
    }

    #[test]
    fn test_valid_row_is_kept() {
        let cleaned = run(&[ok("1")]);
        assert_eq!(cleaned.trips.len(), 1);
        assert_eq!(cleaned.report.kept_rows, 1);
        assert_eq!(cleaned.report.rejected_total(), 0);

        let trip = &cleaned.trips[0];
        assert_eq!(trip.trip_id(), "1");
        assert_eq!(trip.duration_minutes(), 10.0);
        assert_eq!(trip.start_station(), Some("3000"));
        assert_eq!(trip.temporal().hour, 8);
        assert_eq!(trip.temporal().quarter, 2);
    }

    #[test]
    fn test_negative_duration_rejected() {
        let cleaned = run(&[
            ok("1"),
            raw("2", "2021-04-01 08:00:00", "2021-04-01 08:10:00", "-5"),
        ]);
        assert_eq!(cleaned.trips.len(), 1);
        assert_eq!(cleaned.report.count(RejectReason::DurationTooShort), 1);
        assert_eq!(cleaned.report.rejected_total(), 1);
    }

    #[test]
    fn test_duration_bounds_are_configurable() {
        let long = raw("1", "2021-04-01 08:00:00", "2021-04-02 09:00:00", "1500");
        assert_eq!(run(&[long.clone()]).report.count(RejectReason::DurationTooLong), 1);

        let config = CleaningConfig {
            max_duration_minutes: 2000.0,
            ..Default::default()
        };
        assert_eq!(clean_rows(&[long], &[], &config).trips.len(), 1);
    }

    #[test]
    fn test_duplicates_keep_first_occurrence() {
        let mut second = ok("1");
        second.bike_id = "b2".to_string();

        let cleaned = run(&[ok("1"), second, ok("2")]);
        assert_eq!(cleaned.trips.len(), 2);
        assert_eq!(cleaned.trips[0].bike_id(), Some("b1"));
        assert_eq!(cleaned.report.count(RejectReason::DuplicateTripId), 1);
    }

    #[test]
    fn test_coercion_failures_counted_by_reason() {
        let cleaned = run(&[
            raw("", "2021-04-01 08:00:00", "2021-04-01 08:10:00", "10"),
            raw("2", "yesterday", "2021-04-01 08:10:00", "10"),
            raw("3", "2021-04-01 08:00:00", "", "10"),
            raw("4", "2021-04-01 08:00:00", "2021-04-01 08:10:00", "ten"),
        ]);
        assert!(cleaned.trips.is_empty());
        assert_eq!(cleaned.report.count(RejectReason::MissingTripId), 1);
        assert_eq!(cleaned.report.count(RejectReason::InvalidStartTime), 1);
        assert_eq!(cleaned.report.count(RejectReason::InvalidEndTime), 1);
        assert_eq!(cleaned.report.count(RejectReason::InvalidDuration), 1);
        assert_eq!(cleaned.report.input_rows, 4);
    }

    #[test]
    fn test_missing_duration_derived_from_timestamps() {
        let cleaned = run(&[raw("1", "2021-04-01 08:00:00", "2021-04-01 08:25:30", "")]);
        assert_eq!(cleaned.trips[0].duration_minutes(), 25.5);
    }

    #[test]
    fn test_duration_must_match_timestamps() {
        let cleaned = run(&[
            raw("1", "2021-04-01 08:00:00", "2021-04-01 08:10:00", "45"),
            raw("2", "2021-04-01 08:10:00", "2021-04-01 08:00:00", "10"),
        ]);
        assert!(cleaned.trips.is_empty());
        assert_eq!(cleaned.report.count(RejectReason::DurationMismatch), 1);
        assert_eq!(cleaned.report.count(RejectReason::EndBeforeStart), 1);
    }

    #[test]
    fn test_alternate_timestamp_format() {
        let cleaned = run(&[raw("1", "4/1/2021 8:00", "4/1/2021 8:10", "10")]);
        assert_eq!(cleaned.trips.len(), 1);
        assert_eq!(cleaned.trips[0].temporal().month, 4);
    }

    #[test]
    fn test_empty_optional_fields_become_none() {
        let mut row = ok("1");
        row.end_station.clear();
        row.bike_id.clear();
        row.passholder_type = Some(String::new());

        let cleaned = run(&[row]);
        let trip = &cleaned.trips[0];
        assert_eq!(trip.end_station(), None);
        assert_eq!(trip.bike_id(), None);
        assert_eq!(trip.passholder_type(), None);
    }

    #[test]
    fn test_raw_rows_not_mutated() {
        let rows = vec![ok("1"), ok("1")];
        let before = rows.clone();
        let _ = run(&rows);
        assert_eq!(rows, before);
    }
}
