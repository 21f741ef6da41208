//! Output formatting and persistence for trip tables.
//!
//! Supports pretty-printing, JSON serialization, and CSV export (optionally
//! gzip-compressed).

use anyhow::Result;
use csv::WriterBuilder;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::fmt::Debug;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::analyzers::types::QuarterlySummary;
use crate::trip::TripRecord;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Logs a value using Rust's debug pretty-print format.
pub fn print_pretty(value: &impl Debug) {
    debug!("{:#?}", value);
}

/// Logs a value as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One row of the quarterly summary export.
#[derive(Debug, Serialize)]
pub struct QuarterlyExportRow {
    pub year: i32,
    pub quarter: u8,
    pub total_trips: u64,
    pub total_ride_minutes: f64,
    pub avg_duration: Option<f64>,
    pub unique_bikes: usize,
    pub active_stations: usize,
    pub qoq_growth_pct: Option<f64>,
    pub yoy_growth_pct: Option<f64>,
}

impl From<&QuarterlySummary> for QuarterlyExportRow {
    fn from(row: &QuarterlySummary) -> Self {
        Self {
            year: row.rollup.period.year,
            quarter: row.rollup.period.quarter,
            total_trips: row.rollup.total_trips,
            total_ride_minutes: row.rollup.total_ride_minutes,
            avg_duration: row.rollup.avg_duration,
            unique_bikes: row.rollup.unique_bikes,
            active_stations: row.rollup.active_stations,
            qoq_growth_pct: row.qoq_growth.trips,
            yoy_growth_pct: row.yoy_growth.trips,
        }
    }
}

/// One row of the trip export: the canonical record plus derived fields.
#[derive(Debug, Serialize)]
pub struct TripExportRow<'a> {
    pub trip_id: &'a str,
    pub start_time: String,
    pub end_time: String,
    pub duration: f64,
    pub start_station: Option<&'a str>,
    pub end_station: Option<&'a str>,
    pub bike_id: Option<&'a str>,
    pub passholder_type: Option<&'a str>,
    pub source_file: Option<&'a str>,
    pub year: i32,
    pub quarter: u8,
    pub year_quarter: String,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub day_of_week: u32,
    pub day_name: String,
    pub day_type: String,
}

impl<'a> From<&'a TripRecord> for TripExportRow<'a> {
    fn from(trip: &'a TripRecord) -> Self {
        let t = trip.temporal();
        Self {
            trip_id: trip.trip_id(),
            start_time: trip.start_time().format(TIMESTAMP_FORMAT).to_string(),
            end_time: trip.end_time().format(TIMESTAMP_FORMAT).to_string(),
            duration: trip.duration_minutes(),
            start_station: trip.start_station(),
            end_station: trip.end_station(),
            bike_id: trip.bike_id(),
            passholder_type: trip.passholder_type(),
            source_file: trip.source_file(),
            year: t.year,
            quarter: t.quarter,
            year_quarter: t.year_quarter().to_string(),
            month: t.month,
            day: t.day,
            hour: t.hour,
            day_of_week: t.day_of_week(),
            day_name: format!("{:?}", t.weekday),
            day_type: t.day_type.to_string(),
        }
    }
}

/// Writes the quarterly summary as CSV. Undefined growth is an empty field.
pub fn write_quarterly_summary(writer: impl Write, rows: &[QuarterlySummary]) -> Result<usize> {
    let mut wtr = WriterBuilder::new().has_headers(true).from_writer(writer);
    for row in rows {
        wtr.serialize(QuarterlyExportRow::from(row))?;
    }
    wtr.flush()?;
    Ok(rows.len())
}

/// Writes up to `limit` trips as CSV; `None` writes them all.
pub fn write_trips(writer: impl Write, trips: &[TripRecord], limit: Option<usize>) -> Result<usize> {
    let mut wtr = WriterBuilder::new().has_headers(true).from_writer(writer);
    let count = limit.map_or(trips.len(), |n| n.min(trips.len()));
    for trip in &trips[..count] {
        wtr.serialize(TripExportRow::from(trip))?;
    }
    wtr.flush()?;
    Ok(count)
}

/// Creates `path` and hands a writer to `write`, gzip-compressing when asked.
pub fn export_to_file(
    path: &Path,
    gzip: bool,
    write: impl FnOnce(&mut dyn Write) -> Result<usize>,
) -> Result<usize> {
    let file = File::create(path)?;
    debug!(path = %path.display(), gzip, "Writing export");

    let rows = if gzip {
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        let rows = write(&mut encoder)?;
        encoder.finish()?.flush()?;
        rows
    } else {
        let mut writer = BufWriter::new(file);
        let rows = write(&mut writer)?;
        writer.flush()?;
        rows
    };

    info!(path = %path.display(), rows, "Export written");
    Ok(rows)
}

/// Formats a count for display: `1.50M`, `12.30K`, `950.00`.
pub fn format_number(num: f64, decimal_places: usize) -> String {
    if num >= 1_000_000.0 {
        format!("{:.*}M", decimal_places, num / 1_000_000.0)
    } else if num >= 1_000.0 {
        format!("{:.*}K", decimal_places, num / 1_000.0)
    } else {
        format!("{:.*}", decimal_places, num)
    }
}

/// Formats minutes as minutes, hours or days.
pub fn format_duration(minutes: f64) -> String {
    if minutes < 60.0 {
        format!("{minutes:.1} min")
    } else if minutes < 1440.0 {
        format!("{:.1} hrs", minutes / 60.0)
    } else {
        format!("{:.1} days", minutes / 1440.0)
    }
}
