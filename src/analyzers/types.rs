//! Row types of the derived tables.
//!
//! `None` in an `Option<f64>` growth or rolling field means "undefined"
//! (no prior period, zero base, or too little history). It is never zero.

use chrono::Weekday;
use serde::Serialize;

use crate::trip::{DayType, YearQuarter};

/// Per-quarter totals before growth is attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuarterlyRollup {
    pub period: YearQuarter,
    pub total_trips: u64,
    pub total_ride_minutes: f64,
    /// `None` for a quarter with zero trips.
    pub avg_duration: Option<f64>,
    pub median_duration: Option<f64>,
    pub unique_bikes: usize,
    /// Stations touched as start or end.
    pub active_stations: usize,
}

/// Percentage change of the three headline quarterly metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GrowthSet {
    pub trips: Option<f64>,
    pub ride_minutes: Option<f64>,
    pub avg_duration: Option<f64>,
}

/// One row of the quarterly summary, strictly ordered by period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuarterlySummary {
    #[serde(flatten)]
    pub rollup: QuarterlyRollup,
    pub qoq_growth: GrowthSet,
    pub yoy_growth: GrowthSet,
}

impl QuarterlySummary {
    pub fn period(&self) -> YearQuarter {
        self.rollup.period
    }
}

/// Trailing four-quarter totals ending at `period`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollingTotal {
    pub period: YearQuarter,
    pub trips: Option<u64>,
    pub ride_minutes: Option<f64>,
    /// Mean of the four quarterly average durations.
    pub avg_duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyPattern {
    pub hour: u32,
    pub day_type: DayType,
    pub trips: u64,
    pub avg_duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPattern {
    pub weekday: Weekday,
    /// 0 = Monday.
    pub day_of_week: u32,
    pub trips: u64,
    pub avg_duration: Option<f64>,
}

/// Trips per (month, year). `None` cells had no file covering them; `Some(0)`
/// cells were covered but saw no trips.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthlyHeatmap {
    pub years: Vec<i32>,
    /// Twelve rows, January first; each row is aligned with `years`.
    pub rows: Vec<HeatmapRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapRow {
    pub month: u32,
    pub trips: Vec<Option<u64>>,
}

impl MonthlyHeatmap {
    /// `None` when the year is not in the matrix or the month is out of range.
    pub fn cell(&self, year: i32, month: u32) -> Option<Option<u64>> {
        let column = self.years.iter().position(|&y| y == year)?;
        let row = self.rows.iter().find(|r| r.month == month)?;
        row.trips.get(column).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationSummary {
    pub station: String,
    pub departures: u64,
    pub arrivals: u64,
    pub total_activity: u64,
    /// Mean duration of trips departing here.
    pub avg_trip_duration: Option<f64>,
    /// 1 = busiest.
    pub rank: usize,
}
