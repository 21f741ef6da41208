//! Hour-of-day, day-of-week and month-by-year trip distributions.

use chrono::Weekday;
use std::collections::{BTreeMap, BTreeSet};

use crate::analyzers::types::{DailyPattern, HeatmapRow, HourlyPattern, MonthlyHeatmap};
use crate::analyzers::utility::mean;
use crate::schema::quarter_of_month;
use crate::trip::{DayType, TripRecord, YearQuarter};

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Trips per (hour, day type). Always 48 rows: hour ascending, weekday
/// before weekend, empty slots as zero.
pub fn hourly_pattern(trips: &[TripRecord]) -> Vec<HourlyPattern> {
    let mut durations: [[Vec<f64>; 2]; 24] = Default::default();
    for trip in trips {
        let t = trip.temporal();
        durations[t.hour as usize][usize::from(t.is_weekend())].push(trip.duration_minutes());
    }

    durations
        .iter()
        .enumerate()
        .flat_map(|(hour, by_type)| {
            [DayType::Weekday, DayType::Weekend]
                .into_iter()
                .zip(by_type)
                .map(move |(day_type, values)| HourlyPattern {
                    hour: hour as u32,
                    day_type,
                    trips: values.len() as u64,
                    avg_duration: mean(values),
                })
        })
        .collect()
}

/// Trips per weekday, Monday through Sunday.
pub fn daily_pattern(trips: &[TripRecord]) -> Vec<DailyPattern> {
    let mut durations: [Vec<f64>; 7] = Default::default();
    for trip in trips {
        durations[trip.temporal().day_of_week() as usize].push(trip.duration_minutes());
    }

    WEEK.iter()
        .zip(&durations)
        .map(|(&weekday, values)| DailyPattern {
            weekday,
            day_of_week: weekday.num_days_from_monday(),
            trips: values.len() as u64,
            avg_duration: mean(values),
        })
        .collect()
}

/// Trips per (month, year) as a dense matrix.
///
/// A month counts as covered when a file was provided for its quarter or any
/// trip falls in it. Covered months hold a count (possibly zero); uncovered
/// months hold `None`. A non-empty `months` set restricts coverage to those
/// months, so months excluded by a filter stay `None`.
pub fn monthly_heatmap(
    trips: &[TripRecord],
    provided: &BTreeSet<YearQuarter>,
    months: &BTreeSet<u32>,
) -> MonthlyHeatmap {
    let mut counts: BTreeMap<(i32, u32), u64> = BTreeMap::new();
    for trip in trips {
        let t = trip.temporal();
        *counts.entry((t.year, t.month)).or_default() += 1;
    }

    let years: Vec<i32> = provided
        .iter()
        .map(|p| p.year)
        .chain(counts.keys().map(|&(year, _)| year))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let rows = (1..=12)
        .map(|month| HeatmapRow {
            month,
            trips: years
                .iter()
                .map(|&year| {
                    if !months.is_empty() && !months.contains(&month) {
                        return None;
                    }
                    let covered = YearQuarter::new(year, quarter_of_month(month))
                        .is_some_and(|p| provided.contains(&p));
                    match counts.get(&(year, month)) {
                        Some(&n) => Some(n),
                        None if covered => Some(0),
                        None => None,
                    }
                })
                .collect(),
        })
        .collect();

    MonthlyHeatmap { years, rows }
}
