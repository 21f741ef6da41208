//! KPIs and derived series computed from trips and aggregated tables.
//!
//! Undefined results (zero or missing base, empty input) are `None`. Nothing
//! here substitutes zero for a value that cannot be computed.

use chrono::Weekday;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::analyzers::types::{DailyPattern, HourlyPattern, MonthlyHeatmap, QuarterlySummary};
use crate::analyzers::utility::{mean, median, stddev};
use crate::error::ComputationError;
use crate::schema::{HISTOGRAM_RANGE_MINUTES, MEMBER_PASS_TYPES};
use crate::trip::{TripRecord, YearQuarter};

/// Percentage change from `previous` to `current`.
pub fn growth_pct(current: Option<f64>, previous: Option<f64>) -> Result<f64, ComputationError> {
    let previous = previous.ok_or(ComputationError::MissingBase)?;
    let current = current.ok_or(ComputationError::MissingValue)?;
    if previous == 0.0 {
        return Err(ComputationError::ZeroBase);
    }
    Ok((current - previous) / previous * 100.0)
}

/// Mean of the defined values; undefined entries are left out of the count.
pub fn average_growth(values: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    let defined: Vec<f64> = values.into_iter().flatten().collect();
    mean(&defined)
}

/// Change from the first to the last value of `series`, in percent.
pub fn total_growth(series: &[f64]) -> Result<f64, ComputationError> {
    match series {
        [] => Err(ComputationError::InsufficientHistory {
            required: 1,
            available: 0,
        }),
        [first, .., last] => growth_pct(Some(*last), Some(*first)),
        [only] => growth_pct(Some(*only), Some(*only)),
    }
}

/// `part` as a percentage of `total`.
pub fn pct(part: u64, total: u64) -> Option<f64> {
    (total > 0).then(|| part as f64 / total as f64 * 100.0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GrowthMetrics {
    pub avg_qoq_trips: Option<f64>,
    pub avg_yoy_trips: Option<f64>,
    pub avg_qoq_minutes: Option<f64>,
    pub avg_yoy_minutes: Option<f64>,
    /// First to last quarter, trips.
    pub total_growth_pct: Option<f64>,
}

pub fn growth_metrics(summary: &[QuarterlySummary]) -> GrowthMetrics {
    let trips: Vec<f64> = summary
        .iter()
        .map(|r| r.rollup.total_trips as f64)
        .collect();

    GrowthMetrics {
        avg_qoq_trips: average_growth(summary.iter().map(|r| r.qoq_growth.trips)),
        avg_yoy_trips: average_growth(summary.iter().map(|r| r.yoy_growth.trips)),
        avg_qoq_minutes: average_growth(summary.iter().map(|r| r.qoq_growth.ride_minutes)),
        avg_yoy_minutes: average_growth(summary.iter().map(|r| r.yoy_growth.ride_minutes)),
        total_growth_pct: total_growth(&trips).ok(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeasonalityIndex {
    pub quarter: u8,
    /// Mean trips for this quarter-of-year over the mean of all quarters, x100.
    pub index: Option<f64>,
}

/// Seasonality index per quarter-of-year present in `summary`.
pub fn seasonality_index(summary: &[QuarterlySummary]) -> Vec<SeasonalityIndex> {
    let all: Vec<f64> = summary
        .iter()
        .map(|r| r.rollup.total_trips as f64)
        .collect();
    let overall = mean(&all);

    let mut by_quarter: BTreeMap<u8, Vec<f64>> = BTreeMap::new();
    for row in summary {
        by_quarter
            .entry(row.period().quarter)
            .or_default()
            .push(row.rollup.total_trips as f64);
    }

    by_quarter
        .into_iter()
        .map(|(quarter, values)| SeasonalityIndex {
            quarter,
            index: match (mean(&values), overall) {
                (Some(avg), Some(all)) if all != 0.0 => Some(avg / all * 100.0),
                _ => None,
            },
        })
        .collect()
}

/// A table key with its trip count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Peak<K> {
    pub key: K,
    pub trips: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PeakTimes {
    pub peak_hour: Option<Peak<u32>>,
    pub off_peak_hour: Option<Peak<u32>>,
    pub peak_day: Option<Peak<Weekday>>,
    pub peak_month: Option<Peak<u32>>,
}

/// Busiest key; ties go to the earliest key in iteration order. `None` when
/// every count is zero.
fn busiest<K: Copy>(counts: impl IntoIterator<Item = (K, u64)>) -> Option<Peak<K>> {
    let mut best: Option<Peak<K>> = None;
    for (key, trips) in counts {
        if best.is_none_or(|b| trips > b.trips) {
            best = Some(Peak { key, trips });
        }
    }
    best.filter(|b| b.trips > 0)
}

fn hour_totals(hourly: &[HourlyPattern]) -> BTreeMap<u32, u64> {
    let mut totals = BTreeMap::new();
    for row in hourly {
        *totals.entry(row.hour).or_default() += row.trips;
    }
    totals
}

pub fn peak_hour(hourly: &[HourlyPattern]) -> Option<Peak<u32>> {
    busiest(hour_totals(hourly))
}

/// Quietest hour; ties go to the earliest hour. `None` without any trips.
pub fn off_peak_hour(hourly: &[HourlyPattern]) -> Option<Peak<u32>> {
    let totals = hour_totals(hourly);
    if totals.values().all(|&n| n == 0) {
        return None;
    }
    let mut quietest: Option<Peak<u32>> = None;
    for (key, trips) in totals {
        if quietest.is_none_or(|q| trips < q.trips) {
            quietest = Some(Peak { key, trips });
        }
    }
    quietest
}

/// Busiest weekday, Monday first on ties.
pub fn peak_day(daily: &[DailyPattern]) -> Option<Peak<Weekday>> {
    let mut rows: Vec<&DailyPattern> = daily.iter().collect();
    rows.sort_by_key(|r| r.day_of_week);
    busiest(rows.into_iter().map(|r| (r.weekday, r.trips)))
}

/// Busiest month-of-year summed across years.
pub fn peak_month(heatmap: &MonthlyHeatmap) -> Option<Peak<u32>> {
    busiest(
        heatmap
            .rows
            .iter()
            .map(|row| (row.month, row.trips.iter().flatten().sum())),
    )
}

pub fn peak_times(
    hourly: &[HourlyPattern],
    daily: &[DailyPattern],
    heatmap: &MonthlyHeatmap,
) -> PeakTimes {
    PeakTimes {
        peak_hour: peak_hour(hourly),
        off_peak_hour: off_peak_hour(hourly),
        peak_day: peak_day(daily),
        peak_month: peak_month(heatmap),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DurationBin {
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DurationStats {
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std_dev: Option<f64>,
    /// Most populated bin; ties go to the shortest.
    pub mode: Option<DurationBin>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Width of one histogram bucket over the 0-60 minute range.
pub fn histogram_bin_width(buckets: usize) -> Option<f64> {
    (buckets > 0).then(|| HISTOGRAM_RANGE_MINUTES / buckets as f64)
}

/// Mean, median and binned mode of trip duration.
pub fn duration_stats(trips: &[TripRecord], bin_width: f64) -> DurationStats {
    let durations: Vec<f64> = trips.iter().map(TripRecord::duration_minutes).collect();
    let avg = mean(&durations);

    let mode = if bin_width > 0.0 && bin_width.is_finite() {
        let mut bins: BTreeMap<i64, u64> = BTreeMap::new();
        for d in &durations {
            *bins.entry((d / bin_width).floor() as i64).or_default() += 1;
        }
        busiest(bins).map(|peak| DurationBin {
            lower: peak.key as f64 * bin_width,
            upper: (peak.key + 1) as f64 * bin_width,
        })
    } else {
        None
    };

    DurationStats {
        count: durations.len(),
        mean: avg,
        median: median(&durations),
        std_dev: avg.and_then(|m| stddev(&durations, m)),
        mode,
        min: durations.iter().copied().reduce(f64::min),
        max: durations.iter().copied().reduce(f64::max),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub trips: u64,
}

/// Trip counts over 0-60 minutes in `buckets` equal bins. Longer trips are
/// left out; a trip of exactly 60 minutes lands in the last bin.
pub fn duration_histogram(trips: &[TripRecord], buckets: usize) -> Vec<HistogramBin> {
    let Some(width) = histogram_bin_width(buckets) else {
        return Vec::new();
    };

    let mut counts = vec![0u64; buckets];
    for trip in trips {
        let d = trip.duration_minutes();
        if !(0.0..=HISTOGRAM_RANGE_MINUTES).contains(&d) {
            continue;
        }
        let bin = ((d / width).floor() as usize).min(buckets - 1);
        counts[bin] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, trips)| HistogramBin {
            lower: i as f64 * width,
            upper: (i + 1) as f64 * width,
            trips,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Kpis {
    pub total_trips: u64,
    pub total_ride_minutes: f64,
    pub total_ride_hours: f64,
    pub avg_duration: Option<f64>,
    pub median_duration: Option<f64>,
    pub min_duration: Option<f64>,
    pub max_duration: Option<f64>,
    pub unique_bikes: usize,
    /// Stations seen as start or end.
    pub unique_stations: usize,
}

pub fn kpis(trips: &[TripRecord]) -> Kpis {
    let stats = duration_stats(trips, 0.0);
    let total_ride_minutes: f64 = trips.iter().map(TripRecord::duration_minutes).sum();

    let bikes: HashSet<&str> = trips.iter().filter_map(TripRecord::bike_id).collect();
    let stations: HashSet<&str> = trips
        .iter()
        .flat_map(|t| t.start_station().into_iter().chain(t.end_station()))
        .collect();

    Kpis {
        total_trips: trips.len() as u64,
        total_ride_minutes,
        total_ride_hours: total_ride_minutes / 60.0,
        avg_duration: stats.mean,
        median_duration: stats.median,
        min_duration: stats.min,
        max_duration: stats.max,
        unique_bikes: bikes.len(),
        unique_stations: stations.len(),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UsageStats {
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub min: Option<u64>,
    pub max: Option<u64>,
}

impl UsageStats {
    fn from_counts<K>(counts: HashMap<K, u64>) -> Self {
        let mut values: Vec<u64> = counts.into_values().collect();
        values.sort_unstable();
        let as_f64: Vec<f64> = values.iter().map(|&n| n as f64).collect();
        Self {
            mean: mean(&as_f64),
            median: median(&as_f64),
            min: values.first().copied(),
            max: values.last().copied(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Utilization {
    pub trips_per_bike: UsageStats,
    /// Counted by start station.
    pub trips_per_station: UsageStats,
}

pub fn utilization(trips: &[TripRecord]) -> Utilization {
    let mut per_bike: HashMap<&str, u64> = HashMap::new();
    let mut per_station: HashMap<&str, u64> = HashMap::new();
    for trip in trips {
        if let Some(bike) = trip.bike_id() {
            *per_bike.entry(bike).or_default() += 1;
        }
        if let Some(station) = trip.start_station() {
            *per_station.entry(station).or_default() += 1;
        }
    }

    Utilization {
        trips_per_bike: UsageStats::from_counts(per_bike),
        trips_per_station: UsageStats::from_counts(per_station),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeriodComparison {
    pub current: YearQuarter,
    pub previous: YearQuarter,
    pub current_trips: u64,
    pub previous_trips: u64,
    pub trips_change_pct: Option<f64>,
    pub current_minutes: f64,
    pub previous_minutes: f64,
    pub minutes_change_pct: Option<f64>,
}

/// Trips and ride minutes of two quarters side by side.
pub fn compare_periods(
    trips: &[TripRecord],
    current: YearQuarter,
    previous: YearQuarter,
) -> PeriodComparison {
    let totals = |period: YearQuarter| {
        trips
            .iter()
            .filter(|t| t.year_quarter() == period)
            .fold((0u64, 0.0f64), |(n, minutes), t| {
                (n + 1, minutes + t.duration_minutes())
            })
    };
    let (current_trips, current_minutes) = totals(current);
    let (previous_trips, previous_minutes) = totals(previous);

    PeriodComparison {
        current,
        previous,
        current_trips,
        previous_trips,
        trips_change_pct: growth_pct(Some(current_trips as f64), Some(previous_trips as f64)).ok(),
        current_minutes,
        previous_minutes,
        minutes_change_pct: growth_pct(Some(current_minutes), Some(previous_minutes)).ok(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemberShare {
    pub by_pass_type: BTreeMap<String, u64>,
    /// `None` when no trip carries a pass type.
    pub member_pct: Option<f64>,
}

/// Distribution of pass types and the share held by member passes.
pub fn member_share(trips: &[TripRecord]) -> MemberShare {
    let mut by_pass_type: BTreeMap<String, u64> = BTreeMap::new();
    for pass in trips.iter().filter_map(TripRecord::passholder_type) {
        *by_pass_type.entry(pass.to_string()).or_default() += 1;
    }

    let member_pct = if by_pass_type.is_empty() {
        None
    } else {
        let members: u64 = MEMBER_PASS_TYPES
            .iter()
            .filter_map(|p| by_pass_type.get(*p))
            .sum();
        pct(members, trips.len() as u64)
    };

    MemberShare {
        by_pass_type,
        member_pct,
    }
}
