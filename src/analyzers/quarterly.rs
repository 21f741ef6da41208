use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::analyzers::types::{GrowthSet, QuarterlyRollup, QuarterlySummary, RollingTotal};
use crate::analyzers::utility::{mean, median};
use crate::error::ComputationError;
use crate::metrics::growth_pct;
use crate::schema::ROLLING_WINDOW_QUARTERS;
use crate::trip::{TripRecord, YearQuarter};

#[derive(Default)]
struct QuarterAccumulator<'a> {
    durations: Vec<f64>,
    bikes: HashSet<&'a str>,
    stations: HashSet<&'a str>,
}

/// Groups trips by (year, quarter).
///
/// Every period in `provided` gets a row even when no trip falls in it, so a
/// quarter whose file held no qualifying trips reads as zero rather than
/// missing. Periods with neither a file nor a trip are absent.
pub fn quarterly_rollup(
    trips: &[TripRecord],
    provided: &BTreeSet<YearQuarter>,
) -> Vec<QuarterlyRollup> {
    let mut groups: BTreeMap<YearQuarter, QuarterAccumulator> = provided
        .iter()
        .map(|&period| (period, QuarterAccumulator::default()))
        .collect();

    for trip in trips {
        let acc = groups.entry(trip.year_quarter()).or_default();
        acc.durations.push(trip.duration_minutes());
        if let Some(bike) = trip.bike_id() {
            acc.bikes.insert(bike);
        }
        acc.stations.extend(trip.start_station());
        acc.stations.extend(trip.end_station());
    }

    groups
        .into_iter()
        .map(|(period, acc)| QuarterlyRollup {
            period,
            total_trips: acc.durations.len() as u64,
            total_ride_minutes: acc.durations.iter().sum(),
            avg_duration: mean(&acc.durations),
            median_duration: median(&acc.durations),
            unique_bikes: acc.bikes.len(),
            active_stations: acc.stations.len(),
        })
        .collect()
}

/// Attaches QoQ and YoY growth to each rollup row.
///
/// QoQ compares with the immediately preceding calendar quarter and YoY with
/// the same quarter a year earlier. A comparison period missing from the table
/// yields `None`, as does a zero base.
pub fn quarterly_summary(rollups: &[QuarterlyRollup]) -> Vec<QuarterlySummary> {
    let by_period = index(rollups);

    let mut rows: Vec<QuarterlySummary> = rollups
        .iter()
        .map(|row| QuarterlySummary {
            rollup: row.clone(),
            qoq_growth: growth_against(row, by_period.get(&row.period.previous()).copied()),
            yoy_growth: growth_against(row, by_period.get(&row.period.year_earlier()).copied()),
        })
        .collect();
    rows.sort_by_key(QuarterlySummary::period);
    rows
}

fn growth_against(current: &QuarterlyRollup, base: Option<&QuarterlyRollup>) -> GrowthSet {
    GrowthSet {
        trips: growth_pct(
            Some(current.total_trips as f64),
            base.map(|b| b.total_trips as f64),
        )
        .ok(),
        ride_minutes: growth_pct(
            Some(current.total_ride_minutes),
            base.map(|b| b.total_ride_minutes),
        )
        .ok(),
        avg_duration: growth_pct(current.avg_duration, base.and_then(|b| b.avg_duration)).ok(),
    }
}

/// Trailing four-quarter totals for each row.
///
/// The window is the current quarter and the three calendar quarters before
/// it. If any of them is absent from the table the row's values are `None`;
/// partial sums are never reported.
pub fn rolling_annual(rollups: &[QuarterlyRollup]) -> Vec<RollingTotal> {
    let by_period = index(rollups);

    let mut rows: Vec<RollingTotal> = rollups
        .iter()
        .map(|row| match window(&by_period, row.period) {
            Ok(quarters) => RollingTotal {
                period: row.period,
                trips: Some(quarters.iter().map(|q| q.total_trips).sum()),
                ride_minutes: Some(quarters.iter().map(|q| q.total_ride_minutes).sum()),
                avg_duration: quarters
                    .iter()
                    .map(|q| q.avg_duration)
                    .collect::<Option<Vec<f64>>>()
                    .and_then(|avgs| mean(&avgs)),
            },
            Err(_) => RollingTotal {
                period: row.period,
                trips: None,
                ride_minutes: None,
                avg_duration: None,
            },
        })
        .collect();
    rows.sort_by_key(|r| r.period);
    rows
}

/// The rows for `end` and the quarters before it, oldest first.
pub fn window<'a>(
    by_period: &BTreeMap<YearQuarter, &'a QuarterlyRollup>,
    end: YearQuarter,
) -> Result<Vec<&'a QuarterlyRollup>, ComputationError> {
    let mut quarters = Vec::with_capacity(ROLLING_WINDOW_QUARTERS);
    let mut period = end;
    for _ in 0..ROLLING_WINDOW_QUARTERS {
        if let Some(row) = by_period.get(&period) {
            quarters.push(*row);
        }
        period = period.previous();
    }

    if quarters.len() < ROLLING_WINDOW_QUARTERS {
        return Err(ComputationError::InsufficientHistory {
            required: ROLLING_WINDOW_QUARTERS,
            available: quarters.len(),
        });
    }
    quarters.reverse();
    Ok(quarters)
}

fn index(rollups: &[QuarterlyRollup]) -> BTreeMap<YearQuarter, &QuarterlyRollup> {
    rollups.iter().map(|r| (r.period, r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn yq(year: i32, quarter: u8) -> YearQuarter {
        YearQuarter::new(year, quarter).unwrap()
    }

    fn trip(id: usize, period: YearQuarter, duration: f64, start: &str, end: &str) -> TripRecord {
        let month = *period.months().start();
        let ts = NaiveDate::from_ymd_opt(period.year, month, 5)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        TripRecord::new(id.to_string(), ts, ts, duration)
            .with_stations(Some(start.to_string()), Some(end.to_string()))
            .with_bike(Some(format!("bike-{}", id % 3)))
    }

    fn trips_in(period: YearQuarter, count: usize) -> Vec<TripRecord> {
        (0..count).map(|i| trip(i, period, 10.0, "A", "B")).collect()
    }

    fn rollup(period: YearQuarter, total_trips: u64) -> QuarterlyRollup {
        QuarterlyRollup {
            period,
            total_trips,
            total_ride_minutes: total_trips as f64 * 10.0,
            avg_duration: (total_trips > 0).then_some(10.0),
            median_duration: (total_trips > 0).then_some(10.0),
            unique_bikes: 0,
            active_stations: 0,
        }
    }

    #[test]
    fn test_rollup_totals() {
        let trips = vec![
            trip(1, yq(2021, 1), 10.0, "A", "B"),
            trip(2, yq(2021, 1), 20.0, "B", "C"),
            trip(3, yq(2021, 1), 30.0, "A", "A"),
        ];
        let rows = quarterly_rollup(&trips, &BTreeSet::new());

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.total_trips, 3);
        assert_eq!(row.total_ride_minutes, 60.0);
        assert_eq!(row.avg_duration, Some(20.0));
        assert_eq!(row.median_duration, Some(20.0));
        assert_eq!(row.unique_bikes, 3);
        assert_eq!(row.active_stations, 3);
    }

    #[test]
    fn test_provided_quarter_without_trips_is_zero_row() {
        let provided: BTreeSet<_> = [yq(2021, 1), yq(2021, 2)].into_iter().collect();
        let rows = quarterly_rollup(&trips_in(yq(2021, 1), 2), &provided);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].period, yq(2021, 2));
        assert_eq!(rows[1].total_trips, 0);
        assert_eq!(rows[1].total_ride_minutes, 0.0);
        assert_eq!(rows[1].avg_duration, None);
    }

    #[test]
    fn test_qoq_example_sixty_percent() {
        let mut trips = trips_in(yq(2021, 1), 500);
        trips.extend(trips_in(yq(2021, 2), 800));
        let rows = quarterly_summary(&quarterly_rollup(&trips, &BTreeSet::new()));

        assert_eq!(rows[0].rollup.total_trips + rows[1].rollup.total_trips, 1300);
        assert_eq!(rows[0].qoq_growth.trips, None);
        assert_eq!(rows[1].qoq_growth.trips, Some(60.0));
        assert_eq!(rows[1].qoq_growth.avg_duration, Some(0.0));
        assert_eq!(rows[1].yoy_growth.trips, None);
    }

    #[test]
    fn test_growth_after_zero_quarter_is_undefined() {
        let rows = quarterly_summary(&[
            rollup(yq(2021, 1), 0),
            rollup(yq(2021, 2), 100),
            rollup(yq(2021, 3), 150),
        ]);
        assert_eq!(rows[1].qoq_growth.trips, None);
        assert_eq!(rows[1].qoq_growth.avg_duration, None);
        assert_eq!(rows[2].qoq_growth.trips, Some(50.0));
    }

    #[test]
    fn test_gap_in_quarters_is_not_bridged() {
        let rows = quarterly_summary(&[rollup(yq(2021, 1), 100), rollup(yq(2021, 3), 200)]);
        assert_eq!(rows[1].qoq_growth.trips, None);
    }

    #[test]
    fn test_yoy_uses_same_quarter_prior_year() {
        let rollups: Vec<_> = [100, 200, 300, 400, 150]
            .iter()
            .enumerate()
            .map(|(i, &n)| {
                let period = if i < 4 { yq(2021, i as u8 + 1) } else { yq(2022, 1) };
                rollup(period, n)
            })
            .collect();
        let rows = quarterly_summary(&rollups);

        assert!(rows[..4].iter().all(|r| r.yoy_growth.trips.is_none()));
        assert_eq!(rows[4].yoy_growth.trips, Some(50.0));
        assert_eq!(rows[4].qoq_growth.trips, Some(-62.5));
    }

    #[test]
    fn test_rolling_sum_requires_four_quarters() {
        let rollups = vec![
            rollup(yq(2021, 1), 10),
            rollup(yq(2021, 2), 20),
            rollup(yq(2021, 3), 30),
            rollup(yq(2021, 4), 40),
            rollup(yq(2022, 1), 50),
        ];
        let rows = rolling_annual(&rollups);

        assert!(rows[..3].iter().all(|r| r.trips.is_none() && r.ride_minutes.is_none()));
        assert_eq!(rows[3].trips, Some(100));
        assert_eq!(rows[3].ride_minutes, Some(1000.0));
        assert_eq!(rows[3].avg_duration, Some(10.0));
        assert_eq!(rows[4].trips, Some(140));
    }

    #[test]
    fn test_rolling_window_reports_missing_history() {
        let rollups = vec![rollup(yq(2021, 1), 10), rollup(yq(2021, 3), 30)];
        let by_period = index(&rollups);
        assert_eq!(
            window(&by_period, yq(2021, 3)).unwrap_err(),
            ComputationError::InsufficientHistory {
                required: 4,
                available: 2
            }
        );
    }

    #[test]
    fn test_rolling_average_undefined_with_empty_quarter() {
        let rollups = vec![
            rollup(yq(2021, 1), 10),
            rollup(yq(2021, 2), 0),
            rollup(yq(2021, 3), 30),
            rollup(yq(2021, 4), 40),
        ];
        let rows = rolling_annual(&rollups);
        assert_eq!(rows[3].trips, Some(80));
        assert_eq!(rows[3].avg_duration, None);
    }
}
