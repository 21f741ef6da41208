use std::collections::BTreeMap;

use crate::analyzers::types::StationSummary;
use crate::analyzers::utility::mean;
use crate::trip::TripRecord;

#[derive(Default)]
struct StationAccumulator {
    departure_minutes: Vec<f64>,
    arrivals: u64,
}

/// Departures and arrivals per station, busiest first.
///
/// Both roles are counted independently and merged on the station id, so a
/// station seen in only one role still appears with zero in the other. Ties on
/// total activity are ordered by station id.
pub fn station_summary(trips: &[TripRecord]) -> Vec<StationSummary> {
    let mut stations: BTreeMap<&str, StationAccumulator> = BTreeMap::new();
    for trip in trips {
        if let Some(start) = trip.start_station() {
            stations
                .entry(start)
                .or_default()
                .departure_minutes
                .push(trip.duration_minutes());
        }
        if let Some(end) = trip.end_station() {
            stations.entry(end).or_default().arrivals += 1;
        }
    }

    let mut rows: Vec<StationSummary> = stations
        .into_iter()
        .map(|(station, acc)| {
            let departures = acc.departure_minutes.len() as u64;
            StationSummary {
                station: station.to_string(),
                departures,
                arrivals: acc.arrivals,
                total_activity: departures + acc.arrivals,
                avg_trip_duration: mean(&acc.departure_minutes),
                rank: 0,
            }
        })
        .collect();

    // Stable sort keeps the id order from the BTreeMap among equal totals.
    rows.sort_by(|a, b| b.total_activity.cmp(&a.total_activity));
    for (i, row) in rows.iter_mut().enumerate() {
        row.rank = i + 1;
    }
    rows
}

/// The `n` busiest stations.
pub fn top_stations(summary: &[StationSummary], n: usize) -> &[StationSummary] {
    &summary[..n.min(summary.len())]
}
