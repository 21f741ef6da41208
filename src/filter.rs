//! Trip selection by year, quarter, month and day type.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::trip::{DayType, TripRecord, YearQuarter};

/// An empty set means "no restriction" for that dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TripFilter {
    pub years: BTreeSet<i32>,
    pub quarters: BTreeSet<u8>,
    pub months: BTreeSet<u32>,
    pub day_types: BTreeSet<DayType>,
}

impl TripFilter {
    pub fn with_years(mut self, years: impl IntoIterator<Item = i32>) -> Self {
        self.years.extend(years);
        self
    }

    pub fn with_quarters(mut self, quarters: impl IntoIterator<Item = u8>) -> Self {
        self.quarters.extend(quarters);
        self
    }

    pub fn with_months(mut self, months: impl IntoIterator<Item = u32>) -> Self {
        self.months.extend(months);
        self
    }

    pub fn with_day_types(mut self, day_types: impl IntoIterator<Item = DayType>) -> Self {
        self.day_types.extend(day_types);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
            && self.quarters.is_empty()
            && self.months.is_empty()
            && self.day_types.is_empty()
    }

    pub fn matches(&self, trip: &TripRecord) -> bool {
        let t = trip.temporal();
        (self.years.is_empty() || self.years.contains(&t.year))
            && (self.quarters.is_empty() || self.quarters.contains(&t.quarter))
            && (self.months.is_empty() || self.months.contains(&t.month))
            && (self.day_types.is_empty() || self.day_types.contains(&t.day_type))
    }

    /// Whether any trip in `period` could pass the year, quarter and month
    /// restrictions. Day types do not narrow a period.
    pub fn matches_period(&self, period: YearQuarter) -> bool {
        (self.years.is_empty() || self.years.contains(&period.year))
            && (self.quarters.is_empty() || self.quarters.contains(&period.quarter))
            && (self.months.is_empty() || period.months().any(|m| self.months.contains(&m)))
    }

    /// Copies the matching trips, preserving order.
    pub fn apply(&self, trips: &[TripRecord]) -> Vec<TripRecord> {
        trips.iter().filter(|t| self.matches(t)).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn trip(id: &str, y: i32, m: u32, d: u32) -> TripRecord {
        let start = NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        TripRecord::new(id, start, start + chrono::Duration::minutes(10), 10.0)
    }

    fn sample() -> Vec<TripRecord> {
        vec![
            trip("a", 2021, 1, 4),  // Monday, Q1
            trip("b", 2021, 7, 10), // Saturday, Q3
            trip("c", 2022, 7, 11), // Monday, Q3
        ]
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        let filter = TripFilter::default();
        assert!(filter.is_empty());
        assert_eq!(filter.apply(&sample()).len(), 3);
    }

    #[test]
    fn test_dimensions_combine() {
        let filter = TripFilter::default()
            .with_quarters([3])
            .with_day_types([DayType::Weekday]);
        let kept = filter.apply(&sample());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].trip_id(), "c");
    }

    #[test]
    fn test_years_and_months() {
        let by_year = TripFilter::default().with_years([2021]).apply(&sample());
        assert_eq!(by_year.len(), 2);

        let by_month = TripFilter::default().with_months([1]).apply(&sample());
        assert_eq!(by_month.len(), 1);
        assert_eq!(by_month[0].trip_id(), "a");
    }

    #[test]
    fn test_matches_period() {
        let q3 = YearQuarter::new(2021, 3).unwrap();
        assert!(TripFilter::default().matches_period(q3));
        assert!(TripFilter::default().with_months([8]).matches_period(q3));
        assert!(!TripFilter::default().with_months([1]).matches_period(q3));
        assert!(!TripFilter::default().with_years([2022]).matches_period(q3));
        assert!(TripFilter::default()
            .with_day_types([DayType::Weekend])
            .matches_period(q3));
    }
}
