//! Derived tables over cleaned trips.
//!
//! Every function here is a pure transform from a trip slice (optionally
//! pre-filtered) to a freshly built table. Grouping goes through ordered maps
//! so repeated runs over the same input give identical output.

pub mod quarterly;
pub mod station;
pub mod temporal;
pub mod types;
pub mod utility;

pub use quarterly::{quarterly_rollup, quarterly_summary, rolling_annual};
pub use station::{station_summary, top_stations};
pub use temporal::{daily_pattern, hourly_pattern, monthly_heatmap};
