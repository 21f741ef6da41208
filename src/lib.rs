//! Quarterly bike-share trip analytics.
//!
//! Trip CSVs named `<prefix>-YYYY-qQ.csv` are discovered under a data
//! directory, coerced and cleaned into [`trip::TripRecord`]s, and turned into
//! quarterly, temporal and station tables plus KPIs.

pub mod analyzers;
pub mod cache;
pub mod cleaner;
pub mod config;
pub mod error;
pub mod filter;
pub mod loader;
pub mod metrics;
pub mod output;
pub mod pipeline;
pub mod schema;
pub mod trip;
