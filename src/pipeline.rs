//! Load, clean and analyze in one place.
//!
//! [`Pipeline::load`] produces a [`Dataset`] that is never mutated afterwards;
//! [`Analysis::compute`] derives every table from it under a [`TripFilter`].
//! [`CachedPipeline`] memoizes both steps keyed on the file manifest.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::analyzers::types::{
    DailyPattern, HourlyPattern, MonthlyHeatmap, QuarterlySummary, RollingTotal, StationSummary,
};
use crate::analyzers::{
    daily_pattern, hourly_pattern, monthly_heatmap, quarterly_rollup, quarterly_summary,
    rolling_annual, station_summary, top_stations,
};
use crate::cache::{CacheKey, PipelineCache, file_manifest};
use crate::cleaner::{CleaningReport, clean};
use crate::config::PipelineConfig;
use crate::error::{DataFormatError, DataNotFound, PipelineError};
use crate::filter::TripFilter;
use crate::loader::load_directory;
use crate::metrics::{
    self, DurationStats, GrowthMetrics, HistogramBin, Kpis, MemberShare, PeakTimes,
    PeriodComparison, SeasonalityIndex, Utilization,
};
use crate::schema::{DEFAULT_HISTOGRAM_BUCKETS, DEFAULT_TOP_STATIONS};
use crate::trip::{SourceFile, TripRecord, YearQuarter};

/// The cleaned trip table together with what went into it.
#[derive(Debug)]
pub struct Dataset {
    pub trips: Vec<TripRecord>,
    /// Quarters for which a file loaded, whether or not any trip survived.
    pub periods: BTreeSet<YearQuarter>,
    pub sources: Vec<SourceFile>,
    pub failures: Vec<DataFormatError>,
    pub report: CleaningReport,
}

impl Dataset {
    pub fn filtered_trips(&self, filter: &TripFilter) -> Vec<TripRecord> {
        if filter.is_empty() {
            return self.trips.clone();
        }
        filter.apply(&self.trips)
    }

    /// Provided quarters the filter can still reach.
    pub fn filtered_periods(&self, filter: &TripFilter) -> BTreeSet<YearQuarter> {
        self.periods
            .iter()
            .copied()
            .filter(|p| filter.matches_period(*p))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Reads every trip file under the data directory and cleans the rows.
    ///
    /// # Errors
    ///
    /// [`DataNotFound`] when nothing usable is left: no directory, no
    /// matching file, every file malformed, or every row rejected.
    #[instrument(skip(self), fields(dir = %self.config.data_dir.display()))]
    pub fn load(&self) -> Result<Dataset, DataNotFound> {
        let loaded = load_directory(
            &self.config.data_dir,
            self.config.file_prefix.as_deref(),
            &self.config.columns,
        )?;
        let cleaned = clean(&loaded, &self.config.cleaning);

        if cleaned.trips.is_empty() {
            warn!(
                rows = cleaned.report.input_rows,
                "Every row was rejected during cleaning"
            );
            return Err(DataNotFound::NoUsableData {
                path: self.config.data_dir.clone(),
                failed_files: loaded.failures.len(),
            });
        }

        let periods = loaded.periods();
        info!(
            trips = cleaned.trips.len(),
            quarters = periods.len(),
            "Dataset ready"
        );
        Ok(Dataset {
            trips: cleaned.trips,
            periods,
            sources: loaded.sources,
            failures: loaded.failures,
            report: cleaned.report,
        })
    }
}

/// Knobs for [`Analysis::compute`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisParams {
    pub filter: TripFilter,
    pub top_n: usize,
    pub histogram_buckets: usize,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            filter: TripFilter::default(),
            top_n: DEFAULT_TOP_STATIONS,
            histogram_buckets: DEFAULT_HISTOGRAM_BUCKETS,
        }
    }
}

/// Every derived table for one filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub kpis: Kpis,
    pub quarterly: Vec<QuarterlySummary>,
    pub rolling: Vec<RollingTotal>,
    pub growth: GrowthMetrics,
    pub seasonality: Vec<SeasonalityIndex>,
    /// Latest provided quarter against the one before it.
    pub latest_comparison: Option<PeriodComparison>,
    pub hourly: Vec<HourlyPattern>,
    pub daily: Vec<DailyPattern>,
    pub heatmap: MonthlyHeatmap,
    pub peaks: PeakTimes,
    pub top_stations: Vec<StationSummary>,
    pub durations: DurationStats,
    pub histogram: Vec<HistogramBin>,
    pub utilization: Utilization,
    pub members: MemberShare,
}

impl Analysis {
    #[instrument(skip_all, fields(trips = dataset.trips.len()))]
    pub fn compute(dataset: &Dataset, params: &AnalysisParams) -> Self {
        let trips = dataset.filtered_trips(&params.filter);
        let periods = dataset.filtered_periods(&params.filter);

        let rollups = quarterly_rollup(&trips, &periods);
        let quarterly = quarterly_summary(&rollups);
        let rolling = rolling_annual(&rollups);

        let hourly = hourly_pattern(&trips);
        let daily = daily_pattern(&trips);
        let heatmap = monthly_heatmap(&trips, &periods, &params.filter.months);
        let peaks = metrics::peak_times(&hourly, &daily, &heatmap);

        let stations = station_summary(&trips);
        let bin_width = metrics::histogram_bin_width(params.histogram_buckets).unwrap_or(1.0);

        let latest_comparison = quarterly.last().map(|row| {
            let current = row.period();
            metrics::compare_periods(&trips, current, current.previous())
        });

        info!(
            filtered = trips.len(),
            quarters = quarterly.len(),
            stations = stations.len(),
            "Analysis computed"
        );

        Self {
            kpis: metrics::kpis(&trips),
            growth: metrics::growth_metrics(&quarterly),
            seasonality: metrics::seasonality_index(&quarterly),
            latest_comparison,
            quarterly,
            rolling,
            top_stations: top_stations(&stations, params.top_n).to_vec(),
            durations: metrics::duration_stats(&trips, bin_width),
            histogram: metrics::duration_histogram(&trips, params.histogram_buckets),
            utilization: metrics::utilization(&trips),
            members: metrics::member_share(&trips),
            hourly,
            daily,
            heatmap,
            peaks,
        }
    }
}

/// A [`Pipeline`] whose dataset and analyses are memoized until the files
/// on disk, the cleaning thresholds or the parameters change.
///
/// Only results for the current manifest are kept: a change on disk drops
/// everything cached for the previous one.
pub struct CachedPipeline {
    pipeline: Pipeline,
    datasets: PipelineCache<Dataset>,
    analyses: PipelineCache<Analysis>,
    manifest: Option<CacheKey>,
}

impl CachedPipeline {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            datasets: PipelineCache::default(),
            analyses: PipelineCache::default(),
            manifest: None,
        }
    }

    pub fn with_caches(
        pipeline: Pipeline,
        datasets: PipelineCache<Dataset>,
        analyses: PipelineCache<Analysis>,
    ) -> Self {
        Self {
            pipeline,
            datasets,
            analyses,
            manifest: None,
        }
    }

    pub fn dataset(&mut self) -> Result<Arc<Dataset>, PipelineError> {
        let key = self.key(&())?;
        let pipeline = &self.pipeline;
        Ok(self.datasets.get_or_try_insert_with(key, || pipeline.load())?)
    }

    pub fn analysis(&mut self, params: &AnalysisParams) -> Result<Arc<Analysis>, PipelineError> {
        let key = self.key(params)?;
        if let Some(cached) = self.analyses.get(key) {
            return Ok(cached);
        }
        let dataset = self.dataset()?;
        self.analyses
            .get_or_try_insert_with(key, || Ok(Analysis::compute(&dataset, params)))
    }

    /// Drops every memoized result.
    pub fn invalidate(&mut self) {
        self.datasets.clear();
        self.analyses.clear();
        self.manifest = None;
    }

    fn key(&mut self, params: &impl Serialize) -> Result<CacheKey, PipelineError> {
        let config = self.pipeline.config();
        let manifest = file_manifest(&config.data_dir, config.file_prefix.as_deref())?;
        let snapshot = CacheKey::new(&manifest, &config.cleaning, &())?;
        let key = CacheKey::new(&manifest, &config.cleaning, params)?;

        if self.manifest != Some(snapshot) {
            if self.manifest.is_some() {
                debug!("Trip files changed, dropping cached results");
            }
            self.datasets.clear();
            self.analyses.clear();
            self.manifest = Some(snapshot);
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trip::DayType;
    use std::fs;
    use std::path::Path;

    const HEADER: &str = "trip_id,start_time,end_time,duration,start_station,end_station,bike_id\n";

    fn write_file(dir: &Path, name: &str, rows: &[&str]) {
        let mut content = HEADER.to_string();
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        fs::write(dir.join(name), content).unwrap();
    }

    fn pipeline(dir: &Path) -> Pipeline {
        Pipeline::new(PipelineConfig {
            data_dir: dir.to_path_buf(),
            ..Default::default()
        })
    }

    #[test]
    fn test_load_keeps_provided_quarters() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "indego-trips-2021-q1.csv",
            &["1,2021-01-04 08:00:00,2021-01-04 08:10:00,10,3000,3001,b1"],
        );
        write_file(
            dir.path(),
            "indego-trips-2021-q2.csv",
            &["2,2021-04-05 08:00:00,2021-04-05 08:00:30,0.5,3000,3001,b1"],
        );

        let dataset = pipeline(dir.path()).load().unwrap();
        assert_eq!(dataset.trips.len(), 1);
        assert_eq!(dataset.periods.len(), 2);

        let analysis = Analysis::compute(&dataset, &AnalysisParams::default());
        assert_eq!(analysis.quarterly.len(), 2);
        assert_eq!(analysis.quarterly[1].rollup.total_trips, 0);
    }

    #[test]
    fn test_all_rows_rejected_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "indego-trips-2021-q1.csv",
            &["1,2021-01-04 08:00:00,2021-01-04 08:00:10,-5,3000,3001,b1"],
        );

        let err = pipeline(dir.path()).load().unwrap_err();
        assert!(matches!(err, DataNotFound::NoUsableData { .. }));
    }

    #[test]
    fn test_filter_narrows_periods_and_trips() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "indego-trips-2021-q1.csv",
            &[
                "1,2021-01-04 08:00:00,2021-01-04 08:10:00,10,3000,3001,b1",
                "2,2021-01-09 08:00:00,2021-01-09 08:20:00,20,3000,3001,b2",
            ],
        );
        write_file(
            dir.path(),
            "indego-trips-2021-q2.csv",
            &["3,2021-04-05 08:00:00,2021-04-05 08:10:00,10,3001,3000,b1"],
        );
        let dataset = pipeline(dir.path()).load().unwrap();

        let params = AnalysisParams {
            filter: TripFilter::default()
                .with_quarters([1])
                .with_day_types([DayType::Weekend]),
            ..Default::default()
        };
        let analysis = Analysis::compute(&dataset, &params);
        assert_eq!(analysis.kpis.total_trips, 1);
        assert_eq!(analysis.quarterly.len(), 1);
        assert_eq!(analysis.quarterly[0].period().quarter, 1);
    }

    #[test]
    fn test_cached_pipeline_reuses_results() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "indego-trips-2021-q1.csv",
            &["1,2021-01-04 08:00:00,2021-01-04 08:10:00,10,3000,3001,b1"],
        );

        let mut cached = CachedPipeline::new(pipeline(dir.path()));
        let params = AnalysisParams::default();
        let first = cached.analysis(&params).unwrap();
        let second = cached.analysis(&params).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        cached.invalidate();
        let third = cached.analysis(&params).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(*first, *third);
    }

    #[test]
    fn test_rewritten_files_replace_cached_results() {
        let dir = tempfile::tempdir().unwrap();
        let mut cached = CachedPipeline::new(pipeline(dir.path()));
        let params = AnalysisParams::default();

        let mut rows = Vec::new();
        for i in 1..=5 {
            rows.push(format!(
                "{i},2021-01-0{i} 08:00:00,2021-01-0{i} 08:10:00,10,3000,3001,b{i}"
            ));
            let lines: Vec<&str> = rows.iter().map(String::as_str).collect();
            write_file(dir.path(), "indego-trips-2021-q1.csv", &lines);

            assert_eq!(cached.dataset().unwrap().trips.len(), i);
            assert_eq!(cached.analysis(&params).unwrap().kpis.total_trips, i as u64);
        }
        assert_eq!(cached.datasets.len(), 1);
        assert_eq!(cached.analyses.len(), 1);
    }

    #[test]
    fn test_month_filter_blanks_excluded_heatmap_months() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "indego-trips-2021-q3.csv",
            &[
                "1,2021-07-05 08:00:00,2021-07-05 08:10:00,10,3000,3001,b1",
                "2,2021-08-02 08:00:00,2021-08-02 08:10:00,10,3001,3000,b2",
            ],
        );
        let dataset = pipeline(dir.path()).load().unwrap();

        let params = AnalysisParams {
            filter: TripFilter::default().with_months([8]),
            ..Default::default()
        };
        let heatmap = Analysis::compute(&dataset, &params).heatmap;
        assert_eq!(heatmap.cell(2021, 7), Some(None));
        assert_eq!(heatmap.cell(2021, 8), Some(Some(1)));
        assert_eq!(heatmap.cell(2021, 9), Some(None));
    }
}
