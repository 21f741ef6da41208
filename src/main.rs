//! CLI entry point for the bike-share analytics tool.
//!
//! Provides subcommands for validating a trip directory, exporting the
//! quarterly summary and cleaned trips, and printing the full report.

use anyhow::Result;
use bikeshare_analytics::{
    config::PipelineConfig,
    filter::TripFilter,
    output::{
        export_to_file, format_duration, format_number, print_json, print_pretty,
        write_quarterly_summary, write_trips,
    },
    pipeline::{Analysis, AnalysisParams, Pipeline},
    schema::{DEFAULT_HISTOGRAM_BUCKETS, DEFAULT_TOP_STATIONS, PREVIEW_ROW_LIMIT},
    trip::DayType,
};
use clap::{Args, Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "bikeshare_analytics")]
#[command(about = "Quarterly analytics over bike-share trip CSVs", long_about = None)]
struct Cli {
    /// Directory holding <prefix>-YYYY-qQ.csv trip files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// JSON config file (overrides BIKESHARE_CONFIG)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Only load files with this prefix
    #[arg(long, global = true)]
    prefix: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Comma-separated years, e.g. 2021,2022
    #[arg(long, value_delimiter = ',')]
    years: Vec<i32>,

    /// Comma-separated quarters (1-4)
    #[arg(long, value_delimiter = ',')]
    quarters: Vec<u8>,

    /// Comma-separated months (1-12)
    #[arg(long, value_delimiter = ',')]
    months: Vec<u32>,

    /// Comma-separated day types: weekday, weekend
    #[arg(long, value_delimiter = ',')]
    day_types: Vec<DayType>,
}

impl FilterArgs {
    fn into_filter(self) -> TripFilter {
        TripFilter::default()
            .with_years(self.years)
            .with_quarters(self.quarters)
            .with_months(self.months)
            .with_day_types(self.day_types)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Load and clean the data directory, then report row accounting
    Validate,
    /// Write the quarterly summary table as CSV
    Summary {
        /// CSV file to write
        #[arg(short, long, default_value = "quarterly_summary.csv")]
        output: PathBuf,

        /// Gzip compress the output
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Write cleaned trips as CSV
    ExportTrips {
        /// CSV file to write
        #[arg(short, long, default_value = "trips.csv")]
        output: PathBuf,

        /// Maximum rows to write (0 = all)
        #[arg(short, long, default_value_t = PREVIEW_ROW_LIMIT)]
        limit: usize,

        #[command(flatten)]
        filter: FilterArgs,

        /// Gzip compress the output
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Compute every table and log the report
    Report {
        #[command(flatten)]
        filter: FilterArgs,

        /// Number of stations in the ranking
        #[arg(long, default_value_t = DEFAULT_TOP_STATIONS)]
        top_n: usize,

        /// Duration histogram buckets over 0-60 minutes
        #[arg(long, default_value_t = DEFAULT_HISTOGRAM_BUCKETS)]
        bins: usize,

        /// Optional JSON file to write the report to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/bikeshare_analytics.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("bikeshare_analytics.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let pipeline = Pipeline::new(resolve_config(&cli)?);

    match cli.command {
        Commands::Validate => {
            let dataset = pipeline.load()?;
            for failure in &dataset.failures {
                warn!(error = %failure, "Unreadable trip file");
            }
            for (reason, count) in &dataset.report.rejected {
                info!(reason = %reason, count, "Rejected rows");
            }
            info!(
                files = dataset.sources.len(),
                failed_files = dataset.failures.len(),
                quarters = dataset.periods.len(),
                input_rows = dataset.report.input_rows,
                kept_rows = dataset.report.kept_rows,
                rejected_rows = dataset.report.rejected_total(),
                "Validation complete"
            );
            print_pretty(&dataset.report);
        }
        Commands::Summary { output, gzip } => {
            let dataset = pipeline.load()?;
            let analysis = Analysis::compute(&dataset, &AnalysisParams::default());
            export_to_file(&output, gzip, |w| {
                write_quarterly_summary(w, &analysis.quarterly)
            })?;
        }
        Commands::ExportTrips {
            output,
            limit,
            filter,
            gzip,
        } => {
            let dataset = pipeline.load()?;
            let trips = dataset.filtered_trips(&filter.into_filter());
            let limit = (limit > 0).then_some(limit);
            export_to_file(&output, gzip, |w| write_trips(w, &trips, limit))?;
        }
        Commands::Report {
            filter,
            top_n,
            bins,
            output,
        } => {
            let dataset = pipeline.load()?;
            let params = AnalysisParams {
                filter: filter.into_filter(),
                top_n,
                histogram_buckets: bins,
            };
            let analysis = Analysis::compute(&dataset, &params);
            log_headline(&analysis);

            match output {
                Some(path) => {
                    std::fs::write(&path, serde_json::to_string_pretty(&analysis)?)?;
                    info!(path = %path.display(), "Report written");
                }
                None => print_json(&analysis)?,
            }
        }
    }

    Ok(())
}

/// Config file (flag, then `BIKESHARE_CONFIG`) plus environment overrides,
/// then command-line overrides.
fn resolve_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::resolve(cli.config.as_deref())?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(prefix) = &cli.prefix {
        config.file_prefix = Some(prefix.clone());
    }
    Ok(config)
}

fn log_headline(analysis: &Analysis) {
    let kpis = &analysis.kpis;
    info!(
        trips = %format_number(kpis.total_trips as f64, 2),
        ride_time = %format_duration(kpis.total_ride_minutes),
        avg_duration = ?kpis.avg_duration.map(format_duration),
        unique_bikes = kpis.unique_bikes,
        unique_stations = kpis.unique_stations,
        "Headline KPIs"
    );
    if let Some(latest) = analysis.quarterly.last() {
        info!(
            period = %latest.period(),
            trips = latest.rollup.total_trips,
            qoq_growth = ?latest.qoq_growth.trips,
            yoy_growth = ?latest.yoy_growth.trips,
            "Latest quarter"
        );
    }
}
