//! Discovery and parsing of quarterly trip CSV files.
//!
//! Files named `<prefix>-YYYY-qQ.csv` anywhere under the data directory are
//! read into one table of [`RawTrip`] rows. A file that cannot be parsed is
//! skipped and reported in [`LoadedData::failures`]; the remaining files still
//! load.

use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::config::ColumnMap;
use crate::error::{DataFormatError, DataNotFound};
use crate::schema;
use crate::trip::{RawTrip, SourceFile, YearQuarter};

/// Result of a directory load: rows from every readable file plus the
/// failures of the rest.
#[derive(Debug, Default)]
pub struct LoadedData {
    pub root: PathBuf,
    /// Files that loaded, in load order. `RawTrip::source` indexes this.
    pub sources: Vec<SourceFile>,
    pub rows: Vec<RawTrip>,
    pub failures: Vec<DataFormatError>,
}

impl LoadedData {
    /// Quarters for which a file was provided.
    pub fn periods(&self) -> BTreeSet<YearQuarter> {
        self.sources.iter().map(|s| s.period).collect()
    }
}

/// Lists every file under `dir` matching the naming pattern, ordered by
/// (year, quarter, prefix, name).
#[instrument(fields(dir = %dir.display()))]
pub fn discover_files(dir: &Path, prefix: Option<&str>) -> Result<Vec<SourceFile>, DataNotFound> {
    let missing = |source: std::io::Error| DataNotFound::MissingDirectory {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(missing(e.into())),
            Err(e) => {
                warn!(path = ?e.path(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        if entry.depth() == 0 && !entry.file_type().is_dir() {
            return Err(missing(std::io::Error::from(
                std::io::ErrorKind::NotADirectory,
            )));
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(file) = SourceFile::from_path(entry.path()) else {
            continue;
        };
        if prefix.is_some_and(|p| p != file.prefix) {
            continue;
        }
        files.push(file);
    }

    if files.is_empty() {
        return Err(DataNotFound::NoMatchingFiles {
            path: dir.to_path_buf(),
            pattern: schema::FILE_PATTERN,
        });
    }

    files.sort();
    debug!(count = files.len(), "Discovered trip files");
    Ok(files)
}

/// Loads every matching file under `dir`.
///
/// # Errors
///
/// [`DataNotFound`] when the directory is missing, holds no matching file, or
/// every matching file failed to parse. Per-file failures otherwise end up in
/// [`LoadedData::failures`].
#[instrument(skip(columns), fields(dir = %dir.display()))]
pub fn load_directory(
    dir: &Path,
    prefix: Option<&str>,
    columns: &ColumnMap,
) -> Result<LoadedData, DataNotFound> {
    let files = discover_files(dir, prefix)?;
    let mut data = LoadedData {
        root: dir.to_path_buf(),
        ..Default::default()
    };

    for file in files {
        let source = data.sources.len();
        match read_trip_file(&file.path, source, columns) {
            Ok(rows) => {
                debug!(file = %file.name, rows = rows.len(), "Loaded trip file");
                data.rows.extend(rows);
                data.sources.push(file);
            }
            Err(e) => {
                warn!(file = %file.name, error = %e, "Skipping malformed trip file");
                data.failures.push(e);
            }
        }
    }

    if data.sources.is_empty() {
        return Err(DataNotFound::NoUsableData {
            path: dir.to_path_buf(),
            failed_files: data.failures.len(),
        });
    }

    info!(
        files = data.sources.len(),
        failed = data.failures.len(),
        rows = data.rows.len(),
        "Trip files loaded"
    );
    Ok(data)
}

/// Column positions resolved against one file's header.
struct ColumnIndex {
    required: [usize; 7],
    passholder_type: Option<usize>,
}

impl ColumnIndex {
    fn resolve(
        path: &Path,
        headers: &StringRecord,
        columns: &ColumnMap,
    ) -> Result<Self, DataFormatError> {
        let position = |name: &str| headers.iter().position(|h| h == name);

        let mut required = [0usize; 7];
        for (slot, name) in required.iter_mut().zip(columns.required()) {
            *slot = position(name).ok_or_else(|| DataFormatError::MissingColumn {
                path: path.to_path_buf(),
                column: name.to_string(),
            })?;
        }

        Ok(Self {
            required,
            passholder_type: columns.passholder_type.as_deref().and_then(position),
        })
    }
}

/// Reads one trip file into raw rows tagged with `source`.
///
/// Short rows are padded with empty fields and left for the cleaner to reject.
pub fn read_trip_file(
    path: &Path,
    source: usize,
    columns: &ColumnMap,
) -> Result<Vec<RawTrip>, DataFormatError> {
    let csv_error = |e: csv::Error| DataFormatError::Csv {
        path: path.to_path_buf(),
        source: e,
    };

    let file = fs::File::open(path).map_err(|e| DataFormatError::Unreadable {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(file);

    let headers = rdr.headers().map_err(csv_error)?.clone();
    let index = ColumnIndex::resolve(path, &headers, columns)?;

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(csv_error)?;
        let field = |i: usize| record.get(i).unwrap_or("").to_string();
        let [trip_id, start_time, end_time, duration, start_station, end_station, bike_id] =
            index.required;

        rows.push(RawTrip {
            source,
            trip_id: field(trip_id),
            start_time: field(start_time),
            end_time: field(end_time),
            duration: field(duration),
            start_station: field(start_station),
            end_station: field(end_station),
            bike_id: field(bike_id),
            passholder_type: index.passholder_type.map(field),
        });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "trip_id,duration,start_time,end_time,start_station,end_station,bike_id";

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_missing_directory() {
        let result = load_directory(Path::new("/nonexistent/trips"), None, &ColumnMap::default());
        assert!(matches!(result, Err(DataNotFound::MissingDirectory { .. })));
    }

    #[test]
    fn test_file_as_data_dir_is_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "indego-trips-2021-q1.csv", &format!("{HEADER}\n"));

        let result = discover_files(&file, None);
        assert!(matches!(result, Err(DataNotFound::MissingDirectory { .. })));
    }

    #[test]
    fn test_no_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "notes.csv", "a,b\n1,2\n");

        let result = load_directory(dir.path(), None, &ColumnMap::default());
        assert!(matches!(result, Err(DataNotFound::NoMatchingFiles { .. })));
    }

    #[test]
    fn test_reads_rows_with_provenance() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "indego-trips-2021-q2.csv",
            &format!("{HEADER}\n7,12,2021-04-01 08:00:00,2021-04-01 08:12:00,3000,3001,b1\n"),
        );
        write(
            dir.path(),
            "indego-trips-2021-q1.csv",
            &format!("{HEADER}\n1,5,2021-01-04 09:00:00,2021-01-04 09:05:00,3000,3002,b2\n"),
        );

        let data = load_directory(dir.path(), None, &ColumnMap::default()).unwrap();

        assert_eq!(data.sources.len(), 2);
        assert_eq!(data.sources[0].period, YearQuarter::new(2021, 1).unwrap());
        assert_eq!(data.rows.len(), 2);
        assert_eq!(data.rows[0].trip_id, "1");
        assert_eq!(data.rows[0].source, 0);
        assert_eq!(data.rows[1].trip_id, "7");
        assert_eq!(data.rows[1].source, 1);
        assert_eq!(data.rows[1].passholder_type, None);
    }

    #[test]
    fn test_malformed_file_is_skipped_and_reported() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "indego-trips-2021-q1.csv",
            &format!("{HEADER}\n1,5,2021-01-04 09:00:00,2021-01-04 09:05:00,3000,3002,b2\n"),
        );
        let bad = write(dir.path(), "indego-trips-2021-q2.csv", "id,when\n1,today\n");

        let data = load_directory(dir.path(), None, &ColumnMap::default()).unwrap();

        assert_eq!(data.sources.len(), 1);
        assert_eq!(data.rows.len(), 1);
        assert_eq!(data.failures.len(), 1);
        assert_eq!(data.failures[0].path(), &bad);
        assert!(matches!(
            data.failures[0],
            DataFormatError::MissingColumn { .. }
        ));
    }

    #[test]
    fn test_all_files_malformed_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "indego-trips-2021-q1.csv", "id\n1\n");

        let result = load_directory(dir.path(), None, &ColumnMap::default());
        assert!(matches!(
            result,
            Err(DataNotFound::NoUsableData { failed_files: 1, .. })
        ));
    }

    #[test]
    fn test_prefix_filter_and_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("2021").join("q1");
        fs::create_dir_all(&nested).unwrap();
        write(&nested, "indego-trips-2021-q1.csv", &format!("{HEADER}\n"));
        write(dir.path(), "other-trips-2021-q1.csv", &format!("{HEADER}\n"));

        let files = discover_files(dir.path(), Some("indego-trips")).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].prefix, "indego-trips");
    }

    #[test]
    fn test_optional_passholder_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "indego-trips-2021-q1.csv",
            &format!("{HEADER},passholder_type\n1,5,a,b,3000,3002,b2,Indego30\n2,5,a,b\n"),
        );

        let rows = read_trip_file(&path, 0, &ColumnMap::default()).unwrap();
        assert_eq!(rows[0].passholder_type.as_deref(), Some("Indego30"));
        // Short row padded with empty fields.
        assert_eq!(rows[1].bike_id, "");
        assert_eq!(rows[1].passholder_type.as_deref(), Some(""));
    }
}
