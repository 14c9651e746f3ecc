//! CSV output of the rollup tables.
//!
//! Rows are written in rollup order, which is already sorted by key, so the
//! files are byte-identical for identical input.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, instrument};

use crate::aggregate::Rollups;
use crate::pipeline::Diagnostics;

pub const HOURLY_FILE: &str = "utilization_by_hour.csv";
pub const DAILY_FILE: &str = "daily_utilization_summary.csv";
pub const DOW_FILE: &str = "dow_utilization.csv";
pub const SEASON_FILE: &str = "season_utilization.csv";
pub const SERIES_FILE: &str = "seasonality_series.csv";
pub const SUMMARY_FILE: &str = "run_summary.json";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Failed to encode run summary: {0}")]
    Json(#[from] serde_json::Error),
}

fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), ReportError> {
    let csv_error = |source| ReportError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
    for row in rows {
        writer.serialize(row).map_err(csv_error)?;
    }
    writer.flush().map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Writes the four rollup tables and the chart series into `dir`, returning
/// the paths written.
#[instrument(skip(rollups), fields(dir = %dir.display()))]
pub fn write_reports(dir: &Path, rollups: &Rollups) -> Result<Vec<PathBuf>, ReportError> {
    fs::create_dir_all(dir).map_err(|source| ReportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let paths = vec![
        dir.join(HOURLY_FILE),
        dir.join(DAILY_FILE),
        dir.join(DOW_FILE),
        dir.join(SEASON_FILE),
        dir.join(SERIES_FILE),
    ];

    write_table(&paths[0], &rollups.hours)?;
    write_table(&paths[1], &rollups.days)?;
    write_table(&paths[2], &rollups.day_of_week)?;
    write_table(&paths[3], &rollups.seasons)?;
    write_table(&paths[4], &rollups.seasonality_series())?;

    info!("Wrote {} report files to {}", paths.len(), dir.display());
    Ok(paths)
}

#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub source: String,
    pub timezone: String,
    pub diagnostics: &'a Diagnostics,
    pub failed_ranges: &'a [crate::source::FailedRange],
}

pub fn write_summary(dir: &Path, summary: &RunSummary<'_>) -> Result<PathBuf, ReportError> {
    let path = dir.join(SUMMARY_FILE);
    let body = serde_json::to_vec_pretty(summary)?;
    fs::write(&path, body).map_err(|source| ReportError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{DateRange, FailedRange};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    #[test]
    fn test_empty_rollups_still_write_every_file() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("nested").join("out");

        let paths = write_reports(&out, &Rollups::default()).unwrap();

        assert_eq!(paths.len(), 5);
        assert!(paths.iter().all(|p| p.exists()));
        assert_eq!(paths[0].file_name().unwrap(), HOURLY_FILE);
    }

    #[test]
    fn test_summary_lists_failed_ranges() {
        let dir = TempDir::new().unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 4, 29).unwrap();
        let failed = vec![FailedRange {
            range: DateRange::single(day),
            error: "HTTP 503".to_string(),
        }];
        let diagnostics = Diagnostics {
            raw_records: 10,
            normalized: 9,
            rejected: 1,
            failed_ranges: 1,
            ..Diagnostics::default()
        };

        let path = write_summary(
            dir.path(),
            &RunSummary {
                source: "api".to_string(),
                timezone: "America/New_York".to_string(),
                diagnostics: &diagnostics,
                failed_ranges: &failed,
            },
        )
        .unwrap();

        let summary: serde_json::Value =
            serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(summary["diagnostics"]["rejected"], 1);
        assert_eq!(summary["failed_ranges"][0]["range"]["start"], "2025-04-29");
        assert_eq!(summary["failed_ranges"][0]["error"], "HTTP 503");
    }
}
