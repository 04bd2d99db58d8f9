//! Scan loaders for the command-line front end.
//!
//! Scans are stored as CSV with a header row naming `x`, `y`, `z` and a time
//! column (`t`, `time` or `timestamp`, case-insensitive). Each data row is one
//! point; the time column holds the offset from the scan timestamp.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use nalgebra::Vector4;
use thiserror::Error;

use super::frame::RawScan;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Invalid value '{value}' in column '{column}' at row {row}")]
    ParseError {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

const TIME_COLUMNS: [&str; 3] = ["t", "time", "timestamp"];

fn parse_field(record: &csv::StringRecord, idx: usize, row: usize, column: &'static str) -> Result<f64> {
    let raw = record.get(idx).unwrap_or("").trim();
    raw.parse::<f64>().map_err(|_| LoaderError::ParseError {
        row,
        column,
        value: raw.to_string(),
    })
}

/// Load a raw scan from a CSV file.
///
/// # Arguments
///
/// * `path` - Path to the CSV file
/// * `stamp` - Absolute scan timestamp attached to the returned scan
///
/// # Errors
///
/// Returns an error if the file cannot be read, lacks an `x`, `y`, `z` or
/// time column, contains an unparsable value, or has no data rows.
pub fn load_scan_csv<P: AsRef<Path>>(path: P, stamp: f64) -> Result<RawScan> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let col_map: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_lowercase(), i))
        .collect();

    let mut missing = Vec::new();
    let mut column = |name: &str| {
        let idx = col_map.get(name).copied();
        if idx.is_none() {
            missing.push(name.to_string());
        }
        idx
    };
    let x_idx = column("x");
    let y_idx = column("y");
    let z_idx = column("z");
    let t_idx = TIME_COLUMNS.iter().find_map(|name| col_map.get(*name).copied());
    if t_idx.is_none() {
        missing.push("t".to_string());
    }

    let (Some(x_idx), Some(y_idx), Some(z_idx), Some(t_idx)) = (x_idx, y_idx, z_idx, t_idx) else {
        return Err(LoaderError::MissingColumns(missing.join(", ")));
    };

    let mut times = Vec::new();
    let mut points = Vec::new();

    for (row, result) in reader.records().enumerate() {
        let record = result?;
        // 1-based row numbers counting the header
        let row = row + 2;

        let x = parse_field(&record, x_idx, row, "x")?;
        let y = parse_field(&record, y_idx, row, "y")?;
        let z = parse_field(&record, z_idx, row, "z")?;
        let t = parse_field(&record, t_idx, row, "t")?;

        points.push(Vector4::new(x, y, z, 1.0));
        times.push(t);
    }

    if points.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(RawScan::new(stamp, times, points))
}

/// List the scan CSV files in a directory, sorted by file name.
pub fn find_scan_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(LoaderError::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();

    Ok(files)
}
