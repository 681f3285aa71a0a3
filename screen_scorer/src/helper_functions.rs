use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use polars::error::PolarsResult;
use polars::frame::DataFrame;
use polars::prelude::*;
use statrs::statistics::Statistics;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::errors::{missing_column, ScreenError, ScreenResult};

pub fn read_csv(file_path: &Path) -> PolarsResult<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(PathBuf::from(file_path)))?
        .finish()
}

/// Tab-separated variant of [`read_csv`], used for the aligner's frequency tables.
pub fn read_tsv(file_path: &Path) -> PolarsResult<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .map_parse_options(|opts| opts.with_separator(b'\t'))
        .try_into_reader_with_file_path(Some(PathBuf::from(file_path)))?
        .finish()
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

pub fn require_columns(df: &DataFrame, columns: &[&str], table: &str) -> ScreenResult<()> {
    for &column in columns {
        if !has_column(df, column) {
            return Err(missing_column(column, table));
        }
    }
    Ok(())
}

pub fn str_column(df: &DataFrame, name: &str, table: &str) -> ScreenResult<Vec<String>> {
    require_columns(df, &[name], table)?;
    let col = df.column(name)?.cast(&DataType::String)?;
    let values = col
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect();
    Ok(values)
}

/// Read-count style column: every value must be present and non-negative.
pub fn count_column(df: &DataFrame, name: &str, table: &str) -> ScreenResult<Vec<u64>> {
    require_columns(df, &[name], table)?;
    let col = df.column(name)?.cast(&DataType::Int64)?;
    col.i64()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| match v {
            Some(n) if n >= 0 => Ok(n as u64),
            Some(n) => Err(ScreenError::MalformedInput(format!(
                "negative value {} in `{}` of {} (row {})",
                n, name, table, row
            ))),
            None => Err(ScreenError::MalformedInput(format!(
                "missing or non-integer value in `{}` of {} (row {})",
                name, table, row
            ))),
        })
        .collect()
}

pub fn f64_column(df: &DataFrame, name: &str, table: &str) -> ScreenResult<Vec<f64>> {
    require_columns(df, &[name], table)?;
    let col = df.column(name)?.cast(&DataType::Float64)?;
    col.f64()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.ok_or_else(|| {
                ScreenError::MalformedInput(format!(
                    "missing or non-numeric value in `{}` of {} (row {})",
                    name, table, row
                ))
            })
        })
        .collect()
}

pub fn i64_column(df: &DataFrame, name: &str, table: &str) -> ScreenResult<Vec<i64>> {
    require_columns(df, &[name], table)?;
    let col = df.column(name)?.cast(&DataType::Int64)?;
    col.i64()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.ok_or_else(|| {
                ScreenError::MalformedInput(format!(
                    "missing or non-integer value in `{}` of {} (row {})",
                    name, table, row
                ))
            })
        })
        .collect()
}

/// File stem of an input table, used as the sample name in logs and outputs.
pub fn sample_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn temp_file_beside(path: &Path) -> ScreenResult<NamedTempFile> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;
    Ok(NamedTempFile::new_in(dir)?)
}

/// Writes `df` next to its destination and renames it into place, so a
/// reader never observes a half-written table.
pub fn dataframe_to_csv(df: &mut DataFrame, path: &Path) -> ScreenResult<()> {
    let mut tmp = temp_file_beside(path)?;
    CsvWriter::new(tmp.as_file_mut())
        .include_header(true)
        .finish(df)?;
    tmp.persist(path).map_err(|e| ScreenError::Io(e.error))?;
    info!("Wrote {} rows to {}", df.height(), path.display());
    Ok(())
}

pub fn write_json<T: serde::Serialize>(value: &T, path: &Path) -> ScreenResult<()> {
    let mut tmp = temp_file_beside(path)?;
    tmp.write_all(serde_json::to_string_pretty(value)?.as_bytes())?;
    tmp.persist(path).map_err(|e| ScreenError::Io(e.error))?;
    debug!("Wrote {}", path.display());
    Ok(())
}

/// Quantile with linear interpolation between order statistics.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    let pos = (n as f64 - 1.0) * q;
    let idx = pos.floor() as usize;
    let frac = pos - idx as f64;
    if idx + 1 < n {
        Some(sorted[idx] * (1.0 - frac) + sorted[idx + 1] * frac)
    } else {
        Some(sorted[idx])
    }
}

/// Sample standard deviation (n - 1); `None` below two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    Some(values.iter().std_dev())
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
