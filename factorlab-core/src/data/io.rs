//! Polars-backed file I/O for price panels and factor tables.
//!
//! Readers accept any column naming; only the date column is located here.
//! Price fields are resolved later through the alias table.

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use std::fs;
use std::path::Path;

use super::columns::normalize_column_name;
use super::panel::PricePanel;
use crate::error::{ResearchError, Result};
use crate::factors::FactorTable;

/// `NaiveDate::from_ymd(1970, 1, 1).num_days_from_ce()`.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

const DATE_COLUMN_NAMES: &[&str] = &["date", "datetime", "timestamp", "time", "index"];

pub(crate) fn date_from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(EPOCH_DAYS_FROM_CE + days)
}

pub(crate) fn epoch_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - EPOCH_DAYS_FROM_CE
}

// ─── Reading ─────────────────────────────────────────────────────────

/// Read a parquet or csv file (by extension) into a DataFrame.
pub fn read_frame(path: &Path) -> Result<DataFrame> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("parquet") => {
            let file = fs::File::open(path)?;
            Ok(ParquetReader::new(file).finish()?)
        }
        Some("csv") => Ok(CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?),
        _ => Err(ResearchError::UnsupportedConfiguration(format!(
            "unsupported price file extension: {}",
            path.display()
        ))),
    }
}

fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::Int16
            | DataType::Int8
            | DataType::UInt64
            | DataType::UInt32
            | DataType::UInt16
            | DataType::UInt8
    )
}

fn find_date_column(df: &DataFrame) -> Result<&Column> {
    let columns = df.get_columns();
    let by_name = columns.iter().find(|c| {
        let n = normalize_column_name(c.name().as_str());
        DATE_COLUMN_NAMES.contains(&n.as_str())
    });
    let by_dtype = || {
        columns
            .iter()
            .find(|c| matches!(c.dtype(), DataType::Date | DataType::Datetime(_, _)))
    };
    by_name.or_else(by_dtype).ok_or_else(|| {
        ResearchError::Schema(format!(
            "no date column among {:?}",
            df.get_column_names()
        ))
    })
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let head = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

fn extract_dates(col: &Column) -> Result<Vec<NaiveDate>> {
    let name = col.name().to_string();
    let missing = |i: usize| ResearchError::Schema(format!("unparseable date in '{name}' at row {i}"));

    if matches!(col.dtype(), DataType::String) {
        let ca = col.str()?;
        return (0..ca.len())
            .map(|i| ca.get(i).and_then(parse_date_text).ok_or_else(|| missing(i)))
            .collect();
    }

    let as_date = col.cast(&DataType::Date)?;
    let ca = as_date.date()?;
    (0..ca.len())
        .map(|i| {
            ca.get(i)
                .and_then(date_from_epoch_days)
                .ok_or_else(|| missing(i))
        })
        .collect()
}

fn extract_f64(col: &Column) -> Result<Vec<f64>> {
    let as_f64 = col.cast(&DataType::Float64)?;
    let ca = as_f64.f64()?;
    Ok((0..ca.len())
        .map(|i| ca.get(i).unwrap_or(f64::NAN))
        .collect())
}

/// Convert a frame into a price panel: one date column plus every numeric
/// column under its original name.
pub fn frame_to_panel(df: &DataFrame) -> Result<PricePanel> {
    let date_col = find_date_column(df)?;
    let dates = extract_dates(date_col)?;
    let date_name = date_col.name().as_str();

    let mut columns = Vec::new();
    for col in df.get_columns() {
        if col.name().as_str() == date_name || !is_numeric(col.dtype()) {
            continue;
        }
        columns.push((col.name().to_string(), extract_f64(col)?));
    }
    PricePanel::new(dates, columns)
}

/// Read a parquet/csv price file into a panel.
pub fn read_price_file(path: &Path) -> Result<PricePanel> {
    let df = read_frame(path)?;
    frame_to_panel(&df)
}

// ─── Writing ─────────────────────────────────────────────────────────

fn date_column(dates: &[NaiveDate]) -> Result<Column> {
    let days: Vec<i32> = dates.iter().map(|d| epoch_days(*d)).collect();
    Ok(Column::new("date".into(), days).cast(&DataType::Date)?)
}

fn write_parquet(mut df: DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = fs::File::create(path)?;
    ParquetWriter::new(file).finish(&mut df)?;
    Ok(())
}

/// Write a price panel (date column plus every named column) as parquet.
pub fn write_price_panel_parquet(panel: &PricePanel, path: &Path) -> Result<()> {
    let mut cols = vec![date_column(panel.dates())?];
    for (i, name) in panel.column_names().iter().enumerate() {
        cols.push(Column::new((*name).into(), panel.column_at(i).to_vec()));
    }
    write_parquet(DataFrame::new(cols)?, path)
}

/// Write a factor table as parquet with a leading `date` column, columns in
/// table order.
pub fn write_factor_table_parquet(table: &FactorTable, path: &Path) -> Result<()> {
    let mut cols = vec![date_column(table.dates())?];
    for name in table.column_names() {
        let values = table.require(name)?;
        cols.push(Column::new(name.as_str().into(), values.to_vec()));
    }
    write_parquet(DataFrame::new(cols)?, path)?;
    tracing::debug!(path = %path.display(), columns = table.width(), "factor table written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::synthetic_bars;
    use std::env;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = env::temp_dir().join(format!("factorlab_io_test_{}_{id}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn epoch_conversion() {
        assert_eq!(epoch_days(d(1970, 1, 1)), 0);
        assert_eq!(date_from_epoch_days(1), Some(d(1970, 1, 2)));
        let date = d(2024, 2, 29);
        assert_eq!(date_from_epoch_days(epoch_days(date)), Some(date));
    }

    #[test]
    fn parquet_panel_keeps_dates_and_columns() {
        let dir = temp_dir();
        let bars = synthetic_bars("SPY", d(2022, 1, 3), 30);
        let panel = PricePanel::from_bars(&bars).unwrap();
        let path = dir.join("SPY.parquet");
        write_price_panel_parquet(&panel, &path).unwrap();

        let loaded = read_price_file(&path).unwrap();
        assert_eq!(loaded.dates(), panel.dates());
        assert_eq!(loaded.column("close"), panel.column("close"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn csv_with_vendor_column_names() {
        let dir = temp_dir();
        let path = dir.join("AAPL.csv");
        fs::write(
            &path,
            "Date,Open,High,Low,Close,Adj Close,Volume\n\
             2024-01-03,10,11,9,10.5,10.4,1000\n\
             2024-01-02,9,10,8,9.5,9.4,900\n",
        )
        .unwrap();

        let panel = read_price_file(&path).unwrap();
        assert_eq!(panel.dates(), &[d(2024, 1, 2), d(2024, 1, 3)]);
        let close = panel.close_series().unwrap();
        assert_eq!(close.values, vec![9.4, 10.4]);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_date_column_is_schema_error() {
        let dir = temp_dir();
        let path = dir.join("X.csv");
        fs::write(&path, "close\n1.0\n2.0\n").unwrap();
        let err = read_price_file(&path).unwrap_err();
        assert!(matches!(err, ResearchError::Schema(_)));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = read_frame(Path::new("prices.xlsx")).unwrap_err();
        assert!(matches!(err, ResearchError::UnsupportedConfiguration(_)));
    }
}
