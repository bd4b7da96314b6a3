//! CSV file data source.
//!
//! Reads `<dir>/<SYMBOL>.csv`. Columns are located by header name, so provider
//! dumps with extra columns or a different column order work as-is. The date
//! column may be called `date` or `time`; a time-of-day suffix is ignored.

use crate::domain::error::SyncError;
use crate::domain::record::RawRecord;
use crate::ports::data_source::DataSource;
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;

pub struct CsvSource {
    base_path: PathBuf,
}

#[derive(Default)]
struct Columns {
    date: Option<usize>,
    open: Option<usize>,
    high: Option<usize>,
    low: Option<usize>,
    close: Option<usize>,
    volume: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let mut cols = Columns::default();
        for (i, name) in headers.iter().enumerate() {
            match name.trim().to_lowercase().as_str() {
                "date" | "time" => cols.date = cols.date.or(Some(i)),
                "open" => cols.open = Some(i),
                "high" => cols.high = Some(i),
                "low" => cols.low = Some(i),
                "close" => cols.close = Some(i),
                "volume" => cols.volume = Some(i),
                _ => {}
            }
        }
        cols
    }
}

impl CsvSource {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }

    fn fetch_error(symbol: &str, reason: String) -> SyncError {
        SyncError::Fetch {
            symbol: symbol.to_string(),
            reason,
        }
    }
}

fn cell<'r>(record: &'r csv::StringRecord, idx: Option<usize>) -> Option<&'r str> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    // "2024-01-15", "2024-01-15 00:00:00" and "2024-01-15T00:00:00" all name the same day
    let day = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn parse_number<T: std::str::FromStr>(
    symbol: &str,
    line: u64,
    column: &str,
    value: Option<&str>,
) -> Result<Option<T>, SyncError>
where
    T::Err: std::fmt::Display,
{
    value
        .map(|v| {
            v.parse::<T>().map_err(|e| {
                CsvSource::fetch_error(symbol, format!("line {}: invalid {} value '{}': {}", line, column, v, e))
            })
        })
        .transpose()
}

impl DataSource for CsvSource {
    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawRecord>, SyncError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| {
            Self::fetch_error(symbol, format!("failed to read {}: {}", path.display(), e))
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| Self::fetch_error(symbol, format!("CSV header error: {}", e)))?
            .clone();
        let cols = Columns::from_headers(&headers);
        if cols.date.is_none() {
            return Err(Self::fetch_error(
                symbol,
                format!("{} has no date or time column", path.display()),
            ));
        }

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record =
                result.map_err(|e| Self::fetch_error(symbol, format!("CSV parse error: {}", e)))?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            // Undated rows are passed through; normalization discards them.
            let date = cell(&record, cols.date).and_then(parse_date);
            if let Some(date) = date {
                if date < start || date > end {
                    continue;
                }
            }

            let volume = parse_number::<f64>(symbol, line, "volume", cell(&record, cols.volume))?
                .map(|v| v.round() as i64);

            rows.push(RawRecord {
                date,
                open: parse_number(symbol, line, "open", cell(&record, cols.open))?,
                high: parse_number(symbol, line, "high", cell(&record, cols.high))?,
                low: parse_number(symbol, line, "low", cell(&record, cols.low))?,
                close: parse_number(symbol, line, "close", cell(&record, cols.close))?,
                volume,
            });
        }

        tracing::debug!(symbol, rows = rows.len(), path = %path.display(), "read csv");
        Ok(rows)
    }

    fn name(&self) -> &str {
        "csv"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let csv_content = "time,open,high,low,close,volume,ticker\n\
            2024-01-17,110.0,120.0,105.0,115.0,55000,FPT\n\
            2024-01-15,100.0,110.0,90.0,105.0,50000,FPT\n\
            2024-01-16 00:00:00,105.0,,100.0,110.0,,FPT\n";

        fs::write(path.join("FPT.csv"), csv_content).unwrap();
        fs::write(path.join("BAD.csv"), "date,close\n2024-01-15,abc\n").unwrap();
        fs::write(path.join("NODATE.csv"), "open,close\n1,2\n").unwrap();

        (dir, path)
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn fetch_reads_recognized_columns() {
        let (_dir, path) = setup_test_data();
        let source = CsvSource::new(path);

        let rows = source.fetch("FPT", d(1), d(31)).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].date, Some(d(17)));
        assert_eq!(rows[0].close, Some(115.0));
        assert_eq!(rows[0].volume, Some(55000));
    }

    #[test]
    fn empty_cells_are_absent() {
        let (_dir, path) = setup_test_data();
        let source = CsvSource::new(path);

        let rows = source.fetch("FPT", d(16), d(16)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, Some(d(16)));
        assert_eq!(rows[0].high, None);
        assert_eq!(rows[0].volume, None);
        assert_eq!(rows[0].open, Some(105.0));
    }

    #[test]
    fn filters_by_window() {
        let (_dir, path) = setup_test_data();
        let source = CsvSource::new(path);

        let rows = source.fetch("FPT", d(16), d(17)).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(source.fetch("FPT", d(20), d(25)).unwrap().is_empty());
    }

    #[test]
    fn missing_file_is_fetch_error() {
        let (_dir, path) = setup_test_data();
        let source = CsvSource::new(path);

        let result = source.fetch("XYZ", d(1), d(31));
        assert!(matches!(result, Err(SyncError::Fetch { .. })));
    }

    #[test]
    fn bad_number_is_fetch_error() {
        let (_dir, path) = setup_test_data();
        let source = CsvSource::new(path);

        match source.fetch("BAD", d(1), d(31)) {
            Err(SyncError::Fetch { reason, .. }) => assert!(reason.contains("close")),
            other => panic!("expected Fetch error, got: {other:?}"),
        }
    }

    #[test]
    fn missing_date_column_is_fetch_error() {
        let (_dir, path) = setup_test_data();
        let source = CsvSource::new(path);
        assert!(source.fetch("NODATE", d(1), d(31)).is_err());
    }
}
