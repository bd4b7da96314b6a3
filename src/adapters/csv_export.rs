//! CSV export of the derived view.

use crate::domain::derived::AnalysisRow;
use crate::domain::error::SyncError;
use crate::ports::report_port::ReportPort;
use std::io::Write;
use std::path::Path;

pub const HEADER: [&str; 9] = [
    "date",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "prev_close",
    "price_change",
    "percent_change",
];

fn opt<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

fn csv_err(e: csv::Error) -> SyncError {
    SyncError::Io(std::io::Error::other(e))
}

/// Write rows as CSV to any writer; absent values become empty cells.
pub fn write_rows<W: Write>(writer: W, rows: &[AnalysisRow]) -> Result<(), SyncError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(HEADER).map_err(csv_err)?;
    for row in rows {
        let r = &row.record;
        wtr.write_record([
            r.date.format("%Y-%m-%d").to_string(),
            opt(r.open),
            opt(r.high),
            opt(r.low),
            opt(r.close),
            opt(r.volume),
            opt(row.prev_close),
            opt(row.price_change),
            opt(row.percent_change),
        ])
        .map_err(csv_err)?;
    }
    wtr.flush()?;
    Ok(())
}

pub struct CsvExport;

impl ReportPort for CsvExport {
    fn write(&self, symbol: &str, view: &[AnalysisRow], output: &Path) -> Result<(), SyncError> {
        let file = std::fs::File::create(output)?;
        write_rows(file, view)?;
        tracing::info!(symbol, rows = view.len(), path = %output.display(), "exported derived view");
        Ok(())
    }
}
