//! Daily OHLCV record and provider-row normalization.

use chrono::NaiveDate;

/// One stored observation. `date` is the unique key within a series.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<i64>,
}

impl Record {
    /// A record with every attribute absent.
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            open: None,
            high: None,
            low: None,
            close: None,
            volume: None,
        }
    }
}

/// A row as handed over by a data source, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub date: Option<NaiveDate>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<i64>,
}

impl From<Record> for RawRecord {
    fn from(r: Record) -> Self {
        Self {
            date: Some(r.date),
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            volume: r.volume,
        }
    }
}

/// Result of [`normalize`].
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    /// Ascending by date, one record per date.
    pub records: Vec<Record>,
    /// Rows discarded for a missing date or superseded by a later row for the same date.
    pub dropped: usize,
}

/// Sort provider rows by date and collapse them to one record per date.
///
/// Rows without a date are discarded. When two rows share a date the one that
/// comes later after a stable sort wins, i.e. the later one in provider order.
/// Non-finite prices and negative volumes are treated as absent.
pub fn normalize(raw: Vec<RawRecord>) -> Normalized {
    let total = raw.len();
    let mut dated: Vec<Record> = raw
        .into_iter()
        .filter_map(|r| {
            let date = r.date?;
            Some(Record {
                date,
                open: finite(r.open),
                high: finite(r.high),
                low: finite(r.low),
                close: finite(r.close),
                volume: r.volume.filter(|v| {
                    if *v < 0 {
                        tracing::warn!(%date, volume = *v, "discarding negative volume");
                        false
                    } else {
                        true
                    }
                }),
            })
        })
        .collect();

    let undated = total - dated.len();
    if undated > 0 {
        tracing::warn!(count = undated, "discarding rows without a date");
    }

    dated.sort_by_key(|r| r.date);

    let mut records: Vec<Record> = Vec::with_capacity(dated.len());
    for record in dated {
        match records.last_mut() {
            Some(last) if last.date == record.date => *last = record,
            _ => records.push(record),
        }
    }

    let dropped = total - records.len();
    Normalized { records, dropped }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}
