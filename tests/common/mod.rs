#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use dailysync::domain::error::SyncError;
use dailysync::domain::record::{RawRecord, Record};
use dailysync::ports::data_source::DataSource;
use dailysync::ports::series_store::{RangeQuery, SeriesStore, SeriesWriter};
use std::cell::RefCell;
use std::collections::HashMap;

/// Provider stand-in holding each symbol's full history and answering with the
/// requested window, the way a real chart endpoint does.
pub struct MockDataSource {
    pub data: RefCell<HashMap<String, Vec<RawRecord>>>,
    pub errors: HashMap<String, String>,
    pub calls: RefCell<Vec<(String, NaiveDate, NaiveDate)>>,
}

impl MockDataSource {
    pub fn new() -> Self {
        Self {
            data: RefCell::new(HashMap::new()),
            errors: HashMap::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with_records(self, symbol: &str, records: Vec<Record>) -> Self {
        self.data.borrow_mut().insert(
            symbol.to_string(),
            records.into_iter().map(RawRecord::from).collect(),
        );
        self
    }

    pub fn with_raw(self, symbol: &str, raw: Vec<RawRecord>) -> Self {
        self.data.borrow_mut().insert(symbol.to_string(), raw);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }

    /// Replace the provider's close for `date`, as a late correction would.
    pub fn revise_close(&self, symbol: &str, date: NaiveDate, close: f64) {
        if let Some(rows) = self.data.borrow_mut().get_mut(symbol) {
            for row in rows.iter_mut().filter(|r| r.date == Some(date)) {
                row.close = Some(close);
            }
        }
    }

    pub fn push(&self, symbol: &str, record: Record) {
        self.data
            .borrow_mut()
            .entry(symbol.to_string())
            .or_default()
            .push(record.into());
    }

    pub fn last_call(&self) -> Option<(String, NaiveDate, NaiveDate)> {
        self.calls.borrow().last().cloned()
    }
}

impl DataSource for MockDataSource {
    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawRecord>, SyncError> {
        self.calls.borrow_mut().push((symbol.to_string(), start, end));
        if let Some(reason) = self.errors.get(symbol) {
            return Err(SyncError::Fetch {
                symbol: symbol.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .borrow()
            .get(symbol)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.date.is_none_or(|d| d >= start && d <= end))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Store wrapper whose transactions run the real work and then fail, so the
/// wrapped store has to roll back.
pub struct FailingCommitStore<S> {
    pub inner: S,
}

impl<S: SeriesStore> SeriesStore for FailingCommitStore<S> {
    fn max_date(&self) -> Result<Option<NaiveDate>, SyncError> {
        self.inner.max_date()
    }

    fn range_query(&self, query: &RangeQuery) -> Result<Vec<Record>, SyncError> {
        self.inner.range_query(query)
    }

    fn data_range(&self) -> Result<Option<(NaiveDate, NaiveDate, usize)>, SyncError> {
        self.inner.data_range()
    }

    fn transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn SeriesWriter) -> Result<usize, SyncError>,
    ) -> Result<usize, SyncError> {
        self.inner.transaction(&mut |writer| {
            work(writer)?;
            Err(SyncError::Database {
                reason: "disk full".into(),
            })
        })
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_record(date: NaiveDate, close: f64) -> Record {
    Record {
        date,
        open: Some(close - 1.0),
        high: Some(close + 2.0),
        low: Some(close - 2.0),
        close: Some(close),
        volume: Some(10_000),
    }
}

/// `n` consecutive daily records ending at `end`, closes 100, 101, ...
pub fn daily_series(end: NaiveDate, n: i64) -> Vec<Record> {
    (0..n)
        .map(|i| make_record(end - Duration::days(n - 1 - i), 100.0 + i as f64))
        .collect()
}

pub fn stored_dates(store: &dyn SeriesStore) -> Vec<NaiveDate> {
    store
        .range_query(&RangeQuery::all())
        .unwrap()
        .into_iter()
        .map(|r| r.date)
        .collect()
}
