//! Persistent series storage port.

use crate::domain::error::SyncError;
use crate::domain::record::Record;
use chrono::NaiveDate;

/// Bounds for [`SeriesStore::range_query`]. All bounds are inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Keep only the most recent `limit` records of the range.
    pub limit: Option<usize>,
}

impl RangeQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn last(n: usize) -> Self {
        Self {
            limit: Some(n),
            ..Self::default()
        }
    }
}

/// Write half of a store, only reachable inside [`SeriesStore::transaction`].
pub trait SeriesWriter {
    /// Remove every record dated on or after `date`. Returns the number removed.
    fn delete_from(&mut self, date: NaiveDate) -> Result<usize, SyncError>;

    /// Insert records in order. Fails with [`SyncError::DuplicateKey`] when a date
    /// is already present; callers delete overlapping keys first.
    fn insert_all(&mut self, records: &[Record]) -> Result<usize, SyncError>;
}

/// Date-keyed storage for one symbol's series.
pub trait SeriesStore {
    /// Latest stored date, or `None` when the series is empty.
    fn max_date(&self) -> Result<Option<NaiveDate>, SyncError>;

    /// Records within the query bounds, ascending by date.
    fn range_query(&self, query: &RangeQuery) -> Result<Vec<Record>, SyncError>;

    /// `(first, last, count)` of the stored series, or `None` when empty.
    fn data_range(&self) -> Result<Option<(NaiveDate, NaiveDate, usize)>, SyncError>;

    /// Run `work` inside one transaction.
    ///
    /// Changes become visible to readers only if `work` returns `Ok` and the
    /// commit succeeds; any other exit rolls everything back.
    fn transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn SeriesWriter) -> Result<usize, SyncError>,
    ) -> Result<usize, SyncError>;

    /// Single-statement convenience over [`SeriesWriter::delete_from`].
    fn delete_from(&self, date: NaiveDate) -> Result<usize, SyncError> {
        self.transaction(&mut |w| w.delete_from(date))
    }

    /// Single-statement convenience over [`SeriesWriter::insert_all`].
    fn insert_all(&self, records: &[Record]) -> Result<usize, SyncError> {
        self.transaction(&mut |w| w.insert_all(records))
    }
}
