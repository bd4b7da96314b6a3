//! Upstream data provider port.

use crate::domain::error::SyncError;
use crate::domain::record::RawRecord;
use chrono::NaiveDate;

/// Provider of daily rows for a symbol.
///
/// Implementations return the provider's current view of `[start, end]`, which may
/// differ from an earlier call for the same range when recent rows were revised.
/// Rows need not be sorted or unique. Transport failures are reported as
/// [`SyncError::Fetch`]; retries and timeouts are the implementation's business.
pub trait DataSource {
    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawRecord>, SyncError>;

    /// Short provider name for logs.
    fn name(&self) -> &str;
}
