//! Incremental reconciliation of a stored series against its data source.
//!
//! One [`ReconciliationEngine::sync`] call is one cycle:
//!
//! 1. Pick the fetch window from the store state. An empty store bootstraps
//!    `bootstrap_days` of history; otherwise the window starts `overlap_days` before
//!    the latest stored date so that recently revised rows are fetched again.
//! 2. Fetch and normalize. Nothing has been written yet, so a fetch failure leaves
//!    the store as it was.
//! 3. Commit in one store transaction: delete every row from the window start on,
//!    then insert the fetched rows. Readers see either the old or the new window.
//! 4. Report what was written.

use crate::domain::error::SyncError;
use crate::domain::record::normalize;
use crate::ports::data_source::DataSource;
use crate::ports::series_store::SeriesStore;
use chrono::{Days, NaiveDate};
use std::fmt;

/// Days of history fetched into an empty store.
pub const DEFAULT_BOOTSTRAP_DAYS: i64 = 1825;
/// Trailing days re-fetched on every update to pick up provider revisions.
pub const DEFAULT_OVERLAP_DAYS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    pub bootstrap_days: i64,
    pub overlap_days: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            bootstrap_days: DEFAULT_BOOTSTRAP_DAYS,
            overlap_days: DEFAULT_OVERLAP_DAYS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Bootstrap,
    Update,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Bootstrap => write!(f, "bootstrap"),
            SyncMode::Update => write!(f, "update"),
        }
    }
}

/// Inclusive date range requested from the data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub symbol: String,
    pub mode: SyncMode,
    pub window: FetchWindow,
    /// Rows returned by the data source before normalization.
    pub fetched: usize,
    /// Rows discarded during normalization.
    pub dropped: usize,
    pub rows_deleted: usize,
    pub rows_written: usize,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.rows_written == 0 && self.rows_deleted == 0
    }
}

pub struct ReconciliationEngine<'a> {
    store: &'a dyn SeriesStore,
    source: &'a dyn DataSource,
    config: SyncConfig,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(store: &'a dyn SeriesStore, source: &'a dyn DataSource, config: SyncConfig) -> Self {
        Self {
            store,
            source,
            config,
        }
    }

    /// Decide the mode and window for a cycle ending at `as_of`.
    pub fn plan(&self, as_of: NaiveDate) -> Result<(SyncMode, FetchWindow), SyncError> {
        match self.store.max_date()? {
            None => Ok((
                SyncMode::Bootstrap,
                FetchWindow {
                    start: days_before(as_of, self.config.bootstrap_days, "bootstrap_days")?,
                    end: as_of,
                },
            )),
            Some(latest) if as_of < latest => Err(SyncError::InvalidRange { as_of, latest }),
            Some(latest) => Ok((
                SyncMode::Update,
                FetchWindow {
                    start: days_before(latest, self.config.overlap_days, "overlap_days")?,
                    end: as_of,
                },
            )),
        }
    }

    /// Run one reconciliation cycle for `symbol` up to and including `as_of`.
    pub fn sync(&self, symbol: &str, as_of: NaiveDate) -> Result<SyncReport, SyncError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(SyncError::InvalidSymbol {
                symbol: symbol.to_string(),
            });
        }

        let (mode, window) = self.plan(as_of)?;
        tracing::info!(symbol, %mode, %window, source = self.source.name(), "fetching");

        let raw = self.source.fetch(symbol, window.start, window.end)?;
        let fetched = raw.len();
        let normalized = normalize(raw);
        let records = normalized.records;

        if records.is_empty() {
            return match mode {
                SyncMode::Bootstrap => Err(SyncError::NoData {
                    symbol: symbol.to_string(),
                    start: window.start,
                    end: window.end,
                }),
                SyncMode::Update => {
                    tracing::info!(symbol, %window, "no rows returned, store unchanged");
                    Ok(SyncReport {
                        symbol: symbol.to_string(),
                        mode,
                        window,
                        fetched,
                        dropped: normalized.dropped,
                        rows_deleted: 0,
                        rows_written: 0,
                    })
                }
            };
        }

        let mut rows_deleted = 0;
        let rows_written = self
            .store
            .transaction(&mut |writer| {
                if mode == SyncMode::Update {
                    rows_deleted = writer.delete_from(window.start)?;
                }
                writer.insert_all(&records)
            })
            .map_err(|e| match e {
                SyncError::DuplicateKey { .. } | SyncError::Commit { .. } => e,
                other => SyncError::Commit {
                    reason: other.to_string(),
                },
            })?;

        tracing::info!(
            symbol,
            %mode,
            rows_deleted,
            rows_written,
            "commit complete"
        );

        Ok(SyncReport {
            symbol: symbol.to_string(),
            mode,
            window,
            fetched,
            dropped: normalized.dropped,
            rows_deleted,
            rows_written,
        })
    }
}

/// `date` minus `days`, or `ConfigInvalid` when `days` is negative or the
/// result falls outside the calendar.
fn days_before(date: NaiveDate, days: i64, key: &str) -> Result<NaiveDate, SyncError> {
    u64::try_from(days)
        .ok()
        .and_then(|n| date.checked_sub_days(Days::new(n)))
        .ok_or_else(|| SyncError::ConfigInvalid {
            section: "sync".into(),
            key: key.into(),
            reason: format!("{days} days before {date} is not a valid date"),
        })
}
