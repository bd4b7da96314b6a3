//! SQLite series store.
//!
//! All symbols share one `daily_bar` table keyed by `(symbol, date)`; a
//! [`SqliteSeriesStore`] is scoped to a single symbol. The `daily_analysis` view is
//! a read-only SQL projection of the same change fields the domain computes.

use crate::domain::derived::AnalysisRow;
use crate::domain::error::SyncError;
use crate::domain::record::Record;
use crate::ports::config_port::ConfigPort;
use crate::ports::series_store::{RangeQuery, SeriesStore, SeriesWriter};
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, ErrorCode, Row, Transaction, TransactionBehavior};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub const MAX_POOL_SIZE: u32 = 64;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS daily_bar (
        symbol TEXT NOT NULL,
        date TEXT NOT NULL,
        open REAL,
        high REAL,
        low REAL,
        close REAL,
        volume INTEGER,
        PRIMARY KEY (symbol, date)
    );
    CREATE VIEW IF NOT EXISTS daily_analysis AS
    SELECT symbol, date, open, high, low, close, volume,
        LAG(close) OVER w AS prev_close,
        ROUND(close - LAG(close) OVER w, 2) AS price_change,
        ROUND((close - LAG(close) OVER w) / NULLIF(LAG(close) OVER w, 0) * 100, 2) AS percent_change
    FROM daily_bar
    WINDOW w AS (PARTITION BY symbol ORDER BY date);";

pub struct SqliteSeriesStore {
    pool: Pool<SqliteConnectionManager>,
    symbol: String,
}

fn db_err(e: r2d2::Error) -> SyncError {
    SyncError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> SyncError {
    SyncError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let date_str: String = row.get(idx)?;
    NaiveDate::parse_from_str(&date_str, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<Record> {
    Ok(Record {
        date: parse_date(row, 0)?,
        open: row.get(1)?,
        high: row.get(2)?,
        low: row.get(3)?,
        close: row.get(4)?,
        volume: row.get(5)?,
    })
}

impl SqliteSeriesStore {
    pub fn from_config(config: &dyn ConfigPort, symbol: &str) -> Result<Self, SyncError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| SyncError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config
            .get_int("sqlite", "pool_size", 4)
            .clamp(1, MAX_POOL_SIZE as i64) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(db_err)?;

        let store = Self {
            pool,
            symbol: symbol.to_string(),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Private in-memory database; a single pooled connection keeps it alive.
    pub fn in_memory(symbol: &str) -> Result<Self, SyncError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(db_err)?;

        let store = Self {
            pool,
            symbol: symbol.to_string(),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Another symbol's series in the same database.
    pub fn for_symbol(&self, symbol: &str) -> Self {
        Self {
            pool: self.pool.clone(),
            symbol: symbol.to_string(),
        }
    }

    pub fn initialize_schema(&self) -> Result<(), SyncError> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA).map_err(query_err)?;
        Ok(())
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, SyncError> {
        self.pool.get().map_err(db_err)
    }

    /// Rows of the `daily_analysis` SQL view, ascending by date.
    pub fn query_analysis(&self, query: &RangeQuery) -> Result<Vec<AnalysisRow>, SyncError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT * FROM (
                    SELECT date, open, high, low, close, volume,
                           prev_close, price_change, percent_change
                    FROM daily_analysis
                    WHERE symbol = ?1
                      AND (?2 IS NULL OR date >= ?2)
                      AND (?3 IS NULL OR date <= ?3)
                    ORDER BY date DESC
                    LIMIT ?4
                 ) ORDER BY date ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(
                params![
                    self.symbol,
                    query.from.map(format_date),
                    query.to.map(format_date),
                    limit_param(query.limit),
                ],
                |row| {
                    Ok(AnalysisRow {
                        record: row_to_record(row)?,
                        prev_close: row.get(6)?,
                        price_change: row.get(7)?,
                        percent_change: row.get(8)?,
                    })
                },
            )
            .map_err(query_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }
}

/// SQLite treats a negative LIMIT as unbounded.
fn limit_param(limit: Option<usize>) -> i64 {
    limit
        .map(|n| i64::try_from(n).unwrap_or(i64::MAX))
        .unwrap_or(-1)
}

struct SqliteWriter<'a> {
    tx: &'a Transaction<'a>,
    symbol: &'a str,
}

impl SeriesWriter for SqliteWriter<'_> {
    fn delete_from(&mut self, date: NaiveDate) -> Result<usize, SyncError> {
        self.tx
            .execute(
                "DELETE FROM daily_bar WHERE symbol = ?1 AND date >= ?2",
                params![self.symbol, format_date(date)],
            )
            .map_err(query_err)
    }

    fn insert_all(&mut self, records: &[Record]) -> Result<usize, SyncError> {
        let mut stmt = self
            .tx
            .prepare_cached(
                "INSERT INTO daily_bar (symbol, date, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .map_err(query_err)?;

        for record in records {
            stmt.execute(params![
                self.symbol,
                format_date(record.date),
                record.open,
                record.high,
                record.low,
                record.close,
                record.volume,
            ])
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(ref failure, _)
                    if failure.code == ErrorCode::ConstraintViolation =>
                {
                    SyncError::DuplicateKey { date: record.date }
                }
                other => query_err(other),
            })?;
        }

        Ok(records.len())
    }
}

impl SeriesStore for SqliteSeriesStore {
    fn max_date(&self) -> Result<Option<NaiveDate>, SyncError> {
        let conn = self.conn()?;
        let max: Option<String> = conn
            .query_row(
                "SELECT MAX(date) FROM daily_bar WHERE symbol = ?1",
                params![self.symbol],
                |row| row.get(0),
            )
            .map_err(query_err)?;

        max.map(|s| {
            NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| SyncError::Database {
                reason: format!("invalid stored date '{s}': {e}"),
            })
        })
        .transpose()
    }

    fn range_query(&self, query: &RangeQuery) -> Result<Vec<Record>, SyncError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT * FROM (
                    SELECT date, open, high, low, close, volume
                    FROM daily_bar
                    WHERE symbol = ?1
                      AND (?2 IS NULL OR date >= ?2)
                      AND (?3 IS NULL OR date <= ?3)
                    ORDER BY date DESC
                    LIMIT ?4
                 ) ORDER BY date ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(
                params![
                    self.symbol,
                    query.from.map(format_date),
                    query.to.map(format_date),
                    limit_param(query.limit),
                ],
                row_to_record,
            )
            .map_err(query_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn data_range(&self) -> Result<Option<(NaiveDate, NaiveDate, usize)>, SyncError> {
        let conn = self.conn()?;
        let result: (Option<String>, Option<String>, i64) = conn
            .query_row(
                "SELECT MIN(date), MAX(date), COUNT(*) FROM daily_bar WHERE symbol = ?1",
                params![self.symbol],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_err)?;

        match result {
            (Some(min_str), Some(max_str), count) if count > 0 => {
                let min = NaiveDate::parse_from_str(&min_str, DATE_FORMAT).map_err(
                    |e: chrono::ParseError| SyncError::Database {
                        reason: e.to_string(),
                    },
                )?;
                let max = NaiveDate::parse_from_str(&max_str, DATE_FORMAT).map_err(
                    |e: chrono::ParseError| SyncError::Database {
                        reason: e.to_string(),
                    },
                )?;
                Ok(Some((min, max, count as usize)))
            }
            _ => Ok(None),
        }
    }

    fn transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn SeriesWriter) -> Result<usize, SyncError>,
    ) -> Result<usize, SyncError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(query_err)?;

        // Dropping `tx` on the error path rolls back.
        let written = {
            let mut writer = SqliteWriter {
                tx: &tx,
                symbol: &self.symbol,
            };
            work(&mut writer)?
        };

        tx.commit().map_err(|e| SyncError::Commit {
            reason: e.to_string(),
        })?;

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptyConfig;

    impl ConfigPort for EmptyConfig {
        fn get_string(&self, _section: &str, _key: &str) -> Option<String> {
            None
        }
        fn get_int(&self, _section: &str, _key: &str, default: i64) -> i64 {
            default
        }
        fn get_double(&self, _section: &str, _key: &str, default: f64) -> f64 {
            default
        }
        fn get_bool(&self, _section: &str, _key: &str, default: bool) -> bool {
            default
        }
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn bar(day: u32, close: f64) -> Record {
        Record {
            date: d(day),
            open: Some(close - 1.0),
            high: Some(close + 1.0),
            low: Some(close - 2.0),
            close: Some(close),
            volume: Some(1000),
        }
    }

    #[test]
    fn from_config_missing_path() {
        let result = SqliteSeriesStore::from_config(&EmptyConfig, "FPT");
        match result {
            Err(SyncError::ConfigMissing { section, key }) => {
                assert_eq!(section, "sqlite");
                assert_eq!(key, "path");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn empty_store_has_no_max_date() {
        let store = SqliteSeriesStore::in_memory("FPT").unwrap();
        assert_eq!(store.max_date().unwrap(), None);
        assert_eq!(store.data_range().unwrap(), None);
    }

    #[test]
    fn insert_and_query_round_trip_with_nulls() {
        let store = SqliteSeriesStore::in_memory("FPT").unwrap();
        let sparse = Record::empty(d(3));
        store.insert_all(&[bar(1, 100.0), bar(2, 101.0), sparse.clone()]).unwrap();

        let all = store.range_query(&RangeQuery::all()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[1], bar(2, 101.0));
        assert_eq!(all[2], sparse);
        assert_eq!(store.max_date().unwrap(), Some(d(3)));
    }

    #[test]
    fn insert_rejects_existing_date() {
        let store = SqliteSeriesStore::in_memory("FPT").unwrap();
        store.insert_all(&[bar(1, 100.0)]).unwrap();

        let err = store.insert_all(&[bar(2, 1.0), bar(1, 99.0)]).unwrap_err();
        assert!(matches!(err, SyncError::DuplicateKey { date } if date == d(1)));
        // whole batch rolled back
        assert_eq!(store.max_date().unwrap(), Some(d(1)));
    }

    #[test]
    fn delete_from_is_inclusive() {
        let store = SqliteSeriesStore::in_memory("FPT").unwrap();
        store
            .insert_all(&[bar(1, 1.0), bar(2, 2.0), bar(3, 3.0), bar(4, 4.0)])
            .unwrap();

        assert_eq!(store.delete_from(d(3)).unwrap(), 2);
        assert_eq!(store.max_date().unwrap(), Some(d(2)));
    }

    #[test]
    fn failed_transaction_rolls_back_delete() {
        let store = SqliteSeriesStore::in_memory("FPT").unwrap();
        store.insert_all(&[bar(1, 1.0), bar(2, 2.0)]).unwrap();

        let result = store.transaction(&mut |w| {
            w.delete_from(d(1))?;
            Err(SyncError::Commit {
                reason: "injected".into(),
            })
        });
        assert!(result.is_err());
        assert_eq!(store.range_query(&RangeQuery::all()).unwrap().len(), 2);
    }

    #[test]
    fn range_query_bounds_and_limit() {
        let store = SqliteSeriesStore::in_memory("FPT").unwrap();
        let bars: Vec<_> = (1..=10).map(|i| bar(i, i as f64)).collect();
        store.insert_all(&bars).unwrap();

        let window = store
            .range_query(&RangeQuery {
                from: Some(d(3)),
                to: Some(d(6)),
                limit: None,
            })
            .unwrap();
        assert_eq!(window.len(), 4);
        assert_eq!(window[0].date, d(3));

        let last = store.range_query(&RangeQuery::last(2)).unwrap();
        let dates: Vec<_> = last.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![d(9), d(10)]);
    }

    #[test]
    fn symbols_are_isolated() {
        let fpt = SqliteSeriesStore::in_memory("FPT").unwrap();
        let vnm = fpt.for_symbol("VNM");
        fpt.insert_all(&[bar(1, 1.0)]).unwrap();
        vnm.insert_all(&[bar(1, 2.0), bar(2, 3.0)]).unwrap();

        assert_eq!(fpt.data_range().unwrap(), Some((d(1), d(1), 1)));
        assert_eq!(vnm.data_range().unwrap(), Some((d(1), d(2), 2)));
        assert_eq!(vnm.delete_from(d(1)).unwrap(), 2);
        assert_eq!(fpt.max_date().unwrap(), Some(d(1)));
    }

    #[test]
    fn analysis_view_computes_changes() {
        let store = SqliteSeriesStore::in_memory("FPT").unwrap();
        store
            .insert_all(&[bar(1, 100.0), bar(2, 105.0), bar(3, 100.0)])
            .unwrap();

        let rows = store.query_analysis(&RangeQuery::all()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].prev_close, None);
        assert_eq!(rows[1].price_change, Some(5.0));
        assert_eq!(rows[2].percent_change, Some(-4.76));
    }

    #[test]
    fn file_database_persists_across_pools() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("series.db");

        struct PathConfig(String);
        impl ConfigPort for PathConfig {
            fn get_string(&self, section: &str, key: &str) -> Option<String> {
                (section == "sqlite" && key == "path").then(|| self.0.clone())
            }
            fn get_int(&self, _section: &str, _key: &str, default: i64) -> i64 {
                default
            }
            fn get_double(&self, _section: &str, _key: &str, default: f64) -> f64 {
                default
            }
            fn get_bool(&self, _section: &str, _key: &str, default: bool) -> bool {
                default
            }
        }

        let config = PathConfig(path.display().to_string());
        {
            let store = SqliteSeriesStore::from_config(&config, "FPT").unwrap();
            store.insert_all(&[bar(1, 1.0)]).unwrap();
        }
        let reopened = SqliteSeriesStore::from_config(&config, "FPT").unwrap();
        assert_eq!(reopened.max_date().unwrap(), Some(d(1)));
    }

    #[test]
    fn huge_limit_returns_whole_series() {
        let store = SqliteSeriesStore::in_memory("FPT").unwrap();
        store.insert_all(&[bar(1, 1.0), bar(2, 2.0)]).unwrap();

        let rows = store.range_query(&RangeQuery::last(usize::MAX)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, d(1));
        let view = store.query_analysis(&RangeQuery::last(usize::MAX)).unwrap();
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn pool_size_is_clamped() {
        struct PoolConfig(String, i64);
        impl ConfigPort for PoolConfig {
            fn get_string(&self, section: &str, key: &str) -> Option<String> {
                (section == "sqlite" && key == "path").then(|| self.0.clone())
            }
            fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
                if section == "sqlite" && key == "pool_size" {
                    self.1
                } else {
                    default
                }
            }
            fn get_double(&self, _section: &str, _key: &str, default: f64) -> f64 {
                default
            }
            fn get_bool(&self, _section: &str, _key: &str, default: bool) -> bool {
                default
            }
        }

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("series.db").display().to_string();

        let huge = SqliteSeriesStore::from_config(&PoolConfig(path.clone(), 4_294_967_296), "FPT").unwrap();
        assert_eq!(huge.pool.max_size(), MAX_POOL_SIZE);

        let negative = SqliteSeriesStore::from_config(&PoolConfig(path, -3), "FPT").unwrap();
        assert_eq!(negative.pool.max_size(), 1);
    }
}
