//! PostgreSQL series store.

use crate::domain::error::SyncError;
use crate::domain::record::Record;
use crate::ports::config_port::ConfigPort;
use crate::ports::series_store::{RangeQuery, SeriesStore, SeriesWriter};
use chrono::NaiveDate;
use postgres::error::SqlState;
use postgres::types::ToSql;
use postgres::{Client, NoTls, Row, Transaction};
use std::cell::RefCell;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS public.daily_bar (
        symbol TEXT NOT NULL,
        date DATE NOT NULL,
        open DOUBLE PRECISION,
        high DOUBLE PRECISION,
        low DOUBLE PRECISION,
        close DOUBLE PRECISION,
        volume BIGINT,
        PRIMARY KEY (symbol, date)
    );
    CREATE OR REPLACE VIEW public.daily_analysis AS
    SELECT symbol, date, open, high, low, close, volume,
        LAG(close) OVER w AS prev_close,
        ROUND((close - LAG(close) OVER w)::numeric, 2)::double precision AS price_change,
        ROUND(((close - LAG(close) OVER w) / NULLIF(LAG(close) OVER w, 0) * 100)::numeric, 2)::double precision AS percent_change
    FROM public.daily_bar
    WINDOW w AS (PARTITION BY symbol ORDER BY date);";

pub struct PostgresSeriesStore {
    client: RefCell<Client>,
    symbol: String,
}

fn query_err(e: postgres::Error) -> SyncError {
    SyncError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn row_to_record(row: &Row) -> Record {
    Record {
        date: row.get(0),
        open: row.get(1),
        high: row.get(2),
        low: row.get(3),
        close: row.get(4),
        volume: row.get(5),
    }
}

impl PostgresSeriesStore {
    pub fn from_config(config: &dyn ConfigPort, symbol: &str) -> Result<Self, SyncError> {
        // [postgres] connection_string first, then [database] conninfo
        let connection_string = config
            .get_string("postgres", "connection_string")
            .or_else(|| config.get_string("database", "conninfo"))
            .ok_or_else(|| SyncError::ConfigMissing {
                section: "postgres".into(),
                key: "connection_string".into(),
            })?;

        let mut client =
            Client::connect(&connection_string, NoTls).map_err(|e| SyncError::Database {
                reason: e.to_string(),
            })?;
        client.batch_execute(SCHEMA).map_err(query_err)?;

        Ok(Self {
            client: RefCell::new(client),
            symbol: symbol.to_string(),
        })
    }
}

struct PostgresWriter<'a, 'c> {
    tx: &'a mut Transaction<'c>,
    symbol: &'a str,
}

impl SeriesWriter for PostgresWriter<'_, '_> {
    fn delete_from(&mut self, date: NaiveDate) -> Result<usize, SyncError> {
        let removed = self
            .tx
            .execute(
                "DELETE FROM public.daily_bar WHERE symbol = $1 AND date >= $2",
                &[&self.symbol, &date],
            )
            .map_err(query_err)?;
        Ok(removed as usize)
    }

    fn insert_all(&mut self, records: &[Record]) -> Result<usize, SyncError> {
        let stmt = self
            .tx
            .prepare(
                "INSERT INTO public.daily_bar (symbol, date, open, high, low, close, volume)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .map_err(query_err)?;

        for record in records {
            let params: &[&(dyn ToSql + Sync)] = &[
                &self.symbol,
                &record.date,
                &record.open,
                &record.high,
                &record.low,
                &record.close,
                &record.volume,
            ];
            self.tx.execute(&stmt, params).map_err(|e| {
                if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                    SyncError::DuplicateKey { date: record.date }
                } else {
                    query_err(e)
                }
            })?;
        }

        Ok(records.len())
    }
}

impl SeriesStore for PostgresSeriesStore {
    fn max_date(&self) -> Result<Option<NaiveDate>, SyncError> {
        let row = self
            .client
            .borrow_mut()
            .query_one(
                "SELECT MAX(date) FROM public.daily_bar WHERE symbol = $1",
                &[&self.symbol],
            )
            .map_err(query_err)?;
        Ok(row.get(0))
    }

    fn range_query(&self, query: &RangeQuery) -> Result<Vec<Record>, SyncError> {
        let limit: Option<i64> = query.limit.map(|n| i64::try_from(n).unwrap_or(i64::MAX));
        let params: &[&(dyn ToSql + Sync)] = &[&self.symbol, &query.from, &query.to, &limit];
        let rows = self
            .client
            .borrow_mut()
            .query(
                "SELECT * FROM (
                    SELECT date, open, high, low, close, volume
                    FROM public.daily_bar
                    WHERE symbol = $1
                      AND ($2::date IS NULL OR date >= $2)
                      AND ($3::date IS NULL OR date <= $3)
                    ORDER BY date DESC
                    LIMIT $4
                 ) recent ORDER BY date ASC",
                params,
            )
            .map_err(query_err)?;

        Ok(rows.iter().map(row_to_record).collect())
    }

    fn data_range(&self) -> Result<Option<(NaiveDate, NaiveDate, usize)>, SyncError> {
        let row = self
            .client
            .borrow_mut()
            .query_one(
                "SELECT MIN(date), MAX(date), COUNT(*) FROM public.daily_bar WHERE symbol = $1",
                &[&self.symbol],
            )
            .map_err(query_err)?;

        let min: Option<NaiveDate> = row.get(0);
        let max: Option<NaiveDate> = row.get(1);
        let count: i64 = row.get(2);

        match (min, max) {
            (Some(min), Some(max)) if count > 0 => Ok(Some((min, max, count as usize))),
            _ => Ok(None),
        }
    }

    fn transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn SeriesWriter) -> Result<usize, SyncError>,
    ) -> Result<usize, SyncError> {
        let mut client = self.client.borrow_mut();
        let mut tx = client.transaction().map_err(query_err)?;

        // An uncommitted `Transaction` rolls back when dropped.
        let written = {
            let mut writer = PostgresWriter {
                tx: &mut tx,
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
