//! VCI (Vietcap) chart API data source.
//!
//! Daily bars come from the `chart/OHLCChart/gap-chart` endpoint, which takes an
//! end timestamp and a bar count rather than a start date. The request asks for
//! enough bars to reach back to `start` and the response is trimmed to
//! `[start, end]`. Network failures, 429 and 5xx responses are retried with
//! exponential backoff; everything else fails the fetch immediately.

use crate::domain::error::SyncError;
use crate::domain::record::RawRecord;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_source::DataSource;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://trading.vietcap.com.vn/api/";

/// Extra bars requested beyond the business-day count of the window.
const COUNT_BACK_BUFFER: u32 = 100;

/// Upper bound on `[vci] max_retries`.
pub const MAX_RETRIES: u32 = 10;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChartRequest<'a> {
    time_frame: &'static str,
    symbols: [&'a str; 1],
    to: i64,
    count_back: u32,
}

/// One symbol's bars as parallel arrays.
#[derive(Debug, Deserialize)]
struct ChartSeries {
    #[serde(default)]
    o: Vec<Option<f64>>,
    #[serde(default)]
    h: Vec<Option<f64>>,
    #[serde(default)]
    l: Vec<Option<f64>>,
    #[serde(default)]
    c: Vec<Option<f64>>,
    #[serde(default)]
    v: Vec<Option<f64>>,
    t: Vec<serde_json::Value>,
}

pub struct VciSource {
    client: reqwest::blocking::Client,
    base_url: String,
    max_retries: u32,
    base_delay: Duration,
}

impl VciSource {
    pub fn new(base_url: &str, timeout: Duration, max_retries: u32) -> Result<Self, SyncError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| SyncError::Fetch {
                symbol: String::new(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            client,
            base_url,
            max_retries: max_retries.min(MAX_RETRIES),
            base_delay: Duration::from_millis(500),
        })
    }

    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SyncError> {
        let base_url = config
            .get_string("vci", "base_url")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let timeout = config.get_int("vci", "timeout_secs", 30).max(1) as u64;
        let max_retries = config
            .get_int("vci", "max_retries", 3)
            .clamp(0, MAX_RETRIES as i64) as u32;
        Self::new(&base_url, Duration::from_secs(timeout), max_retries)
    }

    fn chart_url(&self) -> String {
        format!("{}chart/OHLCChart/gap-chart", self.base_url)
    }

    fn fetch_with_retry(&self, symbol: &str, body: &ChartRequest<'_>) -> Result<String, SyncError> {
        let url = self.chart_url();
        let mut last_error = String::from("no attempt made");

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(self.base_delay, attempt);
                tracing::warn!(symbol, attempt, reason = %last_error, "retrying VCI request in {:?}", delay);
                std::thread::sleep(delay);
            }

            match self
                .client
                .post(&url)
                .header("Referer", "https://trading.vietcap.com.vn/")
                .header("Origin", "https://trading.vietcap.com.vn")
                .json(body)
                .send()
            {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp.text().map_err(|e| SyncError::Fetch {
                            symbol: symbol.to_string(),
                            reason: format!("failed to read response body: {e}"),
                        });
                    }
                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        last_error = format!("HTTP {status}");
                        continue;
                    }
                    return Err(SyncError::Fetch {
                        symbol: symbol.to_string(),
                        reason: format!("HTTP {status}"),
                    });
                }
                Err(e) => {
                    last_error = format!("network error: {e}");
                }
            }
        }

        Err(SyncError::Fetch {
            symbol: symbol.to_string(),
            reason: format!("giving up after {} attempts: {}", self.max_retries + 1, last_error),
        })
    }
}

/// Delay before retry `attempt` (1-based): `base`, then doubling.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

/// Weekdays in `[start, end]`; the provider counts bars, not calendar days.
pub fn business_days(start: NaiveDate, end: NaiveDate) -> u32 {
    let mut count = 0;
    let mut day = start;
    while day <= end {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            count += 1;
        }
        day += ChronoDuration::days(1);
    }
    count
}

fn end_of_day_timestamp(date: NaiveDate) -> i64 {
    date.and_hms_opt(23, 59, 59)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

fn parse_timestamp(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Turn a chart response body into rows dated within `[start, end]`.
fn parse_chart(
    symbol: &str,
    body: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<RawRecord>, SyncError> {
    let fetch_err = |reason: String| SyncError::Fetch {
        symbol: symbol.to_string(),
        reason,
    };

    let series: Vec<ChartSeries> =
        serde_json::from_str(body).map_err(|e| fetch_err(format!("unexpected response format: {e}")))?;

    let Some(series) = series.into_iter().next() else {
        return Ok(Vec::new());
    };

    let n = series.t.len();
    if [series.o.len(), series.h.len(), series.l.len(), series.c.len(), series.v.len()]
        .iter()
        .any(|&len| len != n)
    {
        return Err(fetch_err("inconsistent array lengths in response".to_string()));
    }

    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        let date = parse_timestamp(&series.t[i])
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.date_naive());

        if let Some(date) = date {
            if date < start || date > end {
                continue;
            }
        }

        rows.push(RawRecord {
            date,
            open: series.o[i],
            high: series.h[i],
            low: series.l[i],
            close: series.c[i],
            volume: series.v[i].map(|v| v.round() as i64),
        });
    }

    Ok(rows)
}

impl DataSource for VciSource {
    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawRecord>, SyncError> {
        let body = ChartRequest {
            time_frame: "ONE_DAY",
            symbols: [symbol],
            to: end_of_day_timestamp(end),
            count_back: business_days(start, end) + COUNT_BACK_BUFFER,
        };
        tracing::debug!(symbol, %start, %end, count_back = body.count_back, "requesting VCI chart");

        let text = self.fetch_with_retry(symbol, &body)?;
        let rows = parse_chart(symbol, &text, start, end)?;
        tracing::debug!(symbol, rows = rows.len(), "VCI chart parsed");
        Ok(rows)
    }

    fn name(&self) -> &str {
        "vci"
    }
}
