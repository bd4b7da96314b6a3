//! Day-over-day change analytics over a reconciled series.
//!
//! [`build_derived_view`] is a pure function of its input: the same records always
//! produce the same rows, so the view can be cached and recomputed at will.

use crate::domain::record::Record;
use chrono::NaiveDate;

/// Decimal places used when no precision is configured.
pub const DEFAULT_PRECISION: u32 = 2;

/// One record plus its change relative to the previous record.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRow {
    pub record: Record,
    pub prev_close: Option<f64>,
    pub price_change: Option<f64>,
    pub percent_change: Option<f64>,
}

impl AnalysisRow {
    pub fn date(&self) -> NaiveDate {
        self.record.date
    }
}

/// Compute change fields for ascending `records` in one pass.
///
/// The first row has no previous close. A missing or zero previous close yields no
/// percent change. Changes are rounded to `precision` decimal places.
pub fn build_derived_view(records: &[Record], precision: u32) -> Vec<AnalysisRow> {
    let mut rows = Vec::with_capacity(records.len());
    let mut prev: Option<Option<f64>> = None;

    for record in records {
        let prev_close = prev.flatten();
        let price_change = match (record.close, prev_close) {
            (Some(close), Some(p)) => Some(close - p),
            _ => None,
        };
        let percent_change = match (price_change, prev_close) {
            (Some(change), Some(p)) if p != 0.0 => Some(change / p * 100.0),
            _ => None,
        };

        rows.push(AnalysisRow {
            record: record.clone(),
            prev_close,
            price_change: price_change.map(|v| round_to(v, precision)),
            percent_change: percent_change.map(|v| round_to(v, precision)),
        });
        prev = Some(record.close);
    }

    rows
}

/// Round half away from zero, matching SQL `ROUND`.
pub fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rec(day: u32, close: Option<f64>) -> Record {
        Record {
            close,
            ..Record::empty(NaiveDate::from_ymd_opt(2024, 3, day).unwrap())
        }
    }

    #[test]
    fn consecutive_closes() {
        let records = vec![rec(1, Some(100.0)), rec(2, Some(105.0)), rec(3, Some(100.0))];
        let view = build_derived_view(&records, 2);

        let changes: Vec<_> = view.iter().map(|r| r.price_change).collect();
        assert_eq!(changes, vec![None, Some(5.0), Some(-5.0)]);

        assert_eq!(view[0].percent_change, None);
        assert_relative_eq!(view[1].percent_change.unwrap(), 5.0);
        assert_relative_eq!(view[2].percent_change.unwrap(), -4.76);
        assert_eq!(view[2].prev_close, Some(105.0));
    }

    #[test]
    fn higher_precision_keeps_more_digits() {
        let records = vec![rec(1, Some(105.0)), rec(2, Some(100.0))];
        let view = build_derived_view(&records, 4);
        assert_relative_eq!(view[1].percent_change.unwrap(), -4.7619);
    }

    #[test]
    fn zero_previous_close_has_no_percent() {
        let records = vec![rec(1, Some(0.0)), rec(2, Some(10.0))];
        let view = build_derived_view(&records, 2);
        assert_eq!(view[1].price_change, Some(10.0));
        assert_eq!(view[1].percent_change, None);
    }

    #[test]
    fn missing_close_breaks_the_chain_for_one_step() {
        let records = vec![rec(1, Some(10.0)), rec(2, None), rec(3, Some(12.0))];
        let view = build_derived_view(&records, 2);
        assert_eq!(view[1].prev_close, Some(10.0));
        assert_eq!(view[1].price_change, None);
        assert_eq!(view[2].prev_close, None);
        assert_eq!(view[2].percent_change, None);
    }

    #[test]
    fn empty_and_single() {
        assert!(build_derived_view(&[], 2).is_empty());
        let view = build_derived_view(&[rec(1, Some(50.0))], 2);
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].prev_close, None);
    }

    #[test]
    fn recomputation_is_identical() {
        let records = vec![rec(1, Some(3.0)), rec(2, Some(7.0)), rec(3, Some(1.0))];
        assert_eq!(build_derived_view(&records, 2), build_derived_view(&records, 2));
    }

    #[test]
    fn round_to_half_away_from_zero() {
        assert_relative_eq!(round_to(1.005_000_1, 2), 1.01);
        assert_relative_eq!(round_to(-2.345, 1), -2.3);
        assert_relative_eq!(round_to(7.0, 0), 7.0);
    }
}
