//! Latest-session summary consumed by the console reporter.

use crate::domain::derived::AnalysisRow;
use crate::domain::record::Record;

#[derive(Debug, Clone, PartialEq)]
pub struct LatestSummary {
    pub latest: Record,
    pub previous: Option<Record>,
    /// Zero when there is no previous session to compare against.
    pub price_change: f64,
    pub percent_change: f64,
}

impl LatestSummary {
    /// Summarize the last row of an ascending derived view.
    pub fn from_view(view: &[AnalysisRow]) -> Option<Self> {
        let last = view.last()?;
        let previous = view
            .len()
            .checked_sub(2)
            .map(|i| view[i].record.clone());

        Some(Self {
            latest: last.record.clone(),
            previous,
            price_change: last.price_change.unwrap_or(0.0),
            percent_change: last.percent_change.unwrap_or(0.0),
        })
    }
}
