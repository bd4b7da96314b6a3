//! Plain-text rendering of the latest session and of derived view tables.

use crate::domain::derived::AnalysisRow;
use crate::domain::summary::LatestSummary;

/// Group the integer part with commas: `1234567.891` at 2 decimals → `1,234,567.89`.
pub fn group_thousands(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && formatted.chars().any(|c| c != '0' && c != '.') {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(f) => format!("{sign}{grouped}.{f}"),
        None => format!("{sign}{grouped}"),
    }
}

fn signed(value: f64, decimals: usize) -> String {
    let body = group_thousands(value, decimals);
    if value > 0.0 { format!("+{body}") } else { body }
}

fn price(value: Option<f64>) -> String {
    value
        .map(|v| group_thousands(v, 2))
        .unwrap_or_else(|| "n/a".to_string())
}

/// Multi-line summary of the most recent session.
pub fn format_summary(symbol: &str, summary: &LatestSummary) -> String {
    let latest = &summary.latest;
    let rule = "=".repeat(56);
    let volume = latest
        .volume
        .map(|v| group_thousands(v as f64, 0))
        .unwrap_or_else(|| "n/a".to_string());

    let mut out = String::new();
    out.push_str(&format!("{symbol} latest session\n"));
    out.push_str(&rule);
    out.push('\n');
    out.push_str(&format!("Date:        {}\n", latest.date.format("%d/%m/%Y")));
    out.push_str(&format!("Close:       {}\n", price(latest.close)));
    out.push_str(&format!(
        "Change:      {} ({}%)\n",
        signed(summary.price_change, 2),
        signed(summary.percent_change, 2)
    ));
    out.push_str(&format!(
        "High:        {} | Low: {}\n",
        price(latest.high),
        price(latest.low)
    ));
    out.push_str(&format!("Volume:      {volume}\n"));
    out.push_str(&rule);
    out.push('\n');
    out
}

/// Fixed-width table of derived rows, one line per date.
pub fn format_table(rows: &[AnalysisRow]) -> String {
    let opt = |v: Option<f64>| v.map(|v| format!("{v:.2}")).unwrap_or_default();

    let mut out = format!(
        "{:<10} {:>10} {:>10} {:>10} {:>10} {:>14} {:>10} {:>9}\n",
        "date", "open", "high", "low", "close", "volume", "change", "change%"
    );
    for row in rows {
        let r = &row.record;
        out.push_str(&format!(
            "{:<10} {:>10} {:>10} {:>10} {:>10} {:>14} {:>10} {:>9}\n",
            r.date.to_string(),
            opt(r.open),
            opt(r.high),
            opt(r.low),
            opt(r.close),
            r.volume.map(|v| v.to_string()).unwrap_or_default(),
            opt(row.price_change),
            opt(row.percent_change),
        ));
    }
    out
}
