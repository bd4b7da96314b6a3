//! SVG chart rendering for the recent part of a series.
//!
//! Three standalone charts: close price line, traded volume bars, and open vs
//! close lines. Rows with missing values leave gaps rather than being drawn at zero.

use crate::domain::derived::AnalysisRow;
use crate::domain::error::SyncError;
use crate::ports::report_port::ReportPort;
use std::fs;
use std::path::{Path, PathBuf};

/// Rows charted when no count is configured (about six months of sessions).
pub const DEFAULT_CHART_DAYS: usize = 180;

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 300.0;
const PADDING: f64 = 40.0;

struct Frame {
    min: f64,
    max: f64,
    count: usize,
}

impl Frame {
    fn new<'a>(values: impl Iterator<Item = &'a Option<f64>>, count: usize, floor_zero: bool) -> Option<Self> {
        let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
        for v in values.flatten() {
            min = min.min(*v);
            max = max.max(*v);
        }
        if !min.is_finite() {
            return None;
        }
        if floor_zero {
            min = min.min(0.0);
        }
        Some(Self { min, max, count })
    }

    fn x(&self, i: usize) -> f64 {
        let plot_width = WIDTH - 2.0 * PADDING;
        if self.count > 1 {
            PADDING + i as f64 * plot_width / (self.count - 1) as f64
        } else {
            WIDTH / 2.0
        }
    }

    fn y(&self, value: f64) -> f64 {
        let plot_height = HEIGHT - 2.0 * PADDING;
        let range = self.max - self.min;
        let scale = if range > 0.0 { plot_height / range } else { 1.0 };
        HEIGHT - PADDING - (value - self.min) * scale
    }
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn document(title: &str, body: &str, frame: &Frame, first: &str, last: &str) -> String {
    let title = xml_escape(title);
    format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w:.0}" height="{h:.0}" viewBox="0 0 {w:.0} {h:.0}">
<rect width="100%" height="100%" fill="white"/>
<text x="{cx:.0}" y="20" text-anchor="middle" font-family="sans-serif" font-size="14">{title}</text>
<line x1="{p:.0}" y1="{p:.0}" x2="{p:.0}" y2="{base:.0}" stroke="black"/>
<line x1="{p:.0}" y1="{base:.0}" x2="{right:.0}" y2="{base:.0}" stroke="black"/>
<text x="{p:.0}" y="{label:.0}" font-family="sans-serif" font-size="10">{first}</text>
<text x="{right:.0}" y="{label:.0}" text-anchor="end" font-family="sans-serif" font-size="10">{last}</text>
<text x="4" y="{top:.0}" font-family="sans-serif" font-size="10">{max:.2}</text>
<text x="4" y="{base:.0}" font-family="sans-serif" font-size="10">{min:.2}</text>
{body}</svg>
"##,
        w = WIDTH,
        h = HEIGHT,
        cx = WIDTH / 2.0,
        p = PADDING,
        base = HEIGHT - PADDING,
        right = WIDTH - PADDING,
        label = HEIGHT - PADDING / 2.0,
        top = PADDING + 4.0,
        max = frame.max,
        min = frame.min,
    )
}

/// One polyline per unbroken run of present values.
fn polylines(frame: &Frame, values: &[Option<f64>], color: &str) -> String {
    let mut out = String::new();
    let mut run: Vec<String> = Vec::new();
    let flush = |run: &mut Vec<String>, out: &mut String| {
        if !run.is_empty() {
            out.push_str(&format!(
                "<polyline fill=\"none\" stroke=\"{}\" stroke-width=\"1.5\" points=\"{}\"/>\n",
                color,
                run.join(" ")
            ));
            run.clear();
        }
    };
    for (i, v) in values.iter().enumerate() {
        match v {
            Some(v) => run.push(format!("{:.1},{:.1}", frame.x(i), frame.y(*v))),
            None => flush(&mut run, &mut out),
        }
    }
    flush(&mut run, &mut out);
    out
}

fn date_bounds(rows: &[AnalysisRow]) -> (String, String) {
    let fmt = |r: Option<&AnalysisRow>| r.map(|r| r.date().to_string()).unwrap_or_default();
    (fmt(rows.first()), fmt(rows.last()))
}

pub fn close_chart(symbol: &str, rows: &[AnalysisRow]) -> Option<String> {
    let closes: Vec<Option<f64>> = rows.iter().map(|r| r.record.close).collect();
    let frame = Frame::new(closes.iter(), rows.len(), false)?;
    let (first, last) = date_bounds(rows);
    let body = polylines(&frame, &closes, "steelblue");
    Some(document(&format!("{symbol} close price"), &body, &frame, &first, &last))
}

pub fn volume_chart(symbol: &str, rows: &[AnalysisRow]) -> Option<String> {
    let volumes: Vec<Option<f64>> = rows
        .iter()
        .map(|r| r.record.volume.map(|v| v as f64))
        .collect();
    let frame = Frame::new(volumes.iter(), rows.len(), true)?;
    let (first, last) = date_bounds(rows);

    let plot_width = WIDTH - 2.0 * PADDING;
    let bar_width = (plot_width / rows.len().max(1) as f64 * 0.8).max(1.0);
    let mut body = String::new();
    for (i, v) in volumes.iter().enumerate() {
        if let Some(v) = v {
            let top = frame.y(*v);
            body.push_str(&format!(
                "<rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" fill=\"darkorange\"/>\n",
                frame.x(i) - bar_width / 2.0,
                top,
                bar_width,
                (HEIGHT - PADDING - top).max(0.0),
            ));
        }
    }
    Some(document(&format!("{symbol} traded volume"), &body, &frame, &first, &last))
}

pub fn open_close_chart(symbol: &str, rows: &[AnalysisRow]) -> Option<String> {
    let opens: Vec<Option<f64>> = rows.iter().map(|r| r.record.open).collect();
    let closes: Vec<Option<f64>> = rows.iter().map(|r| r.record.close).collect();
    let frame = Frame::new(opens.iter().chain(closes.iter()), rows.len(), false)?;
    let (first, last) = date_bounds(rows);
    let mut body = polylines(&frame, &opens, "seagreen");
    body.push_str(&polylines(&frame, &closes, "crimson"));
    Some(document(&format!("{symbol} open vs close"), &body, &frame, &first, &last))
}

/// Writes `<SYMBOL>_close.svg`, `<SYMBOL>_volume.svg` and `<SYMBOL>_open_close.svg`
/// into the output directory.
pub struct SvgChartReport {
    pub last_n: usize,
}

impl SvgChartReport {
    pub fn chart_paths(symbol: &str, dir: &Path) -> [PathBuf; 3] {
        [
            dir.join(format!("{symbol}_close.svg")),
            dir.join(format!("{symbol}_volume.svg")),
            dir.join(format!("{symbol}_open_close.svg")),
        ]
    }
}

impl ReportPort for SvgChartReport {
    fn write(&self, symbol: &str, view: &[AnalysisRow], output: &Path) -> Result<(), SyncError> {
        let recent = &view[view.len().saturating_sub(self.last_n)..];
        fs::create_dir_all(output)?;

        let [close_path, volume_path, open_close_path] = Self::chart_paths(symbol, output);
        let charts = [
            (close_path, close_chart(symbol, recent)),
            (volume_path, volume_chart(symbol, recent)),
            (open_close_path, open_close_chart(symbol, recent)),
        ];
        for (path, svg) in charts {
            match svg {
                Some(svg) => {
                    fs::write(&path, svg)?;
                    tracing::info!(path = %path.display(), "chart written");
                }
                None => tracing::warn!(path = %path.display(), "no values to chart, skipped"),
            }
        }
        Ok(())
    }
}
