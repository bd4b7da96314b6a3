//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::chart_svg::{SvgChartReport, DEFAULT_CHART_DAYS};
use crate::adapters::console_report::{format_summary, format_table};
use crate::adapters::csv_export::CsvExport;
use crate::adapters::csv_source::CsvSource;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config_validation::{validate_sync_config, validate_windows};
use crate::domain::derived::{build_derived_view, AnalysisRow, DEFAULT_PRECISION};
use crate::domain::error::SyncError;
use crate::domain::reconcile::{
    ReconciliationEngine, SyncConfig, SyncReport, DEFAULT_BOOTSTRAP_DAYS, DEFAULT_OVERLAP_DAYS,
};
use crate::domain::summary::LatestSummary;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_source::DataSource;
use crate::ports::report_port::ReportPort;
use crate::ports::series_store::{RangeQuery, SeriesStore};

#[derive(Parser, Debug)]
#[command(name = "dailysync", about = "Incremental daily OHLCV synchronizer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch new and revised rows and commit them to the store
    Sync {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
        /// Last date to synchronize (defaults to today)
        #[arg(long)]
        as_of: Option<NaiveDate>,
        /// Also write SVG charts into this directory
        #[arg(long)]
        chart_dir: Option<PathBuf>,
    },
    /// Show the stored date range for a symbol
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Print the derived view as a table
    Show {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long, default_value_t = 20)]
        last: usize,
    },
    /// Export the derived view to CSV
    Export {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Render SVG charts of recent sessions
    Chart {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        last: Option<usize>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match execute(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn execute(command: Command) -> Result<(), SyncError> {
    match command {
        Command::Sync {
            config,
            symbol,
            as_of,
            chart_dir,
        } => run_sync(&config, symbol.as_deref(), as_of, chart_dir.as_deref()),
        Command::Info { config, symbol } => run_info(&config, symbol.as_deref()),
        Command::Show {
            config,
            symbol,
            last,
        } => run_show(&config, symbol.as_deref(), last),
        Command::Export {
            config,
            symbol,
            output,
            from,
            to,
        } => run_export(&config, symbol.as_deref(), &output, from, to),
        Command::Chart {
            config,
            symbol,
            output,
            last,
        } => run_chart(&config, symbol.as_deref(), &output, last),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, SyncError> {
    let adapter = FileConfigAdapter::from_file(path)?;
    validate_sync_config(&adapter)?;
    Ok(adapter)
}

pub fn build_sync_config(config: &dyn ConfigPort) -> Result<SyncConfig, SyncError> {
    validate_windows(config)?;
    Ok(SyncConfig {
        bootstrap_days: config.get_int("sync", "bootstrap_days", DEFAULT_BOOTSTRAP_DAYS),
        overlap_days: config.get_int("sync", "overlap_days", DEFAULT_OVERLAP_DAYS),
    })
}

/// `--symbol` wins over `[sync] symbol`. Symbols are stored upper-case.
pub fn resolve_symbol(symbol_override: Option<&str>, config: &dyn ConfigPort) -> Result<String, SyncError> {
    let raw = match symbol_override {
        Some(s) => s.to_string(),
        None => config
            .get_string("sync", "symbol")
            .ok_or_else(|| SyncError::ConfigMissing {
                section: "sync".into(),
                key: "symbol".into(),
            })?,
    };

    let symbol = raw.trim().to_uppercase();
    if symbol.is_empty() || symbol.chars().any(char::is_whitespace) {
        return Err(SyncError::InvalidSymbol { symbol: raw });
    }
    Ok(symbol)
}

pub fn derived_precision(config: &dyn ConfigPort) -> u32 {
    config
        .get_int("derived", "precision", DEFAULT_PRECISION as i64)
        .clamp(0, 8) as u32
}

pub fn chart_days(config: &dyn ConfigPort) -> usize {
    config
        .get_int("report", "chart_days", DEFAULT_CHART_DAYS as i64)
        .max(1) as usize
}

pub fn build_source(config: &dyn ConfigPort) -> Result<Box<dyn DataSource>, SyncError> {
    let name = config
        .get_string("sync", "source")
        .unwrap_or_else(|| "vci".to_string())
        .trim()
        .to_lowercase();

    match name.as_str() {
        "csv" => {
            let dir = config
                .get_string("csv", "dir")
                .ok_or_else(|| SyncError::ConfigMissing {
                    section: "csv".into(),
                    key: "dir".into(),
                })?;
            Ok(Box::new(CsvSource::new(PathBuf::from(dir))))
        }
        #[cfg(feature = "vci")]
        "vci" => {
            let source = crate::adapters::vci_source::VciSource::from_config(config)?;
            Ok(Box::new(source))
        }
        other => Err(SyncError::ConfigInvalid {
            section: "sync".into(),
            key: "source".into(),
            reason: format!("source '{other}' is not available in this build"),
        }),
    }
}

/// Postgres when `[postgres] connection_string` is set and the feature is on,
/// otherwise the SQLite file named by `[sqlite] path`.
pub fn open_store(config: &dyn ConfigPort, symbol: &str) -> Result<Box<dyn SeriesStore>, SyncError> {
    #[cfg(feature = "postgres")]
    {
        if config.get_string("postgres", "connection_string").is_some() {
            let store = crate::adapters::postgres_store::PostgresSeriesStore::from_config(config, symbol)?;
            return Ok(Box::new(store));
        }
    }

    #[cfg(feature = "sqlite")]
    {
        let store = crate::adapters::sqlite_store::SqliteSeriesStore::from_config(config, symbol)?;
        Ok(Box::new(store))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (config, symbol);
        Err(SyncError::ConfigInvalid {
            section: "sqlite".into(),
            key: "path".into(),
            reason: "sqlite feature is required without [postgres] connection_string".into(),
        })
    }
}

/// Derived view of the stored rows matched by `query`.
pub fn load_view(
    store: &dyn SeriesStore,
    query: &RangeQuery,
    precision: u32,
) -> Result<Vec<AnalysisRow>, SyncError> {
    let records = store.range_query(query)?;
    Ok(build_derived_view(&records, precision))
}

pub fn format_report(report: &SyncReport) -> String {
    let mut line = format!(
        "{}: {} {} | fetched {}, deleted {}, wrote {}",
        report.symbol,
        report.mode,
        report.window,
        report.fetched,
        report.rows_deleted,
        report.rows_written
    );
    if report.dropped > 0 {
        line.push_str(&format!(" ({} rows dropped)", report.dropped));
    }
    line
}

fn run_sync(
    config_path: &Path,
    symbol_override: Option<&str>,
    as_of: Option<NaiveDate>,
    chart_dir: Option<&Path>,
) -> Result<(), SyncError> {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;
    let sync_config = build_sync_config(&adapter)?;
    let symbol = resolve_symbol(symbol_override, &adapter)?;
    let as_of = as_of.unwrap_or_else(|| chrono::Local::now().date_naive());

    let source = build_source(&adapter)?;
    let store = open_store(&adapter, &symbol)?;

    let engine = ReconciliationEngine::new(store.as_ref(), source.as_ref(), sync_config);
    let report = engine.sync(&symbol, as_of)?;
    eprintln!("{}", format_report(&report));

    let precision = derived_precision(&adapter);
    let recent = load_view(store.as_ref(), &RangeQuery::last(2), precision)?;
    match LatestSummary::from_view(&recent) {
        Some(summary) => println!("{}", format_summary(&symbol, &summary)),
        None => eprintln!("{symbol}: store is empty"),
    }

    if let Some(dir) = chart_dir {
        let last_n = chart_days(&adapter);
        let view = load_view(store.as_ref(), &RangeQuery::last(last_n.saturating_add(1)), precision)?;
        SvgChartReport { last_n }.write(&symbol, &view, dir)?;
        eprintln!("Charts written to: {}", dir.display());
    }

    Ok(())
}

fn run_info(config_path: &Path, symbol_override: Option<&str>) -> Result<(), SyncError> {
    let adapter = load_config(config_path)?;
    let symbol = resolve_symbol(symbol_override, &adapter)?;
    let store = open_store(&adapter, &symbol)?;

    match store.data_range()? {
        Some((first, last, count)) => {
            println!("{symbol}: {first} to {last} ({count} rows)");
        }
        None => eprintln!("{symbol}: no data found"),
    }
    Ok(())
}

fn run_show(config_path: &Path, symbol_override: Option<&str>, last: usize) -> Result<(), SyncError> {
    let adapter = load_config(config_path)?;
    let symbol = resolve_symbol(symbol_override, &adapter)?;
    let store = open_store(&adapter, &symbol)?;

    // One extra row so the first shown row still has its previous close.
    let view = load_view(
        store.as_ref(),
        &RangeQuery::last(last.saturating_add(1)),
        derived_precision(&adapter),
    )?;
    let shown = &view[view.len().saturating_sub(last)..];
    if shown.is_empty() {
        eprintln!("{symbol}: no data found");
        return Ok(());
    }
    print!("{}", format_table(shown));
    Ok(())
}

fn run_export(
    config_path: &Path,
    symbol_override: Option<&str>,
    output: &Path,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<(), SyncError> {
    let adapter = load_config(config_path)?;
    let symbol = resolve_symbol(symbol_override, &adapter)?;
    let store = open_store(&adapter, &symbol)?;

    // Build from the start of the series so the first exported row keeps its change.
    let query = RangeQuery {
        to,
        ..RangeQuery::all()
    };
    let view = load_view(store.as_ref(), &query, derived_precision(&adapter))?;
    let rows: Vec<AnalysisRow> = view
        .into_iter()
        .filter(|row| from.is_none_or(|from| row.date() >= from))
        .collect();

    CsvExport.write(&symbol, &rows, output)?;
    eprintln!("Exported {} rows to: {}", rows.len(), output.display());
    Ok(())
}

fn run_chart(
    config_path: &Path,
    symbol_override: Option<&str>,
    output: &Path,
    last: Option<usize>,
) -> Result<(), SyncError> {
    let adapter = load_config(config_path)?;
    let symbol = resolve_symbol(symbol_override, &adapter)?;
    let store = open_store(&adapter, &symbol)?;

    let last_n = last.unwrap_or_else(|| chart_days(&adapter)).max(1);
    let view = load_view(
        store.as_ref(),
        &RangeQuery::last(last_n.saturating_add(1)),
        derived_precision(&adapter),
    )?;
    SvgChartReport { last_n }.write(&symbol, &view, output)?;
    eprintln!("Charts written to: {}", output.display());
    Ok(())
}
