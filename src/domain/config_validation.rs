//! Configuration validation.
//!
//! Validates every config field the sync pipeline reads before any I/O happens.

use crate::domain::error::SyncError;
use crate::domain::reconcile::{DEFAULT_BOOTSTRAP_DAYS, DEFAULT_OVERLAP_DAYS};
use crate::ports::config_port::ConfigPort;

/// Data sources selectable with `[sync] source`.
pub const KNOWN_SOURCES: &[&str] = &["vci", "csv"];

pub const MAX_PRECISION: i64 = 8;

/// Upper bound for `bootstrap_days` (about a century of history).
pub const MAX_BOOTSTRAP_DAYS: i64 = 36_500;

pub fn validate_sync_config(config: &dyn ConfigPort) -> Result<(), SyncError> {
    validate_windows(config)?;
    validate_source(config)?;
    validate_precision(config)?;
    validate_chart_days(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: &str) -> SyncError {
    SyncError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

pub fn validate_windows(config: &dyn ConfigPort) -> Result<(), SyncError> {
    let bootstrap = config.get_int("sync", "bootstrap_days", DEFAULT_BOOTSTRAP_DAYS);
    if bootstrap <= 0 {
        return Err(invalid(
            "sync",
            "bootstrap_days",
            "bootstrap_days must be positive",
        ));
    }
    if bootstrap > MAX_BOOTSTRAP_DAYS {
        return Err(invalid(
            "sync",
            "bootstrap_days",
            &format!("bootstrap_days must not exceed {MAX_BOOTSTRAP_DAYS}"),
        ));
    }
    let overlap = config.get_int("sync", "overlap_days", DEFAULT_OVERLAP_DAYS);
    if overlap < 0 {
        return Err(invalid(
            "sync",
            "overlap_days",
            "overlap_days must be non-negative",
        ));
    }
    if overlap >= bootstrap {
        return Err(invalid(
            "sync",
            "overlap_days",
            "overlap_days must be smaller than bootstrap_days",
        ));
    }
    Ok(())
}

fn validate_source(config: &dyn ConfigPort) -> Result<(), SyncError> {
    let source = config
        .get_string("sync", "source")
        .unwrap_or_else(|| "vci".to_string());
    let source = source.trim().to_lowercase();
    if !KNOWN_SOURCES.contains(&source.as_str()) {
        return Err(invalid(
            "sync",
            "source",
            &format!("unknown source '{}', expected one of: {}", source, KNOWN_SOURCES.join(", ")),
        ));
    }
    if source == "csv" && config.get_string("csv", "dir").is_none() {
        return Err(SyncError::ConfigMissing {
            section: "csv".to_string(),
            key: "dir".to_string(),
        });
    }
    Ok(())
}

fn validate_precision(config: &dyn ConfigPort) -> Result<(), SyncError> {
    let value = config.get_int("derived", "precision", 2);
    if !(0..=MAX_PRECISION).contains(&value) {
        return Err(invalid(
            "derived",
            "precision",
            "precision must be between 0 and 8",
        ));
    }
    Ok(())
}

fn validate_chart_days(config: &dyn ConfigPort) -> Result<(), SyncError> {
    let value = config.get_int("report", "chart_days", 180);
    if value <= 0 {
        return Err(invalid(
            "report",
            "chart_days",
            "chart_days must be positive",
        ));
    }
    Ok(())
}
