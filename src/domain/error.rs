//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for dailysync.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid symbol {symbol:?}: must be a non-empty identifier")]
    InvalidSymbol { symbol: String },

    #[error("as-of date {as_of} precedes stored data (latest stored date is {latest})")]
    InvalidRange { as_of: NaiveDate, latest: NaiveDate },

    #[error("fetch failed for {symbol}: {reason}")]
    Fetch { symbol: String, reason: String },

    #[error("no data returned for {symbol} between {start} and {end}")]
    NoData {
        symbol: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("duplicate key: a record for {date} already exists")]
    DuplicateKey { date: NaiveDate },

    #[error("commit failed, transaction rolled back: {reason}")]
    Commit { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Process exit status for this error category.
    pub fn exit_status(&self) -> u8 {
        match self {
            SyncError::Io(_) => 1,
            SyncError::ConfigParse { .. }
            | SyncError::ConfigMissing { .. }
            | SyncError::ConfigInvalid { .. } => 2,
            SyncError::Database { .. }
            | SyncError::DatabaseQuery { .. }
            | SyncError::DuplicateKey { .. }
            | SyncError::Commit { .. } => 3,
            SyncError::InvalidSymbol { .. } | SyncError::InvalidRange { .. } => 4,
            SyncError::Fetch { .. } | SyncError::NoData { .. } => 5,
        }
    }
}

impl From<&SyncError> for std::process::ExitCode {
    fn from(err: &SyncError) -> Self {
        std::process::ExitCode::from(err.exit_status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_range_message_names_both_dates() {
        let err = SyncError::InvalidRange {
            as_of: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            latest: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        };
        let msg = err.to_string();
        assert!(msg.contains("2024-01-01"));
        assert!(msg.contains("2024-03-01"));
    }

    #[test]
    fn exit_status_groups_by_category() {
        let config = SyncError::ConfigMissing {
            section: "sync".into(),
            key: "symbol".into(),
        };
        let commit = SyncError::Commit {
            reason: "disk full".into(),
        };
        let fetch = SyncError::Fetch {
            symbol: "FPT".into(),
            reason: "timeout".into(),
        };
        assert_eq!(config.exit_status(), 2);
        assert_eq!(commit.exit_status(), 3);
        assert_eq!(fetch.exit_status(), 5);
        assert_eq!(SyncError::DuplicateKey { date: NaiveDate::MIN }.exit_status(), 3);
    }
}
