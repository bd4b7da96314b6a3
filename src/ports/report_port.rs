//! Report output port.

use crate::domain::derived::AnalysisRow;
use crate::domain::error::SyncError;
use std::path::Path;

/// Port for writing a derived series somewhere outside the store.
pub trait ReportPort {
    fn write(&self, symbol: &str, view: &[AnalysisRow], output: &Path) -> Result<(), SyncError>;
}
