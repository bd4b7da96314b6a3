//! Concrete adapter implementations for ports.

pub mod chart_svg;
pub mod console_report;
pub mod csv_export;
pub mod csv_source;
pub mod file_config_adapter;
#[cfg(feature = "postgres")]
pub mod postgres_store;
#[cfg(feature = "sqlite")]
pub mod sqlite_store;
#[cfg(feature = "vci")]
pub mod vci_source;
