//! Port traits (hexagonal architecture boundaries).

pub mod config_port;
pub mod data_source;
pub mod report_port;
pub mod series_store;
