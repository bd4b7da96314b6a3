//! Core domain types and logic.

pub mod config_validation;
pub mod derived;
pub mod error;
pub mod reconcile;
pub mod record;
pub mod summary;
