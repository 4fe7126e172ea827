//! Error types for the fatal conditions of an enrichment run.
//!
//! Missing coordinates, empty facility sets, non-numeric counter values,
//! exceeded distance caps and degenerate cluster inputs are not errors: they
//! are encoded in the outputs. Only malformed input tables and invalid
//! configuration reach this type.

use thiserror::Error;

/// Errors raised by configuration validation, table merges and CSV I/O.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// Two accident rows share an id, so results cannot be merged back by id.
    #[error("duplicate accident id '{id}' (rows {first} and {second})")]
    DuplicateAccidentId {
        id: String,
        first: usize,
        second: usize,
    },

    /// A configuration value is outside its valid range.
    #[error("invalid configuration: {field} = {value} ({reason})")]
    InvalidConfig {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    /// A protection zone row carries a label that maps to no category.
    #[error("unknown protection zone category '{label}' at row {row}")]
    UnknownZoneCategory { label: String, row: usize },

    #[cfg(feature = "csv")]
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, EnrichError>;

impl EnrichError {
    pub(crate) fn invalid(field: &'static str, value: impl ToString, reason: &'static str) -> Self {
        EnrichError::InvalidConfig {
            field,
            value: value.to_string(),
            reason,
        }
    }
}

/// Check that a distance parameter is finite and strictly positive.
pub(crate) fn ensure_positive(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(EnrichError::invalid(field, value, "must be finite and > 0"))
    }
}
