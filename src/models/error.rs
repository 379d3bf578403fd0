//! Errors raised while loading or evaluating a model bundle.
//!
//! These never leave the forecast layer as-is: the adapter turns them into
//! `AppError::model` with the city and family attached.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// The bundle file could not be read or is not JSON.
    #[error("failed to read bundle: {0}")]
    Unreadable(String),

    /// An entry lacks a field its family requires.
    #[error("{path}: missing field `{field}`")]
    MissingField { path: String, field: String },

    /// An entry is present but malformed.
    #[error("{path}: {message}")]
    InvalidEntry { path: String, message: String },

    /// No entry at all for the requested market and city.
    #[error("no model for {market} / {city}")]
    MissingEntry { market: String, city: String },

    /// The entry exists but not for this family.
    #[error("{family} is not available for {key} (available: {available})")]
    UnsupportedFamily {
        family: String,
        key: String,
        available: String,
    },

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("empty history")]
    EmptyData,

    /// Numerical trouble during prediction (non-finite output and the like).
    #[error("computation error: {0}")]
    ComputationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_entry() {
        let err = ModelError::MissingField {
            path: "locacao/recife/prophet".into(),
            field: "k".into(),
        };
        assert_eq!(err.to_string(), "locacao/recife/prophet: missing field `k`");

        let err = ModelError::DimensionMismatch { expected: 3, got: 2 };
        assert_eq!(err.to_string(), "dimension mismatch: expected 3, got 2");
    }
}
