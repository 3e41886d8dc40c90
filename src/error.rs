//! Error types for perflog-plot

use thiserror::Error;

/// Errors raised by the configuration model and the post-processing engine.
#[derive(Error, Debug)]
pub enum Error {
    /// One or more structural problems in a configuration document.
    #[error("invalid configuration: {}", .0.join("; "))]
    ConfigValidation(Vec<String>),

    /// A value could not be interpreted as the requested type.
    #[error("cannot interpret '{value}' as {type_name}: {reason}")]
    TypeCoercion {
        value: String,
        type_name: String,
        reason: String,
    },

    /// A type name outside `datetime`, `int`, `float`, `str`.
    #[error("unsupported type '{0}' (expected one of datetime, int, float, str)")]
    UnsupportedType(String),

    /// More than one scaling value remains after filtering.
    #[error("scaling column '{column}' has {candidates} candidate values; specify a series or x-axis value")]
    AmbiguousScaling { column: String, candidates: usize },

    /// The scaling column, series or x-axis value selects nothing.
    #[error("scaling value not found: {0}")]
    ScalingColumnNotFound(String),

    /// A configured column does not exist in the dataset.
    #[error("column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// The filters removed every row.
    #[error("filtered dataset is empty")]
    EmptySelection,

    /// More rows survived filtering than there are x values per series.
    #[error("unexpected number of rows ({rows}) does not match number of unique x-axis values per series ({expected})")]
    UnexpectedRowCount { rows: usize, expected: usize },

    /// A units column holds more than one distinct value.
    #[error("unexpected number of axis unit entries in '{column}': {found:?}")]
    AmbiguousUnits { column: String, found: Vec<String> },

    /// YAML (de)serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn coercion(value: impl ToString, type_name: impl ToString, reason: impl ToString) -> Self {
        Error::TypeCoercion {
            value: value.to_string(),
            type_name: type_name.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
