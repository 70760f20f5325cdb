/// Error types for dataset loading and the statistical routines
use thiserror::Error;

/// Errors raised while loading reviews or computing test statistics
#[derive(Debug, Error)]
pub enum ImrError {
    /// An expected column is absent from the CSV header
    #[error("Missing expected column: {0}")]
    MissingColumn(String),

    /// A determination value that is neither upheld nor overturned
    #[error("Unknown determination '{value}' at row {row}")]
    UnknownDetermination { row: usize, value: String },

    /// A file with a header but no review rows
    #[error("Dataset contains no reviews")]
    EmptyDataset,

    /// A column that has no usable values at all
    #[error("Column {0} has no values to compute a median from")]
    EmptyColumn(String),

    /// A sample with no observations
    #[error("Sample '{0}' is empty")]
    EmptySample(&'static str),

    /// A sample too small for a variance estimate
    #[error("Sample '{name}' needs at least {required} observations, found {found}")]
    InsufficientSamples {
        name: &'static str,
        required: usize,
        found: usize,
    },

    /// Both groups are constant, so the test statistic is undefined
    #[error("Standard error is zero; the groups have no variance")]
    ZeroStandardError,

    /// A significance level outside the supported set
    #[error("Unsupported significance level {0} (expected 0.05, 0.02 or 0.01)")]
    UnknownSignificanceLevel(f64),

    /// A grouping field name that does not match any categorical column
    #[error("Unknown review field: {0}")]
    UnknownField(String),

    /// Distribution parameters rejected by statrs
    #[error("Invalid distribution parameters: {0}")]
    Distribution(String),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias for the core routines
pub type ImrResult<T> = Result<T, ImrError>;
