use chrono::NaiveDateTime;
use shared::{GeometryType, SchemaError};
use std::path::PathBuf;
use thiserror::Error;

/// Failure while normalizing the raw rows of one dataset.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Column '{column}' is missing from the raw data")]
    MissingColumn { column: String },

    #[error("Forecast interval must be at least one hour")]
    InvalidInterval,

    #[error("Forecast window ends before it starts ({first} > {last})")]
    InvalidForecastWindow {
        first: NaiveDateTime,
        last: NaiveDateTime,
    },

    #[error("Column '{column}' does not hold a forecast sequence")]
    NotASequence { column: String },

    #[error("Column '{column}' holds {found} values, forecast horizon expects {expected}")]
    ForecastHorizonMismatch {
        column: String,
        expected: usize,
        found: usize,
    },
}

/// Failure while building a feature collection from normalized rows.
#[derive(Debug, Error)]
pub enum AssembleError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Point coordinates 'x' and/or 'y' are missing")]
    MissingGeometryFields,

    #[error("Geometry type is not '{expected}', but '{found}'")]
    GeometryTypeMismatch {
        expected: GeometryType,
        found: String,
    },

    #[error("Invalid geometry: {message}")]
    InvalidGeometry { message: String },

    #[error("Property '{column}' is missing")]
    MissingProperty { column: String },
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot I/O failed for '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode snapshot: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Failed to decode snapshot '{}': {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: rmp_serde::decode::Error,
    },
}

impl SnapshotError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SnapshotError::Io {
            path: path.into(),
            source,
        }
    }
}
