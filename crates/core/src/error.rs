//! Error types for anomap

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for anomap operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Band count mismatch: expected {expected}, got {actual}")]
    BandCountMismatch { expected: usize, actual: usize },

    #[error("Band index {index} out of range for cube with {bands} bands")]
    BandOutOfRange { index: usize, bands: usize },

    #[error("Missing file: {0}")]
    MissingFile(PathBuf),

    #[error("Invalid ENVI header: {0}")]
    Header(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("No valid pixels in {0}")]
    NoValidPixels(&'static str),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Image encoding error: {0}")]
    Image(String),

    #[error("{0}")]
    Other(String),
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Image(e.to_string())
    }
}

/// Result type alias for anomap operations
pub type Result<T> = std::result::Result<T, Error>;
