//! Error types for the correction pipeline.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::zone::ZoneError;

/// Errors that abort processing of an exposure.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Unsupported rotation angle {angle} deg (expected 0, 90, 180, 270 or 360)")]
    UnsupportedRotation { angle: f64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Required input '{path}' does not exist")]
    ArtifactMissing { path: PathBuf },

    #[error("FITS error in '{path}': {source}")]
    Fits {
        path: PathBuf,
        #[source]
        source: fitsio::errors::Error,
    },

    #[error("FITS content error in '{path}': {message}")]
    FitsContent { path: PathBuf, message: String },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize parameters: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Zone(#[from] ZoneError),
}

impl Error {
    /// Configuration errors are fatal for the exposure and never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::UnsupportedRotation { .. } | Self::InvalidConfig(_))
    }

    pub(crate) fn fits(path: impl Into<PathBuf>, source: fitsio::errors::Error) -> Self {
        Self::Fits {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A recoverable gap in the statistics: a zone or bin without eligible pixels,
/// or a curve that could not be evaluated. The affected pixels keep factor 1.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataIncomplete {
    #[error("unit {unit} has no eligible pixels in bin {bin}")]
    EmptyUnitBin { unit: u8, bin: usize },
    #[error("unit {unit} has no defined bins, left uncorrected")]
    UnitWithoutBins { unit: u8 },
    #[error("subunit {unit}.{subunit} has no eligible pixels")]
    EmptySubunit { unit: u8, subunit: u8 },
    #[error("subunit {unit}.{subunit} median {median} is not positive")]
    NonPositiveSubunitMedian { unit: u8, subunit: u8, median: f32 },
    #[error("white-light reference median {median} is not positive")]
    NonPositiveReference { median: f32 },
    #[error("no valid pixels for renormalization, ratio set to 1")]
    NoRenormalizationPixels,
}
