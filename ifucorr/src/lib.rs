//! ifucorr - Illumination correction for reconstructed IFS data cubes.
//!
//! The instrument splits its field into 24 Units of 4 Subunits each. Every
//! optical path leaves its own large-scale throughput signature on the
//! reconstructed cube. This crate removes it in two multiplicative passes
//! and then subtracts the residual sky per Unit:
//! - Unit pass: wavelength-binned per-unit medians, normalized and
//!   interpolated into curves
//! - Subunit pass: one white-light factor per strip, applied over
//!   rotation-aware rectangles
//! - Sky subtraction: per-unit, per-plane median
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use ifucorr::{Config, ExposureInputs, ExposurePipeline, ZoneSource};
//!
//! let pipeline = ExposurePipeline::new(Config::default(), "reduced/")?;
//! let report = pipeline.run(&ExposureInputs {
//!     exposure: "0001".into(),
//!     cube: "DATACUBE_0001.fits".into(),
//!     zones: ZoneSource::Image("ZONES_0001.fits".into()),
//!     reference: None,
//! })?;
//! println!("{} gaps", report.gap_count());
//! ```

pub mod config;
pub mod correction;
pub mod cube;
pub mod curves;
pub mod error;
pub mod fits;
pub mod geometry;
pub(crate) mod math;
pub mod pipeline;
pub mod sky;
pub mod source_mask;
pub mod stats;
pub mod zone;

#[cfg(test)]
pub mod testing;

// ============================================================================
// Data model
// ============================================================================

pub use cube::{Cube, CubeDims};
pub use geometry::{EdgeResolver, PixelRect, RotationAngle, SubunitRegion};
pub use source_mask::{MaskReport, SourceMask, SourceMasker};
pub use zone::{ProvenanceSample, SampleOrigin, ZoneError, ZoneId, ZoneMap, ZoneMapper};

// ============================================================================
// Statistics and correction
// ============================================================================

pub use correction::{apply_subunit_pass, apply_unit_pass, SubunitPassOutcome, UnitPassOutcome};
pub use curves::CorrectionCurves;
pub use sky::{SkyReport, SkySubtractor};
pub use stats::{CorrectionTable, SubunitStats, UnitBinStats, ZoneStatEstimator};

// ============================================================================
// Pipeline
// ============================================================================

pub use config::{Config, Connectivity, CubeLayout, MaskConfig};
pub use error::{DataIncomplete, Error, Result};
pub use pipeline::{
    correct, validate_exposures, Artifact, ArtifactPaths, ExposureInputs, ExposurePipeline,
    ExposureReport, Stage, StageReport, ZoneSource,
};
