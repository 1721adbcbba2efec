//! Correction parameters.
//!
//! A single [`Config`] carries every tunable of both passes and the sky step.
//! It is loadable from YAML or JSON, and its JSON serialization feeds the
//! stage fingerprints, so any parameter change invalidates cached artifacts.

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Default width of a wavelength bin for the Unit pass, in planes.
pub const DEFAULT_BIN_WIDTH: usize = 100;

/// Default header keyword holding the instrument rotator angle.
pub const DEFAULT_ROTATION_KEY: &str = "ESO INS DROT POSANG";

/// Pixel connectivity for source segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// Edge neighbours only.
    Four,
    /// Edge and corner neighbours.
    #[default]
    Eight,
}

/// Source detection parameters for one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    /// Detection threshold in units of the global background rms.
    pub threshold_sigma: f32,
    /// Components smaller than this are discarded.
    pub min_area: usize,
    /// Components larger than this are reclassified as background.
    pub max_area: Option<usize>,
    /// Background mesh size in pixels.
    pub tile_size: usize,
    /// Clipping threshold for per-tile statistics.
    pub clip_sigma: f32,
    pub clip_iterations: usize,
    pub connectivity: Connectivity,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self::unit_pass()
    }
}

impl MaskConfig {
    /// Tight threshold used before the wavelength-binned Unit pass.
    pub fn unit_pass() -> Self {
        Self {
            threshold_sigma: 3.0,
            min_area: 10,
            max_area: None,
            tile_size: 64,
            clip_sigma: 3.0,
            clip_iterations: 3,
            connectivity: Connectivity::Eight,
        }
    }

    /// Looser threshold for the Subunit pass. Very extended components are
    /// illumination residuals rather than sources.
    pub fn subunit_pass() -> Self {
        Self {
            threshold_sigma: 5.0,
            max_area: Some(900),
            ..Self::unit_pass()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.threshold_sigma.is_finite() && self.threshold_sigma > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "threshold_sigma must be positive, got {}",
                self.threshold_sigma
            )));
        }
        if self.tile_size < 8 {
            return Err(Error::InvalidConfig(format!(
                "tile_size must be at least 8, got {}",
                self.tile_size
            )));
        }
        if !(self.clip_sigma.is_finite() && self.clip_sigma > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "clip_sigma must be positive, got {}",
                self.clip_sigma
            )));
        }
        if self.clip_iterations == 0 {
            return Err(Error::InvalidConfig(
                "clip_iterations must be at least 1".to_string(),
            ));
        }
        if let Some(max_area) = self.max_area {
            if max_area < self.min_area {
                return Err(Error::InvalidConfig(format!(
                    "max_area {max_area} is below min_area {}",
                    self.min_area
                )));
            }
        }
        Ok(())
    }
}

/// A `MaskConfig` section as written in a file: absent fields keep the value
/// of the pass preset it is merged onto.
#[derive(Debug, Deserialize)]
struct MaskSection {
    threshold_sigma: Option<f32>,
    min_area: Option<usize>,
    /// `Some(None)` is an explicit `null`, which disables the limit.
    #[serde(default, deserialize_with = "present")]
    max_area: Option<Option<usize>>,
    tile_size: Option<usize>,
    clip_sigma: Option<f32>,
    clip_iterations: Option<usize>,
    connectivity: Option<Connectivity>,
}

impl MaskSection {
    fn merge_onto(self, preset: MaskConfig) -> MaskConfig {
        MaskConfig {
            threshold_sigma: self.threshold_sigma.unwrap_or(preset.threshold_sigma),
            min_area: self.min_area.unwrap_or(preset.min_area),
            max_area: self.max_area.unwrap_or(preset.max_area),
            tile_size: self.tile_size.unwrap_or(preset.tile_size),
            clip_sigma: self.clip_sigma.unwrap_or(preset.clip_sigma),
            clip_iterations: self.clip_iterations.unwrap_or(preset.clip_iterations),
            connectivity: self.connectivity.unwrap_or(preset.connectivity),
        }
    }
}

fn present<'de, T, D>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

fn unit_mask_section<'de, D>(deserializer: D) -> std::result::Result<MaskConfig, D::Error>
where
    D: Deserializer<'de>,
{
    MaskSection::deserialize(deserializer).map(|s| s.merge_onto(MaskConfig::unit_pass()))
}

fn subunit_mask_section<'de, D>(deserializer: D) -> std::result::Result<MaskConfig, D::Error>
where
    D: Deserializer<'de>,
{
    MaskSection::deserialize(deserializer).map(|s| s.merge_onto(MaskConfig::subunit_pass()))
}

/// FITS layout of the input cube.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CubeLayout {
    /// Primary header keyword with the rotator angle in degrees.
    pub rotation_key: String,
    /// Extension holding flux.
    pub flux_hdu: String,
    /// Extension holding variance.
    pub variance_hdu: String,
}

impl Default for CubeLayout {
    fn default() -> Self {
        Self {
            rotation_key: DEFAULT_ROTATION_KEY.to_string(),
            flux_hdu: "DATA".to_string(),
            variance_hdu: "STAT".to_string(),
        }
    }
}

/// Full parameter set of the correction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Wavelength planes per bin in the Unit pass.
    pub bin_width: usize,
    /// Partial sections are completed from [`MaskConfig::unit_pass`].
    #[serde(deserialize_with = "unit_mask_section")]
    pub unit_mask: MaskConfig,
    /// Partial sections are completed from [`MaskConfig::subunit_pass`].
    #[serde(deserialize_with = "subunit_mask_section")]
    pub subunit_mask: MaskConfig,
    /// Inset of the diagnostic interior mask along the subunit axis.
    pub edge_inset: usize,
    pub layout: CubeLayout,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bin_width: DEFAULT_BIN_WIDTH,
            unit_mask: MaskConfig::unit_pass(),
            subunit_mask: MaskConfig::subunit_pass(),
            edge_inset: 2,
            layout: CubeLayout::default(),
        }
    }
}

impl Config {
    /// Load from a `.yaml`/`.yml`/`.json` file. Missing fields take defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let format = common::FileFormat::from_path(path)?;
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = common::deserialize(&text, format)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bin_width == 0 {
            return Err(Error::InvalidConfig(
                "bin_width must be at least 1".to_string(),
            ));
        }
        if self.layout.rotation_key.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "rotation_key must not be empty".to_string(),
            ));
        }
        if self.layout.flux_hdu == self.layout.variance_hdu {
            return Err(Error::InvalidConfig(format!(
                "flux and variance extensions must differ, both are '{}'",
                self.layout.flux_hdu
            )));
        }
        self.unit_mask.validate()?;
        self.subunit_mask.validate()
    }

    /// Reject a bin width that leaves the Unit pass without any bin.
    pub fn validate_for_planes(&self, nwave: usize) -> Result<()> {
        if nwave / self.bin_width == 0 {
            return Err(Error::InvalidConfig(format!(
                "bin_width {} exceeds the cube depth of {nwave} planes",
                self.bin_width
            )));
        }
        Ok(())
    }
}
