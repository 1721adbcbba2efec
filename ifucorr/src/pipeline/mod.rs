//! Per-exposure orchestration: load, correct in three stages, persist.
//!
//! ```text
//! cube + zones ─► Unit pass ─► Subunit pass ─► sky subtraction
//!                    │              │                │
//!                 ILLCORR_*_unit  ILLCORR_*_subunit  DATACUBE_*_SKYSUB
//! ```
//!
//! Each stage owns the cube while it runs and hands it on. Stage outputs
//! are keyed by a fingerprint chained from the inputs, so a rerun resumes
//! after the last stage whose artifacts are current.

pub mod artifacts;
pub mod cache;
pub mod report;


use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use common::buffer2::Buffer2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{Config, CubeLayout, MaskConfig};
use crate::correction::{apply_subunit_pass, apply_unit_pass, SubunitPassOutcome, UnitPassOutcome};
use crate::cube::{check_spatial_shape, Cube};
use crate::curves::CorrectionCurves;
use crate::error::{DataIncomplete, Error, Result};
use crate::fits;
use crate::geometry::{interior_mask, EdgeResolver, SubunitRegion};
use crate::sky::{SkyReport, SkySubtractor};
use crate::source_mask::{MaskReport, SourceMasker};
use crate::stats::{SubunitStats, UnitBinStats, ZoneStatEstimator};
use crate::zone::{ZoneMap, ZoneMapper};

pub use artifacts::{Artifact, ArtifactPaths, Stage};
pub use cache::Fingerprint;
pub use report::{ExposureReport, StageReport};

/// Where the zone map of an exposure comes from. Manifests spell it as a
/// one-key map, `zones: {image: path}` or `zones: {provenance: path}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneSource {
    /// Rasterized zone image, first 2D HDU.
    Image(PathBuf),
    /// Provenance table, mapped onto the cube grid.
    Provenance(PathBuf),
}

impl ZoneSource {
    pub fn path(&self) -> &Path {
        match self {
            ZoneSource::Image(path) | ZoneSource::Provenance(path) => path,
        }
    }
}

/// Explicit input paths of one exposure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureInputs {
    /// Identifier used in output file names.
    pub exposure: String,
    pub cube: PathBuf,
    #[serde(with = "serde_yml::with::singleton_map")]
    pub zones: ZoneSource,
    /// Broadband image for the first source mask. Defaults to the cube's
    /// white-light image.
    #[serde(default)]
    pub reference: Option<PathBuf>,
}

impl ExposureInputs {
    /// The exposure id becomes part of every artifact file name.
    pub fn validate(&self) -> Result<()> {
        let id = self.exposure.as_str();
        if id.trim().is_empty() {
            return Err(Error::InvalidConfig("exposure id must not be empty".to_string()));
        }
        if id.contains(['/', '\\', '\0']) || id == "." || id == ".." {
            return Err(Error::InvalidConfig(format!(
                "exposure id '{}' is not usable in a file name",
                id.escape_default()
            )));
        }
        Ok(())
    }
}

/// Reject exposure lists whose artifacts would collide on disk.
pub fn validate_exposures(exposures: &[ExposureInputs]) -> Result<()> {
    let mut seen = HashSet::new();
    for inputs in exposures {
        inputs.validate()?;
        if !seen.insert(inputs.exposure.as_str()) {
            return Err(Error::InvalidConfig(format!(
                "exposure id '{}' is listed more than once",
                inputs.exposure
            )));
        }
    }
    Ok(())
}

// ============================================================================
// In-memory stages
// ============================================================================

/// Products of the Unit pass.
#[derive(Debug)]
pub struct UnitPass {
    pub cube: Cube,
    pub stats: UnitBinStats,
    pub curves: CorrectionCurves,
    pub mask: MaskReport,
    pub outcome: UnitPassOutcome,
    /// Gaps of the statistics, the curve fit and the renormalization.
    pub gaps: Vec<DataIncomplete>,
}

impl UnitPass {
    /// Mask sources on `reference`, bin the cube per unit, fit the curves and
    /// divide them out.
    pub fn run(
        cube: Cube,
        zones: &ZoneMap,
        reference: &Buffer2<f32>,
        bin_width: usize,
        mask_config: &MaskConfig,
    ) -> Result<Self> {
        check_spatial_shape("reference image", cube.dims(), reference.width(), reference.height())?;

        let (mask, mask_report) = SourceMasker::new(mask_config.clone())?.detect(reference);
        let stats = ZoneStatEstimator::new(bin_width)?.unit_bins(&cube, zones, &mask)?;
        let (curves, curve_gaps) = CorrectionCurves::fit(&stats);
        let (cube, outcome) = apply_unit_pass(cube, zones, &curves, &mask)?;

        let mut gaps = stats.gaps.clone();
        gaps.extend(curve_gaps);
        gaps.extend(outcome.gaps.iter().cloned());

        Ok(Self {
            cube,
            stats,
            curves,
            mask: mask_report,
            outcome,
            gaps,
        })
    }

    fn report(&self) -> StageReport {
        StageReport {
            mask: Some(self.mask.clone()),
            gaps: self.gaps.clone(),
            renormalization: Some(self.outcome.renormalization),
            uncorrected_samples: self.outcome.uncorrected_samples,
            ..StageReport::new(Stage::Unit)
        }
    }
}

/// Products of the Subunit pass.
#[derive(Debug)]
pub struct SubunitPass {
    pub cube: Cube,
    pub stats: SubunitStats,
    pub regions: Vec<SubunitRegion>,
    pub mask: MaskReport,
    pub outcome: SubunitPassOutcome,
}

impl SubunitPass {
    /// Mask sources on the white-light image, compare every subunit against
    /// the global reference and scale the resolved strips.
    pub fn run(
        cube: Cube,
        zones: &ZoneMap,
        resolver: &EdgeResolver,
        mask_config: &MaskConfig,
    ) -> Result<Self> {
        let white = cube.white_image();
        let (mask, mask_report) = SourceMasker::new(mask_config.clone())?.detect(&white);
        let stats = ZoneStatEstimator::subunit_white(&white, zones, &mask)?;
        let regions = resolver.resolve(zones);
        let (cube, outcome) = apply_subunit_pass(cube, &regions, &stats.table)?;
        Ok(Self {
            cube,
            stats,
            regions,
            mask: mask_report,
            outcome,
        })
    }

    fn report(&self) -> StageReport {
        StageReport {
            mask: Some(self.mask.clone()),
            gaps: self.stats.gaps.clone(),
            ..StageReport::new(Stage::Subunit)
        }
    }
}

fn sky_report(sky: &SkyReport) -> StageReport {
    StageReport {
        sky_skipped: sky.skipped,
        ..StageReport::new(Stage::SkySub)
    }
}

/// Run all three stages in memory. Every gap is logged and kept in the
/// returned report.
pub fn correct(
    exposure: &str,
    cube: Cube,
    zones: &ZoneMap,
    reference: &Buffer2<f32>,
    config: &Config,
) -> Result<(Cube, ExposureReport)> {
    config.validate()?;
    config.validate_for_planes(cube.nwave())?;
    let resolver = EdgeResolver::new(cube.rotation(), config.edge_inset);
    let mut report = ExposureReport::new(exposure);

    let unit = UnitPass::run(cube, zones, reference, config.bin_width, &config.unit_mask)?;
    report.push(unit.report());
    let subunit = SubunitPass::run(unit.cube, zones, &resolver, &config.subunit_mask)?;
    report.push(subunit.report());
    let (cube, sky) = SkySubtractor::new(zones).subtract(subunit.cube)?;
    report.push(sky_report(&sky));

    Ok((cube, report))
}

// ============================================================================
// Persisted pipeline
// ============================================================================

#[derive(Serialize)]
struct UnitParams<'a> {
    bin_width: usize,
    mask: &'a MaskConfig,
    layout: &'a CubeLayout,
}

#[derive(Serialize)]
struct SubunitParams<'a> {
    mask: &'a MaskConfig,
    edge_inset: usize,
}

/// Runs exposures against one configuration and output directory.
#[derive(Debug, Clone)]
pub struct ExposurePipeline {
    config: Config,
    output_dir: PathBuf,
}

impl ExposurePipeline {
    pub fn new(config: Config, output_dir: impl Into<PathBuf>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            output_dir: output_dir.into(),
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Run several exposures in parallel. Results keep the input order.
    ///
    /// The list is checked up front: nothing runs if two exposures would
    /// write the same artifacts.
    pub fn run_all(&self, exposures: &[ExposureInputs]) -> Result<Vec<Result<ExposureReport>>> {
        validate_exposures(exposures)?;
        Ok(exposures.par_iter().map(|inputs| self.run(inputs)).collect())
    }

    /// Process one exposure, reusing current artifacts.
    pub fn run(&self, inputs: &ExposureInputs) -> Result<ExposureReport> {
        inputs.validate()?;
        let exposure = inputs.exposure.as_str();
        let span = tracing::info_span!("exposure", id = exposure);
        let _guard = span.enter();

        let paths = ArtifactPaths::new(&self.output_dir, exposure);
        let fingerprints = self.fingerprints(inputs)?;
        let mut report = ExposureReport::new(exposure);

        let resume = Stage::ALL
            .iter()
            .zip(&fingerprints)
            .rposition(|(&stage, fp)| cache::stage_is_current(&paths, stage, fp));

        let layout = &self.config.layout;
        let mut cube = match resume {
            Some(done) => {
                for &stage in &Stage::ALL[..=done] {
                    report.push(StageReport::reused(stage));
                }
                if done + 1 == Stage::ALL.len() {
                    return Ok(report);
                }
                fits::read_cube(&paths.path(Stage::ALL[done].cube()), layout)?
            }
            None => {
                tracing::info!(cube = %inputs.cube.display(), "Loading cube");
                fits::read_cube(&inputs.cube, layout)?
            }
        };

        self.config.validate_for_planes(cube.nwave())?;
        let zones = load_zones(&inputs.zones, &cube)?;
        let resolver = EdgeResolver::new(cube.rotation(), self.config.edge_inset);
        fs::create_dir_all(&self.output_dir).map_err(|e| Error::io(&self.output_dir, e))?;

        let start = resume.map_or(0, |done| done + 1);
        for (&stage, fp) in Stage::ALL.iter().zip(&fingerprints).skip(start) {
            let (next, stage_report) = match stage {
                Stage::Unit => self.unit_stage(cube, &zones, inputs, &paths, fp)?,
                Stage::Subunit => self.subunit_stage(cube, &zones, &resolver, &paths, fp)?,
                Stage::SkySub => self.sky_stage(cube, &zones, &paths, fp)?,
            };
            cube = next;
            report.push(stage_report);
        }
        Ok(report)
    }

    fn fingerprints(&self, inputs: &ExposureInputs) -> Result<[Fingerprint; 3]> {
        let exposure = inputs.exposure.as_str();
        let mut files: Vec<&Path> = vec![&inputs.cube, inputs.zones.path()];
        if let Some(reference) = &inputs.reference {
            files.push(reference);
        }
        let upstream = cache::input_fingerprint(exposure, &files)?;

        let config = &self.config;
        let unit = cache::stage_fingerprint(
            exposure,
            Stage::Unit,
            &UnitParams {
                bin_width: config.bin_width,
                mask: &config.unit_mask,
                layout: &config.layout,
            },
            &upstream,
        )?;
        let subunit = cache::stage_fingerprint(
            exposure,
            Stage::Subunit,
            &SubunitParams {
                mask: &config.subunit_mask,
                edge_inset: config.edge_inset,
            },
            &unit,
        )?;
        let sky = cache::stage_fingerprint(exposure, Stage::SkySub, &(), &subunit)?;
        Ok([unit, subunit, sky])
    }

    fn unit_stage(
        &self,
        cube: Cube,
        zones: &ZoneMap,
        inputs: &ExposureInputs,
        paths: &ArtifactPaths,
        fp: &Fingerprint,
    ) -> Result<(Cube, StageReport)> {
        let reference = match &inputs.reference {
            Some(path) => fits::read_image(path)?,
            None => {
                tracing::debug!("No reference image, masking on the cube's white light");
                cube.white_image()
            }
        };
        let pass = UnitPass::run(
            cube,
            zones,
            &reference,
            self.config.bin_width,
            &self.config.unit_mask,
        )?;
        let white = pass.cube.white_image();
        let layout = &self.config.layout;

        write(paths, Artifact::UnitTable, fp, |tmp| {
            fits::write_images(tmp, &[("ILLCORR", pass.stats.table.cells())])
        })?;
        write(paths, Artifact::UnitCurves, fp, |tmp| {
            fits::write_images(
                tmp,
                &[
                    ("NORMALIZED", pass.curves.normalized().cells()),
                    ("SMOOTHED", pass.curves.smoothed().cells()),
                ],
            )
        })?;
        write(paths, Artifact::UnitImage, fp, |tmp| {
            fits::write_images(tmp, &[("WHITE", &white)])
        })?;
        write(paths, Artifact::UnitCube, fp, |tmp| {
            fits::write_cube(tmp, &pass.cube, layout)
        })?;

        let report = pass.report();
        Ok((pass.cube, report))
    }

    fn subunit_stage(
        &self,
        cube: Cube,
        zones: &ZoneMap,
        resolver: &EdgeResolver,
        paths: &ArtifactPaths,
        fp: &Fingerprint,
    ) -> Result<(Cube, StageReport)> {
        let pass = SubunitPass::run(cube, zones, resolver, &self.config.subunit_mask)?;
        let white = pass.cube.white_image();
        let edges = interior_mask(&pass.regions, zones.width(), zones.height());
        let layout = &self.config.layout;

        write(paths, Artifact::SubunitTable, fp, |tmp| {
            fits::write_images(tmp, &[("ILLCORR", pass.stats.table.cells())])
        })?;
        write(paths, Artifact::NativeMask, fp, |tmp| {
            fits::write_mask(tmp, "NATIVE", &zones.native_mask())
        })?;
        write(paths, Artifact::EdgeMask, fp, |tmp| {
            fits::write_mask(tmp, "EDGES", &edges)
        })?;
        write(paths, Artifact::SubunitImage, fp, |tmp| {
            fits::write_images(tmp, &[("WHITE", &white)])
        })?;
        write(paths, Artifact::SubunitCube, fp, |tmp| {
            fits::write_cube(tmp, &pass.cube, layout)
        })?;

        let report = pass.report();
        Ok((pass.cube, report))
    }

    fn sky_stage(
        &self,
        cube: Cube,
        zones: &ZoneMap,
        paths: &ArtifactPaths,
        fp: &Fingerprint,
    ) -> Result<(Cube, StageReport)> {
        let (cube, sky) = SkySubtractor::new(zones).subtract(cube)?;
        let white = cube.white_image();

        write(paths, Artifact::SkySubImage, fp, |tmp| {
            fits::write_images(tmp, &[("WHITE", &white)])
        })?;
        write(paths, Artifact::SkySubCube, fp, |tmp| {
            fits::write_cube(tmp, &cube, &self.config.layout)
        })?;

        Ok((cube, sky_report(&sky)))
    }
}

fn write(
    paths: &ArtifactPaths,
    artifact: Artifact,
    fp: &Fingerprint,
    f: impl FnOnce(&Path) -> Result<()>,
) -> Result<()> {
    cache::write_artifact(&paths.path(artifact), fp, f)
}

/// Zone map on the cube's spatial grid.
pub fn load_zones(source: &ZoneSource, cube: &Cube) -> Result<ZoneMap> {
    let dims = cube.dims();
    match source {
        ZoneSource::Image(path) => {
            let image = fits::read_image(path)?;
            check_spatial_shape("zone map", dims, image.width(), image.height())?;
            Ok(ZoneMap::from_codes(image)?)
        }
        ZoneSource::Provenance(path) => {
            let samples = fits::read_provenance(path, fits::PROVENANCE_EXTNAME)?;
            tracing::debug!(samples = samples.len(), "Mapping provenance samples");
            Ok(ZoneMapper::new(dims.nx, dims.ny).map(&samples)?)
        }
    }
}
