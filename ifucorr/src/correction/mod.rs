//! Multiplicative flux correction with variance propagation.
//!
//! Every factor `F` applied to flux is applied as `F²` to variance.


use common::buffer2::Buffer2;
use rayon::prelude::*;

use crate::cube::{check_spatial_shape, Cube};
use crate::curves::CorrectionCurves;
use crate::error::{DataIncomplete, Error, Result};
use crate::geometry::{PixelRect, SubunitRegion};
use crate::math::finite_median;
use crate::source_mask::SourceMask;
use crate::stats::CorrectionTable;
use crate::zone::ZoneMap;

/// Result of the Unit-pass correction.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitPassOutcome {
    /// Global factor applied after the curves to restore the white-light level.
    pub renormalization: f32,
    /// Samples inside a unit band where the curve was not positive.
    pub uncorrected_samples: usize,
    pub gaps: Vec<DataIncomplete>,
}

/// Result of the Subunit-pass correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubunitPassOutcome {
    pub corrected_regions: usize,
    pub unchanged_regions: usize,
}

/// Divide each pixel by its blended unit curve, then renormalize.
///
/// The renormalization ratio is the median of `white_before / white_after`
/// over unmasked pixels with a defined zone. Without such pixels the ratio
/// is one.
pub fn apply_unit_pass(
    mut cube: Cube,
    zones: &ZoneMap,
    curves: &CorrectionCurves,
    mask: &SourceMask,
) -> Result<(Cube, UnitPassOutcome)> {
    let dims = cube.dims();
    check_spatial_shape("zone map", dims, zones.width(), zones.height())?;
    check_spatial_shape("source mask", dims, mask.width(), mask.height())?;

    let units = zones.unit_index();
    let values = zones.values();
    let before = cube.white_image();

    let uncorrected_samples: usize = cube
        .par_planes_mut()
        .map(|(w, (flux, variance))| {
            let plane = curves.plane(w);
            let mut skipped = 0;
            for idx in 0..flux.len() {
                let Some(unit) = units[idx] else {
                    continue;
                };
                let curve = plane.value_at(unit, values[idx]);
                if !(curve.is_finite() && curve > 0.0) {
                    skipped += 1;
                    continue;
                }
                let factor = (1.0 / curve) as f32;
                flux[idx] *= factor;
                variance[idx] *= factor * factor;
            }
            skipped
        })
        .sum();

    if uncorrected_samples > 0 {
        tracing::warn!(
            samples = uncorrected_samples,
            "Non-positive curve values, samples left uncorrected"
        );
    }

    let after = cube.white_image();
    let mut gaps = Vec::new();
    let renormalization = match renormalization_ratio(&before, &after, zones, mask) {
        Some(ratio) => ratio,
        None => {
            gaps.push(DataIncomplete::NoRenormalizationPixels);
            1.0
        }
    };
    cube.scale(renormalization);

    tracing::info!(renormalization, "Unit-pass correction applied");

    Ok((
        cube,
        UnitPassOutcome {
            renormalization,
            uncorrected_samples,
            gaps,
        },
    ))
}

/// Median of `before / after` over unmasked defined pixels with a finite ratio.
pub fn renormalization_ratio(
    before: &Buffer2<f32>,
    after: &Buffer2<f32>,
    zones: &ZoneMap,
    mask: &SourceMask,
) -> Option<f32> {
    let mut scratch = Vec::new();
    let ratios = (0..before.len())
        .filter(|&i| mask.passes(i) && zones.is_defined_idx(i))
        .map(|i| before[i] / after[i]);
    finite_median(ratios, &mut scratch).filter(|&r| r > 0.0)
}

/// Multiply each resolved rectangle by its `[unit, subunit]` table value.
///
/// Regions without a rectangle or with an undefined value are left as is.
pub fn apply_subunit_pass(
    mut cube: Cube,
    regions: &[SubunitRegion],
    table: &CorrectionTable,
) -> Result<(Cube, SubunitPassOutcome)> {
    let (width, height) = (cube.width(), cube.height());

    let mut factors: Vec<(PixelRect, f32)> = Vec::new();
    let mut unchanged_regions = 0;
    for region in regions {
        let value = table.get(region.zone.unit() as usize - 1, region.zone.subunit() as usize - 1);
        let (Some(rect), Some(factor)) = (&region.rect, value) else {
            unchanged_regions += 1;
            continue;
        };
        if rect.x.end > width || rect.y.end > height {
            return Err(Error::ShapeMismatch {
                what: "subunit region",
                expected: vec![height, width],
                actual: vec![rect.y.end, rect.x.end],
            });
        }
        factors.push((rect.clone(), factor));
    }

    cube.par_planes_mut().for_each(|(_, (flux, variance))| {
        for (rect, factor) in &factors {
            let factor_sq = factor * factor;
            for idx in rect.indices(width) {
                flux[idx] *= factor;
                variance[idx] *= factor_sq;
            }
        }
    });

    tracing::info!(
        corrected = factors.len(),
        unchanged = unchanged_regions,
        "Subunit-pass correction applied"
    );

    Ok((
        cube,
        SubunitPassOutcome {
            corrected_regions: factors.len(),
            unchanged_regions,
        },
    ))
}
