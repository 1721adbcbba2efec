//! Per-unit additive sky subtraction.

#[cfg(test)]
mod tests;

use common::buffer2::Buffer2;
use rayon::prelude::*;

use crate::cube::{check_spatial_shape, Cube};
use crate::error::Result;
use crate::math::finite_median;
use crate::zone::{ZoneMap, NUM_UNITS};

/// Sky levels removed from a cube.
#[derive(Debug, Clone, PartialEq)]
pub struct SkyReport {
    /// `[plane, unit]` levels, NaN where the plane had no finite flux.
    pub levels: Buffer2<f32>,
    /// (plane, unit) pairs skipped for lack of finite flux.
    pub skipped: usize,
}

impl SkyReport {
    #[inline]
    pub fn level(&self, w: usize, unit: u8) -> Option<f32> {
        let v = self.levels[(unit as usize - 1, w)];
        (!v.is_nan()).then_some(v)
    }
}

/// Subtracts, for every unit and plane, the median flux of the unit's pixels.
///
/// Sources are not masked. Variance and pixels outside every unit are left
/// untouched.
#[derive(Debug, Clone)]
pub struct SkySubtractor {
    unit_pixels: Vec<Vec<usize>>,
    width: usize,
    height: usize,
}

impl SkySubtractor {
    pub fn new(zones: &ZoneMap) -> Self {
        let mut unit_pixels = vec![Vec::new(); NUM_UNITS as usize];
        for (idx, unit) in zones.unit_index().iter().enumerate() {
            if let Some(unit) = unit {
                unit_pixels[*unit as usize - 1].push(idx);
            }
        }
        Self {
            unit_pixels,
            width: zones.width(),
            height: zones.height(),
        }
    }

    pub fn subtract(&self, mut cube: Cube) -> Result<(Cube, SkyReport)> {
        check_spatial_shape("zone map", cube.dims(), self.width, self.height)?;

        let rows: Vec<Vec<f32>> = cube
            .par_flux_planes_mut()
            .map_init(Vec::new, |scratch, (_, flux)| {
                self.unit_pixels
                    .iter()
                    .map(|pixels| {
                        let Some(level) = finite_median(pixels.iter().map(|&i| flux[i]), scratch)
                        else {
                            return f32::NAN;
                        };
                        for &i in pixels {
                            flux[i] -= level;
                        }
                        level
                    })
                    .collect()
            })
            .collect();

        let nwave = rows.len();
        let levels = Buffer2::new(NUM_UNITS as usize, nwave, rows.into_iter().flatten().collect());
        let skipped = levels.iter().filter(|v| v.is_nan()).count();
        if skipped > 0 {
            tracing::debug!(skipped, "Sky planes without finite flux");
        }
        tracing::info!(planes = nwave, "Sky subtracted");

        Ok((cube, SkyReport { levels, skipped }))
    }
}
