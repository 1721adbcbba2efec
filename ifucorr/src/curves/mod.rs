//! Unit-pass illumination curves.
//!
//! Binned unit medians are normalized bin by bin to a median of one across
//! units, then interpolated linearly along wavelength per unit. Evaluation at
//! a pixel blends the curves of neighbouring units by the pixel's zone value.

#[cfg(test)]
mod tests;

use crate::error::DataIncomplete;
use crate::math::{finite_median, LinearInterpolant};
use crate::stats::{bin_center, CorrectionTable, UnitBinStats};
use crate::zone::{unit_base, NUM_UNITS, UNIT_STRIDE};

/// Divide each bin by the median of its defined unit values.
///
/// Bins without any defined value, or with a non-positive median, stay
/// undefined.
pub fn normalize(table: &CorrectionTable) -> CorrectionTable {
    let mut normalized = CorrectionTable::undefined(table.rows(), table.cols());
    let mut scratch = Vec::new();
    for row in 0..table.rows() {
        let Some(median) = finite_median(table.row_values(row), &mut scratch) else {
            continue;
        };
        if median <= 0.0 {
            continue;
        }
        for col in 0..table.cols() {
            normalized.set(row, col, table.get(row, col).map(|v| v / median));
        }
    }
    normalized
}

/// Per-unit correction curves over wavelength planes.
#[derive(Debug, Clone)]
pub struct CorrectionCurves {
    bin_width: usize,
    normalized: CorrectionTable,
    smoothed: CorrectionTable,
    interpolants: Vec<LinearInterpolant>,
}

impl CorrectionCurves {
    /// Normalize the binned statistics and fit one interpolant per unit.
    ///
    /// Undefined bins are skipped. A unit without any defined bin gets a
    /// constant curve of one and is reported.
    pub fn fit(stats: &UnitBinStats) -> (Self, Vec<DataIncomplete>) {
        let normalized = normalize(&stats.table);
        let nbins = normalized.rows();
        let mut gaps = Vec::new();

        let interpolants: Vec<LinearInterpolant> = (0..NUM_UNITS as usize)
            .map(|col| {
                let knots = (0..nbins).filter_map(|bin| {
                    normalized
                        .get(bin, col)
                        .map(|v| (bin_center(bin, stats.bin_width), v as f64))
                });
                LinearInterpolant::new(knots).unwrap_or_else(|| {
                    let unit = col as u8 + 1;
                    tracing::warn!(unit, "No defined bins, unit left uncorrected");
                    gaps.push(DataIncomplete::UnitWithoutBins { unit });
                    LinearInterpolant::constant(1.0)
                })
            })
            .collect();

        let mut smoothed = CorrectionTable::undefined(nbins, NUM_UNITS as usize);
        for bin in 0..nbins {
            let center = bin_center(bin, stats.bin_width);
            for (col, curve) in interpolants.iter().enumerate() {
                smoothed.set(bin, col, Some(curve.eval(center) as f32));
            }
        }

        let curves = Self {
            bin_width: stats.bin_width,
            normalized,
            smoothed,
            interpolants,
        };
        (curves, gaps)
    }

    #[inline]
    pub fn bin_width(&self) -> usize {
        self.bin_width
    }

    /// `[bin, unit]` values normalized to a median of one per bin.
    #[inline]
    pub fn normalized(&self) -> &CorrectionTable {
        &self.normalized
    }

    /// Curves sampled at the bin centers, undefined bins filled in.
    #[inline]
    pub fn smoothed(&self) -> &CorrectionTable {
        &self.smoothed
    }

    /// Curve of `unit` (1-based) at plane `w`.
    #[inline]
    pub fn unit_curve(&self, unit: u8, w: usize) -> f64 {
        self.interpolants[unit as usize - 1].eval(w as f64)
    }

    /// All unit curves at plane `w`, indexed by `unit - 1`.
    pub fn plane(&self, w: usize) -> PlaneCurves {
        let mut values = [0.0; NUM_UNITS as usize];
        for (v, curve) in values.iter_mut().zip(&self.interpolants) {
            *v = curve.eval(w as f64);
        }
        PlaneCurves { values }
    }
}

/// Unit curves evaluated at one wavelength plane.
#[derive(Debug, Clone, Copy)]
pub struct PlaneCurves {
    values: [f64; NUM_UNITS as usize],
}

impl PlaneCurves {
    /// Curve value at a pixel of `unit` carrying zone value `value`.
    ///
    /// Below the last unit the value blends linearly towards the next unit
    /// over the code band: `c_i + (c_{i+1} - c_i) / 100 * (value - 100 i)`.
    /// The last unit uses its own curve.
    #[inline]
    pub fn value_at(&self, unit: u8, value: f32) -> f64 {
        let i = unit as usize - 1;
        let c = self.values[i];
        if unit >= NUM_UNITS {
            return c;
        }
        let next = self.values[i + 1];
        let offset = (value - unit_base(unit)) as f64;
        c + (next - c) / UNIT_STRIDE as f64 * offset
    }
}
