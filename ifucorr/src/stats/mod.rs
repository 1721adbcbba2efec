//! Per-zone robust statistics feeding the two correction passes.
//!
//! The Unit pass collapses the cube into wavelength bins and takes, per bin,
//! the median of each Unit's unmasked native pixels. The Subunit pass works
//! on the white-light image and compares every Subunit against one global
//! reference median.

#[cfg(test)]
mod tests;

use common::buffer2::Buffer2;
use rayon::prelude::*;

use crate::cube::{check_spatial_shape, Cube, CubeDims};
use crate::error::{DataIncomplete, Error, Result};
use crate::math::finite_median;
use crate::source_mask::SourceMask;
use crate::zone::{ZoneId, ZoneMap, NUM_UNITS, SUBUNITS_PER_UNIT};

/// Dense table of correction values. Undefined cells hold NaN.
///
/// Unit pass tables are `[bin, unit]` (one row per bin, one column per unit);
/// Subunit pass tables are `[unit, subunit]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionTable {
    cells: Buffer2<f32>,
}

impl CorrectionTable {
    pub fn undefined(rows: usize, cols: usize) -> Self {
        Self {
            cells: Buffer2::new_filled(cols, rows, f32::NAN),
        }
    }

    /// Wrap raw cells as read back from disk. Non-finite or negative cells
    /// are treated as undefined.
    pub fn from_cells(cells: Buffer2<f32>) -> Self {
        let mut cells = cells;
        for v in cells.iter_mut() {
            if !(v.is_finite() && *v >= 0.0) {
                *v = f32::NAN;
            }
        }
        Self { cells }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.cells.height()
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cells.width()
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        let v = self.cells[(col, row)];
        (!v.is_nan()).then_some(v)
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: Option<f32>) {
        self.cells[(col, row)] = value.unwrap_or(f32::NAN);
    }

    /// Defined values of one row.
    pub fn row_values(&self, row: usize) -> impl Iterator<Item = f32> + '_ {
        self.cells.row(row).iter().copied().filter(|v| !v.is_nan())
    }

    pub fn defined_count(&self) -> usize {
        self.cells.iter().filter(|v| !v.is_nan()).count()
    }

    /// Raw cells, NaN where undefined.
    #[inline]
    pub fn cells(&self) -> &Buffer2<f32> {
        &self.cells
    }
}

/// Binned per-unit medians of the Unit pass.
#[derive(Debug, Clone)]
pub struct UnitBinStats {
    /// `[bin, unit]` medians.
    pub table: CorrectionTable,
    pub bin_width: usize,
    pub gaps: Vec<DataIncomplete>,
}

impl UnitBinStats {
    #[inline]
    pub fn nbins(&self) -> usize {
        self.table.rows()
    }

    /// Center plane of `bin`.
    #[inline]
    pub fn bin_center(&self, bin: usize) -> f64 {
        bin_center(bin, self.bin_width)
    }
}

#[inline]
pub fn bin_center(bin: usize, bin_width: usize) -> f64 {
    (bin * bin_width) as f64 + bin_width as f64 / 2.0
}

/// Per-subunit white-light corrections of the Subunit pass.
#[derive(Debug, Clone)]
pub struct SubunitStats {
    /// `[unit, subunit]` factors `reference / zone_median`.
    pub table: CorrectionTable,
    /// Global reference median, `None` if no pixel was eligible.
    pub reference: Option<f32>,
    pub gaps: Vec<DataIncomplete>,
}

/// Robust zone statistics.
#[derive(Debug, Clone, Copy)]
pub struct ZoneStatEstimator {
    bin_width: usize,
}

impl ZoneStatEstimator {
    pub fn new(bin_width: usize) -> Result<Self> {
        if bin_width == 0 {
            return Err(Error::InvalidConfig(
                "bin_width must be at least 1".to_string(),
            ));
        }
        Ok(Self { bin_width })
    }

    #[inline]
    pub fn bin_width(&self) -> usize {
        self.bin_width
    }

    /// Unit pass: one median per (bin, unit).
    ///
    /// Eligible pixels are native pixels of any subunit of the unit that pass
    /// the source mask. Planes past the last full bin feed no bin.
    pub fn unit_bins(&self, cube: &Cube, zones: &ZoneMap, mask: &SourceMask) -> Result<UnitBinStats> {
        let dims = cube.dims();
        check_spatial_shape("zone map", dims, zones.width(), zones.height())?;
        check_spatial_shape("source mask", dims, mask.width(), mask.height())?;

        let eligible = unit_eligible_pixels(zones, mask);
        let width = self.bin_width;
        let nbins = dims.nwave / width;

        let rows: Vec<Vec<Option<f32>>> = (0..nbins)
            .into_par_iter()
            .map_init(Vec::new, |scratch, bin| {
                let image = cube.collapse(bin * width, (bin + 1) * width, width as f32);
                eligible
                    .iter()
                    .map(|pixels| finite_median(pixels.iter().map(|&i| image[i]), scratch))
                    .collect()
            })
            .collect();

        let mut table = CorrectionTable::undefined(nbins, NUM_UNITS as usize);
        let mut gaps = Vec::new();
        for (bin, row) in rows.into_iter().enumerate() {
            for (col, value) in row.into_iter().enumerate() {
                if value.is_none() {
                    gaps.push(DataIncomplete::EmptyUnitBin {
                        unit: col as u8 + 1,
                        bin,
                    });
                }
                table.set(bin, col, value);
            }
        }

        tracing::debug!(
            nbins,
            bin_width = width,
            defined = table.defined_count(),
            "Unit bin statistics"
        );

        Ok(UnitBinStats {
            table,
            bin_width: width,
            gaps,
        })
    }

    /// Subunit pass: `reference / median` per zone on a white-light image.
    ///
    /// The reference is the median over every unmasked pixel with a defined
    /// zone; each zone median uses unmasked native pixels of that zone.
    pub fn subunit_white(
        white: &Buffer2<f32>,
        zones: &ZoneMap,
        mask: &SourceMask,
    ) -> Result<SubunitStats> {
        let plane = CubeDims::new(white.width(), white.height(), 1);
        check_spatial_shape("zone map", plane, zones.width(), zones.height())?;
        check_spatial_shape("source mask", plane, mask.width(), mask.height())?;

        let mut scratch = Vec::new();
        let reference = finite_median(
            (0..white.len())
                .filter(|&i| mask.passes(i) && zones.is_defined_idx(i))
                .map(|i| white[i]),
            &mut scratch,
        );

        let mut zone_pixels: Vec<Vec<usize>> =
            vec![Vec::new(); NUM_UNITS as usize * SUBUNITS_PER_UNIT as usize];
        for idx in 0..white.len() {
            if !mask.passes(idx) {
                continue;
            }
            if let Some(zone) = zones.zone_at_idx(idx) {
                zone_pixels[zone_slot(zone)].push(idx);
            }
        }

        let mut table = CorrectionTable::undefined(NUM_UNITS as usize, SUBUNITS_PER_UNIT as usize);
        let mut gaps = Vec::new();

        if let Some(r) = reference.filter(|&r| r <= 0.0) {
            gaps.push(DataIncomplete::NonPositiveReference { median: r });
        }

        for zone in ZoneId::all() {
            let (unit, subunit) = (zone.unit(), zone.subunit());
            let median = finite_median(
                zone_pixels[zone_slot(zone)].iter().map(|&i| white[i]),
                &mut scratch,
            );
            let factor = match (median, reference) {
                (None, _) | (_, None) => {
                    gaps.push(DataIncomplete::EmptySubunit { unit, subunit });
                    None
                }
                (Some(m), _) if m <= 0.0 => {
                    gaps.push(DataIncomplete::NonPositiveSubunitMedian {
                        unit,
                        subunit,
                        median: m,
                    });
                    None
                }
                (Some(m), Some(r)) => Some(r / m).filter(|f| f.is_finite() && *f > 0.0),
            };
            table.set(unit as usize - 1, subunit as usize - 1, factor);
        }

        tracing::debug!(
            reference = reference.unwrap_or(f32::NAN),
            defined = table.defined_count(),
            "Subunit white-light statistics"
        );

        Ok(SubunitStats {
            table,
            reference,
            gaps,
        })
    }
}

#[inline]
fn zone_slot(zone: ZoneId) -> usize {
    (zone.unit() as usize - 1) * SUBUNITS_PER_UNIT as usize + zone.subunit() as usize - 1
}

/// Unmasked native pixels of each unit, indexed by `unit - 1`.
fn unit_eligible_pixels(zones: &ZoneMap, mask: &SourceMask) -> Vec<Vec<usize>> {
    let mut pixels = vec![Vec::new(); NUM_UNITS as usize];
    for idx in 0..zones.values().len() {
        if !mask.passes(idx) {
            continue;
        }
        if let Some(zone) = zones.zone_at_idx(idx) {
            pixels[zone.unit() as usize - 1].push(idx);
        }
    }
    pixels
}
