//! Flux and variance cube.


use common::buffer2::Buffer2;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::geometry::RotationAngle;

/// Cube shape: `nwave` planes of `ny` rows by `nx` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CubeDims {
    pub nx: usize,
    pub ny: usize,
    pub nwave: usize,
}

impl CubeDims {
    pub const fn new(nx: usize, ny: usize, nwave: usize) -> Self {
        Self { nx, ny, nwave }
    }

    #[inline]
    pub fn plane_len(&self) -> usize {
        self.nx * self.ny
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.plane_len() * self.nwave
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// FITS axis order, slowest first.
    pub fn shape(&self) -> Vec<usize> {
        vec![self.nwave, self.ny, self.nx]
    }
}

/// Reduced data cube. Stored plane by plane: `w * ny * nx + y * nx + x`.
///
/// Missing samples are NaN. Stages take a `Cube` by value and hand it back.
#[derive(Debug, Clone, PartialEq)]
pub struct Cube {
    dims: CubeDims,
    flux: Vec<f32>,
    variance: Vec<f32>,
    rotation: RotationAngle,
}

impl Cube {
    pub fn new(
        dims: CubeDims,
        flux: Vec<f32>,
        variance: Vec<f32>,
        rotation: RotationAngle,
    ) -> Result<Self> {
        for (what, len) in [("flux", flux.len()), ("variance", variance.len())] {
            if len != dims.len() {
                return Err(Error::ShapeMismatch {
                    what,
                    expected: dims.shape(),
                    actual: vec![len],
                });
            }
        }
        Ok(Self {
            dims,
            flux,
            variance,
            rotation,
        })
    }

    #[inline]
    pub fn dims(&self) -> CubeDims {
        self.dims
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.dims.nx
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.dims.ny
    }

    #[inline]
    pub fn nwave(&self) -> usize {
        self.dims.nwave
    }

    #[inline]
    pub fn rotation(&self) -> RotationAngle {
        self.rotation
    }

    #[inline]
    pub fn flux(&self) -> &[f32] {
        &self.flux
    }

    #[inline]
    pub fn variance(&self) -> &[f32] {
        &self.variance
    }

    #[inline]
    pub fn flux_plane(&self, w: usize) -> &[f32] {
        let n = self.dims.plane_len();
        &self.flux[w * n..(w + 1) * n]
    }

    #[inline]
    pub fn flux_plane_mut(&mut self, w: usize) -> &mut [f32] {
        let n = self.dims.plane_len();
        &mut self.flux[w * n..(w + 1) * n]
    }

    #[inline]
    pub fn variance_plane(&self, w: usize) -> &[f32] {
        let n = self.dims.plane_len();
        &self.variance[w * n..(w + 1) * n]
    }

    /// Flux and variance planes in parallel, paired with their plane index.
    pub fn par_planes_mut(
        &mut self,
    ) -> impl IndexedParallelIterator<Item = (usize, (&mut [f32], &mut [f32]))> + '_ {
        let n = self.dims.plane_len().max(1);
        self.flux
            .par_chunks_mut(n)
            .zip(self.variance.par_chunks_mut(n))
            .enumerate()
    }

    /// Flux planes in parallel, paired with their plane index.
    pub fn par_flux_planes_mut(
        &mut self,
    ) -> impl IndexedParallelIterator<Item = (usize, &mut [f32])> + '_ {
        let n = self.dims.plane_len().max(1);
        self.flux.par_chunks_mut(n).enumerate()
    }

    /// Scale the whole cube, variance by the square.
    pub fn scale(&mut self, factor: f32) {
        let factor_sq = factor * factor;
        self.flux.iter_mut().for_each(|v| *v *= factor);
        self.variance.iter_mut().for_each(|v| *v *= factor_sq);
    }

    /// Mean over planes `[start, end)` of each spatial pixel, NaN counted as
    /// zero, divided by `divisor`.
    pub fn collapse(&self, start: usize, end: usize, divisor: f32) -> Buffer2<f32> {
        let n = self.dims.plane_len();
        let mut sum = vec![0.0f64; n];
        for w in start..end.min(self.dims.nwave) {
            for (acc, &v) in sum.iter_mut().zip(self.flux_plane(w)) {
                if !v.is_nan() {
                    *acc += v as f64;
                }
            }
        }
        let pixels = sum.into_iter().map(|s| (s / divisor as f64) as f32).collect();
        Buffer2::new(self.dims.nx, self.dims.ny, pixels)
    }

    /// White-light image: NaN-skipping sum over all planes divided by `nwave`.
    pub fn white_image(&self) -> Buffer2<f32> {
        self.collapse(0, self.dims.nwave, self.dims.nwave as f32)
    }
}

/// Check that a 2D product is aligned with the cube's spatial grid.
pub fn check_spatial_shape(
    what: &'static str,
    dims: CubeDims,
    width: usize,
    height: usize,
) -> Result<()> {
    if width != dims.nx || height != dims.ny {
        return Err(Error::ShapeMismatch {
            what,
            expected: vec![dims.ny, dims.nx],
            actual: vec![height, width],
        });
    }
    Ok(())
}
