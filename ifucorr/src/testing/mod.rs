//! Synthetic data for tests.

#![allow(dead_code)]

use common::buffer2::Buffer2;

use crate::cube::{Cube, CubeDims};
use crate::geometry::RotationAngle;
use crate::zone::{ZoneId, ZoneMap, NUM_UNITS, SUBUNITS_PER_UNIT};

/// Initialize a tracing subscriber for tests. Safe to call repeatedly.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// 64-bit linear congruential generator, seeded per test for reproducible noise.
#[derive(Debug, Clone)]
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed.wrapping_add(0x9e3779b97f4a7c15))
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f32(&mut self) -> f32 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.0 >> 33) as f32 / (1u64 << 31) as f32
    }

    /// Approximately normal with zero mean and unit variance (Irwin-Hall).
    pub fn next_gaussian(&mut self) -> f32 {
        (0..12).map(|_| self.next_f32()).sum::<f32>() - 6.0
    }
}

/// Flat image at `level` with Gaussian noise of `sigma`.
pub fn noise_image(width: usize, height: usize, level: f32, sigma: f32, seed: u64) -> Buffer2<f32> {
    let mut rng = Lcg::new(seed);
    Buffer2::from_fn(width, height, |_, _| level + sigma * rng.next_gaussian())
}

/// Add a circular Gaussian profile.
pub fn add_gaussian_source(image: &mut Buffer2<f32>, cx: f32, cy: f32, amplitude: f32, sigma: f32) {
    let inv = 1.0 / (2.0 * sigma * sigma);
    for y in 0..image.height() {
        for x in 0..image.width() {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            image[(x, y)] += amplitude * (-(dx * dx + dy * dy) * inv).exp();
        }
    }
}

/// Synthetic focal plane: 24 units on a 6×4 grid of blocks, each split into
/// four strips. Strips run along y at 0/180/360 degrees and along x at
/// 90/270. A `border` of unassigned pixels surrounds the field.
#[derive(Debug, Clone, Copy)]
pub struct ZoneLayout {
    /// Strip width across the strip direction.
    pub strip: usize,
    /// Unit extent along the strip direction.
    pub length: usize,
    pub border: usize,
    pub rotation: RotationAngle,
}

impl Default for ZoneLayout {
    fn default() -> Self {
        Self {
            strip: 4,
            length: 12,
            border: 2,
            rotation: RotationAngle::Deg0,
        }
    }
}

const UNITS_ACROSS: usize = 6;
const UNITS_DOWN: usize = 4;

impl ZoneLayout {
    fn block(&self) -> (usize, usize) {
        let across = self.strip * SUBUNITS_PER_UNIT as usize;
        if self.rotation.swaps_axes() {
            (self.length, across)
        } else {
            (across, self.length)
        }
    }

    pub fn width(&self) -> usize {
        self.block().0 * UNITS_ACROSS + 2 * self.border
    }

    pub fn height(&self) -> usize {
        self.block().1 * UNITS_DOWN + 2 * self.border
    }

    /// Zone at a pixel, `None` in the border.
    pub fn zone_at(&self, x: usize, y: usize) -> Option<ZoneId> {
        let (bw, bh) = self.block();
        let fx = x.checked_sub(self.border)?;
        let fy = y.checked_sub(self.border)?;
        if fx >= bw * UNITS_ACROSS || fy >= bh * UNITS_DOWN {
            return None;
        }
        let unit = (fy / bh) * UNITS_ACROSS + fx / bw + 1;
        let along = if self.rotation.swaps_axes() {
            fy % bh
        } else {
            fx % bw
        };
        let subunit = along / self.strip + 1;
        ZoneId::new(unit as u32, subunit as u32).ok()
    }

    pub fn zone_map(&self) -> ZoneMap {
        let values = Buffer2::from_fn(self.width(), self.height(), |x, y| {
            self.zone_at(x, y).map_or(0.0, |z| z.code() as f32)
        });
        ZoneMap::from_codes(values).unwrap()
    }
}

/// Cube on `layout` with `flux(x, y, w, zone)` and constant variance.
pub fn synthetic_cube(
    layout: &ZoneLayout,
    nwave: usize,
    variance: f32,
    mut flux: impl FnMut(usize, usize, usize, Option<ZoneId>) -> f32,
) -> Cube {
    let dims = CubeDims::new(layout.width(), layout.height(), nwave);
    let mut data = Vec::with_capacity(dims.len());
    for w in 0..nwave {
        for y in 0..dims.ny {
            for x in 0..dims.nx {
                data.push(flux(x, y, w, layout.zone_at(x, y)));
            }
        }
    }
    Cube::new(dims, data, vec![variance; dims.len()], layout.rotation).unwrap()
}

/// Per-unit median of finite flux at plane `w` over the unit's pixels.
pub fn unit_plane_median(cube: &Cube, zones: &ZoneMap, unit: u8, w: usize) -> Option<f32> {
    let plane = cube.flux_plane(w);
    let mut scratch = Vec::new();
    crate::math::finite_median(
        zones.unit_pixels(unit).into_iter().map(|i| plane[i]),
        &mut scratch,
    )
}

pub fn all_units() -> impl Iterator<Item = u8> {
    1..=NUM_UNITS
}
