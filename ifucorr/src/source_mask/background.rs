//! Smooth background model on a tile mesh.
//!
//! Each tile gets a sigma-clipped median and MAD sigma of its finite pixels.
//! Tile values are median-filtered over 3×3 neighbourhoods and bilinearly
//! interpolated between tile centers.

use common::buffer2::Buffer2;
use rayon::prelude::*;

use crate::math::{median_f32_mut, sigma_clipped_median_mad};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct TileStats {
    median: f32,
    sigma: f32,
}

/// Background level per pixel plus the global rms.
#[derive(Debug)]
pub struct Background {
    level: Buffer2<f32>,
    global_rms: f32,
}

impl Background {
    /// Estimate the background of `image`. Non-finite pixels are ignored.
    pub fn estimate(
        image: &Buffer2<f32>,
        tile_size: usize,
        clip_sigma: f32,
        clip_iterations: usize,
    ) -> Self {
        let grid = TileGrid::new(image, tile_size, clip_sigma, clip_iterations);
        let global_rms = grid.mean_sigma();
        Self {
            level: grid.interpolate(),
            global_rms,
        }
    }

    #[inline]
    pub fn level(&self) -> &Buffer2<f32> {
        &self.level
    }

    /// Mean of the tile sigmas.
    #[inline]
    pub fn global_rms(&self) -> f32 {
        self.global_rms
    }

    /// `image - background`.
    pub fn subtract_from(&self, image: &Buffer2<f32>) -> Buffer2<f32> {
        Buffer2::new(
            image.width(),
            image.height(),
            image
                .iter()
                .zip(self.level.iter())
                .map(|(&v, &b)| v - b)
                .collect(),
        )
    }
}

#[derive(Debug)]
struct TileGrid {
    stats: Buffer2<TileStats>,
    tile_size: usize,
    width: usize,
    height: usize,
}

impl TileGrid {
    fn new(image: &Buffer2<f32>, tile_size: usize, clip_sigma: f32, clip_iterations: usize) -> Self {
        let width = image.width();
        let height = image.height();
        let tiles_x = width.div_ceil(tile_size).max(1);
        let tiles_y = height.div_ceil(tile_size).max(1);

        let raw: Vec<Option<TileStats>> = (0..tiles_x * tiles_y)
            .into_par_iter()
            .map_init(
                || (Vec::new(), Vec::new()),
                |(values, deviations), idx| {
                    let tx = idx % tiles_x;
                    let ty = idx / tiles_x;
                    let x_range = tx * tile_size..((tx + 1) * tile_size).min(width);
                    let y_range = ty * tile_size..((ty + 1) * tile_size).min(height);

                    values.clear();
                    for y in y_range {
                        values.extend(
                            image.row(y)[x_range.clone()]
                                .iter()
                                .copied()
                                .filter(|v| v.is_finite()),
                        );
                    }
                    if values.is_empty() {
                        return None;
                    }
                    let (median, sigma) =
                        sigma_clipped_median_mad(values, deviations, clip_sigma, clip_iterations);
                    Some(TileStats { median, sigma })
                },
            )
            .collect();

        let mut grid = Self {
            stats: Buffer2::new(tiles_x, tiles_y, fill_empty_tiles(raw)),
            tile_size,
            width,
            height,
        };
        grid.apply_median_filter();
        grid
    }

    #[inline]
    fn tiles_x(&self) -> usize {
        self.stats.width()
    }

    #[inline]
    fn tiles_y(&self) -> usize {
        self.stats.height()
    }

    fn center(&self, t: usize, extent: usize) -> f32 {
        let start = t * self.tile_size;
        let end = (start + self.tile_size).min(extent);
        (start + end) as f32 * 0.5
    }

    fn mean_sigma(&self) -> f32 {
        let sum: f64 = self.stats.iter().map(|s| s.sigma as f64).sum();
        (sum / self.stats.len() as f64) as f32
    }

    fn apply_median_filter(&mut self) {
        let tiles_x = self.tiles_x();
        let tiles_y = self.tiles_y();
        if tiles_x * tiles_y < 2 {
            return;
        }

        let src = &self.stats;
        let filtered = Buffer2::from_fn(tiles_x, tiles_y, |tx, ty| {
            let mut medians = [0.0f32; 9];
            let mut sigmas = [0.0f32; 9];
            let mut count = 0;
            for ny in ty.saturating_sub(1)..(ty + 2).min(tiles_y) {
                for nx in tx.saturating_sub(1)..(tx + 2).min(tiles_x) {
                    let neighbor = src[(nx, ny)];
                    medians[count] = neighbor.median;
                    sigmas[count] = neighbor.sigma;
                    count += 1;
                }
            }
            TileStats {
                median: median_f32_mut(&mut medians[..count]),
                sigma: median_f32_mut(&mut sigmas[..count]),
            }
        });
        self.stats = filtered;
    }

    /// Bilinear interpolation of tile medians, constant beyond the outermost
    /// tile centers.
    fn interpolate(&self) -> Buffer2<f32> {
        let centers_x: Vec<f32> = (0..self.tiles_x()).map(|t| self.center(t, self.width)).collect();
        let centers_y: Vec<f32> = (0..self.tiles_y()).map(|t| self.center(t, self.height)).collect();

        let mut level = Buffer2::new_default(self.width, self.height);
        level
            .pixels_mut()
            .par_chunks_mut(self.width.max(1))
            .enumerate()
            .for_each(|(y, row)| {
                let (ty0, ty1, fy) = bracket(&centers_y, y as f32 + 0.5);
                for (x, out) in row.iter_mut().enumerate() {
                    let (tx0, tx1, fx) = bracket(&centers_x, x as f32 + 0.5);
                    let top = lerp(self.stats[(tx0, ty0)].median, self.stats[(tx1, ty0)].median, fx);
                    let bottom =
                        lerp(self.stats[(tx0, ty1)].median, self.stats[(tx1, ty1)].median, fx);
                    *out = lerp(top, bottom, fy);
                }
            });
        level
    }
}

/// Neighbouring centers around `pos` and the weight of the second one.
fn bracket(centers: &[f32], pos: f32) -> (usize, usize, f32) {
    let last = centers.len() - 1;
    if pos <= centers[0] {
        return (0, 0, 0.0);
    }
    if pos >= centers[last] {
        return (last, last, 0.0);
    }
    let hi = centers.partition_point(|&c| c <= pos);
    let lo = hi - 1;
    let t = (pos - centers[lo]) / (centers[hi] - centers[lo]);
    (lo, hi, t)
}

/// Exact at `t = 0` and for equal endpoints.
#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Tiles without finite pixels take the median of the filled ones.
fn fill_empty_tiles(raw: Vec<Option<TileStats>>) -> Vec<TileStats> {
    let mut medians: Vec<f32> = raw.iter().flatten().map(|s| s.median).collect();
    let mut sigmas: Vec<f32> = raw.iter().flatten().map(|s| s.sigma).collect();
    let fallback = if medians.is_empty() {
        TileStats::default()
    } else {
        TileStats {
            median: median_f32_mut(&mut medians),
            sigma: median_f32_mut(&mut sigmas),
        }
    };
    raw.into_iter().map(|s| s.unwrap_or(fallback)).collect()
}
