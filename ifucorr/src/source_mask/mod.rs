//! Source detection on a broadband reference image.
//!
//! Flatten the image with a tile-mesh background, threshold the residual at
//! `k` times the global rms and keep connected components within the
//! configured area limits. Everything that survives is excluded from the
//! illumination statistics.

mod background;
mod labeling;

use common::bit_buffer2::BitBuffer2;
use common::buffer2::Buffer2;

use crate::config::MaskConfig;
use crate::error::Result;

pub use background::Background;
pub use labeling::LabelMap;

/// Pixels flagged as astrophysical sources. `true` means excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMask {
    bits: BitBuffer2,
}

impl SourceMask {
    /// Mask with no sources.
    pub fn empty(width: usize, height: usize) -> Self {
        Self {
            bits: BitBuffer2::new_default(width, height),
        }
    }

    pub fn from_bits(bits: BitBuffer2) -> Self {
        Self { bits }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.bits.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.bits.height()
    }

    #[inline]
    pub fn is_source(&self, idx: usize) -> bool {
        self.bits.get(idx)
    }

    /// Usable for background statistics.
    #[inline]
    pub fn passes(&self, idx: usize) -> bool {
        !self.bits.get(idx)
    }

    #[inline]
    pub fn bits(&self) -> &BitBuffer2 {
        &self.bits
    }

    #[inline]
    pub fn source_pixels(&self) -> usize {
        self.bits.count_ones()
    }
}

/// Summary of one detection run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaskReport {
    /// Connected components above threshold.
    pub components: usize,
    /// Components kept as sources.
    pub sources: usize,
    pub rejected_small: usize,
    /// Components reclassified as background for exceeding the area limit.
    pub rejected_large: usize,
    pub global_rms: f32,
    pub threshold: f32,
    pub masked_pixels: usize,
}

#[derive(Debug, Clone)]
pub struct SourceMasker {
    config: MaskConfig,
}

impl SourceMasker {
    /// Fails on parameters the background mesh or threshold cannot use.
    pub fn new(config: MaskConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[inline]
    pub fn config(&self) -> &MaskConfig {
        &self.config
    }

    pub fn detect(&self, image: &Buffer2<f32>) -> (SourceMask, MaskReport) {
        let background = Background::estimate(
            image,
            self.config.tile_size,
            self.config.clip_sigma,
            self.config.clip_iterations,
        );
        let residual = background.subtract_from(image);
        let threshold = self.config.threshold_sigma * background.global_rms();

        // NaN compares false, so missing pixels never cross the threshold.
        let above = BitBuffer2::from_fn(image.width(), image.height(), |x, y| {
            residual[(x, y)] > threshold
        });

        let labels = LabelMap::from_mask(&above, self.config.connectivity);
        let areas = labels.areas();

        let mut report = MaskReport {
            components: labels.num_labels(),
            global_rms: background.global_rms(),
            threshold,
            ..MaskReport::default()
        };

        let keep: Vec<bool> = areas
            .iter()
            .enumerate()
            .map(|(label, &area)| {
                if label == 0 {
                    return false;
                }
                if area < self.config.min_area {
                    report.rejected_small += 1;
                    false
                } else if self.config.max_area.is_some_and(|max| area > max) {
                    report.rejected_large += 1;
                    false
                } else {
                    report.sources += 1;
                    true
                }
            })
            .collect();

        let mut bits = BitBuffer2::new_default(image.width(), image.height());
        for (idx, &label) in labels.labels().iter().enumerate() {
            if keep[label as usize] {
                bits.set(idx, true);
            }
        }
        report.masked_pixels = bits.count_ones();

        tracing::debug!(
            components = report.components,
            sources = report.sources,
            rejected_small = report.rejected_small,
            rejected_large = report.rejected_large,
            global_rms = report.global_rms,
            "Source detection done"
        );

        (SourceMask::from_bits(bits), report)
    }
}
