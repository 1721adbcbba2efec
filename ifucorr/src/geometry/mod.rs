//! Rotation-aware Subunit boundaries.
//!
//! Subunits are strips across their Unit. Which image axis the strip runs
//! along depends on the instrument rotator: at 0/180/360 degrees the Subunit
//! is narrow in x and spans the Unit in y, at 90/270 the roles swap.


use std::ops::Range;

use common::bit_buffer2::BitBuffer2;

use crate::error::{Error, Result};
use crate::math::Aabb;
use crate::zone::{ZoneId, ZoneMap, NUM_UNITS, SUBUNITS_PER_UNIT};

/// Supported rotator positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RotationAngle {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
    Deg360,
}

impl RotationAngle {
    /// Exact match against the supported positions; any other header value
    /// is a configuration error.
    pub fn from_degrees(angle: f64) -> Result<Self> {
        const ANGLES: [(f64, RotationAngle); 5] = [
            (0.0, RotationAngle::Deg0),
            (90.0, RotationAngle::Deg90),
            (180.0, RotationAngle::Deg180),
            (270.0, RotationAngle::Deg270),
            (360.0, RotationAngle::Deg360),
        ];
        ANGLES
            .iter()
            .find(|&&(deg, _)| angle == deg)
            .map(|&(_, rotation)| rotation)
            .ok_or(Error::UnsupportedRotation { angle })
    }

    pub fn degrees(self) -> f64 {
        match self {
            Self::Deg0 => 0.0,
            Self::Deg90 => 90.0,
            Self::Deg180 => 180.0,
            Self::Deg270 => 270.0,
            Self::Deg360 => 360.0,
        }
    }

    /// True when Subunit strips run along x.
    #[inline]
    pub fn swaps_axes(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

/// Half-open pixel rectangle `x × y`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelRect {
    pub x: Range<usize>,
    pub y: Range<usize>,
}

impl PixelRect {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty() || self.y.is_empty()
    }

    #[inline]
    pub fn area(&self) -> usize {
        self.x.len() * self.y.len()
    }

    /// Row-major linear indices on a grid of `width` columns.
    pub fn indices(&self, width: usize) -> impl Iterator<Item = usize> + '_ {
        self.y
            .clone()
            .flat_map(move |y| self.x.clone().map(move |x| y * width + x))
    }
}

/// Resolved strip of one Subunit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubunitRegion {
    pub zone: ZoneId,
    /// `None` when the Subunit has no native pixels.
    pub rect: Option<PixelRect>,
    /// Interior of `rect`, inset along the Subunit axis. Diagnostic only.
    pub interior: Option<PixelRect>,
}

/// Computes [`SubunitRegion`]s for a fixed rotation.
#[derive(Debug, Clone, Copy)]
pub struct EdgeResolver {
    rotation: RotationAngle,
    inset: usize,
}

impl EdgeResolver {
    pub fn new(rotation: RotationAngle, inset: usize) -> Self {
        Self { rotation, inset }
    }

    /// Validate a raw header angle first.
    pub fn from_degrees(angle: f64, inset: usize) -> Result<Self> {
        Ok(Self::new(RotationAngle::from_degrees(angle)?, inset))
    }

    #[inline]
    pub fn rotation(&self) -> RotationAngle {
        self.rotation
    }

    /// Regions for all 96 zones, unit-major.
    ///
    /// The strip extent comes from the Subunit's native pixels, the cross
    /// extent from every pixel in the Unit band. Both ranges are `[min, max)`,
    /// so the last row/column of a box is not part of the strip.
    pub fn resolve(&self, zones: &ZoneMap) -> Vec<SubunitRegion> {
        let (unit_boxes, zone_boxes) = bounding_boxes(zones);

        ZoneId::all()
            .map(|zone| {
                let unit_box = unit_boxes[zone.unit() as usize - 1];
                let zone_box = zone_boxes[zone_slot(zone)];
                let rect = match (zone_box, unit_box) {
                    (Some(z), Some(u)) => Some(self.strip(&z, &u)),
                    _ => None,
                };
                let interior = rect.as_ref().map(|r| self.inset_rect(r));
                SubunitRegion {
                    zone,
                    rect,
                    interior,
                }
            })
            .collect()
    }

    fn strip(&self, zone_box: &Aabb, unit_box: &Aabb) -> PixelRect {
        if self.rotation.swaps_axes() {
            PixelRect {
                x: unit_box.min_x..unit_box.max_x,
                y: zone_box.min_y..zone_box.max_y,
            }
        } else {
            PixelRect {
                x: zone_box.min_x..zone_box.max_x,
                y: unit_box.min_y..unit_box.max_y,
            }
        }
    }

    fn inset_rect(&self, rect: &PixelRect) -> PixelRect {
        let shrink = |r: &Range<usize>| {
            let start = r.start + self.inset;
            let end = r.end.saturating_sub(self.inset).max(start);
            start..end
        };
        if self.rotation.swaps_axes() {
            PixelRect {
                x: rect.x.clone(),
                y: shrink(&rect.y),
            }
        } else {
            PixelRect {
                x: shrink(&rect.x),
                y: rect.y.clone(),
            }
        }
    }
}

/// Diagnostic mask of all region interiors.
pub fn interior_mask(regions: &[SubunitRegion], width: usize, height: usize) -> BitBuffer2 {
    let mut mask = BitBuffer2::new_default(width, height);
    for interior in regions.iter().filter_map(|r| r.interior.as_ref()) {
        for idx in interior.indices(width) {
            mask.set(idx, true);
        }
    }
    mask
}

#[inline]
fn zone_slot(zone: ZoneId) -> usize {
    (zone.unit() as usize - 1) * SUBUNITS_PER_UNIT as usize + zone.subunit() as usize - 1
}

/// Per-unit band boxes and per-zone native boxes in one scan.
fn bounding_boxes(zones: &ZoneMap) -> (Vec<Option<Aabb>>, Vec<Option<Aabb>>) {
    let mut units = vec![Aabb::empty(); NUM_UNITS as usize];
    let mut native = vec![Aabb::empty(); NUM_UNITS as usize * SUBUNITS_PER_UNIT as usize];

    for y in 0..zones.height() {
        for x in 0..zones.width() {
            if let Some(unit) = zones.unit_at(x, y) {
                units[unit as usize - 1].include(x, y);
            }
            if let Some(zone) = zones.zone_at(x, y) {
                native[zone_slot(zone)].include(x, y);
            }
        }
    }

    let finish = |boxes: Vec<Aabb>| -> Vec<Option<Aabb>> {
        boxes
            .into_iter()
            .map(|b| (!b.is_empty()).then_some(b))
            .collect()
    };
    (finish(units), finish(native))
}
