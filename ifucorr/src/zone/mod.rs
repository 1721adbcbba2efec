//! Focal-plane zone labels.
//!
//! Every reconstructed pixel is tagged with the instrument Unit and Subunit it
//! came from, encoded as `unit * 100 + subunit`. Zero marks unassigned pixels.

mod mapper;

use common::bit_buffer2::BitBuffer2;
use common::buffer2::Buffer2;
use thiserror::Error;

pub use mapper::{ProvenanceSample, SampleOrigin, ZoneMapper};

pub const NUM_UNITS: u8 = 24;
pub const SUBUNITS_PER_UNIT: u8 = 4;
pub const SLICES_PER_UNIT: u8 = 48;
pub const SLICES_PER_SUBUNIT: u8 = SLICES_PER_UNIT / SUBUNITS_PER_UNIT;

/// Zone code multiplier for the unit index.
pub const UNIT_STRIDE: f32 = 100.0;

/// Largest valid zone code.
pub const MAX_ZONE_CODE: u16 = NUM_UNITS as u16 * 100 + SUBUNITS_PER_UNIT as u16;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ZoneError {
    #[error("Unit {0} out of range 1..={NUM_UNITS}")]
    UnitOutOfRange(u32),

    #[error("Subunit {0} out of range 1..={SUBUNITS_PER_UNIT}")]
    SubunitOutOfRange(u32),

    #[error("Slice {0} out of range 1..={SLICES_PER_UNIT}")]
    SliceOutOfRange(u32),

    #[error("Sample position ({x}, {y}) outside the {width}x{height} grid")]
    PositionOutOfGrid {
        x: i64,
        y: i64,
        width: usize,
        height: usize,
    },

    #[error("Zone value {value} at ({x}, {y}) is not a valid zone code")]
    InvalidCode { value: f32, x: usize, y: usize },
}

/// A (Unit, Subunit) pair, both 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZoneId {
    unit: u8,
    subunit: u8,
}

impl ZoneId {
    pub fn new(unit: u32, subunit: u32) -> Result<Self, ZoneError> {
        if !(1..=NUM_UNITS as u32).contains(&unit) {
            return Err(ZoneError::UnitOutOfRange(unit));
        }
        if !(1..=SUBUNITS_PER_UNIT as u32).contains(&subunit) {
            return Err(ZoneError::SubunitOutOfRange(subunit));
        }
        Ok(Self {
            unit: unit as u8,
            subunit: subunit as u8,
        })
    }

    /// Zone of an instrument slice: slices are grouped in runs of 12.
    pub fn from_slice(unit: u32, slice: u32) -> Result<Self, ZoneError> {
        if !(1..=SLICES_PER_UNIT as u32).contains(&slice) {
            return Err(ZoneError::SliceOutOfRange(slice));
        }
        Self::new(unit, (slice - 1) / SLICES_PER_SUBUNIT as u32 + 1)
    }

    /// Decode an integral zone code.
    pub fn from_code(code: u16) -> Result<Self, ZoneError> {
        Self::new(code as u32 / 100, code as u32 % 100)
    }

    #[inline]
    pub fn unit(self) -> u8 {
        self.unit
    }

    #[inline]
    pub fn subunit(self) -> u8 {
        self.subunit
    }

    #[inline]
    pub fn code(self) -> u16 {
        self.unit as u16 * 100 + self.subunit as u16
    }

    /// All 96 zones in unit-major order.
    pub fn all() -> impl Iterator<Item = ZoneId> {
        (1..=NUM_UNITS).flat_map(|unit| {
            (1..=SUBUNITS_PER_UNIT).map(move |subunit| ZoneId { unit, subunit })
        })
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.unit, self.subunit)
    }
}

/// Lower edge of the zone-value band of `unit`.
#[inline]
pub fn unit_base(unit: u8) -> f32 {
    unit as f32 * UNIT_STRIDE
}

/// Per-pixel zone values on the cube's spatial grid.
///
/// Integral values are native samples. Maps resampled upstream carry
/// fractional values between neighbouring codes near unit boundaries; those
/// pixels belong to the unit whose band `[100*u, 100*(u+1))` holds the value
/// but are not native to any zone.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneMap {
    values: Buffer2<f32>,
}

impl ZoneMap {
    /// Map with every pixel unassigned.
    pub fn unassigned(width: usize, height: usize) -> Self {
        Self {
            values: Buffer2::new_default(width, height),
        }
    }

    /// Validate a rasterized zone image.
    ///
    /// NaN, non-positive and sub-100 values become unassigned. Anything above
    /// the largest code, or infinite, is rejected.
    pub fn from_codes(image: Buffer2<f32>) -> Result<Self, ZoneError> {
        let mut values = image;
        for idx in 0..values.len() {
            let v = values[idx];
            if v.is_nan() || v < UNIT_STRIDE {
                values[idx] = 0.0;
            } else if v.is_infinite() || v > MAX_ZONE_CODE as f32 {
                let (x, y) = values.coords(idx);
                return Err(ZoneError::InvalidCode { value: v, x, y });
            }
        }
        Ok(Self { values })
    }

    pub(crate) fn from_values_unchecked(values: Buffer2<f32>) -> Self {
        Self { values }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.values.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.values.height()
    }

    #[inline]
    pub fn values(&self) -> &Buffer2<f32> {
        &self.values
    }

    #[inline]
    pub fn value_at(&self, x: usize, y: usize) -> f32 {
        self.values[(x, y)]
    }

    #[inline]
    pub fn is_defined(&self, x: usize, y: usize) -> bool {
        self.values[(x, y)] > 0.0
    }

    #[inline]
    pub(crate) fn is_defined_idx(&self, idx: usize) -> bool {
        self.values[idx] > 0.0
    }

    /// Zone of a native pixel, `None` for unassigned or resampled values.
    #[inline]
    pub fn zone_at(&self, x: usize, y: usize) -> Option<ZoneId> {
        native_zone(self.values[(x, y)])
    }

    #[inline]
    pub(crate) fn zone_at_idx(&self, idx: usize) -> Option<ZoneId> {
        native_zone(self.values[idx])
    }

    /// Unit whose band holds the pixel value.
    #[inline]
    pub fn unit_at(&self, x: usize, y: usize) -> Option<u8> {
        unit_of_value(self.values[(x, y)])
    }

    #[inline]
    pub(crate) fn unit_at_idx(&self, idx: usize) -> Option<u8> {
        unit_of_value(self.values[idx])
    }

    /// Linear indices of all pixels in the band of `unit`.
    pub fn unit_pixels(&self, unit: u8) -> Vec<usize> {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, &v)| unit_of_value(v) == Some(unit))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Linear indices of native pixels of `zone`.
    pub fn zone_pixels(&self, zone: ZoneId) -> Vec<usize> {
        let code = zone.code() as f32;
        self.values
            .iter()
            .enumerate()
            .filter(|(_, &v)| v == code)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Pixels whose value is exactly a zone code.
    pub fn native_mask(&self) -> BitBuffer2 {
        let width = self.width();
        BitBuffer2::from_fn(width, self.height(), |x, y| {
            native_zone(self.values[y * width + x]).is_some()
        })
    }

    /// Per-pixel unit lookup for all 24 bands, computed once.
    pub fn unit_index(&self) -> Buffer2<Option<u8>> {
        self.values.map(|&v| unit_of_value(v))
    }
}

#[inline]
fn native_zone(value: f32) -> Option<ZoneId> {
    if value <= 0.0 || value.fract() != 0.0 || value > MAX_ZONE_CODE as f32 {
        return None;
    }
    ZoneId::from_code(value as u16).ok()
}

#[inline]
fn unit_of_value(value: f32) -> Option<u8> {
    if !(value >= UNIT_STRIDE) {
        return None;
    }
    let unit = (value / UNIT_STRIDE).floor();
    (unit <= NUM_UNITS as f32).then_some(unit as u8)
}
