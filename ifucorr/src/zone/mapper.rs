//! Rasterize per-sample provenance into a [`ZoneMap`].

use common::buffer2::Buffer2;

use super::{ZoneError, ZoneId, ZoneMap};

/// Instrument origin of a sample below the unit level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOrigin {
    /// Instrument slice, 1..=48.
    Slice(u32),
    /// Subunit directly, 1..=4.
    Subunit(u32),
}

/// One reconstructed sample: its pixel on the cube grid and where it came
/// from in the instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProvenanceSample {
    pub x: i64,
    pub y: i64,
    pub unit: u32,
    pub origin: SampleOrigin,
}

impl ProvenanceSample {
    pub fn zone(&self) -> Result<ZoneId, ZoneError> {
        match self.origin {
            SampleOrigin::Slice(slice) => ZoneId::from_slice(self.unit, slice),
            SampleOrigin::Subunit(subunit) => ZoneId::new(self.unit, subunit),
        }
    }
}

/// Writes zone codes for a grid of fixed size.
#[derive(Debug, Clone, Copy)]
pub struct ZoneMapper {
    width: usize,
    height: usize,
}

impl ZoneMapper {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Single pass over `samples`. A later sample on the same pixel overwrites
    /// an earlier one. The first invalid sample aborts the whole map.
    pub fn map<'a>(
        &self,
        samples: impl IntoIterator<Item = &'a ProvenanceSample>,
    ) -> Result<ZoneMap, ZoneError> {
        let mut values = Buffer2::<f32>::new_default(self.width, self.height);
        for sample in samples {
            let zone = sample.zone()?;
            let (x, y) = self.checked_position(sample)?;
            values[(x, y)] = zone.code() as f32;
        }
        Ok(ZoneMap::from_values_unchecked(values))
    }

    fn checked_position(&self, sample: &ProvenanceSample) -> Result<(usize, usize), ZoneError> {
        let inside = (0..self.width as i64).contains(&sample.x)
            && (0..self.height as i64).contains(&sample.y);
        if !inside {
            return Err(ZoneError::PositionOutOfGrid {
                x: sample.x,
                y: sample.y,
                width: self.width,
                height: self.height,
            });
        }
        Ok((sample.x as usize, sample.y as usize))
    }
}
