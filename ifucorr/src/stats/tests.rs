use common::bit_buffer2::BitBuffer2;
use common::buffer2::Buffer2;

use super::*;
use crate::error::Error;
use crate::testing::{synthetic_cube, ZoneLayout};

fn unit_ramp_cube(layout: &ZoneLayout, nwave: usize) -> Cube {
    synthetic_cube(layout, nwave, 1.0, |_, _, w, zone| match zone {
        None => f32::NAN,
        Some(_) if w >= 200 => 1.0e6,
        Some(z) => z.unit() as f32 + (w / 100) as f32 * 10.0,
    })
}

#[test]
fn test_unit_bins_take_per_unit_medians() {
    let layout = ZoneLayout::default();
    let zones = layout.zone_map();
    let cube = unit_ramp_cube(&layout, 250);
    let mask = SourceMask::empty(zones.width(), zones.height());

    let stats = ZoneStatEstimator::new(100)
        .unwrap()
        .unit_bins(&cube, &zones, &mask)
        .unwrap();

    // Trailing planes 200..250 form no bin.
    assert_eq!(stats.nbins(), 2);
    assert!(stats.gaps.is_empty());
    for bin in 0..2 {
        for unit in 1..=24usize {
            let expected = unit as f32 + bin as f32 * 10.0;
            assert_eq!(stats.table.get(bin, unit - 1), Some(expected));
        }
    }
    assert_eq!(stats.bin_center(0), 50.0);
    assert_eq!(stats.bin_center(1), 150.0);
}

#[test]
fn test_fully_masked_unit_is_undefined() {
    let layout = ZoneLayout::default();
    let zones = layout.zone_map();
    let cube = unit_ramp_cube(&layout, 200);
    let bits = BitBuffer2::from_fn(zones.width(), zones.height(), |x, y| {
        zones.zone_at(x, y).is_some_and(|z| z.unit() == 5)
    });
    let mask = SourceMask::from_bits(bits);

    let stats = ZoneStatEstimator::new(100)
        .unwrap()
        .unit_bins(&cube, &zones, &mask)
        .unwrap();

    assert_eq!(stats.table.get(0, 4), None);
    assert_eq!(stats.table.get(1, 4), None);
    assert_eq!(stats.table.get(0, 5), Some(6.0));
    assert_eq!(
        stats.gaps,
        vec![
            DataIncomplete::EmptyUnitBin { unit: 5, bin: 0 },
            DataIncomplete::EmptyUnitBin { unit: 5, bin: 1 },
        ]
    );
}

#[test]
fn test_resampled_pixels_feed_no_unit_bin() {
    let layout = ZoneLayout::default();
    let native = layout.zone_map();
    // Shift every value of unit 2 off its code: still in the unit band, no
    // longer native.
    let values = native.values().map(|&v| if (200.0..300.0).contains(&v) { v + 0.5 } else { v });
    let zones = ZoneMap::from_codes(values).unwrap();
    let cube = unit_ramp_cube(&layout, 100);
    let mask = SourceMask::empty(zones.width(), zones.height());

    let stats = ZoneStatEstimator::new(100)
        .unwrap()
        .unit_bins(&cube, &zones, &mask)
        .unwrap();

    assert_eq!(stats.table.get(0, 1), None);
    assert_eq!(stats.table.get(0, 0), Some(1.0));
}

#[test]
fn test_unit_bins_reject_misaligned_mask() {
    let layout = ZoneLayout::default();
    let zones = layout.zone_map();
    let cube = unit_ramp_cube(&layout, 100);
    let mask = SourceMask::empty(zones.width() + 1, zones.height());

    let err = ZoneStatEstimator::new(100)
        .unwrap()
        .unit_bins(&cube, &zones, &mask)
        .unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { what: "source mask", .. }));
}

fn white_with(layout: &ZoneLayout, f: impl Fn(ZoneId) -> f32) -> Buffer2<f32> {
    Buffer2::from_fn(layout.width(), layout.height(), |x, y| {
        layout.zone_at(x, y).map_or(0.0, &f)
    })
}

#[test]
fn test_subunit_factors_relative_to_reference() {
    let layout = ZoneLayout::default();
    let zones = layout.zone_map();
    let target = ZoneId::new(3, 2).unwrap();
    let white = white_with(&layout, |z| if z == target { 5.0 } else { 10.0 });
    let mask = SourceMask::empty(zones.width(), zones.height());

    let stats = ZoneStatEstimator::subunit_white(&white, &zones, &mask).unwrap();

    assert_eq!(stats.reference, Some(10.0));
    assert_eq!(stats.table.get(2, 1), Some(2.0));
    assert_eq!(stats.table.get(0, 0), Some(1.0));
    assert_eq!(stats.table.get(23, 3), Some(1.0));
    assert!(stats.gaps.is_empty());
}

#[test]
fn test_subunit_gaps_leave_cells_undefined() {
    let layout = ZoneLayout::default();
    let zones = layout.zone_map();
    let masked = ZoneId::new(7, 4).unwrap();
    let negative = ZoneId::new(9, 1).unwrap();
    let white = white_with(&layout, |z| if z == negative { -1.0 } else { 10.0 });
    let bits = BitBuffer2::from_fn(zones.width(), zones.height(), |x, y| {
        zones.zone_at(x, y) == Some(masked)
    });
    let mask = SourceMask::from_bits(bits);

    let stats = ZoneStatEstimator::subunit_white(&white, &zones, &mask).unwrap();

    assert_eq!(stats.table.get(6, 3), None);
    assert_eq!(stats.table.get(8, 0), None);
    assert_eq!(stats.table.defined_count(), 94);
    assert!(stats.gaps.contains(&DataIncomplete::EmptySubunit {
        unit: 7,
        subunit: 4
    }));
    assert!(stats.gaps.contains(&DataIncomplete::NonPositiveSubunitMedian {
        unit: 9,
        subunit: 1,
        median: -1.0
    }));
}

#[test]
fn test_table_from_cells_drops_invalid_values() {
    let cells = Buffer2::new(2, 2, vec![1.5, -1.0, f32::INFINITY, 0.0]);
    let table = CorrectionTable::from_cells(cells);
    assert_eq!(table.get(0, 0), Some(1.5));
    assert_eq!(table.get(0, 1), None);
    assert_eq!(table.get(1, 0), None);
    assert_eq!(table.get(1, 1), Some(0.0));
    assert_eq!(table.row_values(0).collect::<Vec<_>>(), vec![1.5]);
}

#[test]
fn test_zero_bin_width_is_rejected() {
    let err = ZoneStatEstimator::new(0).unwrap_err();
    assert!(err.is_configuration());
}
