use super::*;
use crate::testing::{synthetic_cube, unit_plane_median, ZoneLayout};

fn sky_cube(layout: &ZoneLayout) -> Cube {
    synthetic_cube(layout, 6, 2.5, |x, y, w, zone| match zone {
        None => 3.0,
        Some(z) => z.unit() as f32 + w as f32 * 0.5 + ((x * 7 + y * 3) % 11) as f32 * 0.01,
    })
}

#[test]
fn test_sky_subtraction_zeroes_unit_medians_and_is_idempotent() {
    let layout = ZoneLayout::default();
    let zones = layout.zone_map();
    let sky = SkySubtractor::new(&zones);

    let (once, report) = sky.subtract(sky_cube(&layout)).unwrap();
    assert_eq!(report.skipped, 0);
    for unit in 1..=NUM_UNITS {
        for w in 0..6 {
            let median = unit_plane_median(&once, &zones, unit, w).unwrap();
            assert!(median.abs() < 1e-5, "unit {unit} plane {w}: {median}");
        }
    }

    let (twice, report) = sky.subtract(once.clone()).unwrap();
    assert!(report.levels.iter().all(|v| v.abs() < 1e-5));
    for (a, b) in once.flux().iter().zip(twice.flux()) {
        assert!((a - b).abs() < 1e-5);
    }
}

#[test]
fn test_sky_leaves_variance_and_unassigned_pixels() {
    let layout = ZoneLayout::default();
    let zones = layout.zone_map();
    let (cube, report) = SkySubtractor::new(&zones).subtract(sky_cube(&layout)).unwrap();

    assert!(cube.variance().iter().all(|&v| v == 2.5));
    assert_eq!(cube.flux_plane(4)[0], 3.0);
    let level = report.level(4, 10).unwrap();
    assert!((level - (10.0 + 2.0 + 0.05)).abs() < 0.06);
}

#[test]
fn test_planes_without_finite_flux_are_skipped() {
    let layout = ZoneLayout::default();
    let zones = layout.zone_map();
    let cube = synthetic_cube(&layout, 3, 1.0, |_, _, w, zone| match zone {
        Some(z) if z.unit() == 2 && w == 1 => f32::NAN,
        Some(_) => 4.0,
        None => f32::NAN,
    });

    let (cube, report) = SkySubtractor::new(&zones).subtract(cube).unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.level(1, 2), None);
    assert_eq!(report.level(0, 2), Some(4.0));
    let idx = zones.unit_pixels(2)[0];
    assert!(cube.flux_plane(1)[idx].is_nan());
    assert_eq!(cube.flux_plane(0)[idx], 0.0);
}

#[test]
fn test_resampled_pixels_follow_their_unit_band() {
    let layout = ZoneLayout::default();
    let native = layout.zone_map();
    let (bx, by) = (layout.border + 1, layout.border + 1);
    let mut values = native.values().clone();
    values[(bx, by)] = 250.5;
    let zones = ZoneMap::from_codes(values).unwrap();
    let cube = synthetic_cube(&layout, 1, 1.0, |_, _, _, zone| {
        zone.map_or(0.0, |z| z.unit() as f32)
    });

    let (cube, _) = SkySubtractor::new(&zones).subtract(cube).unwrap();

    // The pixel holds unit-1 flux but its value sits in unit 2's band.
    assert_eq!(cube.flux_plane(0)[by * layout.width() + bx], -1.0);
}

#[test]
fn test_misaligned_cube_is_rejected() {
    let layout = ZoneLayout::default();
    let zones = ZoneMap::unassigned(layout.width() + 2, layout.height());
    let err = SkySubtractor::new(&zones).subtract(sky_cube(&layout)).unwrap_err();
    assert!(matches!(err, crate::error::Error::ShapeMismatch { .. }));
}
