use super::*;

fn stats_from(rows: usize, f: impl Fn(usize, u8) -> Option<f32>) -> UnitBinStats {
    let mut table = CorrectionTable::undefined(rows, NUM_UNITS as usize);
    for bin in 0..rows {
        for unit in 1..=NUM_UNITS {
            table.set(bin, unit as usize - 1, f(bin, unit));
        }
    }
    UnitBinStats {
        table,
        bin_width: 100,
        gaps: Vec::new(),
    }
}

#[test]
fn test_normalized_median_is_one_per_bin() {
    let stats = stats_from(3, |bin, unit| Some(unit as f32 * (bin + 1) as f32));
    let normalized = normalize(&stats.table);
    let mut scratch = Vec::new();
    for bin in 0..3 {
        let median = finite_median(normalized.row_values(bin), &mut scratch).unwrap();
        assert!((median - 1.0).abs() < 1e-6, "bin {bin}: {median}");
    }
    assert!((normalized.get(0, 0).unwrap() - 1.0 / 12.5).abs() < 1e-6);
}

#[test]
fn test_normalize_ignores_undefined_cells() {
    let stats = stats_from(2, |bin, unit| match (bin, unit) {
        (1, _) => None,
        (_, 1..=3) => None,
        (_, u) => Some(u as f32),
    });
    let normalized = normalize(&stats.table);
    // Median over units 4..=24 is 14.
    assert_eq!(normalized.get(0, 13), Some(1.0));
    assert_eq!(normalized.get(0, 0), None);
    assert_eq!(normalized.row_values(1).count(), 0);
}

#[test]
fn test_curves_interpolate_and_extrapolate() {
    let stats = stats_from(2, |bin, unit| Some(if unit == 1 { bin as f32 + 1.0 } else { 1.0 }));
    let (curves, gaps) = CorrectionCurves::fit(&stats);
    assert!(gaps.is_empty());
    assert!((curves.unit_curve(1, 50) - 1.0).abs() < 1e-9);
    assert!((curves.unit_curve(1, 100) - 1.5).abs() < 1e-9);
    assert!((curves.unit_curve(1, 150) - 2.0).abs() < 1e-9);
    assert!((curves.unit_curve(1, 250) - 3.0).abs() < 1e-9);
    assert!((curves.unit_curve(1, 0) - 0.5).abs() < 1e-9);
    assert!((curves.unit_curve(2, 300) - 1.0).abs() < 1e-9);
}

#[test]
fn test_unit_without_bins_gets_unit_curve() {
    let stats = stats_from(2, |_, unit| (unit != 9).then_some(2.0));
    let (curves, gaps) = CorrectionCurves::fit(&stats);
    assert_eq!(gaps, vec![DataIncomplete::UnitWithoutBins { unit: 9 }]);
    assert_eq!(curves.unit_curve(9, 0), 1.0);
    assert_eq!(curves.unit_curve(9, 10_000), 1.0);
    assert_eq!(curves.smoothed().get(1, 8), Some(1.0));
    assert_eq!(curves.normalized().get(1, 8), None);
}

#[test]
fn test_smoothed_fills_skipped_bins() {
    let stats = stats_from(3, |bin, unit| match (bin, unit) {
        (1, 3) => None,
        (b, 3) => Some(b as f32 + 1.0),
        _ => Some(1.0),
    });
    let (curves, _) = CorrectionCurves::fit(&stats);
    assert_eq!(curves.normalized().get(1, 2), None);
    assert_eq!(curves.smoothed().get(1, 2), Some(2.0));
    assert_eq!(curves.smoothed().get(2, 2), Some(3.0));
}

#[test]
fn test_blend_ramps_into_last_unit() {
    // Unit 24 twice as bright as the rest.
    let stats = stats_from(1, |_, unit| Some(if unit == NUM_UNITS { 2.0 } else { 1.0 }));
    let (curves, _) = CorrectionCurves::fit(&stats);
    let plane = curves.plane(50);

    // Native unit-23 pixels pick up a small share of the unit-24 curve.
    assert!((plane.value_at(23, 2301.0) - 1.01).abs() < 1e-6);
    assert!((plane.value_at(23, 2304.0) - 1.04).abs() < 1e-6);
    // Resampled values climb smoothly towards unit 24.
    assert!((plane.value_at(23, 2350.0) - 1.5).abs() < 1e-6);
    let ramp: Vec<f64> = [2310.0, 2330.0, 2360.0, 2399.0]
        .iter()
        .map(|&v| plane.value_at(23, v))
        .collect();
    assert!(ramp.windows(2).all(|w| w[0] < w[1]));
    assert!(ramp[3] < 2.0);
    // Unit 24 is never blended.
    assert_eq!(plane.value_at(24, 2401.0), 2.0);
    assert_eq!(plane.value_at(24, 2404.0), 2.0);
    // Interior units with equal neighbours are flat.
    assert_eq!(plane.value_at(5, 503.0), 1.0);
}
