//! Robust statistics: median, MAD, sigma-clipped median.
//!
//! Missing values are NaN throughout the cube. Every public helper here either
//! requires finite input or filters it first.

use std::cmp::Ordering;

/// For a normal distribution, σ ≈ 1.4826 × MAD.
pub const MAD_TO_SIGMA: f32 = 1.4826022;

#[inline]
pub fn mad_to_sigma(mad: f32) -> f32 {
    mad * MAD_TO_SIGMA
}

#[inline]
fn cmp_f32(a: &f32, b: &f32) -> Ordering {
    a.total_cmp(b)
}

/// Median of finite values, reordering the buffer. Even lengths average the
/// two middle elements.
#[inline]
pub fn median_f32_mut(data: &mut [f32]) -> f32 {
    debug_assert!(!data.is_empty());

    let len = data.len();
    let mid = len / 2;

    let (left, upper, _) = data.select_nth_unstable_by(mid, cmp_f32);
    let upper = *upper;
    if len & 1 == 1 {
        return upper;
    }
    let lower = left.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    (lower + upper) * 0.5
}

/// Median of the finite elements of `values`, `None` if there are none.
///
/// `scratch` is cleared and reused.
pub fn finite_median(
    values: impl IntoIterator<Item = f32>,
    scratch: &mut Vec<f32>,
) -> Option<f32> {
    scratch.clear();
    scratch.extend(values.into_iter().filter(|v| v.is_finite()));
    if scratch.is_empty() {
        None
    } else {
        Some(median_f32_mut(scratch))
    }
}

/// Iteratively reject values beyond `kappa × sigma` from the median and
/// return `(median, sigma)` of the survivors. Sigma is MAD-based.
///
/// `values` must be finite; it is reordered and partially overwritten.
pub fn sigma_clipped_median_mad(
    values: &mut [f32],
    deviations: &mut Vec<f32>,
    kappa: f32,
    iterations: usize,
) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }

    let mut len = values.len();

    for _ in 0..iterations {
        if len < 3 {
            break;
        }

        let active = &mut values[..len];
        let median = median_f32_mut(active);

        deviations.clear();
        deviations.extend(active.iter().map(|v| (v - median).abs()));
        let sigma = mad_to_sigma(median_f32_mut(deviations));

        if sigma < f32::EPSILON {
            return (median, 0.0);
        }

        let threshold = kappa * sigma;
        let mut write_idx = 0;
        for i in 0..len {
            if (values[i] - median).abs() <= threshold {
                values[write_idx] = values[i];
                write_idx += 1;
            }
        }

        if write_idx == len {
            break;
        }
        len = write_idx;
    }

    let active = &mut values[..len];
    let median = median_f32_mut(active);
    deviations.clear();
    deviations.extend(active.iter().map(|v| (v - median).abs()));
    let sigma = mad_to_sigma(median_f32_mut(deviations));

    (median, sigma)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_even() {
        assert_eq!(median_f32_mut(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median_f32_mut(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median_f32_mut(&mut [7.0]), 7.0);
    }

    #[test]
    fn test_finite_median_skips_nan() {
        let mut scratch = Vec::new();
        let values = [1.0, f32::NAN, 5.0, f32::INFINITY, 3.0];
        assert_eq!(finite_median(values, &mut scratch), Some(3.0));
    }

    #[test]
    fn test_finite_median_all_missing() {
        let mut scratch = Vec::new();
        assert_eq!(finite_median([f32::NAN, f32::NAN], &mut scratch), None);
        assert_eq!(finite_median(std::iter::empty(), &mut scratch), None);
    }

    #[test]
    fn test_sigma_clip_rejects_outlier() {
        let mut values: Vec<f32> = (0..100).map(|i| 10.0 + (i % 5) as f32 * 0.1).collect();
        values.push(1000.0);
        let mut deviations = Vec::new();
        let (median, sigma) = sigma_clipped_median_mad(&mut values, &mut deviations, 3.0, 3);
        assert!((median - 10.2).abs() < 1e-4);
        assert!(sigma > 0.0 && sigma < 1.0);
    }

    #[test]
    fn test_sigma_clip_constant_data() {
        let mut values = vec![4.0f32; 20];
        let mut deviations = Vec::new();
        assert_eq!(
            sigma_clipped_median_mad(&mut values, &mut deviations, 3.0, 3),
            (4.0, 0.0)
        );
    }
}
