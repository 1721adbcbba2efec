//! Piecewise-linear 1D interpolation with linear extrapolation.

/// Linear interpolant through `(x, y)` knots sorted by strictly increasing `x`.
///
/// Outside the knot range the first or last segment is extended. A single
/// knot evaluates to a constant.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearInterpolant {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl LinearInterpolant {
    /// `None` when no knots are given or `x` is not strictly increasing.
    pub fn new(knots: impl IntoIterator<Item = (f64, f64)>) -> Option<Self> {
        let (xs, ys): (Vec<f64>, Vec<f64>) = knots.into_iter().unzip();
        if xs.is_empty() || xs.windows(2).any(|w| !(w[0] < w[1])) {
            return None;
        }
        Some(Self { xs, ys })
    }

    pub fn constant(value: f64) -> Self {
        Self {
            xs: vec![0.0],
            ys: vec![value],
        }
    }

    pub fn eval(&self, x: f64) -> f64 {
        let n = self.xs.len();
        if n == 1 {
            return self.ys[0];
        }

        // Segment index: interior lookup, clamped so that both ends extrapolate.
        let seg = match self.xs.partition_point(|&k| k <= x) {
            0 => 0,
            p if p >= n => n - 2,
            p => p - 1,
        };

        let (x0, x1) = (self.xs[seg], self.xs[seg + 1]);
        let (y0, y1) = (self.ys[seg], self.ys[seg + 1]);
        y0 + (y1 - y0) * (x - x0) / (x1 - x0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolates_between_knots() {
        let f = LinearInterpolant::new([(50.0, 1.0), (150.0, 2.0), (250.0, 4.0)]).unwrap();
        assert_eq!(f.eval(50.0), 1.0);
        assert_eq!(f.eval(100.0), 1.5);
        assert_eq!(f.eval(200.0), 3.0);
        assert_eq!(f.eval(250.0), 4.0);
    }

    #[test]
    fn test_extrapolates_both_ends() {
        let f = LinearInterpolant::new([(50.0, 1.0), (150.0, 2.0)]).unwrap();
        assert!((f.eval(0.0) - 0.5).abs() < 1e-12);
        assert!((f.eval(250.0) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_knot_is_constant() {
        let f = LinearInterpolant::new([(150.0, 0.8)]).unwrap();
        assert_eq!(f.eval(-10.0), 0.8);
        assert_eq!(f.eval(1e6), 0.8);
    }

    #[test]
    fn test_rejects_unsorted_or_empty() {
        assert!(LinearInterpolant::new([(2.0, 1.0), (1.0, 1.0)]).is_none());
        assert!(LinearInterpolant::new([(1.0, 1.0), (1.0, 2.0)]).is_none());
        assert!(LinearInterpolant::new(std::iter::empty()).is_none());
    }
}
