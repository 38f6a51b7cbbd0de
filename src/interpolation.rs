//! Monotone piecewise cubic Hermite interpolation (PCHIP).
//!
//! Slopes follow Fritsch–Carlson: weighted harmonic means at interior knots,
//! one-sided three-point estimates limited to the secant sign at the ends.
//! The resulting interpolant never overshoots between knots when the data is
//! monotone.

use crate::error::{BallisticsError, Result};

/// Below this many knots a linear scan beats binary search on short curves
const LINEAR_SCAN_MAX_POINTS: usize = 16;

/// Slope at an interior knot from the neighbouring secants
#[inline]
fn interior_slope(h0: f64, h1: f64, d0: f64, d1: f64) -> f64 {
    if d0 == 0.0 || d1 == 0.0 || d0.signum() != d1.signum() {
        return 0.0;
    }
    let w1 = 2.0 * h1 + h0;
    let w2 = h1 + 2.0 * h0;
    (w1 + w2) / (w1 / d0 + w2 / d1)
}

/// One-sided slope at an end knot. `h0`/`d0` belong to the end interval.
#[inline]
fn end_slope(h0: f64, h1: f64, d0: f64, d1: f64) -> f64 {
    let m = ((2.0 * h0 + h1) * d0 - h0 * d1) / (h0 + h1);
    if m.signum() != d0.signum() || d0 == 0.0 {
        0.0
    } else if d0.signum() != d1.signum() && m.abs() > 3.0 * d0.abs() {
        3.0 * d0
    } else {
        m
    }
}

/// Evaluate the cubic Hermite on `[xa, xb]`
#[inline]
fn hermite(x: f64, xa: f64, xb: f64, ya: f64, yb: f64, ma: f64, mb: f64) -> f64 {
    let h = xb - xa;
    let t = (x - xa) / h;
    let t2 = t * t;
    let t3 = t2 * t;
    let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
    let h10 = t3 - 2.0 * t2 + t;
    let h01 = -2.0 * t3 + 3.0 * t2;
    let h11 = t3 - t2;
    h00 * ya + h10 * h * ma + h01 * yb + h11 * h * mb
}

/// PCHIP through three points, evaluated at `x`.
///
/// The points may arrive in any order. Fails when two abscissae coincide.
pub fn interpolate_3pt(x: f64, x0: f64, x1: f64, x2: f64, y0: f64, y1: f64, y2: f64) -> Result<f64> {
    let mut pts = [(x0, y0), (x1, y1), (x2, y2)];
    pts.sort_by(|a, b| a.0.total_cmp(&b.0));
    let [(x0, y0), (x1, y1), (x2, y2)] = pts;

    if !(x0 < x1 && x1 < x2) {
        return Err(BallisticsError::Value(format!(
            "interpolation knots must be distinct: {}, {}, {}",
            x0, x1, x2
        )));
    }

    let h0 = x1 - x0;
    let h1 = x2 - x1;
    let d0 = (y1 - y0) / h0;
    let d1 = (y2 - y1) / h1;

    let m0 = end_slope(h0, h1, d0, d1);
    let m1 = interior_slope(h0, h1, d0, d1);
    let m2 = end_slope(h1, h0, d1, d0);

    if x <= x1 {
        Ok(hermite(x, x0, x1, y0, y1, m0, m1))
    } else {
        Ok(hermite(x, x1, x2, y1, y2, m1, m2))
    }
}

/// Linear interpolation between two points
pub fn interpolate_2pt(x: f64, x0: f64, y0: f64, x1: f64, y1: f64) -> Result<f64> {
    let dx = x1 - x0;
    if dx == 0.0 {
        return Err(BallisticsError::ZeroDivision(format!(
            "linear interpolation with coincident knots at {}",
            x0
        )));
    }
    Ok(y0 + (y1 - y0) * (x - x0) / dx)
}

/// Cubic segment `y = a + b·dx + c·dx² + d·dx³` with `dx = x - x_start`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveSegment {
    pub x_start: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl CurveSegment {
    #[inline]
    fn eval(&self, x: f64) -> f64 {
        let dx = x - self.x_start;
        self.a + dx * (self.b + dx * (self.c + dx * self.d))
    }
}

/// A PCHIP curve built once from knots and evaluated many times.
///
/// Evaluation clamps to the first and last knot values outside the domain.
#[derive(Debug, Clone, PartialEq)]
pub struct PchipCurve {
    xs: Vec<f64>,
    segments: Vec<CurveSegment>,
    y_last: f64,
}

impl PchipCurve {
    /// Build from strictly increasing `xs` with at least two knots
    pub fn new(xs: &[f64], ys: &[f64]) -> Result<Self> {
        let n = xs.len();
        if n != ys.len() {
            return Err(BallisticsError::Value(format!(
                "curve needs matching knot arrays, got {} x and {} y",
                n,
                ys.len()
            )));
        }
        if n < 2 {
            return Err(BallisticsError::Value(format!(
                "curve needs at least 2 knots, got {}",
                n
            )));
        }
        for (i, pair) in xs.windows(2).enumerate() {
            let h = pair[1] - pair[0];
            if h == 0.0 {
                return Err(BallisticsError::ZeroDivision(format!(
                    "duplicate knot at index {}",
                    i + 1
                )));
            }
            if !(h > 0.0) {
                return Err(BallisticsError::Value(format!(
                    "knots must be strictly increasing at index {}",
                    i + 1
                )));
            }
        }

        let h: Vec<f64> = xs.windows(2).map(|p| p[1] - p[0]).collect();
        let delta: Vec<f64> = (0..n - 1).map(|i| (ys[i + 1] - ys[i]) / h[i]).collect();

        let mut slopes = vec![0.0; n];
        if n == 2 {
            slopes[0] = delta[0];
            slopes[1] = delta[0];
        } else {
            slopes[0] = end_slope(h[0], h[1], delta[0], delta[1]);
            for i in 1..n - 1 {
                slopes[i] = interior_slope(h[i - 1], h[i], delta[i - 1], delta[i]);
            }
            slopes[n - 1] = end_slope(h[n - 2], h[n - 3], delta[n - 2], delta[n - 3]);
        }

        let segments = (0..n - 1)
            .map(|i| {
                let m0 = slopes[i];
                let m1 = slopes[i + 1];
                CurveSegment {
                    x_start: xs[i],
                    a: ys[i],
                    b: m0,
                    c: (3.0 * delta[i] - 2.0 * m0 - m1) / h[i],
                    d: (m0 + m1 - 2.0 * delta[i]) / (h[i] * h[i]),
                }
            })
            .collect();

        Ok(PchipCurve {
            xs: xs.to_vec(),
            segments,
            y_last: ys[n - 1],
        })
    }

    /// Knot abscissae
    pub fn knots(&self) -> &[f64] {
        &self.xs
    }

    pub fn segments(&self) -> &[CurveSegment] {
        &self.segments
    }

    /// Evaluate at `x`, holding the boundary values outside the knot range
    pub fn eval(&self, x: f64) -> f64 {
        let n = self.xs.len();
        if x <= self.xs[0] {
            return self.segments[0].a;
        }
        if x >= self.xs[n - 1] {
            return self.y_last;
        }
        let idx = if n <= LINEAR_SCAN_MAX_POINTS {
            self.xs[1..].iter().position(|&k| x < k).unwrap_or(n - 2)
        } else {
            self.xs.partition_point(|&k| k <= x).saturating_sub(1)
        };
        self.segments[idx.min(n - 2)].eval(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_3pt_exact_at_knots() {
        let (x0, x1, x2) = (1.0, 2.0, 4.0);
        let (y0, y1, y2) = (3.0, 5.0, 6.0);
        for (x, y) in [(x0, y0), (x1, y1), (x2, y2)] {
            let v = interpolate_3pt(x, x0, x1, x2, y0, y1, y2).unwrap();
            assert_relative_eq!(v, y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_3pt_order_independent() {
        let a = interpolate_3pt(1.5, 1.0, 2.0, 4.0, 3.0, 5.0, 6.0).unwrap();
        let b = interpolate_3pt(1.5, 4.0, 1.0, 2.0, 6.0, 3.0, 5.0).unwrap();
        assert_relative_eq!(a, b, epsilon = 1e-12);
    }

    #[test]
    fn test_3pt_monotone_no_overshoot() {
        // Sharp step between the last two points
        let (x0, x1, x2) = (0.0, 1.0, 2.0);
        let (y0, y1, y2) = (0.0, 0.1, 10.0);
        let mut prev = f64::NEG_INFINITY;
        for i in 0..=200 {
            let x = i as f64 * 0.01;
            let y = interpolate_3pt(x, x0, x1, x2, y0, y1, y2).unwrap();
            assert!(y >= prev - 1e-12, "not monotone at {}", x);
            assert!(y >= y0 - 1e-12 && y <= y2 + 1e-12);
            prev = y;
        }
    }

    #[test]
    fn test_3pt_decreasing_data() {
        let mut prev = f64::INFINITY;
        for i in 0..=100 {
            let x = 10.0 + i as f64 * 0.3;
            let y = interpolate_3pt(x, 10.0, 20.0, 40.0, 9.0, 4.0, 3.5).unwrap();
            assert!(y <= prev + 1e-12);
            prev = y;
        }
    }

    #[test]
    fn test_3pt_duplicate_x_fails() {
        assert!(interpolate_3pt(1.0, 1.0, 1.0, 2.0, 0.0, 1.0, 2.0).is_err());
    }

    #[test]
    fn test_2pt() {
        assert_relative_eq!(interpolate_2pt(1.5, 1.0, 10.0, 2.0, 20.0).unwrap(), 15.0);
        assert!(matches!(
            interpolate_2pt(1.5, 1.0, 10.0, 1.0, 20.0),
            Err(BallisticsError::ZeroDivision(_))
        ));
    }

    #[test]
    fn test_curve_round_trip() {
        let xs = [0.0, 0.5, 0.9, 1.0, 1.2, 2.0, 3.0];
        let ys = [0.26, 0.27, 0.30, 0.48, 0.63, 0.59, 0.51];
        let curve = PchipCurve::new(&xs, &ys).unwrap();
        assert_eq!(curve.segments().len(), xs.len() - 1);
        for (x, y) in xs.iter().zip(ys.iter()) {
            assert_relative_eq!(curve.eval(*x), *y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_curve_clamps_outside_domain() {
        let curve = PchipCurve::new(&[1.0, 2.0, 3.0], &[5.0, 7.0, 8.0]).unwrap();
        assert_eq!(curve.eval(-10.0), 5.0);
        assert_eq!(curve.eval(99.0), 8.0);
    }

    #[test]
    fn test_curve_two_points_is_linear() {
        let curve = PchipCurve::new(&[0.0, 2.0], &[1.0, 5.0]).unwrap();
        assert_relative_eq!(curve.eval(0.5), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_curve_binary_search_path() {
        let xs: Vec<f64> = (0..40).map(|i| i as f64 * 0.1).collect();
        let ys: Vec<f64> = xs.iter().map(|x| x * x).collect();
        let curve = PchipCurve::new(&xs, &ys).unwrap();
        for (x, y) in xs.iter().zip(ys.iter()) {
            assert_relative_eq!(curve.eval(*x), *y, epsilon = 1e-12);
        }
        let mid = curve.eval(1.55);
        assert!(mid > 1.5 * 1.5 && mid < 1.6 * 1.6);
    }

    #[test]
    fn test_curve_rejects_bad_knots() {
        assert!(PchipCurve::new(&[1.0], &[1.0]).is_err());
        assert!(PchipCurve::new(&[1.0, 1.0], &[1.0, 2.0]).is_err());
        assert!(PchipCurve::new(&[2.0, 1.0], &[1.0, 2.0]).is_err());
    }
}
