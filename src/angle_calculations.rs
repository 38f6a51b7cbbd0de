//! Bracketing root finder and one-dimensional maximizer used by the solvers.
//!
//! Both accept fallible objectives: an integration error inside the
//! objective aborts the search and is returned unchanged.

use crate::error::Result;

const INV_PHI: f64 = 0.618_033_988_749_894_8;

/// Final bracket of a root search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub low: f64,
    pub high: f64,
    pub f_low: f64,
    pub f_high: f64,
}

impl Bracket {
    pub fn width(&self) -> f64 {
        (self.high - self.low).abs()
    }

    pub fn is_sign_changing(&self) -> bool {
        self.f_low * self.f_high < 0.0
    }
}

/// Result of angle calculation
#[derive(Debug, Clone)]
pub struct AngleResult {
    pub angle_rad: f64,
    pub iterations_used: usize,
    pub final_error: f64,
    pub success: bool,
    pub bracket: Bracket,
}

#[inline]
fn same_sign(a: f64, b: f64) -> bool {
    (a < 0.0) == (b < 0.0)
}

/// Ridder's method on a pre-evaluated bracket.
///
/// Converges when `|f| < tolerance` at the new estimate or the bracket
/// narrows below `tolerance`. When the iteration cap is hit, or the bracket
/// degenerates, the best estimate comes back with `success == false` and the
/// last bracket so callers can apply their own acceptance rules.
pub fn ridder_root_find<F>(
    mut f: F,
    bracket: Bracket,
    tolerance: f64,
    max_iterations: usize,
) -> Result<AngleResult>
where
    F: FnMut(f64) -> Result<f64>,
{
    let Bracket {
        mut low,
        mut high,
        mut f_low,
        mut f_high,
    } = bracket;

    let mut best = if f_low.abs() < f_high.abs() { (low, f_low) } else { (high, f_high) };
    let mut iterations = 0;

    while iterations < max_iterations {
        iterations += 1;

        let mid = 0.5 * (low + high);
        let f_mid = f(mid)?;
        let s = (f_mid * f_mid - f_low * f_high).sqrt();
        if s == 0.0 || !s.is_finite() {
            break;
        }

        let direction = if f_low >= f_high { 1.0 } else { -1.0 };
        let next = mid + (mid - low) * direction * f_mid / s;
        let f_next = f(next)?;

        if f_next.abs() < best.1.abs() {
            best = (next, f_next);
        }
        if f_next.abs() < tolerance {
            return Ok(AngleResult {
                angle_rad: next,
                iterations_used: iterations,
                final_error: f_next.abs(),
                success: true,
                bracket: Bracket { low, high, f_low, f_high },
            });
        }

        if !same_sign(f_mid, f_next) {
            low = mid;
            f_low = f_mid;
            high = next;
            f_high = f_next;
        } else if !same_sign(f_low, f_next) {
            high = next;
            f_high = f_next;
        } else if !same_sign(f_high, f_next) {
            low = next;
            f_low = f_next;
        } else {
            break;
        }
        if low > high {
            std::mem::swap(&mut low, &mut high);
            std::mem::swap(&mut f_low, &mut f_high);
        }

        if (high - low).abs() < tolerance {
            return Ok(AngleResult {
                angle_rad: best.0,
                iterations_used: iterations,
                final_error: best.1.abs(),
                success: true,
                bracket: Bracket { low, high, f_low, f_high },
            });
        }
    }

    Ok(AngleResult {
        angle_rad: best.0,
        iterations_used: iterations,
        final_error: best.1.abs(),
        success: false,
        bracket: Bracket { low, high, f_low, f_high },
    })
}

/// Outcome of a golden-section search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaximumResult {
    pub x: f64,
    pub value: f64,
    pub iterations_used: usize,
}

/// Golden-section search for the maximum of a unimodal `f` on `[low, high]`
pub fn golden_section_max<F>(
    mut f: F,
    low: f64,
    high: f64,
    tolerance: f64,
    max_iterations: usize,
) -> Result<MaximumResult>
where
    F: FnMut(f64) -> Result<f64>,
{
    let (mut a, mut b) = if low <= high { (low, high) } else { (high, low) };
    let mut c = b - INV_PHI * (b - a);
    let mut d = a + INV_PHI * (b - a);
    let mut fc = f(c)?;
    let mut fd = f(d)?;

    let mut iterations = 0;
    while iterations < max_iterations && (b - a).abs() > tolerance {
        iterations += 1;
        if fc > fd {
            b = d;
            d = c;
            fd = fc;
            c = b - INV_PHI * (b - a);
            fc = f(c)?;
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + INV_PHI * (b - a);
            fd = f(d)?;
        }
    }

    let x = 0.5 * (a + b);
    let value = f(x)?;
    Ok(MaximumResult {
        x,
        value,
        iterations_used: iterations,
    })
}
