//! Scalar root finding used by the statistical models.

use crate::error::{PropaError, PropaResult};

/// Default iteration cap for [`bisect`]
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Find a root of `f` in `[lo, hi]` by bisection.
///
/// `f(lo)` and `f(hi)` must have opposite signs (or one of them be zero).
/// Stops once the bracket is narrower than `xtol`. Returns
/// [`PropaError::Convergence`] if `max_iterations` is reached first.
pub fn bisect<F>(f: F, lo: f64, hi: f64, xtol: f64, max_iterations: usize) -> PropaResult<f64>
where
    F: Fn(f64) -> f64,
{
    if !(lo < hi) || !(xtol > 0.0) {
        return Err(PropaError::InvalidParameter(format!(
            "bisection needs lo < hi and xtol > 0, got [{}, {}] xtol {}",
            lo, hi, xtol
        )));
    }

    let (mut a, mut b) = (lo, hi);
    let fa = f(a);
    let fb = f(b);
    if fa == 0.0 {
        return Ok(a);
    }
    if fb == 0.0 {
        return Ok(b);
    }
    if !(fa.is_finite() && fb.is_finite()) || fa.signum() == fb.signum() {
        return Err(PropaError::InvalidParameter(format!(
            "root not bracketed in [{}, {}]: f = ({}, {})",
            lo, hi, fa, fb
        )));
    }

    let mut fa_sign = fa.signum();
    for _ in 0..max_iterations {
        let mid = 0.5 * (a + b);
        if b - a < xtol {
            return Ok(mid);
        }
        let fm = f(mid);
        if fm == 0.0 {
            return Ok(mid);
        }
        if fm.signum() == fa_sign {
            a = mid;
            fa_sign = fm.signum();
        } else {
            b = mid;
        }
    }

    Err(PropaError::Convergence {
        target: 0.0,
        iterations: max_iterations,
        nearest: 0.5 * (a + b),
    })
}
