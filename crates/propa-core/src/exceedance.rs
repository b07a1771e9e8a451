//! # Exceedance Curves
//!
//! Wraps a closed-form "attenuation exceeded for p % of the time" model as a
//! validated, invertible distribution that the time-series synthesizer can
//! target.
//!
//! ## Forward and inverse lookups
//!
//! - [`ExceedanceCurve::attenuation_at`] evaluates the model on the curve's
//!   probability domain `[p_min, p_max]` (percent).
//! - [`ExceedanceCurve::probability_at`] inverts it with a bounded bisection
//!   in `ln p`. Plateaus are allowed; the smallest probability within the
//!   relative tolerance is returned. Targets outside the curve's range, or
//!   that fall into a jump of the model, produce
//!   [`PropaError::Convergence`] carrying the nearest bracket endpoint.
//!
//! ## Example
//!
//! ```rust
//! use propa_core::exceedance::{ExceedanceCurve, LinkContext, LogNormalExceedance};
//!
//! let site = LinkContext::new(41.39, 2.11, 20.0, 35.0).unwrap();
//! let model = LogNormalExceedance::new(-0.4, 1.3, 5.0).unwrap();
//! let curve = ExceedanceCurve::builder(site, model)
//!     .probability_range(0.001, 50.0)
//!     .build()
//!     .unwrap();
//!
//! let a = curve.attenuation_at(&[0.01, 0.1, 1.0]).unwrap();
//! assert!(a[0] > a[1] && a[1] > a[2]);
//!
//! let p = curve.probability_at(&[a[1]]).unwrap();
//! assert!((p[0] / 0.1 - 1.0).abs() < 1e-3);
//! ```

use crate::error::{PropaError, PropaResult};
use crate::stats::inv_q;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Targets are matched to at least this absolute tolerance in dB
const ABS_TOLERANCE_DB: f64 = 1e-9;

/// Bracket width in `ln p` at which the inverse search stops
const LOG_P_XTOL: f64 = 1e-10;

/// Site, frequency and geometry an exceedance model is evaluated for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkContext {
    /// Ground station latitude in degrees
    pub latitude_deg: f64,
    /// Ground station longitude in degrees
    pub longitude_deg: f64,
    /// Carrier frequency in GHz
    pub frequency_ghz: f64,
    /// Path elevation angle in degrees (0 for horizontal links)
    pub elevation_deg: f64,
}

impl LinkContext {
    /// Create a validated link context
    pub fn new(
        latitude_deg: f64,
        longitude_deg: f64,
        frequency_ghz: f64,
        elevation_deg: f64,
    ) -> PropaResult<Self> {
        if !(-90.0..=90.0).contains(&latitude_deg) {
            return Err(PropaError::out_of_domain("latitude", latitude_deg, -90.0, 90.0));
        }
        if !longitude_deg.is_finite() {
            return Err(PropaError::out_of_domain(
                "longitude",
                longitude_deg,
                f64::NEG_INFINITY,
                f64::INFINITY,
            ));
        }
        if !(frequency_ghz.is_finite() && frequency_ghz > 0.0) {
            return Err(PropaError::out_of_domain("frequency_ghz", frequency_ghz, 0.0, f64::INFINITY));
        }
        if !(0.0..=90.0).contains(&elevation_deg) {
            return Err(PropaError::out_of_domain("elevation", elevation_deg, 0.0, 90.0));
        }
        Ok(Self {
            latitude_deg,
            longitude_deg,
            frequency_ghz,
            elevation_deg,
        })
    }
}

/// Closed-form attenuation-vs-probability model.
///
/// Implementations must be non-increasing in `p` over the curve's domain.
pub trait ExceedanceModel: Send + Sync {
    /// Attenuation in dB exceeded for `p` percent of an average year
    fn attenuation_db(&self, context: &LinkContext, p: f64) -> f64;
}

impl<F> ExceedanceModel for F
where
    F: Fn(&LinkContext, f64) -> f64 + Send + Sync,
{
    fn attenuation_db(&self, context: &LinkContext, p: f64) -> f64 {
        self(context, p)
    }
}

/// Domain and solver settings for exceedance curves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Smallest probability (percent) the curve is evaluated at
    pub p_min: f64,
    /// Largest probability (percent) the curve is evaluated at
    pub p_max: f64,
    /// Relative attenuation tolerance for inverse lookups
    pub relative_tolerance: f64,
    /// Iteration cap for inverse lookups
    pub max_iterations: usize,
    /// Number of log-spaced probes used to check monotonicity at build time
    pub monotonicity_probes: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            p_min: 0.001,
            p_max: 100.0,
            relative_tolerance: 1e-4,
            max_iterations: 100,
            monotonicity_probes: 64,
        }
    }
}

impl SolverConfig {
    /// Validate the solver settings.
    pub fn validate(&self) -> PropaResult<()> {
        if !(self.p_min > 0.0 && self.p_min < self.p_max && self.p_max <= 100.0) {
            return Err(PropaError::InvalidParameter(format!(
                "probability range must satisfy 0 < p_min < p_max <= 100, got [{}, {}]",
                self.p_min, self.p_max
            )));
        }
        if !(self.relative_tolerance.is_finite() && self.relative_tolerance > 0.0) {
            return Err(PropaError::InvalidParameter(format!(
                "relative_tolerance must be positive, got {}",
                self.relative_tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(PropaError::InvalidParameter(
                "max_iterations must be > 0".to_string(),
            ));
        }
        if self.monotonicity_probes < 2 {
            return Err(PropaError::InvalidParameter(
                "monotonicity_probes must be >= 2".to_string(),
            ));
        }
        Ok(())
    }
}

/// Monotone probability → attenuation mapping for one link.
#[derive(Clone)]
pub struct ExceedanceCurve {
    context: LinkContext,
    model: Arc<dyn ExceedanceModel>,
    solver: SolverConfig,
}

impl fmt::Debug for ExceedanceCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceedanceCurve")
            .field("context", &self.context)
            .field("solver", &self.solver)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ExceedanceCurve`].
pub struct CurveBuilder {
    context: LinkContext,
    model: Arc<dyn ExceedanceModel>,
    solver: SolverConfig,
}

impl CurveBuilder {
    /// Probability domain in percent
    pub fn probability_range(mut self, p_min: f64, p_max: f64) -> Self {
        self.solver.p_min = p_min;
        self.solver.p_max = p_max;
        self
    }

    pub fn relative_tolerance(mut self, tolerance: f64) -> Self {
        self.solver.relative_tolerance = tolerance;
        self
    }

    pub fn max_iterations(mut self, iterations: usize) -> Self {
        self.solver.max_iterations = iterations;
        self
    }

    /// Replace all solver settings at once (e.g. from [`crate::config::PropaConfig`])
    pub fn solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Validate the settings and probe the model for monotonicity.
    pub fn build(self) -> PropaResult<ExceedanceCurve> {
        self.solver.validate()?;

        let curve = ExceedanceCurve {
            context: self.context,
            model: self.model,
            solver: self.solver,
        };
        curve.check_monotone()?;

        debug!(
            "Built exceedance curve at ({:.3}, {:.3}), {} GHz, {}° over p = [{}, {}]%",
            curve.context.latitude_deg,
            curve.context.longitude_deg,
            curve.context.frequency_ghz,
            curve.context.elevation_deg,
            curve.solver.p_min,
            curve.solver.p_max
        );
        Ok(curve)
    }
}

impl ExceedanceCurve {
    /// Start building a curve for `model` at `context`.
    pub fn builder<M>(context: LinkContext, model: M) -> CurveBuilder
    where
        M: ExceedanceModel + 'static,
    {
        CurveBuilder {
            context,
            model: Arc::new(model),
            solver: SolverConfig::default(),
        }
    }

    /// Build a curve with default solver settings.
    pub fn build<M>(context: LinkContext, model: M) -> PropaResult<Self>
    where
        M: ExceedanceModel + 'static,
    {
        Self::builder(context, model).build()
    }

    pub fn context(&self) -> &LinkContext {
        &self.context
    }

    pub fn solver(&self) -> &SolverConfig {
        &self.solver
    }

    pub fn p_min(&self) -> f64 {
        self.solver.p_min
    }

    pub fn p_max(&self) -> f64 {
        self.solver.p_max
    }

    /// Attenuation (dB) exceeded for each probability in `ps` (percent).
    pub fn attenuation_at(&self, ps: &[f64]) -> PropaResult<Vec<f64>> {
        ps.iter().map(|&p| self.attenuation_at_one(p)).collect()
    }

    /// Single-probability form of [`ExceedanceCurve::attenuation_at`] for
    /// per-step loops.
    pub fn attenuation_at_one(&self, p: f64) -> PropaResult<f64> {
        if !(p >= self.solver.p_min && p <= self.solver.p_max) {
            return Err(PropaError::out_of_domain(
                "probability",
                p,
                self.solver.p_min,
                self.solver.p_max,
            ));
        }
        let a = self.eval(p);
        if !(a.is_finite() && a >= 0.0) {
            return Err(PropaError::InvalidCurve(format!(
                "model returned {} dB at p = {}%",
                a, p
            )));
        }
        Ok(a)
    }

    /// Probability (percent) at which each attenuation in `attenuations` is
    /// exceeded.
    pub fn probability_at(&self, attenuations: &[f64]) -> PropaResult<Vec<f64>> {
        attenuations.iter().map(|&a| self.invert(a)).collect()
    }

    /// Least-squares lognormal fit of the curve below `p_rain`.
    ///
    /// Fits `ln A(p) = m + sigma * Q⁻¹(p / p_rain)` on log-spaced
    /// probabilities in `[p_min, p_rain)`, ignoring points where the curve
    /// is zero.
    pub fn fit_lognormal(&self, p_rain: f64) -> PropaResult<LogNormalExceedance> {
        if !(p_rain > self.solver.p_min && p_rain <= 100.0) {
            return Err(PropaError::out_of_domain("p_rain", p_rain, self.solver.p_min, 100.0));
        }

        const FIT_POINTS: usize = 40;
        let p_hi = p_rain.min(self.solver.p_max) * 0.999;
        let ratio = (p_hi / self.solver.p_min).ln();

        let mut xs = Vec::with_capacity(FIT_POINTS);
        let mut ys = Vec::with_capacity(FIT_POINTS);
        for k in 0..FIT_POINTS {
            let p = self.solver.p_min * (ratio * k as f64 / (FIT_POINTS - 1) as f64).exp();
            let a = self.eval(p);
            if a.is_finite() && a > 0.0 {
                xs.push(inv_q(p / p_rain));
                ys.push(a.ln());
            }
        }

        if xs.len() < 2 {
            return Err(PropaError::InvalidCurve(
                "not enough non-zero points for a lognormal fit".to_string(),
            ));
        }

        let n = xs.len() as f64;
        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_y = ys.iter().sum::<f64>() / n;
        let sxx: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
        let sxy: f64 = xs.iter().zip(&ys).map(|(x, y)| (x - mean_x) * (y - mean_y)).sum();
        if sxx <= 0.0 {
            return Err(PropaError::InvalidCurve("degenerate lognormal fit".to_string()));
        }
        let sigma = sxy / sxx;
        let m = mean_y - sigma * mean_x;

        LogNormalExceedance::new(m, sigma, p_rain)
    }

    #[inline]
    fn eval(&self, p: f64) -> f64 {
        self.model.attenuation_db(&self.context, p)
    }

    fn check_monotone(&self) -> PropaResult<()> {
        let n = self.solver.monotonicity_probes;
        let ratio = (self.solver.p_max / self.solver.p_min).ln();
        let mut prev: Option<(f64, f64)> = None;

        for k in 0..n {
            let p = (self.solver.p_min * (ratio * k as f64 / (n - 1) as f64).exp())
                .clamp(self.solver.p_min, self.solver.p_max);
            let a = self.eval(p);
            if !(a.is_finite() && a >= 0.0) {
                return Err(PropaError::InvalidCurve(format!(
                    "model returned {} dB at p = {}%",
                    a, p
                )));
            }
            if let Some((p_prev, a_prev)) = prev {
                if a > a_prev * (1.0 + 1e-9) + ABS_TOLERANCE_DB {
                    return Err(PropaError::InvalidCurve(format!(
                        "attenuation increases from {} dB at p = {}% to {} dB at p = {}%",
                        a_prev, p_prev, a, p
                    )));
                }
            }
            prev = Some((p, a));
        }
        Ok(())
    }

    /// Smallest p whose attenuation lies within tolerance of `target`.
    fn invert(&self, target: f64) -> PropaResult<f64> {
        if !(target.is_finite() && target >= 0.0) {
            return Err(PropaError::out_of_domain("attenuation", target, 0.0, f64::INFINITY));
        }

        let tol = (self.solver.relative_tolerance * target).max(ABS_TOLERANCE_DB);
        let (p_min, p_max) = (self.solver.p_min, self.solver.p_max);
        let to_p = |ln_p: f64| ln_p.exp().clamp(p_min, p_max);

        let a_first = self.eval(p_min);
        if a_first <= target + tol {
            if a_first >= target - tol {
                return Ok(p_min);
            }
            return Err(PropaError::Convergence {
                target,
                iterations: 0,
                nearest: p_min,
            });
        }
        if self.eval(p_max) > target + tol {
            return Err(PropaError::Convergence {
                target,
                iterations: 0,
                nearest: p_max,
            });
        }

        // A(lo) is above the tolerance band, A(hi) is at or below its top
        let (mut lo, mut hi) = (p_min.ln(), p_max.ln());
        for iteration in 1..=self.solver.max_iterations {
            let mid = 0.5 * (lo + hi);
            if self.eval(to_p(mid)) > target + tol {
                lo = mid;
            } else {
                hi = mid;
            }

            if hi - lo < LOG_P_XTOL {
                let p = to_p(hi);
                if self.eval(p) >= target - tol {
                    debug!("Inverted {} dB -> p = {}% in {} iterations", target, p, iteration);
                    return Ok(p);
                }
                // The model jumps over the target
                return Err(PropaError::Convergence {
                    target,
                    iterations: iteration,
                    nearest: p,
                });
            }
        }

        let p = to_p(hi);
        if (self.eval(p) - target).abs() <= tol {
            return Ok(p);
        }
        Err(PropaError::Convergence {
            target,
            iterations: self.solver.max_iterations,
            nearest: p,
        })
    }
}

/// Lognormal rain attenuation statistics:
/// `A(p) = exp(m + sigma * Q⁻¹(p / p_rain))` for `p < p_rain`, 0 above.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogNormalExceedance {
    /// Mean of ln A (A in dB)
    pub m: f64,
    /// Standard deviation of ln A
    pub sigma: f64,
    /// Probability of rain in percent
    pub p_rain: f64,
}

impl LogNormalExceedance {
    pub fn new(m: f64, sigma: f64, p_rain: f64) -> PropaResult<Self> {
        if !m.is_finite() {
            return Err(PropaError::InvalidParameter(format!("m must be finite, got {}", m)));
        }
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(PropaError::InvalidParameter(format!(
                "sigma must be positive, got {}",
                sigma
            )));
        }
        if !(p_rain > 0.0 && p_rain <= 100.0) {
            return Err(PropaError::out_of_domain("p_rain", p_rain, 0.0, 100.0));
        }
        Ok(Self { m, sigma, p_rain })
    }
}

impl ExceedanceModel for LogNormalExceedance {
    fn attenuation_db(&self, _context: &LinkContext, p: f64) -> f64 {
        if p >= self.p_rain {
            return 0.0;
        }
        (self.m + self.sigma * inv_q(p / self.p_rain)).exp()
    }
}
