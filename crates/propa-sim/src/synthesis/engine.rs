//! Synthesis engine: Markov rain/no-rain chain driving a Gaussian AR(1)
//! process mapped through an exceedance curve.
//!
//! ## Per-step model
//!
//! ```text
//! 1. rain state   WET/DRY Markov transition (stationary P(WET) = P0 / 100)
//! 2. process      X[t] = a·X[t-1] + b·n[t],  a = exp(-Δt/τ), b = sqrt(1 - a²)
//! 3. WET          A[t] = max(floor, A_curve(Q(X[t]) · P0))
//! 4. DRY          A[t] = floor                        (dry_decay_seconds = 0)
//!                 A[t] = floor + (A[t-1] - floor)·exp(-Δt/T_decay)
//! ```
//!
//! `X` is stationary standard normal, so `Q(X)` is uniform on (0, 1) and a
//! WET sample exceeds `A_curve(p)` with probability `p / P0`. Combined with
//! the rain fraction the long-run exceedance matches the curve at every
//! level above the floor. The floor only lifts samples that would fall
//! below it.
//!
//! ## Markov chain with minimum dwell
//!
//! With a minimum dwell of `d` steps a state is only left once it has been
//! occupied for `d` steps; from then on it is left with probability `q` per
//! step, giving a mean run length of `d - 1 + 1/q`. `q` is chosen per state
//! so the mean WET run matches `mean_event_duration_s` and the mean DRY run
//! keeps the stationary WET probability at `P0`.

use super::cancel::CancelToken;
use super::series::TimeSeries;
use super::state::{Clamp, RainState, StepOutcome, SynthesisState};
use propa_core::stats::q_function;
use propa_core::{ExceedanceCurve, PropaError, PropaResult, SynthesisConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tracing::{debug, warn};

/// Upper bound on the samples preallocated for one run
const MAX_PREALLOCATED_STEPS: usize = 1 << 20;

/// Validated synthesis parameters bound to one exceedance curve.
///
/// Immutable and `Send + Sync`; every run owns its own state and RNG, so a
/// single synthesizer can serve many runs concurrently.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    curve: ExceedanceCurve,
    config: SynthesisConfig,
    /// Resolved rain fraction in percent
    rain_fraction: f64,
    ar_a: f64,
    ar_b: f64,
    p_wet_to_dry: f64,
    p_dry_to_wet: f64,
    /// Per-step decay factor towards the floor (0 = immediate)
    dry_decay: f64,
    /// Warnings raised while resolving the parameters
    warnings: Vec<String>,
}

impl Synthesizer {
    /// Validate `config` and tune the rain chain for `curve`.
    ///
    /// When `config.rain_fraction` is `None` it is derived as the probability
    /// at which the curve exceeds `wet_threshold_db`. If that search does not
    /// converge, the nearest bracket endpoint is used and a warning recorded.
    pub fn new(curve: ExceedanceCurve, config: SynthesisConfig) -> PropaResult<Self> {
        config.validate()?;

        let mut warnings = Vec::new();
        let rain_fraction = match config.rain_fraction {
            Some(p0) => p0,
            None => match curve.probability_at(&[config.wet_threshold_db]) {
                Ok(p) => p[0],
                Err(PropaError::Convergence { nearest, .. }) => {
                    let msg = format!(
                        "rain fraction for {} dB did not converge, using {}%",
                        config.wet_threshold_db, nearest
                    );
                    warn!("{}", msg);
                    warnings.push(msg);
                    nearest
                }
                Err(e) => return Err(e),
            },
        };

        let ar_a = (-config.step_seconds / config.tau_seconds).exp();
        let ar_b = (1.0 - ar_a * ar_a).sqrt();

        let dwell = f64::from(config.min_dwell_steps);
        let wet_prob = rain_fraction / 100.0;
        let (p_wet_to_dry, p_dry_to_wet) = if wet_prob >= 1.0 {
            (0.0, 1.0)
        } else {
            let wet_run = (config.mean_event_duration_s / config.step_seconds)
                .max(dwell)
                .max(1.0);
            let dry_run = wet_run * (1.0 - wet_prob) / wet_prob;
            let p_dry_to_wet = if dry_run >= dwell {
                1.0 / (dry_run - dwell + 1.0)
            } else {
                let msg = format!(
                    "mean dry run of {:.2} steps is shorter than the minimum dwell of {} steps; \
                     the rain fraction will be underestimated",
                    dry_run, config.min_dwell_steps
                );
                warn!("{}", msg);
                warnings.push(msg);
                1.0
            };
            (1.0 / (wet_run - dwell + 1.0), p_dry_to_wet)
        };

        let dry_decay = if config.dry_decay_seconds > 0.0 {
            (-config.step_seconds / config.dry_decay_seconds).exp()
        } else {
            0.0
        };

        debug!(
            "Synthesizer: P0 = {:.4}%, a = {:.6}, P(W→D) = {:.3e}, P(D→W) = {:.3e}",
            rain_fraction, ar_a, p_wet_to_dry, p_dry_to_wet
        );

        Ok(Self {
            curve,
            config,
            rain_fraction,
            ar_a,
            ar_b,
            p_wet_to_dry,
            p_dry_to_wet,
            dry_decay,
            warnings,
        })
    }

    pub fn curve(&self) -> &ExceedanceCurve {
        &self.curve
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Rain fraction in percent the chain is tuned to
    pub fn rain_fraction(&self) -> f64 {
        self.rain_fraction
    }

    /// AR(1) coefficients `(a, b)`
    pub fn ar_coefficients(&self) -> (f64, f64) {
        (self.ar_a, self.ar_b)
    }

    /// Per-step transition probabilities `(WET→DRY, DRY→WET)` once the
    /// minimum dwell is met
    pub fn transition_probabilities(&self) -> (f64, f64) {
        (self.p_wet_to_dry, self.p_dry_to_wet)
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Draw a stationary starting state.
    pub fn initial_state<R: Rng>(&self, rng: &mut R) -> SynthesisState {
        let rain_state = if rng.gen::<f64>() < self.rain_fraction / 100.0 {
            RainState::Wet
        } else {
            RainState::Dry
        };
        SynthesisState {
            current_attenuation: self.config.floor_db,
            x: rng.sample(StandardNormal),
            rain_state,
            dwell: self.config.min_dwell_steps,
            time_step_index: 0,
        }
    }

    /// Advance one step, returning the new state and the sample it produced.
    pub fn step<R: Rng>(
        &self,
        state: SynthesisState,
        rng: &mut R,
    ) -> (SynthesisState, StepOutcome) {
        let mut rain_state = state.rain_state;
        let mut dwell = state.dwell;
        if dwell >= self.config.min_dwell_steps {
            let leave = match rain_state {
                RainState::Wet => self.p_wet_to_dry,
                RainState::Dry => self.p_dry_to_wet,
            };
            if rng.gen::<f64>() < leave {
                rain_state = rain_state.toggled();
                dwell = 0;
            }
        }
        dwell = dwell.saturating_add(1);

        let n: f64 = rng.sample(StandardNormal);
        let x = self.ar_a * state.x + self.ar_b * n;

        let floor = self.config.floor_db;
        let mut clamped = None;
        let mut substituted = false;
        let attenuation_db = match rain_state {
            RainState::Wet => {
                let mut p = q_function(x) * self.rain_fraction;
                if p < self.curve.p_min() {
                    p = self.curve.p_min();
                    clamped = Some(Clamp::Low);
                } else if p > self.curve.p_max() {
                    p = self.curve.p_max();
                    clamped = Some(Clamp::High);
                }
                match self.curve.attenuation_at_one(p) {
                    Ok(a) => a.max(floor),
                    Err(_) => {
                        substituted = true;
                        state.current_attenuation
                    }
                }
            }
            RainState::Dry => floor + (state.current_attenuation - floor) * self.dry_decay,
        };

        let index = state.time_step_index;
        let next = SynthesisState {
            current_attenuation: attenuation_db,
            x,
            rain_state,
            dwell,
            time_step_index: index + 1,
        };
        let outcome = StepOutcome {
            index,
            timestamp_s: index as f64 * self.config.step_seconds,
            attenuation_db,
            rain_state,
            clamped,
            substituted,
        };
        (next, outcome)
    }

    /// Endless sample iterator for `seed`; bound it with `take`.
    pub fn run(&self, seed: u64) -> SynthesisRun<'_> {
        let mut rng = StdRng::seed_from_u64(seed);
        let state = self.initial_state(&mut rng);
        SynthesisRun {
            synthesizer: self,
            state,
            rng,
        }
    }

    /// Produce `steps` samples for `seed`.
    pub fn synthesize(&self, steps: usize, seed: u64) -> TimeSeries {
        self.collect(steps, seed, None)
    }

    /// Like [`Synthesizer::synthesize`], stopping early once `cancel` is set.
    /// A cancelled run returns the samples produced so far, marked incomplete.
    pub fn synthesize_until(&self, steps: usize, seed: u64, cancel: &CancelToken) -> TimeSeries {
        self.collect(steps, seed, Some(cancel))
    }

    fn collect(&self, steps: usize, seed: u64, cancel: Option<&CancelToken>) -> TimeSeries {
        debug!("Synthesis run: seed {}, {} steps", seed, steps);

        let mut series =
            TimeSeries::with_capacity(self.config.step_seconds, steps.min(MAX_PREALLOCATED_STEPS));
        let (mut clamped_low, mut clamped_high, mut substituted) = (0, 0, 0);
        let mut cancelled = false;

        let mut run = self.run(seed);
        for _ in 0..steps {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                cancelled = true;
                break;
            }
            let outcome = run.next_outcome();
            match outcome.clamped {
                Some(Clamp::Low) => clamped_low += 1,
                Some(Clamp::High) => clamped_high += 1,
                None => {}
            }
            if outcome.substituted {
                substituted += 1;
            }
            series.push(
                outcome.timestamp_s,
                outcome.attenuation_db,
                outcome.rain_state.is_wet(),
            );
        }

        let produced = series.len();
        let mut warnings = self.warnings.clone();
        if clamped_low + clamped_high > 0 {
            let msg = format!(
                "{} samples clamped to p_min, {} to p_max",
                clamped_low, clamped_high
            );
            warn!(seed = seed, "{}", msg);
            warnings.push(msg);
        }
        if substituted > 0 {
            let msg = format!("{} samples repeated after unusable curve values", substituted);
            warn!(seed = seed, "{}", msg);
            warnings.push(msg);
        }
        if cancelled {
            let msg = format!("cancelled after {} of {} steps", produced, steps);
            warn!(seed = seed, "{}", msg);
            warnings.push(msg);
        }

        let diagnostics = series.diagnostics_mut();
        diagnostics.seed = seed;
        diagnostics.requested_steps = steps;
        diagnostics.completed = !cancelled;
        diagnostics.rain_fraction = self.rain_fraction;
        diagnostics.clamped_low = clamped_low;
        diagnostics.clamped_high = clamped_high;
        diagnostics.substituted = substituted;
        diagnostics.warnings = warnings;

        debug!("Synthesis run {} finished: {} samples", seed, produced);
        series
    }
}

/// Lazy sample stream owning its state and RNG.
pub struct SynthesisRun<'a> {
    synthesizer: &'a Synthesizer,
    state: SynthesisState,
    rng: StdRng,
}

impl SynthesisRun<'_> {
    /// State after the last produced sample
    pub fn state(&self) -> &SynthesisState {
        &self.state
    }

    fn next_outcome(&mut self) -> StepOutcome {
        let (state, outcome) = self.synthesizer.step(self.state, &mut self.rng);
        self.state = state;
        outcome
    }
}

impl Iterator for SynthesisRun<'_> {
    type Item = StepOutcome;

    fn next(&mut self) -> Option<StepOutcome> {
        Some(self.next_outcome())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use propa_core::{LinkContext, LogNormalExceedance};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn site() -> LinkContext {
        LinkContext::new(45.0, 9.0, 20.0, 35.0).unwrap()
    }

    fn lognormal_curve(p_rain: f64) -> ExceedanceCurve {
        ExceedanceCurve::builder(site(), LogNormalExceedance::new(0.5, 1.0, p_rain).unwrap())
            .probability_range(0.001, 50.0)
            .build()
            .unwrap()
    }

    fn fast_config(rain_fraction: Option<f64>) -> SynthesisConfig {
        SynthesisConfig {
            step_seconds: 1.0,
            tau_seconds: 1.0,
            rain_fraction,
            mean_event_duration_s: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_output_length_and_timestamps() {
        let config = SynthesisConfig {
            step_seconds: 10.0,
            ..fast_config(Some(5.0))
        };
        let synth = Synthesizer::new(lognormal_curve(5.0), config).unwrap();
        let ts = synth.synthesize(1_000, 7);
        assert_eq!(ts.len(), 1_000);
        assert!(ts.is_complete());
        assert_eq!(ts.timestamps()[0], 0.0);
        assert_eq!(ts.timestamps()[999], 9_990.0);
        assert!(ts.attenuation_db().iter().all(|a| a.is_finite() && *a >= 0.0));
    }

    #[test]
    fn test_fixed_seed_is_reproducible() {
        let synth = Synthesizer::new(lognormal_curve(5.0), fast_config(Some(5.0))).unwrap();
        let a = synth.synthesize(5_000, 42);
        let b = synth.synthesize(5_000, 42);
        assert_eq!(a, b);
        assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());

        let c = synth.synthesize(5_000, 43);
        assert_ne!(a.attenuation_db(), c.attenuation_db());
    }

    #[test]
    fn test_manual_steps_match_synthesize() {
        let synth = Synthesizer::new(lognormal_curve(5.0), fast_config(Some(5.0))).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let mut state = synth.initial_state(&mut rng);
        let mut manual = Vec::new();
        for _ in 0..500 {
            let (next, outcome) = synth.step(state, &mut rng);
            state = next;
            manual.push(outcome.attenuation_db);
        }
        assert_eq!(state.time_step_index, 500);
        assert_eq!(manual, synth.synthesize(500, 11).attenuation_db());

        let lazy: Vec<f64> = synth.run(11).take(500).map(|o| o.attenuation_db).collect();
        assert_eq!(manual, lazy);
    }

    #[test]
    fn test_ar_coefficients() {
        let config = SynthesisConfig {
            step_seconds: 1.0,
            tau_seconds: 5000.0,
            ..Default::default()
        };
        let synth = Synthesizer::new(lognormal_curve(5.0), config).unwrap();
        let (a, b) = synth.ar_coefficients();
        assert!((a - (-1.0f64 / 5000.0).exp()).abs() < 1e-15);
        assert!((a * a + b * b - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_long_run_matches_curve() {
        let curve = lognormal_curve(5.0);
        let synth = Synthesizer::new(curve.clone(), fast_config(Some(5.0))).unwrap();
        let ts = synth.synthesize(200_000, 2024);

        assert!((ts.wet_fraction() - 0.05).abs() < 0.005, "wet = {}", ts.wet_fraction());

        let ps = [0.1, 1.0, 3.0];
        let thresholds = curve.attenuation_at(&ps).unwrap();
        let ccdf = ts.empirical_ccdf(&thresholds);
        for (p, observed) in ps.iter().zip(&ccdf) {
            assert!(
                (observed / p - 1.0).abs() < 0.25,
                "P(A > A({})) = {}%",
                p,
                observed
            );
        }
    }

    #[test]
    fn test_floor_keeps_curve_above_it() {
        let curve = lognormal_curve(5.0);
        let config = SynthesisConfig {
            floor_db: 1.0,
            ..fast_config(Some(5.0))
        };
        let synth = Synthesizer::new(curve.clone(), config).unwrap();
        let ts = synth.synthesize(200_000, 2024);

        let ps = [0.1, 1.0, 3.0];
        let thresholds = curve.attenuation_at(&ps).unwrap();
        assert!(thresholds.iter().all(|&t| t > 1.0));
        let ccdf = ts.empirical_ccdf(&thresholds);
        for (p, observed) in ps.iter().zip(&ccdf) {
            assert!(
                (observed / p - 1.0).abs() < 0.25,
                "P(A > A({})) = {}%",
                p,
                observed
            );
        }

        assert!(ts.attenuation_db().iter().all(|&a| a >= 1.0));
        assert_eq!(ts.empirical_ccdf(&[0.999])[0], 100.0);
    }

    #[test]
    fn test_rain_fraction_derived_from_curve() {
        let synth = Synthesizer::new(lognormal_curve(4.0), fast_config(None)).unwrap();
        assert!((synth.rain_fraction() / 4.0 - 1.0).abs() < 1e-3);
        assert!(synth.warnings().is_empty());
    }

    #[test]
    fn test_rain_fraction_fallback_on_convergence_failure() {
        // Never reaches 0 dB inside the domain
        let curve = ExceedanceCurve::builder(site(), |_: &LinkContext, p: f64| 3.0 * p.powf(-0.5))
            .probability_range(0.001, 20.0)
            .build()
            .unwrap();
        let synth = Synthesizer::new(curve, fast_config(None)).unwrap();
        assert_eq!(synth.rain_fraction(), 20.0);
        assert_eq!(synth.warnings().len(), 1);

        let ts = synth.synthesize(1_000, 1);
        assert_eq!(ts.len(), 1_000);
        assert!(ts.diagnostics().warnings[0].contains("did not converge"));
    }

    #[test]
    fn test_dry_samples_sit_on_floor() {
        let config = SynthesisConfig {
            floor_db: 0.4,
            ..fast_config(Some(10.0))
        };
        let synth = Synthesizer::new(lognormal_curve(10.0), config).unwrap();
        let ts = synth.synthesize(20_000, 3);
        for (a, wet) in ts.attenuation_db().iter().zip(ts.wet_flags()) {
            if *wet {
                assert!(*a >= 0.4);
            } else {
                assert_eq!(*a, 0.4);
            }
        }
    }

    #[test]
    fn test_dry_decay_relaxes_towards_floor() {
        let config = SynthesisConfig {
            floor_db: 0.2,
            dry_decay_seconds: 5.0,
            ..fast_config(Some(10.0))
        };
        let synth = Synthesizer::new(lognormal_curve(10.0), config).unwrap();
        let ts = synth.synthesize(20_000, 5);
        let a = ts.attenuation_db();
        let wet = ts.wet_flags();

        let mut decays = 0;
        for i in 1..a.len() {
            if !wet[i] {
                assert!(a[i] >= 0.2);
                assert!(a[i] <= a[i - 1]);
                if a[i] > 0.2 {
                    decays += 1;
                }
            }
        }
        assert!(decays > 0);
    }

    #[test]
    fn test_minimum_dwell() {
        let config = SynthesisConfig {
            min_dwell_steps: 5,
            mean_event_duration_s: 8.0,
            ..fast_config(Some(20.0))
        };
        let synth = Synthesizer::new(lognormal_curve(20.0), config).unwrap();
        let ts = synth.synthesize(100_000, 9);
        let flags = ts.wet_flags();

        // Interior runs (excluding the first and last) last at least 5 steps
        let mut runs = Vec::new();
        let mut len = 1;
        for i in 1..flags.len() {
            if flags[i] == flags[i - 1] {
                len += 1;
            } else {
                runs.push(len);
                len = 1;
            }
        }
        assert!(runs.len() > 10);
        assert!(runs[1..].iter().all(|&r| r >= 5), "short run found");
        assert!((ts.wet_fraction() - 0.2).abs() < 0.02, "wet = {}", ts.wet_fraction());
    }

    #[test]
    fn test_infeasible_dwell_warns() {
        let config = SynthesisConfig {
            min_dwell_steps: 10,
            mean_event_duration_s: 10.0,
            ..fast_config(Some(95.0))
        };
        let synth = Synthesizer::new(lognormal_curve(95.0), config).unwrap();
        assert_eq!(synth.warnings().len(), 1);
        assert_eq!(synth.transition_probabilities().1, 1.0);
    }

    #[test]
    fn test_clamping_is_counted() {
        let narrow = ExceedanceCurve::builder(site(), LogNormalExceedance::new(0.5, 1.0, 40.0).unwrap())
            .probability_range(0.5, 10.0)
            .build()
            .unwrap();
        let synth = Synthesizer::new(narrow, fast_config(Some(40.0))).unwrap();
        let ts = synth.synthesize(20_000, 17);
        let d = ts.diagnostics();
        assert!(d.clamped_low > 0);
        assert!(d.clamped_high > 0);
        assert!(!d.warnings.is_empty());
        assert!(ts.attenuation_db().iter().all(|a| a.is_finite()));
    }

    #[test]
    fn test_unusable_curve_values_are_substituted() {
        // NaN in a band the build-time probes do not hit
        let holey = |_: &LinkContext, p: f64| {
            if p > 3.2 && p < 3.5 {
                f64::NAN
            } else {
                5.0 * p.powf(-0.3)
            }
        };
        let curve = ExceedanceCurve::builder(site(), holey)
            .probability_range(0.001, 10.0)
            .build()
            .unwrap();
        let synth = Synthesizer::new(curve, fast_config(Some(10.0))).unwrap();
        let ts = synth.synthesize(50_000, 21);
        assert!(ts.diagnostics().substituted > 0);
        assert!(ts.attenuation_db().iter().all(|a| a.is_finite()));
    }

    #[test]
    fn test_cancellation_returns_partial_series() {
        let token = CancelToken::new();
        let synth = Synthesizer::new(lognormal_curve(5.0), fast_config(Some(5.0))).unwrap();

        token.cancel();
        let ts = synth.synthesize_until(1_000, 1, &token);
        assert!(ts.is_empty());
        assert!(!ts.is_complete());

        let ts = synth.synthesize_until(1_000, 1, &CancelToken::new());
        assert_eq!(ts.len(), 1_000);
        assert!(ts.is_complete());
    }

    #[test]
    fn test_cancellation_mid_run() {
        let token = CancelToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let remote = token.clone();
        let counter = Arc::clone(&calls);
        let cancelling = move |_: &LinkContext, p: f64| {
            // 64 build-time probes, then 100 synthesis steps
            if counter.fetch_add(1, Ordering::Relaxed) == 164 {
                remote.cancel();
            }
            2.0 * p.powf(-0.4)
        };
        let curve = ExceedanceCurve::builder(site(), cancelling)
            .probability_range(0.001, 100.0)
            .build()
            .unwrap();
        let synth = Synthesizer::new(curve, fast_config(Some(100.0))).unwrap();

        let ts = synth.synthesize_until(10_000, 4, &token);
        assert_eq!(ts.len(), 101);
        assert!(!ts.is_complete());
        assert_eq!(ts.diagnostics().requested_steps, 10_000);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let bad_step = SynthesisConfig {
            step_seconds: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            Synthesizer::new(lognormal_curve(5.0), bad_step),
            Err(PropaError::InvalidParameter(_))
        ));

        let bad_fraction = SynthesisConfig {
            rain_fraction: Some(0.0),
            ..Default::default()
        };
        assert!(Synthesizer::new(lognormal_curve(5.0), bad_fraction).is_err());
    }

    #[test]
    fn test_synthesizer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Synthesizer>();
    }
}
