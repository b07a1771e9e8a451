//! Independent synthesis runs over many seeds.
//!
//! With the `parallel` feature (on by default) runs are spread over the
//! rayon thread pool; otherwise they run in order on the calling thread.
//! Either way the output for each seed is identical to a single
//! [`Synthesizer::synthesize`] call and keeps the order of `seeds`.

use crate::synthesis::{CancelToken, Synthesizer, TimeSeries};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::debug;

/// Run `synthesizer` once per seed, `steps` samples each.
pub fn synthesize_batch(synthesizer: &Synthesizer, seeds: &[u64], steps: usize) -> Vec<TimeSeries> {
    debug!("Batch synthesis: {} runs of {} steps", seeds.len(), steps);

    #[cfg(feature = "parallel")]
    let iter = seeds.par_iter();
    #[cfg(not(feature = "parallel"))]
    let iter = seeds.iter();

    iter.map(|&seed| synthesizer.synthesize(steps, seed)).collect()
}

/// [`synthesize_batch`] sharing one cancellation token across all runs.
///
/// Runs that had not finished when the token was set come back partial.
pub fn synthesize_batch_until(
    synthesizer: &Synthesizer,
    seeds: &[u64],
    steps: usize,
    cancel: &CancelToken,
) -> Vec<TimeSeries> {
    #[cfg(feature = "parallel")]
    let iter = seeds.par_iter();
    #[cfg(not(feature = "parallel"))]
    let iter = seeds.iter();

    iter.map(|&seed| synthesizer.synthesize_until(steps, seed, cancel))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use propa_core::{ExceedanceCurve, LinkContext, LogNormalExceedance, SynthesisConfig};

    fn synthesizer() -> Synthesizer {
        let site = LinkContext::new(1.35, 103.8, 30.0, 60.0).unwrap();
        let curve = ExceedanceCurve::builder(site, LogNormalExceedance::new(1.2, 1.0, 8.0).unwrap())
            .probability_range(0.001, 50.0)
            .build()
            .unwrap();
        let config = SynthesisConfig {
            step_seconds: 1.0,
            tau_seconds: 30.0,
            rain_fraction: Some(8.0),
            mean_event_duration_s: 20.0,
            ..Default::default()
        };
        Synthesizer::new(curve, config).unwrap()
    }

    #[test]
    fn test_batch_matches_single_runs() {
        let synth = synthesizer();
        let seeds = [1, 2, 3, 5, 8, 13];
        let batch = synthesize_batch(&synth, &seeds, 2_000);

        assert_eq!(batch.len(), seeds.len());
        for (seed, series) in seeds.iter().zip(&batch) {
            assert_eq!(series.diagnostics().seed, *seed);
            assert_eq!(series, &synth.synthesize(2_000, *seed));
        }
    }

    #[test]
    fn test_cancelled_batch() {
        let synth = synthesizer();
        let cancel = CancelToken::new();
        cancel.cancel();
        let batch = synthesize_batch_until(&synth, &[1, 2, 3], 1_000, &cancel);
        assert!(batch.iter().all(|s| s.is_empty() && !s.is_complete()));
    }
}
