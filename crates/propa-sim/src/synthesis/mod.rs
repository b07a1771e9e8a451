//! # Rain Attenuation Time-Series Synthesis
//!
//! Generates time-ordered attenuation samples whose long-run distribution
//! follows an [`ExceedanceCurve`], with a two-state (WET/DRY) rain process
//! and a temporally correlated Gaussian driver.
//!
//! Runs are deterministic for a given seed. Each run owns its state and
//! RNG; the [`Synthesizer`] itself is immutable and can be shared between
//! threads.
//!
//! ## Example
//!
//! ```rust
//! use propa_core::{ExceedanceCurve, LinkContext, LogNormalExceedance};
//! use propa_sim::synthesis::synthesize;
//!
//! let site = LinkContext::new(52.2, 0.12, 20.0, 30.0).unwrap();
//! let curve = ExceedanceCurve::builder(site, LogNormalExceedance::new(-0.3, 1.1, 4.0).unwrap())
//!     .probability_range(0.001, 50.0)
//!     .build()
//!     .unwrap();
//!
//! let series = synthesize(&curve, 3_600, 1.0, 60.0, Some(4.0), 42).unwrap();
//! assert_eq!(series.len(), 3_600);
//! assert!(series.is_complete());
//! ```

pub mod cancel;
pub mod engine;
pub mod series;
pub mod state;

pub use cancel::CancelToken;
pub use engine::{SynthesisRun, Synthesizer};
pub use series::{SynthesisDiagnostics, TimeSeries};
pub use state::{Clamp, RainState, StepOutcome, SynthesisState};

use propa_core::{ExceedanceCurve, PropaResult, SynthesisConfig};

/// Synthesize `duration_steps` samples spaced `step_seconds` apart.
///
/// `rain_fraction` is the percentage of time raining; pass `None` to derive
/// it from the curve. Other settings take their [`SynthesisConfig`]
/// defaults; build a [`Synthesizer`] directly to change them.
pub fn synthesize(
    curve: &ExceedanceCurve,
    duration_steps: usize,
    step_seconds: f64,
    tau_seconds: f64,
    rain_fraction: Option<f64>,
    seed: u64,
) -> PropaResult<TimeSeries> {
    let config = SynthesisConfig {
        step_seconds,
        tau_seconds,
        rain_fraction,
        ..Default::default()
    };
    let synthesizer = Synthesizer::new(curve.clone(), config)?;
    Ok(synthesizer.synthesize(duration_steps, seed))
}
