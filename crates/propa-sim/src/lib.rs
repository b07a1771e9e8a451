//! # Propagation Time-Series Simulation
//!
//! Synthetic rain attenuation time series for link-level simulation, driven
//! by the exceedance curves of [`propa_core`].
//!
//! ## Overview
//!
//! - **Synthesis**: seeded WET/DRY Markov chain plus correlated Gaussian
//!   process, mapped through the curve ([`synthesis`])
//! - **Batch runs**: many seeds at once, in parallel with the `parallel`
//!   feature ([`batch`])
//!
//! ## Signal Flow
//!
//! ```text
//! seed → StdRng → Markov state ─┐
//!            └──→ AR(1) X[t] ───┴→ Q(X)·P0 → ExceedanceCurve → A[t] (dB)
//! ```

pub mod batch;
pub mod synthesis;

// Re-export main types
pub use batch::{synthesize_batch, synthesize_batch_until};
pub use synthesis::{
    synthesize, CancelToken, RainState, StepOutcome, SynthesisDiagnostics, SynthesisRun,
    SynthesisState, Synthesizer, TimeSeries,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::batch::synthesize_batch;
    pub use crate::synthesis::{synthesize, CancelToken, Synthesizer, TimeSeries};
    pub use propa_core::prelude::*;
}
