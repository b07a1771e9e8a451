//! Per-run synthesis state and per-step output

use serde::{Deserialize, Serialize};

/// Rain state of the two-state Markov chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RainState {
    Dry,
    Wet,
}

impl RainState {
    pub fn is_wet(self) -> bool {
        self == RainState::Wet
    }

    pub fn toggled(self) -> Self {
        match self {
            RainState::Dry => RainState::Wet,
            RainState::Wet => RainState::Dry,
        }
    }
}

/// State carried from one step to the next.
///
/// The random number generator is owned by the run and passed to
/// [`crate::Synthesizer::step`] alongside this value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynthesisState {
    /// Last emitted attenuation in dB (the floor before the first step)
    pub current_attenuation: f64,
    /// Standard-normal AR(1) process value
    pub x: f64,
    pub rain_state: RainState,
    /// Steps spent in `rain_state` so far
    pub dwell: u32,
    /// Index of the next step to be produced
    pub time_step_index: u64,
}

/// Which end of the curve's probability domain a sample was clamped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Clamp {
    /// Raised to `p_min`
    Low,
    /// Lowered to `p_max`
    High,
}

/// One produced sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub index: u64,
    pub timestamp_s: f64,
    pub attenuation_db: f64,
    pub rain_state: RainState,
    /// Set when the exceedance probability fell outside the curve's domain
    pub clamped: Option<Clamp>,
    /// Set when the curve returned an unusable value and the previous
    /// sample was repeated
    pub substituted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rain_state_toggle() {
        assert_eq!(RainState::Dry.toggled(), RainState::Wet);
        assert_eq!(RainState::Wet.toggled(), RainState::Dry);
        assert!(RainState::Wet.is_wet());
        assert!(!RainState::Dry.is_wet());
    }
}
