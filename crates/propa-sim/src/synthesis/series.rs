//! Synthesized attenuation time series and run diagnostics

use propa_core::{PropaError, PropaResult};
use serde::{Deserialize, Serialize};

/// How a run went: what was corrected and whether it finished.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SynthesisDiagnostics {
    pub seed: u64,
    pub requested_steps: usize,
    /// False when the run was cancelled before `requested_steps`
    pub completed: bool,
    /// Rain fraction (percent) the Markov chain was tuned to
    pub rain_fraction: f64,
    /// Samples whose probability was raised to the curve's `p_min`
    pub clamped_low: usize,
    /// Samples whose probability was lowered to the curve's `p_max`
    pub clamped_high: usize,
    /// Samples replaced by the previous valid value
    pub substituted: usize,
    pub warnings: Vec<String>,
}

/// Ordered `(timestamp, attenuation)` samples from one synthesis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    step_seconds: f64,
    timestamps_s: Vec<f64>,
    attenuation_db: Vec<f64>,
    wet: Vec<bool>,
    diagnostics: SynthesisDiagnostics,
}

impl TimeSeries {
    pub(crate) fn with_capacity(step_seconds: f64, capacity: usize) -> Self {
        Self {
            step_seconds,
            timestamps_s: Vec::with_capacity(capacity),
            attenuation_db: Vec::with_capacity(capacity),
            wet: Vec::with_capacity(capacity),
            diagnostics: SynthesisDiagnostics::default(),
        }
    }

    pub(crate) fn push(&mut self, timestamp_s: f64, attenuation_db: f64, wet: bool) {
        self.timestamps_s.push(timestamp_s);
        self.attenuation_db.push(attenuation_db);
        self.wet.push(wet);
    }

    pub(crate) fn diagnostics_mut(&mut self) -> &mut SynthesisDiagnostics {
        &mut self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.attenuation_db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attenuation_db.is_empty()
    }

    pub fn step_seconds(&self) -> f64 {
        self.step_seconds
    }

    /// Sample times in seconds from the start of the run
    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps_s
    }

    /// Attenuation samples in dB
    pub fn attenuation_db(&self) -> &[f64] {
        &self.attenuation_db
    }

    /// Rain state of each sample
    pub fn wet_flags(&self) -> &[bool] {
        &self.wet
    }

    /// `(timestamp, attenuation)` pairs
    pub fn samples(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.timestamps_s
            .iter()
            .copied()
            .zip(self.attenuation_db.iter().copied())
    }

    pub fn diagnostics(&self) -> &SynthesisDiagnostics {
        &self.diagnostics
    }

    pub fn is_complete(&self) -> bool {
        self.diagnostics.completed
    }

    /// Fraction of samples (0..1) strictly above `threshold_db`.
    pub fn exceedance_fraction(&self, threshold_db: f64) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let above = self
            .attenuation_db
            .iter()
            .filter(|&&a| a > threshold_db)
            .count();
        above as f64 / self.len() as f64
    }

    /// Percentage of time each threshold is exceeded.
    pub fn empirical_ccdf(&self, thresholds_db: &[f64]) -> Vec<f64> {
        if self.is_empty() {
            return vec![0.0; thresholds_db.len()];
        }

        let mut sorted = self.attenuation_db.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let n = sorted.len() as f64;

        thresholds_db
            .iter()
            .map(|&t| {
                let at_or_below = sorted.partition_point(|&a| a <= t);
                100.0 * (sorted.len() - at_or_below) as f64 / n
            })
            .collect()
    }

    /// Fraction of samples (0..1) produced in the WET state
    pub fn wet_fraction(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.wet.iter().filter(|&&w| w).count() as f64 / self.len() as f64
    }

    pub fn mean_db(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(self.attenuation_db.iter().sum::<f64>() / self.len() as f64)
    }

    pub fn max_db(&self) -> Option<f64> {
        self.attenuation_db.iter().copied().reduce(f64::max)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> PropaResult<String> {
        serde_json::to_string(self).map_err(|e| PropaError::Serialization(e.to_string()))
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> PropaResult<Self> {
        serde_json::from_str(json).map_err(|e| PropaError::Serialization(e.to_string()))
    }
}
