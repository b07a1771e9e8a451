//! Propagation core error types

use crate::grid_store::Quantity;
use thiserror::Error;

/// Result type for propagation core operations
pub type PropaResult<T> = Result<T, PropaError>;

/// Errors that can occur while building grids, querying them, or inverting
/// exceedance curves
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PropaError {
    /// Query outside the valid latitude/longitude or probability range
    #[error("{what} = {value} is outside the valid range [{min}, {max}]")]
    OutOfDomain {
        what: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Bracketed search did not reach the requested tolerance
    #[error(
        "search for {target} did not converge after {iterations} iterations (nearest = {nearest})"
    )]
    Convergence {
        target: f64,
        iterations: usize,
        /// Bracket endpoint closest to the target, usable as a fallback
        /// (a probability in percent when inverting an exceedance curve)
        nearest: f64,
    },

    /// Grid dimensions or metadata are inconsistent
    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    /// Latitude and longitude arrays differ in length
    #[error("Query length mismatch: {lats} latitudes, {lons} longitudes")]
    LengthMismatch { lats: usize, lons: usize },

    /// No grid registered for the requested quantity
    #[error("No grid loaded for {0}")]
    MissingGrid(Quantity),

    /// Exceedance model is not usable as a distribution
    #[error("Invalid exceedance curve: {0}")]
    InvalidCurve(String),

    /// Invalid scalar parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Configuration could not be located, read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PropaError {
    /// Build an out-of-domain error
    pub(crate) fn out_of_domain(what: &'static str, value: f64, min: f64, max: f64) -> Self {
        PropaError::OutOfDomain {
            what,
            value,
            min,
            max,
        }
    }

    /// Check if the caller can recover by widening a bracket or falling back
    /// to the reported endpoint
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PropaError::Convergence { .. })
    }

    /// Check if this is a domain error on the query itself
    pub fn is_domain_error(&self) -> bool {
        matches!(self, PropaError::OutOfDomain { .. } | PropaError::LengthMismatch { .. })
    }
}
