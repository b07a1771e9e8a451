//! # Propagation Core Library
//!
//! Building blocks for atmospheric propagation models on Earth-space and
//! terrestrial radio links.
//!
//! ## Overview
//!
//! The recommendations that predict gaseous, cloud and rain attenuation all
//! start from global reference maps of meteorological quantities, and most of
//! them end in a statistical curve of attenuation versus percentage of time.
//! This crate provides both ends:
//!
//! - **Geophysical grids**: validated regular lat/lon maps ([`grid`]) held
//!   in an explicit, shareable [`grid_store::GridStore`]
//! - **Interpolation**: vectorized bilinear lookups with longitude wrap and
//!   pole handling ([`interpolation`])
//! - **Exceedance curves**: forward and inverse lookups over any closed-form
//!   attenuation model ([`exceedance`])
//! - **Rainfall rate**: P.837-7 / P.837-6 rain statistics over the store
//!   ([`rainfall_rate`])
//! - **Configuration and logging**: YAML config and `tracing` setup
//!   ([`config`], [`observe`])
//!
//! ## Data Flow
//!
//! ```text
//! parsed maps → GridStore → interpolate(lat[], lon[]) → model inputs
//!                                                          │
//!       closed-form model + LinkContext → ExceedanceCurve ─┴→ synthesizer
//! ```
//!
//! ## Example
//!
//! ```rust
//! use propa_core::prelude::*;
//!
//! let rho = GeophysicalGrid::builder()
//!     .latitude(-90.0, 90.0)
//!     .longitude(0.0, 359.0)
//!     .resolution(1.0)
//!     .wrap_longitude(true)
//!     .build_with(|lat, _lon| 12.0 * lat.to_radians().cos())
//!     .unwrap();
//!
//! let store = GridStore::new()
//!     .with_grid(Quantity::SurfaceWaterVapourDensity, rho)
//!     .unwrap();
//!
//! // Scalar callers pass length-1 slices
//! let v = store
//!     .interpolate(&Quantity::SurfaceWaterVapourDensity, &[48.85], &[-2.35])
//!     .unwrap();
//! assert!(v.values()[0] > 7.0 && v.values()[0] < 8.5);
//! ```

pub mod config;
pub mod error;
pub mod exceedance;
pub mod grid;
pub mod grid_store;
pub mod interpolation;
pub mod numeric;
pub mod observe;
pub mod rainfall_rate;
pub mod stats;

// Re-export main types
pub use config::{PropaConfig, SynthesisConfig};
pub use error::{PropaError, PropaResult};
pub use exceedance::{ExceedanceCurve, ExceedanceModel, LinkContext, LogNormalExceedance, SolverConfig};
pub use grid::{GeophysicalGrid, GridBuilder, GridRecord};
pub use grid_store::{GridStore, InterpolatedValues, Quantity};
pub use interpolation::interpolate;
pub use rainfall_rate::{RainfallRateModel, RainfallVersion};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{PropaConfig, SynthesisConfig};
    pub use crate::error::{PropaError, PropaResult};
    pub use crate::exceedance::{ExceedanceCurve, ExceedanceModel, LinkContext, LogNormalExceedance};
    pub use crate::grid::GeophysicalGrid;
    pub use crate::grid_store::{GridStore, Quantity};
    pub use crate::rainfall_rate::{RainfallRateModel, RainfallVersion};
}
