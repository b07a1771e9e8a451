//! # Grid Store
//!
//! Holds the reference maps used by the propagation models, one
//! [`GeophysicalGrid`] per [`Quantity`]. A store is built explicitly by the
//! caller (typically once, right after the files have been parsed), then
//! shared read-only for the rest of the process: it is `Send + Sync` and
//! cheap to clone.
//!
//! ```rust
//! use propa_core::grid::GeophysicalGrid;
//! use propa_core::grid_store::{GridStore, Quantity};
//!
//! let grid = GeophysicalGrid::builder()
//!     .latitude(-90.0, 90.0)
//!     .longitude(-180.0, 180.0)
//!     .resolution(1.125)
//!     .wrap_longitude(true)
//!     .build_with(|lat, _lon| 7.5 * lat.to_radians().cos())
//!     .unwrap();
//!
//! let store = GridStore::new()
//!     .with_grid(Quantity::SurfaceWaterVapourDensity, grid)
//!     .unwrap();
//!
//! let rho = store
//!     .interpolate(&Quantity::SurfaceWaterVapourDensity, &[45.0], &[2.35])
//!     .unwrap();
//! assert_eq!(rho.unit(), "g/m³");
//! assert_eq!(rho.len(), 1);
//! ```

use crate::error::{PropaError, PropaResult};
use crate::grid::GeophysicalGrid;
use crate::interpolation;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Physical quantity held by a reference map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    /// Surface water-vapour density (P.836)
    SurfaceWaterVapourDensity,
    /// Total columnar water-vapour content (P.836)
    TotalColumnWaterVapour,
    /// Wet term of surface refractivity (P.453)
    WetRefractivity,
    /// Refractivity gradient in the lowest 65 m (P.453)
    RefractivityGradient,
    /// Rainfall rate exceeded for 0.01 % of an average year (P.837-7)
    RainfallRate001,
    /// Monthly mean total rainfall, month 1..=12 (P.837-7)
    MonthlyTotalRainfall(u8),
    /// Monthly mean surface temperature, month 1..=12 (P.1510)
    MonthlyMeanSurfaceTemperature(u8),
    /// Annual mean surface temperature (P.1510)
    AnnualMeanSurfaceTemperature,
    /// Probability of rainy 6-hour periods (P.837-6 Pr6)
    RainProbability,
    /// Annual mean total rainfall (P.837-6 Mt)
    AnnualTotalRainfall,
    /// Ratio of convective to total rainfall (P.837-6 β)
    ConvectiveRainRatio,
    /// Mean 0 °C isotherm height above sea level (P.839)
    ZeroDegreeIsothermHeight,
    /// Topographic altitude above sea level (P.1511)
    TopographicAltitude,
    /// Total columnar cloud liquid water content (P.840)
    CloudLiquidWater,
    /// Caller-defined quantity
    Custom(String),
}

impl Quantity {
    /// Unit of the stored values
    pub fn unit(&self) -> &'static str {
        match self {
            Quantity::SurfaceWaterVapourDensity => "g/m³",
            Quantity::TotalColumnWaterVapour => "kg/m²",
            Quantity::WetRefractivity => "N-units",
            Quantity::RefractivityGradient => "N-units/km",
            Quantity::RainfallRate001 => "mm/h",
            Quantity::MonthlyTotalRainfall(_) => "mm",
            Quantity::MonthlyMeanSurfaceTemperature(_) => "K",
            Quantity::AnnualMeanSurfaceTemperature => "K",
            Quantity::RainProbability => "%",
            Quantity::AnnualTotalRainfall => "mm",
            Quantity::ConvectiveRainRatio => "",
            Quantity::ZeroDegreeIsothermHeight => "km",
            Quantity::TopographicAltitude => "km",
            Quantity::CloudLiquidWater => "kg/m²",
            Quantity::Custom(_) => "",
        }
    }

    fn month(&self) -> Option<u8> {
        match self {
            Quantity::MonthlyTotalRainfall(m) | Quantity::MonthlyMeanSurfaceTemperature(m) => Some(*m),
            _ => None,
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::SurfaceWaterVapourDensity => f.write_str("surface water-vapour density"),
            Quantity::TotalColumnWaterVapour => f.write_str("total columnar water vapour"),
            Quantity::WetRefractivity => f.write_str("wet refractivity"),
            Quantity::RefractivityGradient => f.write_str("refractivity gradient"),
            Quantity::RainfallRate001 => f.write_str("rainfall rate exceeded 0.01%"),
            Quantity::MonthlyTotalRainfall(m) => write!(f, "monthly total rainfall (month {})", m),
            Quantity::MonthlyMeanSurfaceTemperature(m) => {
                write!(f, "monthly mean surface temperature (month {})", m)
            }
            Quantity::AnnualMeanSurfaceTemperature => f.write_str("annual mean surface temperature"),
            Quantity::RainProbability => f.write_str("rain probability"),
            Quantity::AnnualTotalRainfall => f.write_str("annual total rainfall"),
            Quantity::ConvectiveRainRatio => f.write_str("convective rain ratio"),
            Quantity::ZeroDegreeIsothermHeight => f.write_str("0°C isotherm height"),
            Quantity::TopographicAltitude => f.write_str("topographic altitude"),
            Quantity::CloudLiquidWater => f.write_str("cloud liquid water"),
            Quantity::Custom(name) => f.write_str(name),
        }
    }
}

/// Interpolated values tagged with the quantity they came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterpolatedValues {
    quantity: Quantity,
    values: Vec<f64>,
}

impl InterpolatedValues {
    pub fn quantity(&self) -> &Quantity {
        &self.quantity
    }

    pub fn unit(&self) -> &'static str {
        self.quantity.unit()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Read-only collection of reference maps keyed by quantity.
#[derive(Debug, Clone, Default)]
pub struct GridStore {
    grids: HashMap<Quantity, Arc<GeophysicalGrid>>,
}

impl GridStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a grid, replacing any previous grid for the same quantity.
    pub fn insert(&mut self, quantity: Quantity, grid: GeophysicalGrid) -> PropaResult<()> {
        if let Some(month) = quantity.month() {
            if !(1..=12).contains(&month) {
                return Err(PropaError::InvalidParameter(format!(
                    "month must be 1-12, got {}",
                    month
                )));
            }
        }

        debug!(
            "Registering {} grid: {}x{} at {}°{}",
            quantity,
            grid.rows(),
            grid.cols(),
            grid.resolution_deg(),
            if grid.wrap_longitude() { " (wrapped)" } else { "" }
        );
        self.grids.insert(quantity, Arc::new(grid));
        Ok(())
    }

    /// Builder-style [`GridStore::insert`].
    pub fn with_grid(mut self, quantity: Quantity, grid: GeophysicalGrid) -> PropaResult<Self> {
        self.insert(quantity, grid)?;
        Ok(self)
    }

    /// Remove a grid, returning it if present
    pub fn remove(&mut self, quantity: &Quantity) -> Option<Arc<GeophysicalGrid>> {
        self.grids.remove(quantity)
    }

    /// Grid registered for `quantity`.
    pub fn get(&self, quantity: &Quantity) -> PropaResult<&GeophysicalGrid> {
        self.grids
            .get(quantity)
            .map(|g| g.as_ref())
            .ok_or_else(|| PropaError::MissingGrid(quantity.clone()))
    }

    pub fn contains(&self, quantity: &Quantity) -> bool {
        self.grids.contains_key(quantity)
    }

    /// Registered quantities, in no particular order
    pub fn quantities(&self) -> impl Iterator<Item = &Quantity> {
        self.grids.keys()
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }

    /// Interpolate the grid for `quantity` at each `(lats[i], lons[i])`.
    pub fn interpolate(
        &self,
        quantity: &Quantity,
        lats: &[f64],
        lons: &[f64],
    ) -> PropaResult<InterpolatedValues> {
        let grid = self.get(quantity)?;
        let values = interpolation::interpolate(grid, lats, lons)?;
        Ok(InterpolatedValues {
            quantity: quantity.clone(),
            values,
        })
    }
}
