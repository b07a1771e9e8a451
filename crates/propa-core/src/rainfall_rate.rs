//! # Rainfall Rate Statistics
//!
//! Point rainfall rate exceeded for p % of an average year, computed from the
//! reference maps in a [`GridStore`] (ITU-R P.837).
//!
//! Two editions are supported, selected per model instance:
//!
//! | Version | Maps used | Method |
//! |---------|-----------|--------|
//! | P.837-7 | R0.01, monthly total rainfall, monthly mean temperature | Monthly lognormal mixture, inverted by bisection |
//! | P.837-6 | Pr6, annual total rainfall, convective ratio β | Closed-form quadratic in R |
//!
//! Monthly temperature maps are in kelvin.

use crate::error::{PropaError, PropaResult};
use crate::grid_store::{GridStore, Quantity};
use crate::numeric::{bisect, DEFAULT_MAX_ITERATIONS};
use crate::stats::q_function;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Days per month of the average year
const DAYS_IN_MONTH: [f64; 12] = [
    31.0, 28.25, 31.0, 30.0, 31.0, 30.0, 31.0, 31.0, 30.0, 31.0, 30.0, 31.0,
];

const DAYS_IN_YEAR: f64 = 365.25;

/// Monthly rain probability cap (%)
const MAX_MONTHLY_P0: f64 = 70.0;

/// Bisection bracket for the rain rate (mm/h)
const RATE_BRACKET: (f64, f64) = (1e-10, 1000.0);
const RATE_XTOL: f64 = 1e-5;

/// Edition of the rainfall-rate recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RainfallVersion {
    /// P.837-7 (06/2017)
    #[default]
    V7,
    /// P.837-6 (02/2012)
    V6,
}

impl RainfallVersion {
    /// Maps a store must hold for this edition
    pub fn required_quantities(self) -> Vec<Quantity> {
        match self {
            RainfallVersion::V7 => {
                let mut q = vec![Quantity::RainfallRate001];
                for m in 1..=12 {
                    q.push(Quantity::MonthlyTotalRainfall(m));
                    q.push(Quantity::MonthlyMeanSurfaceTemperature(m));
                }
                q
            }
            RainfallVersion::V6 => vec![
                Quantity::RainProbability,
                Quantity::AnnualTotalRainfall,
                Quantity::ConvectiveRainRatio,
            ],
        }
    }
}

/// Per-site monthly parameters of the P.837-7 mixture
#[derive(Debug, Clone, Copy)]
struct MonthlyRain {
    /// Probability of rain in the month (%)
    p0: f64,
    /// Mean rain rate scale (mm/h)
    r: f64,
}

/// Rainfall rate model bound to a set of reference maps.
#[derive(Debug, Clone)]
pub struct RainfallRateModel {
    store: GridStore,
    version: RainfallVersion,
}

impl RainfallRateModel {
    /// Bind `store` to `version`, checking every required map is present.
    pub fn new(store: GridStore, version: RainfallVersion) -> PropaResult<Self> {
        for quantity in version.required_quantities() {
            if !store.contains(&quantity) {
                return Err(PropaError::MissingGrid(quantity));
            }
        }
        Ok(Self { store, version })
    }

    pub fn version(&self) -> RainfallVersion {
        self.version
    }

    /// Rainfall rate (mm/h) exceeded for `p` % of the year at each site.
    pub fn rainfall_rate(&self, lats: &[f64], lons: &[f64], p: f64) -> PropaResult<Vec<f64>> {
        check_probability(p)?;
        match self.version {
            RainfallVersion::V7 => self.rate_v7(lats, lons, p),
            RainfallVersion::V6 => self.rate_v6(lats, lons, p),
        }
    }

    /// Annual probability of rain (%) at each site.
    pub fn rain_probability(&self, lats: &[f64], lons: &[f64]) -> PropaResult<Vec<f64>> {
        match self.version {
            RainfallVersion::V7 => Ok(self
                .monthly_v7(lats, lons)?
                .iter()
                .map(|months| annual_p0(months))
                .collect()),
            RainfallVersion::V6 => Ok(self
                .params_v6(lats, lons)?
                .into_iter()
                .map(|(p0, _, _)| p0)
                .collect()),
        }
    }

    fn rate_v7(&self, lats: &[f64], lons: &[f64], p: f64) -> PropaResult<Vec<f64>> {
        if p == 0.01 {
            return Ok(self
                .store
                .interpolate(&Quantity::RainfallRate001, lats, lons)?
                .into_values());
        }

        let monthly = self.monthly_v7(lats, lons)?;
        let mut rates = Vec::with_capacity(monthly.len());
        for months in &monthly {
            let p0 = annual_p0(months);
            if p > p0 {
                rates.push(0.0);
                continue;
            }
            let excess = |rate: f64| 100.0 * (exceedance_v7(months, rate) / p - 1.0);
            let rate = bisect(
                excess,
                RATE_BRACKET.0,
                RATE_BRACKET.1,
                RATE_XTOL,
                DEFAULT_MAX_ITERATIONS,
            )?;
            rates.push(rate);
        }
        debug!("P.837-7 rainfall rate at {}% for {} sites", p, rates.len());
        Ok(rates)
    }

    fn monthly_v7(&self, lats: &[f64], lons: &[f64]) -> PropaResult<Vec<[MonthlyRain; 12]>> {
        let mut out = vec![[MonthlyRain { p0: 0.0, r: 0.0 }; 12]; lats.len()];

        for (m, &days) in DAYS_IN_MONTH.iter().enumerate() {
            let month = (m + 1) as u8;
            let totals = self
                .store
                .interpolate(&Quantity::MonthlyTotalRainfall(month), lats, lons)?;
            let temps = self
                .store
                .interpolate(&Quantity::MonthlyMeanSurfaceTemperature(month), lats, lons)?;

            for (site, (&mt, &kelvin)) in totals.values().iter().zip(temps.values()).enumerate() {
                out[site][m] = monthly_rain(mt, kelvin, days);
            }
        }
        Ok(out)
    }

    fn rate_v6(&self, lats: &[f64], lons: &[f64], p: f64) -> PropaResult<Vec<f64>> {
        Ok(self
            .params_v6(lats, lons)?
            .into_iter()
            .map(|(p0, mc, ms)| {
                if p0.is_nan() || p > p0 {
                    return 0.0;
                }
                let a = 1.09;
                let b = (mc + ms) / (21797.0 * p0);
                let c = 26.02 * b;
                let big_a = a * b;
                let big_b = a + c * (p / p0).ln();
                let big_c = (p / p0).ln();
                (-big_b + (big_b * big_b - 4.0 * big_a * big_c).sqrt()) / (2.0 * big_a)
            })
            .collect())
    }

    /// (P0, Mc, Ms) per site
    fn params_v6(&self, lats: &[f64], lons: &[f64]) -> PropaResult<Vec<(f64, f64, f64)>> {
        let pr6 = self.store.interpolate(&Quantity::RainProbability, lats, lons)?;
        let mt = self.store.interpolate(&Quantity::AnnualTotalRainfall, lats, lons)?;
        let beta = self.store.interpolate(&Quantity::ConvectiveRainRatio, lats, lons)?;

        Ok(pr6
            .values()
            .iter()
            .zip(mt.values())
            .zip(beta.values())
            .map(|((&pr6, &mt), &beta)| {
                let mc = beta * mt;
                let ms = (1.0 - beta) * mt;
                let p0 = if pr6 > 0.0 {
                    pr6 * (1.0 - (-0.0079 * ms / pr6).exp())
                } else {
                    0.0
                };
                (p0, mc, ms)
            })
            .collect())
    }
}

fn check_probability(p: f64) -> PropaResult<()> {
    if p > 0.0 && p <= 100.0 {
        Ok(())
    } else {
        Err(PropaError::out_of_domain("probability", p, 0.0, 100.0))
    }
}

fn monthly_rain(total_mm: f64, kelvin: f64, days: f64) -> MonthlyRain {
    let t = kelvin - 273.15;
    let r = if t >= 0.0 { 0.5874 * (0.0883 * t).exp() } else { 0.5874 };
    let p0 = 100.0 * total_mm / (24.0 * days * r);
    if p0 > MAX_MONTHLY_P0 {
        MonthlyRain {
            p0: MAX_MONTHLY_P0,
            r: 100.0 / MAX_MONTHLY_P0 * total_mm / (24.0 * days),
        }
    } else {
        MonthlyRain { p0, r }
    }
}

fn annual_p0(months: &[MonthlyRain; 12]) -> f64 {
    months
        .iter()
        .zip(DAYS_IN_MONTH)
        .map(|(m, days)| days * m.p0)
        .sum::<f64>()
        / DAYS_IN_YEAR
}

/// Annual probability (%) that the rain rate exceeds `rate`
fn exceedance_v7(months: &[MonthlyRain; 12], rate: f64) -> f64 {
    months
        .iter()
        .zip(DAYS_IN_MONTH)
        .map(|(m, days)| days * m.p0 * q_function((rate.ln() + 0.7938 - m.r.ln()) / 1.26))
        .sum::<f64>()
        / DAYS_IN_YEAR
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GeophysicalGrid;

    fn constant(value: f64) -> GeophysicalGrid {
        GeophysicalGrid::builder()
            .latitude(-90.0, 90.0)
            .longitude(-180.0, 170.0)
            .resolution(10.0)
            .wrap_longitude(true)
            .build_with(|_, _| value)
            .unwrap()
    }

    fn v7_store(monthly_total: f64, kelvin: f64) -> GridStore {
        let mut store = GridStore::new();
        store.insert(Quantity::RainfallRate001, constant(42.0)).unwrap();
        for m in 1..=12 {
            store
                .insert(Quantity::MonthlyTotalRainfall(m), constant(monthly_total))
                .unwrap();
            store
                .insert(Quantity::MonthlyMeanSurfaceTemperature(m), constant(kelvin))
                .unwrap();
        }
        store
    }

    fn v6_store(pr6: f64, mt: f64, beta: f64) -> GridStore {
        GridStore::new()
            .with_grid(Quantity::RainProbability, constant(pr6))
            .and_then(|s| s.with_grid(Quantity::AnnualTotalRainfall, constant(mt)))
            .and_then(|s| s.with_grid(Quantity::ConvectiveRainRatio, constant(beta)))
            .unwrap()
    }

    #[test]
    fn test_missing_maps_rejected() {
        let err = RainfallRateModel::new(GridStore::new(), RainfallVersion::V7).unwrap_err();
        assert_eq!(err, PropaError::MissingGrid(Quantity::RainfallRate001));

        let err = RainfallRateModel::new(v7_store(80.0, 290.0), RainfallVersion::V6).unwrap_err();
        assert!(matches!(err, PropaError::MissingGrid(_)));
    }

    #[test]
    fn test_v7_r001_comes_from_map() {
        let model = RainfallRateModel::new(v7_store(80.0, 290.0), RainfallVersion::V7).unwrap();
        let r = model.rainfall_rate(&[40.0, -12.0], &[3.0, 250.0], 0.01).unwrap();
        assert_eq!(r, vec![42.0, 42.0]);
    }

    #[test]
    fn test_v7_rain_probability() {
        let model = RainfallRateModel::new(v7_store(100.0, 293.15), RainfallVersion::V7).unwrap();
        let p0 = model.rain_probability(&[10.0], &[10.0]).unwrap()[0];

        let r = 0.5874 * (0.0883f64 * 20.0).exp();
        let expected = 12.0 * 100.0 * 100.0 / (24.0 * r) / DAYS_IN_YEAR;
        assert!((p0 - expected).abs() < 1e-9, "P0 = {}, expected {}", p0, expected);
    }

    #[test]
    fn test_v7_monthly_cap() {
        let model = RainfallRateModel::new(v7_store(5000.0, 280.0), RainfallVersion::V7).unwrap();
        let p0 = model.rain_probability(&[0.0], &[0.0]).unwrap()[0];
        assert!((p0 - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_v7_rate_inverts_exceedance() {
        let store = v7_store(100.0, 293.15);
        let model = RainfallRateModel::new(store, RainfallVersion::V7).unwrap();
        let monthly = model.monthly_v7(&[10.0], &[10.0]).unwrap();

        let rates = [0.1, 1.0]
            .iter()
            .map(|&p| model.rainfall_rate(&[10.0], &[10.0], p).unwrap()[0])
            .collect::<Vec<_>>();
        assert!(rates[0] > rates[1] && rates[1] > 0.0);

        let back = exceedance_v7(&monthly[0], rates[0]);
        assert!((back / 0.1 - 1.0).abs() < 1e-3, "P(R >= {}) = {}", rates[0], back);
    }

    #[test]
    fn test_v7_above_rain_probability_is_dry() {
        let model = RainfallRateModel::new(v7_store(20.0, 263.0), RainfallVersion::V7).unwrap();
        let p0 = model.rain_probability(&[0.0], &[0.0]).unwrap()[0];
        let r = model.rainfall_rate(&[0.0], &[0.0], (p0 * 1.5).min(100.0)).unwrap();
        assert_eq!(r, vec![0.0]);
    }

    #[test]
    fn test_v6_closed_form() {
        let model = RainfallRateModel::new(v6_store(5.0, 1000.0, 0.3), RainfallVersion::V6).unwrap();
        let p0 = model.rain_probability(&[45.0], &[7.0]).unwrap()[0];
        let expected_p0 = 5.0 * (1.0 - (-0.0079f64 * 700.0 / 5.0).exp());
        assert!((p0 - expected_p0).abs() < 1e-12);

        let r001 = model.rainfall_rate(&[45.0], &[7.0], 0.01).unwrap()[0];
        let r1 = model.rainfall_rate(&[45.0], &[7.0], 1.0).unwrap()[0];
        assert!(r001 > r1 && r1 > 0.0, "R0.01 = {}, R1 = {}", r001, r1);

        // The quadratic vanishes at p = P0
        let at_p0 = model.rainfall_rate(&[45.0], &[7.0], p0).unwrap()[0];
        assert!(at_p0.abs() < 1e-12);
    }

    #[test]
    fn test_v6_no_rain() {
        let model = RainfallRateModel::new(v6_store(0.0, 0.0, 0.0), RainfallVersion::V6).unwrap();
        assert_eq!(model.rainfall_rate(&[0.0], &[0.0], 0.01).unwrap(), vec![0.0]);
        assert_eq!(model.rain_probability(&[0.0], &[0.0]).unwrap(), vec![0.0]);
    }

    #[test]
    fn test_probability_domain() {
        let model = RainfallRateModel::new(v6_store(5.0, 1000.0, 0.3), RainfallVersion::V6).unwrap();
        for p in [0.0, -1.0, 100.5, f64::NAN] {
            let err = model.rainfall_rate(&[0.0], &[0.0], p).unwrap_err();
            assert!(err.is_domain_error(), "p = {}", p);
        }
    }

    #[test]
    fn test_latitude_domain_propagates() {
        let model = RainfallRateModel::new(v6_store(5.0, 1000.0, 0.3), RainfallVersion::V6).unwrap();
        assert!(model.rainfall_rate(&[95.0], &[0.0], 0.1).is_err());
    }
}
