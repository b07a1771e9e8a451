//! # Bilinear Grid Interpolation
//!
//! Resolves arbitrary (lat, lon) queries against a [`GeophysicalGrid`].
//!
//! ## Algorithm
//!
//! For each query point:
//! 1. Latitude offset from `lat_min` divided by the resolution gives the row
//!    index and fraction. Rows are clamped at the poles, never wrapped.
//! 2. Longitude is reduced to the grid's own convention. Wrapping grids reduce
//!    the column index modulo the wrap period so the cell spanning the seam is
//!    interpolated across it; regional grids try the ±360° aliases and reject
//!    anything still outside.
//! 3. The four corner values are blended with the usual bilinear weights.
//!    Corners with zero weight are skipped, so a query on a node returns the
//!    stored value exactly even when a neighbour is NaN.
//!
//! Latitude is a hard domain: a query outside `[lat_min, lat_max]` is an
//! error, except that a grid whose last row lies less than one resolution step
//! from a pole is taken to cover that pole (the polar strip reads the nearest
//! row).

use crate::error::{PropaError, PropaResult};
use crate::grid::GeophysicalGrid;

/// Fractions closer than this (in index units) to a node snap onto it.
const NODE_SNAP: f64 = 1e-9;

/// Enclosing cell of a query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub row0: usize,
    pub row1: usize,
    pub col0: usize,
    pub col1: usize,
    /// Fraction of the way from `row0` to `row1`
    pub fy: f64,
    /// Fraction of the way from `col0` to `col1`
    pub fx: f64,
}

/// Interpolate `grid` at each `(lats[i], lons[i])`.
///
/// Scalar callers pass length-1 slices.
pub fn interpolate(grid: &GeophysicalGrid, lats: &[f64], lons: &[f64]) -> PropaResult<Vec<f64>> {
    if lats.len() != lons.len() {
        return Err(PropaError::LengthMismatch {
            lats: lats.len(),
            lons: lons.len(),
        });
    }

    lats.iter()
        .zip(lons)
        .map(|(&lat, &lon)| {
            let cell = locate(grid, lat, lon)?;
            Ok(blend(grid, &cell))
        })
        .collect()
}

/// Find the cell enclosing `(lat, lon)`.
pub fn locate(grid: &GeophysicalGrid, lat: f64, lon: f64) -> PropaResult<Cell> {
    let (row0, row1, fy) = locate_lat(grid, lat)?;
    let (col0, col1, fx) = locate_lon(grid, lon)?;
    Ok(Cell {
        row0,
        row1,
        col0,
        col1,
        fy,
        fx,
    })
}

/// Weighted sum of the cell corners, skipping zero-weight corners.
fn blend(grid: &GeophysicalGrid, cell: &Cell) -> f64 {
    let corners = [
        (cell.row0, cell.col0, (1.0 - cell.fy) * (1.0 - cell.fx)),
        (cell.row0, cell.col1, (1.0 - cell.fy) * cell.fx),
        (cell.row1, cell.col0, cell.fy * (1.0 - cell.fx)),
        (cell.row1, cell.col1, cell.fy * cell.fx),
    ];

    corners
        .iter()
        .filter(|(_, _, w)| *w != 0.0)
        .map(|&(r, c, w)| w * grid.value(r, c))
        .sum()
}

/// Latitude domain actually accepted for `grid`, including polar strips.
pub fn latitude_domain(grid: &GeophysicalGrid) -> (f64, f64) {
    let res = grid.resolution_deg();
    let lo = if grid.lat_min() + 90.0 < res { -90.0 } else { grid.lat_min() };
    let hi = if 90.0 - grid.lat_max() < res { 90.0 } else { grid.lat_max() };
    (lo, hi)
}

fn locate_lat(grid: &GeophysicalGrid, lat: f64) -> PropaResult<(usize, usize, f64)> {
    let (lo, hi) = latitude_domain(grid);
    if !lat.is_finite() || lat < lo || lat > hi {
        return Err(PropaError::out_of_domain("latitude", lat, lo, hi));
    }

    let last = grid.rows() - 1;
    let y = snap((lat - grid.lat_min()) / grid.resolution_deg());
    if y <= 0.0 {
        return Ok((0, 0, 0.0));
    }
    let j0 = y.floor() as usize;
    if j0 >= last {
        return Ok((last, last, 0.0));
    }
    Ok((j0, j0 + 1, y - j0 as f64))
}

fn locate_lon(grid: &GeophysicalGrid, lon: f64) -> PropaResult<(usize, usize, f64)> {
    if !lon.is_finite() {
        return Err(PropaError::out_of_domain(
            "longitude",
            lon,
            grid.lon_min(),
            grid.lon_max(),
        ));
    }

    let res = grid.resolution_deg();

    if grid.wrap_longitude() {
        let period = grid.lon_period();
        let seam = grid.cols() > period;
        if seam && snap((lon - grid.lon_min()) / res) == period as f64 {
            return Ok((period, period, 0.0));
        }
        let mut x = snap((lon - grid.lon_min()).rem_euclid(360.0) / res);
        if x >= period as f64 {
            x -= period as f64;
        }
        let i0 = x.floor() as usize % period;
        let i1 = if seam { i0 + 1 } else { (i0 + 1) % period };
        return Ok((i0, i1, x - x.floor()));
    }

    // Snap first so queries a hair outside the edge stay on the grid, then
    // bring the rest into [lon_min, lon_min + 360)
    let last = grid.cols() - 1;
    let direct = snap((lon - grid.lon_min()) / res);
    let x = if (0.0..=last as f64).contains(&direct) {
        direct
    } else {
        snap((lon - grid.lon_min()).rem_euclid(360.0) / res)
    };
    if x > last as f64 {
        return Err(PropaError::out_of_domain(
            "longitude",
            lon,
            grid.lon_min(),
            grid.lon_max(),
        ));
    }
    let i0 = x.floor() as usize;
    if i0 >= last {
        return Ok((last, last, 0.0));
    }
    Ok((i0, i0 + 1, x - i0 as f64))
}

#[inline]
fn snap(index: f64) -> f64 {
    let nearest = index.round();
    if (index - nearest).abs() < NODE_SNAP {
        nearest
    } else {
        index
    }
}
