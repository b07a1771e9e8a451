//! # Geophysical Grids
//!
//! Regular latitude/longitude meshes holding one physical quantity each
//! (water-vapour density, refractivity, rainfall statistics, ...).
//!
//! ## Layout
//!
//! Values are stored row-major with row 0 at `lat_min` and column 0 at
//! `lon_min`:
//!
//! ```text
//! rows = (lat_max - lat_min) / resolution + 1
//! cols = (lon_max - lon_min) / resolution + 1
//! ```
//!
//! Reference files are often ordered north to south; use
//! [`GridBuilder::north_to_south`] to flip them on construction.
//!
//! ## Longitude wraparound
//!
//! A grid marked `wrap_longitude` must cover the full circle, either with
//! `360 / resolution` columns or with one extra column duplicating the seam
//! (e.g. -180..180 inclusive). A duplicated seam column must repeat column 0.
//! The wrap period is recorded at construction so the interpolator never
//! scans for it.
//!
//! ## Example
//!
//! ```rust
//! use propa_core::grid::GeophysicalGrid;
//!
//! let grid = GeophysicalGrid::builder()
//!     .latitude(-90.0, 90.0)
//!     .longitude(0.0, 359.0)
//!     .resolution(1.0)
//!     .wrap_longitude(true)
//!     .build_with(|lat, lon| lat + lon / 1000.0)
//!     .unwrap();
//!
//! assert_eq!(grid.rows(), 181);
//! assert_eq!(grid.cols(), 360);
//! ```

use crate::error::{PropaError, PropaResult};
use serde::{Deserialize, Serialize};

/// Relative slack allowed when checking that a span is a whole number of
/// resolution steps.
const STEP_TOLERANCE: f64 = 1e-6;

/// Largest node count accepted for one grid (about 2 GiB of `f64`).
const MAX_GRID_NODES: usize = 1 << 28;

/// Immutable regular lat/lon grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GridRecord", into = "GridRecord")]
pub struct GeophysicalGrid {
    values: Vec<f64>,
    rows: usize,
    cols: usize,
    lat_min: f64,
    lat_max: f64,
    lon_min: f64,
    lon_max: f64,
    resolution_deg: f64,
    wrap_longitude: bool,
    /// Distinct columns per 360° (only meaningful when wrapping)
    lon_period: usize,
}

/// Serialized form of a grid, as handed over by a file loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridRecord {
    /// Rows ordered from `lat_min` to `lat_max`
    pub values: Vec<Vec<f64>>,
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
    pub resolution_deg: f64,
    #[serde(default)]
    pub wrap_longitude: bool,
}

impl TryFrom<GridRecord> for GeophysicalGrid {
    type Error = PropaError;

    fn try_from(record: GridRecord) -> PropaResult<Self> {
        GeophysicalGrid::builder()
            .latitude(record.lat_min, record.lat_max)
            .longitude(record.lon_min, record.lon_max)
            .resolution(record.resolution_deg)
            .wrap_longitude(record.wrap_longitude)
            .rows(record.values)
            .build()
    }
}

impl From<GeophysicalGrid> for GridRecord {
    fn from(grid: GeophysicalGrid) -> Self {
        let values = grid
            .values
            .chunks(grid.cols)
            .map(|row| row.to_vec())
            .collect();
        Self {
            values,
            lat_min: grid.lat_min,
            lat_max: grid.lat_max,
            lon_min: grid.lon_min,
            lon_max: grid.lon_max,
            resolution_deg: grid.resolution_deg,
            wrap_longitude: grid.wrap_longitude,
        }
    }
}

impl GeophysicalGrid {
    /// Start building a grid.
    pub fn builder() -> GridBuilder {
        GridBuilder::default()
    }

    /// Number of latitude rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of longitude columns
    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn lat_min(&self) -> f64 {
        self.lat_min
    }

    pub fn lat_max(&self) -> f64 {
        self.lat_max
    }

    pub fn lon_min(&self) -> f64 {
        self.lon_min
    }

    pub fn lon_max(&self) -> f64 {
        self.lon_max
    }

    /// Node spacing in degrees (same for latitude and longitude)
    pub fn resolution_deg(&self) -> f64 {
        self.resolution_deg
    }

    /// Whether longitude wraps around the antimeridian
    pub fn wrap_longitude(&self) -> bool {
        self.wrap_longitude
    }

    /// Distinct columns per full turn of longitude.
    ///
    /// Equals `cols()` unless the seam column is duplicated.
    pub fn lon_period(&self) -> usize {
        self.lon_period
    }

    /// Stored value at a node.
    ///
    /// # Panics
    ///
    /// Panics if `row` or `col` is out of bounds.
    #[inline]
    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.cols + col]
    }

    /// Latitude of a node row in degrees
    pub fn node_lat(&self, row: usize) -> f64 {
        self.lat_min + row as f64 * self.resolution_deg
    }

    /// Longitude of a node column in degrees
    pub fn node_lon(&self, col: usize) -> f64 {
        self.lon_min + col as f64 * self.resolution_deg
    }

    /// Row-major value slice
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Builder for [`GeophysicalGrid`]; validation happens in [`GridBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct GridBuilder {
    lat: Option<(f64, f64)>,
    lon: Option<(f64, f64)>,
    resolution_deg: Option<f64>,
    wrap_longitude: bool,
    north_to_south: bool,
    rows: Vec<Vec<f64>>,
}

impl GridBuilder {
    /// Latitude extent of the node mesh in degrees
    pub fn latitude(mut self, lat_min: f64, lat_max: f64) -> Self {
        self.lat = Some((lat_min, lat_max));
        self
    }

    /// Longitude extent of the node mesh in degrees
    pub fn longitude(mut self, lon_min: f64, lon_max: f64) -> Self {
        self.lon = Some((lon_min, lon_max));
        self
    }

    /// Node spacing in degrees
    pub fn resolution(mut self, resolution_deg: f64) -> Self {
        self.resolution_deg = Some(resolution_deg);
        self
    }

    pub fn wrap_longitude(mut self, wrap: bool) -> Self {
        self.wrap_longitude = wrap;
        self
    }

    /// Rows are supplied from `lat_max` down to `lat_min`.
    pub fn north_to_south(mut self, descending: bool) -> Self {
        self.north_to_south = descending;
        self
    }

    /// Value rows, one `Vec` per latitude.
    pub fn rows(mut self, rows: Vec<Vec<f64>>) -> Self {
        self.rows = rows;
        self
    }

    /// Validate and build the grid from the supplied rows.
    pub fn build(self) -> PropaResult<GeophysicalGrid> {
        let geometry = self.geometry()?;

        if self.rows.len() != geometry.rows {
            return Err(PropaError::InvalidGrid(format!(
                "expected {} latitude rows, got {}",
                geometry.rows,
                self.rows.len()
            )));
        }

        let mut values = Vec::with_capacity(geometry.rows * geometry.cols);
        let ordered: Box<dyn Iterator<Item = &Vec<f64>>> = if self.north_to_south {
            Box::new(self.rows.iter().rev())
        } else {
            Box::new(self.rows.iter())
        };
        for (i, row) in ordered.enumerate() {
            if row.len() != geometry.cols {
                return Err(PropaError::InvalidGrid(format!(
                    "row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    geometry.cols
                )));
            }
            values.extend_from_slice(row);
        }

        geometry.into_grid(values)
    }

    /// Validate the geometry and fill every node from `f(lat, lon)`.
    ///
    /// Handy for analytic test fields and for resampling.
    pub fn build_with<F>(self, f: F) -> PropaResult<GeophysicalGrid>
    where
        F: Fn(f64, f64) -> f64,
    {
        let geometry = self.geometry()?;
        let mut values = Vec::with_capacity(geometry.rows * geometry.cols);
        for r in 0..geometry.rows {
            let lat = geometry.lat_min + r as f64 * geometry.resolution_deg;
            for c in 0..geometry.cols {
                let lon = geometry.lon_min + c as f64 * geometry.resolution_deg;
                values.push(f(lat, lon));
            }
        }
        geometry.into_grid(values)
    }

    fn geometry(&self) -> PropaResult<Geometry> {
        let (lat_min, lat_max) = self
            .lat
            .ok_or_else(|| PropaError::InvalidGrid("latitude extent not set".to_string()))?;
        let (lon_min, lon_max) = self
            .lon
            .ok_or_else(|| PropaError::InvalidGrid("longitude extent not set".to_string()))?;
        let resolution_deg = self
            .resolution_deg
            .ok_or_else(|| PropaError::InvalidGrid("resolution not set".to_string()))?;

        if !(resolution_deg.is_finite() && resolution_deg > 0.0) {
            return Err(PropaError::InvalidGrid(format!(
                "resolution must be positive, got {}",
                resolution_deg
            )));
        }
        if !(lat_min.is_finite() && lat_max.is_finite() && lon_min.is_finite() && lon_max.is_finite()) {
            return Err(PropaError::InvalidGrid("non-finite grid extent".to_string()));
        }
        if lat_min < -90.0 || lat_max > 90.0 || lat_min >= lat_max {
            return Err(PropaError::InvalidGrid(format!(
                "latitude extent [{}, {}] must be increasing within [-90, 90]",
                lat_min, lat_max
            )));
        }
        if lon_min >= lon_max || lon_max - lon_min > 360.0 + STEP_TOLERANCE {
            return Err(PropaError::InvalidGrid(format!(
                "longitude extent [{}, {}] must be increasing and span at most 360°",
                lon_min, lon_max
            )));
        }

        let rows = whole_steps(lat_max - lat_min, resolution_deg, "latitude")? + 1;
        let cols = whole_steps(lon_max - lon_min, resolution_deg, "longitude")? + 1;
        if rows.saturating_mul(cols) > MAX_GRID_NODES {
            return Err(PropaError::InvalidGrid(format!(
                "{} x {} nodes at {}° resolution exceeds the {} node limit",
                rows, cols, resolution_deg, MAX_GRID_NODES
            )));
        }

        let lon_period = if self.wrap_longitude {
            let period = whole_steps(360.0, resolution_deg, "360° longitude")?;
            if cols == period || cols == period + 1 {
                period
            } else {
                return Err(PropaError::InvalidGrid(format!(
                    "wrap_longitude needs global coverage: {} columns for a {}-column period",
                    cols, period
                )));
            }
        } else {
            cols
        };

        Ok(Geometry {
            rows,
            cols,
            lat_min,
            lat_max,
            lon_min,
            lon_max,
            resolution_deg,
            wrap_longitude: self.wrap_longitude,
            lon_period,
        })
    }
}

struct Geometry {
    rows: usize,
    cols: usize,
    lat_min: f64,
    lat_max: f64,
    lon_min: f64,
    lon_max: f64,
    resolution_deg: f64,
    wrap_longitude: bool,
    lon_period: usize,
}

impl Geometry {
    fn into_grid(self, values: Vec<f64>) -> PropaResult<GeophysicalGrid> {
        // A duplicated seam column must repeat column 0
        if self.wrap_longitude && self.cols > self.lon_period {
            for (r, row) in values.chunks(self.cols).enumerate() {
                let (first, seam) = (row[0], row[self.lon_period]);
                if !same_node_value(first, seam) {
                    return Err(PropaError::InvalidGrid(format!(
                        "seam column differs from column 0 in row {}: {} vs {}",
                        r, seam, first
                    )));
                }
            }
        }

        Ok(GeophysicalGrid {
            values,
            rows: self.rows,
            cols: self.cols,
            lat_min: self.lat_min,
            lat_max: self.lat_max,
            lon_min: self.lon_min,
            lon_max: self.lon_max,
            resolution_deg: self.resolution_deg,
            wrap_longitude: self.wrap_longitude,
            lon_period: self.lon_period,
        })
    }
}

fn same_node_value(a: f64, b: f64) -> bool {
    if a.is_nan() || b.is_nan() {
        return a.is_nan() && b.is_nan();
    }
    (a - b).abs() <= STEP_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

/// Number of resolution steps in `span`, which must be whole.
fn whole_steps(span: f64, resolution_deg: f64, axis: &str) -> PropaResult<usize> {
    let steps = span / resolution_deg;
    if steps >= MAX_GRID_NODES as f64 {
        return Err(PropaError::InvalidGrid(format!(
            "{} span {} at {}° resolution needs too many nodes",
            axis, span, resolution_deg
        )));
    }
    let rounded = steps.round();
    if (steps - rounded).abs() > STEP_TOLERANCE * rounded.max(1.0) {
        return Err(PropaError::InvalidGrid(format!(
            "{} span {} is not a multiple of the {}° resolution",
            axis, span, resolution_deg
        )));
    }
    Ok(rounded as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_rows() -> Vec<Vec<f64>> {
        vec![
            vec![1.0, 2.0, 3.0],
            vec![4.0, 5.0, 6.0],
        ]
    }

    #[test]
    fn test_build_from_rows() {
        let grid = GeophysicalGrid::builder()
            .latitude(10.0, 11.0)
            .longitude(20.0, 22.0)
            .resolution(1.0)
            .rows(small_rows())
            .build()
            .unwrap();

        assert_eq!(grid.rows(), 2);
        assert_eq!(grid.cols(), 3);
        assert_eq!(grid.value(0, 0), 1.0);
        assert_eq!(grid.value(1, 2), 6.0);
        assert_eq!(grid.node_lat(1), 11.0);
        assert_eq!(grid.node_lon(2), 22.0);
        assert_eq!(grid.lon_period(), 3);
    }

    #[test]
    fn test_north_to_south_flips_rows() {
        let grid = GeophysicalGrid::builder()
            .latitude(10.0, 11.0)
            .longitude(20.0, 22.0)
            .resolution(1.0)
            .north_to_south(true)
            .rows(small_rows())
            .build()
            .unwrap();

        // First supplied row is the northern one
        assert_eq!(grid.value(1, 0), 1.0);
        assert_eq!(grid.value(0, 0), 4.0);
    }

    #[test]
    fn test_row_count_mismatch() {
        let err = GeophysicalGrid::builder()
            .latitude(10.0, 12.0)
            .longitude(20.0, 22.0)
            .resolution(1.0)
            .rows(small_rows())
            .build()
            .unwrap_err();
        assert!(matches!(err, PropaError::InvalidGrid(_)));
    }

    #[test]
    fn test_ragged_row_rejected() {
        let err = GeophysicalGrid::builder()
            .latitude(10.0, 11.0)
            .longitude(20.0, 22.0)
            .resolution(1.0)
            .rows(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0]])
            .build()
            .unwrap_err();
        assert!(matches!(err, PropaError::InvalidGrid(_)));
    }

    #[test]
    fn test_invalid_resolution() {
        for res in [0.0, -1.0, f64::NAN] {
            let err = GeophysicalGrid::builder()
                .latitude(0.0, 1.0)
                .longitude(0.0, 1.0)
                .resolution(res)
                .build_with(|_, _| 0.0)
                .unwrap_err();
            assert!(matches!(err, PropaError::InvalidGrid(_)));
        }
    }

    #[test]
    fn test_span_not_multiple_of_resolution() {
        let err = GeophysicalGrid::builder()
            .latitude(0.0, 1.0)
            .longitude(0.0, 1.0)
            .resolution(0.3)
            .build_with(|_, _| 0.0)
            .unwrap_err();
        assert!(matches!(err, PropaError::InvalidGrid(_)));
    }

    #[test]
    fn test_wrap_requires_global_coverage() {
        let err = GeophysicalGrid::builder()
            .latitude(0.0, 10.0)
            .longitude(0.0, 180.0)
            .resolution(1.0)
            .wrap_longitude(true)
            .build_with(|_, _| 0.0)
            .unwrap_err();
        assert!(matches!(err, PropaError::InvalidGrid(_)));
    }

    #[test]
    fn test_wrap_with_duplicated_seam() {
        let grid = GeophysicalGrid::builder()
            .latitude(-90.0, 90.0)
            .longitude(-180.0, 180.0)
            .resolution(1.5)
            .wrap_longitude(true)
            .build_with(|lat, _| lat)
            .unwrap();
        assert_eq!(grid.cols(), 241);
        assert_eq!(grid.lon_period(), 240);
    }

    #[test]
    fn test_mismatched_seam_rejected() {
        let rows = vec![vec![0.0, 1.0, 2.0, 3.0, 99.0]; 3];
        let err = GeophysicalGrid::builder()
            .latitude(-90.0, 90.0)
            .longitude(-180.0, 180.0)
            .resolution(90.0)
            .wrap_longitude(true)
            .rows(rows)
            .build()
            .unwrap_err();
        assert!(matches!(err, PropaError::InvalidGrid(_)));

        let mut rows = vec![vec![0.0, 1.0, 2.0, 3.0, 0.0]; 3];
        rows[1] = vec![f64::NAN, 1.0, 2.0, 3.0, f64::NAN];
        let grid = GeophysicalGrid::builder()
            .latitude(-90.0, 90.0)
            .longitude(-180.0, 180.0)
            .resolution(90.0)
            .wrap_longitude(true)
            .rows(rows)
            .build()
            .unwrap();
        assert_eq!(grid.lon_period(), 4);
    }

    #[test]
    fn test_tiny_resolution_rejected() {
        let record = GridRecord {
            values: vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            lat_min: 0.0,
            lat_max: 1.0,
            lon_min: 0.0,
            lon_max: 1.0,
            resolution_deg: 1e-300,
            wrap_longitude: false,
        };
        let err = GeophysicalGrid::try_from(record).unwrap_err();
        assert!(matches!(err, PropaError::InvalidGrid(_)));

        // Each axis fits on its own but the mesh is too large to allocate
        let err = GeophysicalGrid::builder()
            .latitude(-90.0, 90.0)
            .longitude(-180.0, 180.0)
            .resolution(0.001)
            .build_with(|_, _| 0.0)
            .unwrap_err();
        assert!(matches!(err, PropaError::InvalidGrid(_)));
    }

    #[test]
    fn test_serde_revalidates() {
        let grid = GeophysicalGrid::builder()
            .latitude(10.0, 11.0)
            .longitude(20.0, 22.0)
            .resolution(1.0)
            .rows(small_rows())
            .build()
            .unwrap();

        let json = serde_json::to_string(&grid).unwrap();
        let back: GeophysicalGrid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, grid);

        let broken = json.replace("\"resolution_deg\":1.0", "\"resolution_deg\":-1.0");
        assert!(serde_json::from_str::<GeophysicalGrid>(&broken).is_err());
    }
}
