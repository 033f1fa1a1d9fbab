//! Geo primitives: points, distances, haversine and the coarse grid
//!
//! GeoWithin is answered in two phases. The grid returns every cell that can
//! hold a point inside the query circle (a superset); the exact phase keeps
//! the points whose great-circle distance is at most the radius.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Earth radius used by Redis geo commands, in meters
pub const EARTH_RADIUS_METERS: f64 = 6_372_797.560_856;

/// Coverings larger than this fall back to scanning every stored point
pub const MAX_COVER_CELLS: usize = 4096;

const EDGE_EPSILON_DEGREES: f64 = 1e-9;

/// A (longitude, latitude) pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(alias = "x", alias = "longitude")]
    pub lon: f64,
    #[serde(alias = "y", alias = "latitude")]
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Reject coordinates that are not on the map
    pub fn check(&self) -> Result<(), String> {
        if !self.lon.is_finite() || !(-180.0..=180.0).contains(&self.lon) {
            return Err(format!("longitude {} outside [-180, 180]", self.lon));
        }
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(format!("latitude {} outside [-90, 90]", self.lat));
        }
        Ok(())
    }

    /// Bit-exact identity, used to diff old and new index keys
    pub fn bits(&self) -> (u64, u64) {
        (self.lon.to_bits(), self.lat.to_bits())
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lon, self.lat)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceUnit {
    #[serde(alias = "m")]
    Meters,
    #[serde(alias = "km")]
    Kilometers,
    #[serde(alias = "mi")]
    Miles,
}

impl DistanceUnit {
    pub fn meters_per_unit(&self) -> f64 {
        match self {
            DistanceUnit::Meters => 1.0,
            DistanceUnit::Kilometers => 1000.0,
            DistanceUnit::Miles => 1609.344,
        }
    }
}

/// A (magnitude, unit) pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Distance {
    pub value: f64,
    pub unit: DistanceUnit,
}

impl Distance {
    pub fn new(value: f64, unit: DistanceUnit) -> Self {
        Self { value, unit }
    }

    pub fn meters(value: f64) -> Self {
        Self::new(value, DistanceUnit::Meters)
    }

    pub fn kilometers(value: f64) -> Self {
        Self::new(value, DistanceUnit::Kilometers)
    }

    pub fn miles(value: f64) -> Self {
        Self::new(value, DistanceUnit::Miles)
    }

    pub fn to_meters(&self) -> f64 {
        self.value * self.unit.meters_per_unit()
    }
}

/// Great-circle distance in meters
pub fn haversine(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

/// A grid cell: (latitude row, longitude column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeoCell {
    pub row: i32,
    pub col: i32,
}

/// Cells that may contain points within a query circle
#[derive(Debug, Clone, PartialEq)]
pub enum CellCover {
    Cells(Vec<GeoCell>),
    All,
}

/// Fixed-size latitude/longitude grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoGrid {
    cell_degrees: f64,
    rows: i32,
    cols: i32,
}

impl GeoGrid {
    pub fn new(cell_degrees: f64) -> Self {
        Self {
            cell_degrees,
            rows: (180.0 / cell_degrees).ceil() as i32,
            cols: (360.0 / cell_degrees).ceil() as i32,
        }
    }

    pub fn cell_degrees(&self) -> f64 {
        self.cell_degrees
    }

    fn row(&self, lat: f64) -> i32 {
        (((lat + 90.0) / self.cell_degrees).floor() as i32).clamp(0, self.rows - 1)
    }

    fn col(&self, lon: f64) -> i32 {
        (((lon + 180.0) / self.cell_degrees).floor() as i32).rem_euclid(self.cols)
    }

    /// Column of an on-map longitude without wrapping 180 back to column 0
    fn span_col(&self, lon: f64) -> i32 {
        (((lon + 180.0) / self.cell_degrees).floor() as i32).clamp(0, self.cols - 1)
    }

    pub fn cell(&self, point: &GeoPoint) -> GeoCell {
        GeoCell {
            row: self.row(point.lat),
            col: self.col(point.lon),
        }
    }

    /// Cover the circle of `radius_m` meters around `center`
    pub fn cover(&self, center: &GeoPoint, radius_m: f64) -> CellCover {
        let angular = radius_m / EARTH_RADIUS_METERS;
        if angular >= std::f64::consts::PI {
            return CellCover::All;
        }

        let dlat = angular.to_degrees() + EDGE_EPSILON_DEGREES;
        let lat_min = center.lat - dlat;
        let lat_max = center.lat + dlat;

        // A cap touching a pole spans every longitude
        let full_lon = if lat_min <= -90.0 || lat_max >= 90.0 {
            true
        } else {
            let ratio = angular.sin() / center.lat.to_radians().cos();
            ratio >= 1.0
        };

        let rows = self.row(lat_min)..=self.row(lat_max);
        let cols: Vec<i32> = if full_lon {
            (0..self.cols).collect()
        } else {
            let ratio = angular.sin() / center.lat.to_radians().cos();
            let dlon = ratio.asin().to_degrees() + EDGE_EPSILON_DEGREES;
            let lon_min = center.lon - dlon;
            let lon_max = center.lon + dlon;
            if lon_max - lon_min >= 360.0 {
                (0..self.cols).collect()
            } else {
                // Split a span crossing the antimeridian into two on-map spans
                let spans = if lon_min <= -180.0 {
                    vec![(lon_min + 360.0, 180.0), (-180.0, lon_max)]
                } else if lon_max >= 180.0 {
                    vec![(lon_min, 180.0), (-180.0, lon_max - 360.0)]
                } else {
                    vec![(lon_min, lon_max)]
                };
                let cols: BTreeSet<i32> = spans
                    .into_iter()
                    .flat_map(|(west, east)| self.span_col(west)..=self.span_col(east))
                    .collect();
                cols.into_iter().collect()
            }
        };

        let count = (rows.end() - rows.start() + 1) as usize * cols.len();
        if count > MAX_COVER_CELLS {
            return CellCover::All;
        }

        let mut cells = Vec::with_capacity(count);
        for row in rows {
            for &col in &cols {
                cells.push(GeoCell { row, col });
            }
        }
        CellCover::Cells(cells)
    }
}
