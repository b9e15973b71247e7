//! WGS84 point primitives.
//!
//! All measurements go through [`geo::Geodesic`], so distances are in meters on the
//! ellipsoid and bearings are degrees clockwise from true north.

pub mod area;

use geo::{Bearing, Destination, Distance, Geodesic, InterpolatePoint};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn to_point(self) -> geo::Point {
        geo::Point::new(self.longitude, self.latitude)
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

impl From<geo::Point> for GeoPoint {
    fn from(point: geo::Point) -> Self {
        GeoPoint::new(point.y(), point.x())
    }
}

impl From<geo::Coord> for GeoPoint {
    fn from(coord: geo::Coord) -> Self {
        GeoPoint::new(coord.y, coord.x)
    }
}

impl From<GeoPoint> for geo::Point {
    fn from(point: GeoPoint) -> Self {
        point.to_point()
    }
}

/// A single reading from the location source. Replaced wholesale, never patched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius in meters.
    pub accuracy: Option<f64>,
    /// GPS course over ground, degrees.
    pub heading: Option<f64>,
    /// Meters per second.
    pub speed: Option<f64>,
    /// Epoch milliseconds.
    pub timestamp: Option<i64>,
}

impl PositionFix {
    pub fn at(point: GeoPoint) -> Self {
        Self {
            latitude: point.latitude,
            longitude: point.longitude,
            accuracy: None,
            heading: None,
            speed: None,
            timestamp: None,
        }
    }

    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed = Some(speed_mps);
        self
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy = Some(accuracy_m);
        self
    }

    pub fn with_heading(mut self, heading_deg: f64) -> Self {
        self.heading = Some(heading_deg);
        self
    }

    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    /// Latitude within ±90 and longitude within ±180, both finite.
    pub fn is_valid(&self) -> bool {
        self.position().is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Geodesic distance in meters.
pub fn distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    Geodesic.distance(a.to_point(), b.to_point())
}

/// Initial bearing from `from` to `to`, normalized into `[0, 360)`.
pub fn bearing_deg(from: GeoPoint, to: GeoPoint) -> f64 {
    normalize_degrees(Geodesic.bearing(from.to_point(), to.to_point()))
}

pub fn destination(origin: GeoPoint, bearing_deg: f64, distance_m: f64) -> GeoPoint {
    Geodesic
        .destination(origin.to_point(), bearing_deg, distance_m)
        .into()
}

/// Point `ratio` of the way along the geodesic from `a` to `b`, clamped to the endpoints.
pub fn interpolate(a: GeoPoint, b: GeoPoint, ratio: f64) -> GeoPoint {
    if ratio <= 0.0 {
        return a;
    }
    if ratio >= 1.0 {
        return b;
    }

    Geodesic
        .point_at_ratio_between(a.to_point(), b.to_point(), ratio)
        .into()
}

pub fn normalize_degrees(degrees: f64) -> f64 {
    degrees.rem_euclid(360.0)
}

/// Total geodesic length of a polyline in meters.
pub fn path_length_m(points: &[GeoPoint]) -> f64 {
    points
        .iter()
        .tuple_windows()
        .map(|(a, b)| distance_m(*a, *b))
        .sum()
}

/// The point halfway along the polyline, measured by length rather than vertex count.
pub fn polyline_midpoint(points: &[GeoPoint]) -> Option<GeoPoint> {
    let (first, rest) = points.split_first()?;
    if rest.is_empty() {
        return Some(*first);
    }

    let half = path_length_m(points) / 2.0;
    let mut walked = 0.0;

    for (a, b) in points.iter().tuple_windows() {
        let segment = distance_m(*a, *b);
        if walked + segment >= half {
            if segment <= f64::EPSILON {
                return Some(*a);
            }
            return Some(interpolate(*a, *b, (half - walked) / segment));
        }
        walked += segment;
    }

    points.last().copied()
}
