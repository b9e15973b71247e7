use anyhow::{bail, Context, Result};
use geojson::GeoJson;
use shadow_runner_core::geodesy::{self, GeoPoint};
use std::path::Path;

/// A walkable polyline with its cumulative geodesic length at every vertex.
#[derive(Debug, Clone)]
pub struct Track {
    points: Vec<GeoPoint>,
    cumulative_m: Vec<f64>,
}

impl Track {
    pub fn new(points: Vec<GeoPoint>) -> Result<Self> {
        if points.is_empty() {
            bail!("Track has no points");
        }
        if let Some(bad) = points.iter().find(|p| !p.is_finite()) {
            bail!("Track contains a non-finite point: {bad:?}");
        }

        let mut cumulative_m = Vec::with_capacity(points.len());
        let mut total = 0.0;
        cumulative_m.push(0.0);
        for pair in points.windows(2) {
            total += geodesy::distance_m(pair[0], pair[1]);
            cumulative_m.push(total);
        }

        Ok(Self {
            points,
            cumulative_m,
        })
    }

    pub fn start(&self) -> GeoPoint {
        self.points[0]
    }

    pub fn length_m(&self) -> f64 {
        self.cumulative_m.last().copied().unwrap_or(0.0)
    }

    /// Position after walking `distance_m` from the start. Clamped to the end.
    pub fn position_at(&self, distance_m: f64) -> GeoPoint {
        let distance_m = distance_m.max(0.0);
        if distance_m >= self.length_m() {
            return self.points[self.points.len() - 1];
        }

        // first vertex strictly beyond the distance
        let next = self.cumulative_m.partition_point(|d| *d <= distance_m);
        let (from, to) = (next - 1, next);
        let span = self.cumulative_m[to] - self.cumulative_m[from];
        if span <= 0.0 {
            return self.points[from];
        }

        let ratio = (distance_m - self.cumulative_m[from]) / span;
        geodesy::interpolate(self.points[from], self.points[to], ratio)
    }

    /// Direction of travel at `distance_m`.
    pub fn bearing_at(&self, distance_m: f64) -> Option<f64> {
        if self.points.len() < 2 {
            return None;
        }

        let next = self
            .cumulative_m
            .partition_point(|d| *d <= distance_m.max(0.0))
            .clamp(1, self.points.len() - 1);
        Some(geodesy::bearing_deg(self.points[next - 1], self.points[next]))
    }
}

/// Read the first LineString found in a GeoJSON file.
/// Accepts a bare geometry, a Feature, or a FeatureCollection.
pub fn read_track(path: &Path) -> Result<Track> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read track file: {}", path.display()))?;

    parse_track(&content).with_context(|| format!("No usable track in: {}", path.display()))
}

pub fn parse_track(content: &str) -> Result<Track> {
    let geojson: GeoJson = content.parse().context("Failed to parse GeoJSON")?;

    let value = match geojson {
        GeoJson::Geometry(geometry) => Some(geometry.value),
        GeoJson::Feature(feature) => feature.geometry.map(|g| g.value),
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .filter_map(|f| f.geometry)
            .map(|g| g.value)
            .find(|v| matches!(v, geojson::Value::LineString(_))),
    };

    match value {
        Some(geojson::Value::LineString(coords)) => Track::new(
            coords
                .iter()
                .filter(|c| c.len() >= 2)
                .map(|c| GeoPoint::new(c[1], c[0]))
                .collect(),
        ),
        Some(_) => bail!("Geometry is not a LineString"),
        None => bail!("No geometry found"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARIS: GeoPoint = GeoPoint::new(48.8566, 2.3522);

    fn l_shape() -> Track {
        let corner = geodesy::destination(PARIS, 90.0, 300.0);
        let end = geodesy::destination(corner, 0.0, 200.0);
        Track::new(vec![PARIS, corner, end]).unwrap()
    }

    #[test]
    fn test_length_and_positions() {
        let track = l_shape();

        assert!((track.length_m() - 500.0).abs() < 0.01);
        assert_eq!(track.position_at(0.0), PARIS);
        assert!((geodesy::distance_m(track.position_at(150.0), PARIS) - 150.0).abs() < 0.01);

        let past_corner = track.position_at(400.0);
        let corner = geodesy::destination(PARIS, 90.0, 300.0);
        assert!((geodesy::distance_m(past_corner, corner) - 100.0).abs() < 0.01);

        assert_eq!(track.position_at(10_000.0), track.position_at(500.0));
    }

    #[test]
    fn test_bearing_follows_segments() {
        let track = l_shape();

        assert!((track.bearing_at(10.0).unwrap() - 90.0).abs() < 0.1);
        let north = track.bearing_at(450.0).unwrap();
        assert!(north < 0.5 || north > 359.5);
    }

    #[test]
    fn test_parse_feature_collection() {
        let track = parse_track(
            r#"{
                "type": "FeatureCollection",
                "features": [
                    { "type": "Feature", "properties": {}, "geometry": { "type": "Point", "coordinates": [2.0, 48.0] } },
                    { "type": "Feature", "properties": {}, "geometry": { "type": "LineString", "coordinates": [[2.3522, 48.8566], [2.3622, 48.8566]] } }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(track.start(), PARIS);
        assert!(track.length_m() > 700.0);
    }

    #[test]
    fn test_parse_rejects_polygons() {
        let result = parse_track(
            r#"{ "type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]] }"#,
        );

        assert!(result.is_err());
    }
}
