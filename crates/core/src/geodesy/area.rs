use std::panic;

use geo::{BooleanOps, GeodesicArea, LineString, MultiPolygon, Polygon};
use geojson::GeoJson;

use crate::geodesy::{GeoPoint, destination};

/// The union of every visibility disc granted so far.
pub type ExploredArea = MultiPolygon<f64>;

#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("boolean union panicked")]
    UnionPanicked,

    #[error("union shrank the explored area from {before:.1} m² to {after:.1} m²")]
    Regressed { before: f64, after: f64 },

    #[error("invalid geojson: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("expected a Polygon or MultiPolygon, found {0}")]
    UnsupportedGeometry(&'static str),
}

/// A closed polygon approximating a geodesic circle.
pub fn circle(center: GeoPoint, radius_m: f64, steps: usize) -> Polygon<f64> {
    let steps = steps.max(3);
    let mut ring = (0..steps)
        .map(|i| {
            // clockwise from north
            let bearing = 360.0 * i as f64 / steps as f64;
            destination(center, bearing, radius_m).to_point().0
        })
        .collect::<Vec<_>>();

    // counter-clockwise exterior, closed
    ring.reverse();
    if let Some(first) = ring.first().copied() {
        ring.push(first);
    }

    Polygon::new(LineString::new(ring), vec![])
}

/// Unsigned geodesic area in square meters.
pub fn area_m2(area: &MultiPolygon<f64>) -> f64 {
    area.geodesic_area_unsigned()
}

/// Union `disc` into `area`.
///
/// The boolean-ops engine can panic on degenerate topology after many merges, so the
/// call is isolated with `catch_unwind`. A result smaller than its input is rejected too.
pub fn merge_geometry(
    area: &MultiPolygon<f64>,
    disc: &Polygon<f64>,
) -> Result<MultiPolygon<f64>, GeometryError> {
    let disc = MultiPolygon::new(vec![disc.clone()]);

    let merged = panic::catch_unwind(panic::AssertUnwindSafe(|| area.union(&disc)))
        .map_err(|_| GeometryError::UnionPanicked)?;

    reject_regression(area, merged)
}

fn reject_regression(
    previous: &MultiPolygon<f64>,
    merged: MultiPolygon<f64>,
) -> Result<MultiPolygon<f64>, GeometryError> {
    let before = area_m2(previous);
    let after = area_m2(&merged);

    // tolerate float noise from re-noding
    if after + before * 1e-9 < before {
        return Err(GeometryError::Regressed { before, after });
    }

    Ok(merged)
}

pub fn to_geojson(area: &MultiPolygon<f64>) -> String {
    GeoJson::Geometry(geojson::Geometry::new(geojson::Value::from(area))).to_string()
}

pub fn from_geojson(source: &str) -> Result<MultiPolygon<f64>, GeometryError> {
    let geojson: GeoJson = source.parse()?;
    let geometry = geo::Geometry::<f64>::try_from(geojson)?;

    match geometry {
        geo::Geometry::MultiPolygon(area) => Ok(area),
        geo::Geometry::Polygon(polygon) => Ok(MultiPolygon::new(vec![polygon])),
        geo::Geometry::Point(_) => Err(GeometryError::UnsupportedGeometry("Point")),
        geo::Geometry::MultiPoint(_) => Err(GeometryError::UnsupportedGeometry("MultiPoint")),
        geo::Geometry::LineString(_) => Err(GeometryError::UnsupportedGeometry("LineString")),
        geo::Geometry::MultiLineString(_) => {
            Err(GeometryError::UnsupportedGeometry("MultiLineString"))
        }
        geo::Geometry::GeometryCollection(_) => {
            Err(GeometryError::UnsupportedGeometry("GeometryCollection"))
        }
        _ => Err(GeometryError::UnsupportedGeometry("non-areal geometry")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::distance_m;
    use approx::assert_relative_eq;

    const PARIS: GeoPoint = GeoPoint::new(48.8566, 2.3522);

    #[test]
    fn test_circle_is_closed_and_sized() {
        let disc = circle(PARIS, 50.0, 64);
        let ring = &disc.exterior().0;

        assert_eq!(ring.len(), 65);
        assert_eq!(ring.first(), ring.last());
        for coord in ring {
            assert_relative_eq!(distance_m(PARIS, (*coord).into()), 50.0, epsilon = 1e-3);
        }

        let expected = std::f64::consts::PI * 50.0 * 50.0;
        let actual = area_m2(&MultiPolygon::new(vec![disc]));
        assert!((actual - expected).abs() / expected < 0.01);
    }

    #[test]
    fn test_merge_overlapping_discs_grows_area() {
        let first = MultiPolygon::new(vec![circle(PARIS, 50.0, 64)]);
        let second = circle(destination(PARIS, 90.0, 60.0), 50.0, 64);

        let merged = merge_geometry(&first, &second).unwrap();

        assert_eq!(merged.0.len(), 1);
        assert!(area_m2(&merged) > area_m2(&first));
    }

    #[test]
    fn test_merge_disjoint_discs_keeps_both() {
        let first = MultiPolygon::new(vec![circle(PARIS, 50.0, 64)]);
        let second = circle(destination(PARIS, 0.0, 1_000.0), 50.0, 64);

        let merged = merge_geometry(&first, &second).unwrap();

        assert_eq!(merged.0.len(), 2);
    }

    #[test]
    fn test_shrinking_union_is_rejected() {
        let large = MultiPolygon::new(vec![circle(PARIS, 80.0, 64)]);
        let small = MultiPolygon::new(vec![circle(PARIS, 40.0, 64)]);

        assert!(matches!(
            reject_regression(&large, small.clone()),
            Err(GeometryError::Regressed { before, after }) if after < before
        ));
        assert_eq!(reject_regression(&small, large.clone()).unwrap(), large);
    }

    #[test]
    fn test_geojson_round_trip_preserves_area() {
        let area = MultiPolygon::new(vec![circle(PARIS, 50.0, 32)]);

        let restored = from_geojson(&to_geojson(&area)).unwrap();

        assert_relative_eq!(area_m2(&restored), area_m2(&area), epsilon = 1e-6);
    }

    #[test]
    fn test_geojson_rejects_points() {
        let source = r#"{"type":"Point","coordinates":[2.35,48.85]}"#;

        assert!(matches!(
            from_geojson(source),
            Err(GeometryError::UnsupportedGeometry("Point"))
        ));
    }
}
