//! Mission layout and grading.

pub mod objective;
pub mod rank;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::geodesy::{self, GeoPoint};

/// Where an Extraction run is headed. Fixed for the life of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionTarget {
    pub extraction_point: GeoPoint,
    pub checkpoint: Option<GeoPoint>,
    pub initial_distance_m: f64,
    /// Walkable route toward the extraction point, when one was found.
    pub route: Option<Vec<GeoPoint>>,
}

impl MissionTarget {
    /// Straight-line fallback: the checkpoint sits halfway along the geodesic.
    pub fn straight_line(start: GeoPoint, extraction_point: GeoPoint) -> Self {
        Self {
            extraction_point,
            checkpoint: Some(geodesy::interpolate(start, extraction_point, 0.5)),
            initial_distance_m: geodesy::distance_m(start, extraction_point),
            route: None,
        }
    }

    /// Snap the extraction point to the end of a routed polyline, with the checkpoint at
    /// its length midpoint. Routes with fewer than two usable points are rejected.
    pub fn from_route(start: GeoPoint, route: Vec<GeoPoint>) -> Option<Self> {
        let route = route
            .into_iter()
            .filter(GeoPoint::is_finite)
            .collect::<Vec<_>>();
        if route.len() < 2 {
            return None;
        }

        let extraction_point = *route.last()?;
        let checkpoint = geodesy::polyline_midpoint(&route);

        Some(Self {
            extraction_point,
            checkpoint,
            initial_distance_m: geodesy::distance_m(start, extraction_point),
            route: Some(route),
        })
    }
}

/// Inputs for laying out a run, drawn once at launch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MissionLayout {
    pub start: GeoPoint,
    /// Bearing from the start toward the rough extraction point.
    pub bearing_deg: f64,
    pub target_distance_km: f64,
}

impl MissionLayout {
    pub fn random(start: GeoPoint, target_distance_km: f64, rng: &mut impl Rng) -> Self {
        Self {
            start,
            bearing_deg: rng.random_range(0.0..360.0),
            target_distance_km,
        }
    }

    /// The straight-line destination before any route refinement.
    pub fn rough_destination(&self) -> GeoPoint {
        geodesy::destination(
            self.start,
            self.bearing_deg,
            self.target_distance_km * 1_000.0,
        )
    }

    /// The shadow starts behind the player, on the far side from the extraction point.
    pub fn shadow_spawn(&self, spawn_distance_m: f64) -> GeoPoint {
        geodesy::destination(
            self.start,
            geodesy::normalize_degrees(self.bearing_deg + 180.0),
            spawn_distance_m,
        )
    }

    pub fn target(&self, route: Option<Vec<GeoPoint>>) -> MissionTarget {
        route
            .and_then(|route| MissionTarget::from_route(self.start, route))
            .unwrap_or_else(|| MissionTarget::straight_line(self.start, self.rough_destination()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{SeedableRng, rngs::StdRng};

    const PARIS: GeoPoint = GeoPoint::new(48.8566, 2.3522);

    #[test]
    fn test_layout_places_extraction_and_shadow_opposite() {
        let layout = MissionLayout {
            start: PARIS,
            bearing_deg: 30.0,
            target_distance_km: 2.0,
        };

        let extraction = layout.rough_destination();
        let shadow = layout.shadow_spawn(500.0);

        assert_relative_eq!(geodesy::distance_m(PARIS, extraction), 2_000.0, epsilon = 1e-3);
        assert_relative_eq!(geodesy::distance_m(PARIS, shadow), 500.0, epsilon = 1e-3);
        assert_relative_eq!(geodesy::bearing_deg(PARIS, shadow), 210.0, epsilon = 1e-3);
        assert!(geodesy::distance_m(shadow, extraction) > 2_400.0);
    }

    #[test]
    fn test_random_layout_is_seed_deterministic() {
        let a = MissionLayout::random(PARIS, 2.0, &mut StdRng::seed_from_u64(3));
        let b = MissionLayout::random(PARIS, 2.0, &mut StdRng::seed_from_u64(3));

        assert_eq!(a, b);
        assert!((0.0..360.0).contains(&a.bearing_deg));
    }

    #[test]
    fn test_straight_line_target_has_midpoint_checkpoint() {
        let extraction = geodesy::destination(PARIS, 0.0, 2_000.0);

        let target = MissionTarget::straight_line(PARIS, extraction);

        let checkpoint = target.checkpoint.unwrap();
        assert_relative_eq!(geodesy::distance_m(PARIS, checkpoint), 1_000.0, epsilon = 0.01);
        assert_relative_eq!(target.initial_distance_m, 2_000.0, epsilon = 1e-3);
        assert!(target.route.is_none());
    }

    #[test]
    fn test_route_target_snaps_to_route_end() {
        let corner = geodesy::destination(PARIS, 90.0, 1_000.0);
        let end = geodesy::destination(corner, 0.0, 1_000.0);

        let target = MissionTarget::from_route(PARIS, vec![PARIS, corner, end]).unwrap();

        assert_eq!(target.extraction_point, end);
        let checkpoint = target.checkpoint.unwrap();
        assert_relative_eq!(geodesy::distance_m(checkpoint, corner), 0.0, epsilon = 0.5);
    }

    #[test]
    fn test_short_route_falls_back_to_straight_line() {
        let layout = MissionLayout {
            start: PARIS,
            bearing_deg: 0.0,
            target_distance_km: 1.0,
        };

        let target = layout.target(Some(vec![PARIS]));

        assert!(target.route.is_none());
        assert_eq!(target.extraction_point, layout.rough_destination());
    }
}
