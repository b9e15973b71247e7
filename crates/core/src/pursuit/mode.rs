use serde::{Deserialize, Serialize};

use crate::{
    geodesy::{self, GeoPoint},
    mission::MissionTarget,
    units::Kph,
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum GameMode {
    Extraction,
    Survival,
}

/// The mode-specific half of a pursuit tick.
pub trait PursuitMode: Send + Sync {
    fn kind(&self) -> GameMode;

    /// Re-measure the player against this mode's goal. Returns meters remaining, if the
    /// mode has a goal at all.
    fn compute_target(&mut self, player: GeoPoint) -> Option<f64>;

    /// Shadow speed given everything measured so far.
    fn shadow_speed(&self, base: Kph, max: Kph) -> Kph;

    fn check_win(&self) -> bool;

    fn target(&self) -> Option<&MissionTarget> {
        None
    }

    fn distance_to_goal_m(&self) -> Option<f64> {
        None
    }
}

pub struct ExtractionMode {
    target: MissionTarget,
    win_radius_m: f64,
    distance_to_extraction_m: Option<f64>,
}

impl ExtractionMode {
    pub fn new(target: MissionTarget, win_radius_m: f64) -> Self {
        Self {
            target,
            win_radius_m,
            distance_to_extraction_m: None,
        }
    }

    /// Fraction of the initial distance already covered, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        let Some(remaining) = self.distance_to_extraction_m else {
            return 0.0;
        };

        let initial = self.target.initial_distance_m;
        if !(initial > 0.0) {
            return 1.0;
        }

        let progress = 1.0 - remaining / initial;
        if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        }
    }
}

impl PursuitMode for ExtractionMode {
    fn kind(&self) -> GameMode {
        GameMode::Extraction
    }

    fn compute_target(&mut self, player: GeoPoint) -> Option<f64> {
        let distance = geodesy::distance_m(player, self.target.extraction_point);
        self.distance_to_extraction_m = Some(distance);
        Some(distance)
    }

    fn shadow_speed(&self, base: Kph, max: Kph) -> Kph {
        Kph(base.0 + (max.0 - base.0) * self.progress()).bounded(base, max)
    }

    fn check_win(&self) -> bool {
        self.distance_to_extraction_m
            .is_some_and(|d| d < self.win_radius_m)
    }

    fn target(&self) -> Option<&MissionTarget> {
        Some(&self.target)
    }

    fn distance_to_goal_m(&self) -> Option<f64> {
        self.distance_to_extraction_m
    }
}

/// No goal: the run lasts until the shadow catches up.
pub struct SurvivalMode;

impl PursuitMode for SurvivalMode {
    fn kind(&self) -> GameMode {
        GameMode::Survival
    }

    fn compute_target(&mut self, _player: GeoPoint) -> Option<f64> {
        None
    }

    fn shadow_speed(&self, base: Kph, _max: Kph) -> Kph {
        base
    }

    fn check_win(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const PARIS: GeoPoint = GeoPoint::new(48.8566, 2.3522);

    fn extraction(distance_m: f64) -> ExtractionMode {
        let end = geodesy::destination(PARIS, 0.0, distance_m);
        ExtractionMode::new(MissionTarget::straight_line(PARIS, end), 50.0)
    }

    #[test]
    fn test_speed_scales_with_progress() {
        let mut mode = extraction(2_000.0);

        mode.compute_target(PARIS);
        assert_relative_eq!(mode.shadow_speed(Kph(15.0), Kph(25.0)).0, 15.0, epsilon = 1e-6);

        mode.compute_target(geodesy::destination(PARIS, 0.0, 1_000.0));
        assert_relative_eq!(mode.shadow_speed(Kph(15.0), Kph(25.0)).0, 20.0, epsilon = 1e-3);
    }

    #[test]
    fn test_speed_never_leaves_bounds() {
        let mut mode = extraction(2_000.0);

        // further away than at the start
        mode.compute_target(geodesy::destination(PARIS, 180.0, 3_000.0));
        assert_eq!(mode.shadow_speed(Kph(15.0), Kph(25.0)), Kph(15.0));

        // overshoot past the extraction point
        mode.compute_target(geodesy::destination(PARIS, 0.0, 2_000.0));
        assert!(mode.shadow_speed(Kph(15.0), Kph(25.0)) <= Kph(25.0));
        assert!(mode.shadow_speed(Kph(15.0), Kph(25.0)) >= Kph(15.0));
    }

    #[test]
    fn test_zero_length_mission_counts_as_complete() {
        let mut mode = ExtractionMode::new(MissionTarget::straight_line(PARIS, PARIS), 50.0);
        mode.compute_target(PARIS);

        assert_eq!(mode.progress(), 1.0);
        assert!(mode.check_win());
    }

    #[test]
    fn test_survival_has_no_goal() {
        let mut mode = SurvivalMode;

        assert_eq!(mode.compute_target(PARIS), None);
        assert!(!mode.check_win());
        assert_eq!(mode.shadow_speed(Kph(15.0), Kph(25.0)), Kph(15.0));
    }
}
