use chrono::{DateTime, Utc};

use crate::{
    fog::Visibility,
    geodesy::GeoPoint,
    mission::{
        objective::{BonusObjective, ObjectiveKind},
        rank::Rank,
    },
    pursuit::{PursuitStatus, mode::GameMode},
    session::{GameStatus, RunGeneration, RunOutcome, Session},
    units::Kph,
};

/// Shadow distance past which there is no hazard at all.
const HAZARD_FAR_M: f64 = 500.0;
const HAZARD_MAX: f64 = 0.8;

/// Read-only view of a session for renderers and UI.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub generation: RunGeneration,
    pub status: GameStatus,
    pub mode: Option<GameMode>,
    pub user_position: Option<GeoPoint>,
    pub heading: Option<f64>,
    pub shadow_position: Option<GeoPoint>,
    pub extraction_point: Option<GeoPoint>,
    pub checkpoint: Option<GeoPoint>,
    pub checkpoint_reached: bool,
    pub route: Option<Vec<GeoPoint>>,
    pub explored_area: Option<Visibility>,
    pub bonus_objectives: Vec<BonusObjective>,
    pub distance_to_extraction_m: Option<f64>,
    pub shadow_distance_m: Option<f64>,
    pub current_shadow_speed: Option<Kph>,
    pub hazard_intensity: f64,
    pub max_speed_mps: f64,
    pub final_rank: Option<Rank>,
    pub outcome: Option<RunOutcome>,
    pub elapsed_seconds: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub gps_error: Option<String>,
}

/// 0 beyond 500 m, rising linearly to 0.8 at the catch radius.
pub fn hazard_intensity(shadow_distance_m: f64, catch_radius_m: f64) -> f64 {
    if !shadow_distance_m.is_finite() || shadow_distance_m >= HAZARD_FAR_M {
        return 0.0;
    }
    if shadow_distance_m <= catch_radius_m {
        return HAZARD_MAX;
    }

    let span = HAZARD_FAR_M - catch_radius_m;
    HAZARD_MAX * (HAZARD_FAR_M - shadow_distance_m) / span
}

impl Session {
    pub fn snapshot(&self) -> SessionSnapshot {
        let run = self.run.as_ref();
        let engine = run.map(|r| &r.engine);
        let target = engine.and_then(|e| e.target());
        let state = engine.map(|e| *e.state());

        let hazard = match engine {
            Some(e) if e.status() == PursuitStatus::Captured => HAZARD_MAX,
            Some(e) => hazard_intensity(e.state().distance_to_player_m, self.config.catch_radius_m),
            None => 0.0,
        };

        let objectives = engine
            .map(|e| e.objectives().to_vec())
            .unwrap_or_default();
        let checkpoint_reached = objectives
            .iter()
            .any(|o| o.kind() == ObjectiveKind::Checkpoint && o.completed);
        let outcome = run.and_then(|r| r.outcome);

        SessionSnapshot {
            generation: self.generation,
            status: self.status,
            mode: self.mode,
            user_position: self.player.position,
            heading: self.player.heading,
            shadow_position: state.map(|s| s.shadow_position),
            extraction_point: target.map(|t| t.extraction_point),
            checkpoint: target.and_then(|t| t.checkpoint),
            checkpoint_reached,
            route: target.and_then(|t| t.route.clone()),
            explored_area: self.fog.visible().cloned(),
            bonus_objectives: objectives,
            distance_to_extraction_m: engine.and_then(|e| e.distance_to_extraction_m()),
            shadow_distance_m: state.map(|s| s.distance_to_player_m),
            current_shadow_speed: state.map(|s| s.current_speed),
            hazard_intensity: hazard,
            max_speed_mps: self.player.max_speed_mps,
            final_rank: outcome.map(|o| o.rank),
            outcome,
            elapsed_seconds: engine.map(|e| e.elapsed_seconds()).unwrap_or(0.0),
            started_at: run.map(|r| r.started_at),
            ended_at: run.and_then(|r| r.ended_at),
            gps_error: self.location_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_hazard_ramp() {
        assert_eq!(hazard_intensity(800.0, 20.0), 0.0);
        assert_eq!(hazard_intensity(500.0, 20.0), 0.0);
        assert_eq!(hazard_intensity(20.0, 20.0), 0.8);
        assert_eq!(hazard_intensity(5.0, 20.0), 0.8);
        assert_relative_eq!(hazard_intensity(260.0, 20.0), 0.4, epsilon = 1e-9);
        assert_eq!(hazard_intensity(f64::NAN, 20.0), 0.0);
    }

    #[test]
    fn test_idle_snapshot_is_empty() {
        let session = Session::new(crate::config::GameConfig::default());

        let snapshot = session.snapshot();

        assert_eq!(snapshot.status, GameStatus::Idle);
        assert!(snapshot.shadow_position.is_none());
        assert!(snapshot.bonus_objectives.is_empty());
        assert!(!snapshot.checkpoint_reached);
        assert_eq!(snapshot.hazard_intensity, 0.0);
        assert!(snapshot.final_rank.is_none());
    }
}
