//! The shadow's pursuit simulation.
//!
//! [`PursuitEngine::advance`] takes the latest player sample and an explicit time step,
//! so a tick never reads state it wasn't handed.

pub mod mode;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    config::GameConfig,
    geodesy::{self, GeoPoint},
    mission::{
        MissionTarget,
        objective::{self, BonusObjective, ObjectiveTick},
    },
    pursuit::mode::{GameMode, PursuitMode},
    units::Kph,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PursuitState {
    pub shadow_position: GeoPoint,
    pub current_speed: Kph,
    pub distance_to_player_m: f64,
}

/// The player as seen by one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSample {
    pub position: GeoPoint,
    pub speed_mps: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PursuitStatus {
    Running,
    Extracted,
    Captured,
}

impl PursuitStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PursuitStatus::Running)
    }
}

/// Everything grading needs once a run is over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PursuitResult {
    pub status: PursuitStatus,
    pub elapsed_seconds: f64,
    pub completed_objectives: u32,
    pub total_objectives: u32,
}

pub struct PursuitEngine {
    state: PursuitState,
    mode: Box<dyn PursuitMode>,
    objectives: Vec<BonusObjective>,
    base_speed: Kph,
    max_speed: Kph,
    catch_radius_m: f64,
    elapsed_seconds: f64,
    status: PursuitStatus,
}

impl PursuitEngine {
    pub fn new(
        config: &GameConfig,
        shadow_spawn: GeoPoint,
        player_start: GeoPoint,
        mode: Box<dyn PursuitMode>,
        objectives: Vec<BonusObjective>,
    ) -> Self {
        let base_speed = config.base_shadow_speed_kph;

        Self {
            state: PursuitState {
                shadow_position: shadow_spawn,
                current_speed: base_speed,
                distance_to_player_m: geodesy::distance_m(shadow_spawn, player_start),
            },
            mode,
            objectives,
            base_speed,
            max_speed: config.max_shadow_speed_kph,
            catch_radius_m: config.catch_radius_m,
            elapsed_seconds: 0.0,
            status: PursuitStatus::Running,
        }
    }

    /// Run one tick of `dt_seconds`.
    ///
    /// Finished runs are frozen and a missing player sample skips the tick outright.
    pub fn advance(&mut self, player: Option<PlayerSample>, dt_seconds: f64) -> PursuitStatus {
        if self.status.is_terminal() {
            return self.status;
        }

        let Some(player) = player.filter(|p| p.position.is_finite()) else {
            return self.status;
        };
        if !dt_seconds.is_finite() || dt_seconds < 0.0 {
            return self.status;
        }

        self.elapsed_seconds += dt_seconds;

        // move the shadow, never past the player
        let to_player = geodesy::distance_m(self.state.shadow_position, player.position);
        let step = (self.state.current_speed.to_meters_per_second() * dt_seconds).min(to_player);
        if step > 0.0 {
            let bearing = geodesy::bearing_deg(self.state.shadow_position, player.position);
            self.state.shadow_position =
                geodesy::destination(self.state.shadow_position, bearing, step);
        }

        self.state.distance_to_player_m =
            geodesy::distance_m(player.position, self.state.shadow_position);
        self.mode.compute_target(player.position);
        self.state.current_speed = self.mode.shadow_speed(self.base_speed, self.max_speed);

        let tick = ObjectiveTick {
            player: player.position,
            player_speed: Kph::from_meters_per_second(player.speed_mps.unwrap_or(0.0).max(0.0)),
            dt_seconds,
        };
        for objective in &mut self.objectives {
            if objective.observe(&tick) {
                info!(objective = %objective.id, "bonus objective completed");
            }
        }

        // extraction is checked before capture
        self.status = if self.mode.check_win() {
            for objective in &mut self.objectives {
                objective.on_extracted(self.elapsed_seconds);
            }
            PursuitStatus::Extracted
        } else if self.state.distance_to_player_m < self.catch_radius_m {
            PursuitStatus::Captured
        } else {
            PursuitStatus::Running
        };

        if self.status.is_terminal() {
            info!(
                status = ?self.status,
                elapsed_seconds = self.elapsed_seconds,
                "pursuit finished"
            );
        } else {
            debug!(
                shadow_distance_m = self.state.distance_to_player_m,
                speed_kph = self.state.current_speed.0,
                "pursuit tick"
            );
        }

        self.status
    }

    pub fn state(&self) -> &PursuitState {
        &self.state
    }

    pub fn status(&self) -> PursuitStatus {
        self.status
    }

    pub fn mode(&self) -> GameMode {
        self.mode.kind()
    }

    pub fn target(&self) -> Option<&MissionTarget> {
        self.mode.target()
    }

    pub fn distance_to_extraction_m(&self) -> Option<f64> {
        self.mode.distance_to_goal_m()
    }

    pub fn objectives(&self) -> &[BonusObjective] {
        &self.objectives
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed_seconds
    }

    pub fn result(&self) -> PursuitResult {
        PursuitResult {
            status: self.status,
            elapsed_seconds: self.elapsed_seconds,
            completed_objectives: objective::completed_count(&self.objectives),
            total_objectives: self.objectives.len() as u32,
        }
    }
}
