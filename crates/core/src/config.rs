use serde::{Deserialize, Serialize};

use crate::units::Kph;

/// Gameplay tunables. Every field has a default so partial JSON documents load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Radius of the visibility disc granted around each fix.
    pub exploration_radius_m: f64,
    /// Vertex count used to approximate each visibility disc.
    pub circle_steps: usize,

    pub extraction_radius_m: f64,
    /// How close the shadow has to get to end the run. Product has shipped both 20 m and 1 m.
    pub catch_radius_m: f64,
    pub checkpoint_radius_m: f64,

    pub base_shadow_speed_kph: Kph,
    pub max_shadow_speed_kph: Kph,
    pub shadow_spawn_distance_m: f64,

    pub target_distance_km: f64,

    /// Ticks at exactly this speed still count toward the challenge.
    pub speed_challenge_min_kph: Kph,
    pub speed_challenge_seconds: f64,
    pub time_bonus_minutes_per_km: f64,

    /// Below this speed the compass is trusted over the GPS course.
    pub heading_min_speed_mps: f64,

    pub filter_min_accuracy_m: f64,
    /// Reported accuracy worse than this is treated as exactly this.
    pub filter_max_accuracy_m: f64,
    pub filter_process_noise: f64,

    /// Fixed seed for mission generation; OS entropy when absent.
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            exploration_radius_m: 50.0,
            circle_steps: 64,
            extraction_radius_m: 50.0,
            catch_radius_m: 20.0,
            checkpoint_radius_m: 30.0,
            base_shadow_speed_kph: Kph(15.0),
            max_shadow_speed_kph: Kph(25.0),
            shadow_spawn_distance_m: 500.0,
            target_distance_km: 2.0,
            speed_challenge_min_kph: Kph(8.0),
            speed_challenge_seconds: 30.0,
            time_bonus_minutes_per_km: 10.0,
            heading_min_speed_mps: 1.0,
            filter_min_accuracy_m: 1.0,
            filter_max_accuracy_m: 10.0,
            filter_process_noise: 1.0,
            seed: None,
        }
    }
}

impl GameConfig {
    /// Time limit for the time-bonus objective on a run of `target_distance_km`.
    pub fn time_bonus_seconds(&self, target_distance_km: f64) -> f64 {
        target_distance_km * self.time_bonus_minutes_per_km * 60.0
    }
}
