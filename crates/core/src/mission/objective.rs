use serde::{Deserialize, Serialize};

use crate::{
    config::GameConfig,
    geodesy::{self, GeoPoint},
    mission::MissionTarget,
    units::Kph,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectiveKind {
    Checkpoint,
    TimeBonus,
    SpeedChallenge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectiveRule {
    Checkpoint {
        position: GeoPoint,
        radius_m: f64,
    },
    /// Extract within `target_seconds` of the start.
    TimeBonus { target_seconds: f64 },
    /// Hold at least `min_speed` for `required_seconds` without dropping below it.
    SpeedChallenge {
        min_speed: Kph,
        required_seconds: f64,
        progress_seconds: f64,
    },
}

/// Per-tick facts an objective can react to.
#[derive(Debug, Clone, Copy)]
pub struct ObjectiveTick {
    pub player: GeoPoint,
    pub player_speed: Kph,
    pub dt_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BonusObjective {
    pub id: String,
    pub completed: bool,
    pub rule: ObjectiveRule,
}

impl BonusObjective {
    pub fn checkpoint(position: GeoPoint, radius_m: f64) -> Self {
        Self {
            id: "checkpoint".into(),
            completed: false,
            rule: ObjectiveRule::Checkpoint { position, radius_m },
        }
    }

    pub fn time_bonus(target_seconds: f64) -> Self {
        Self {
            id: "time_bonus".into(),
            completed: false,
            rule: ObjectiveRule::TimeBonus { target_seconds },
        }
    }

    pub fn speed_challenge(min_speed: Kph, required_seconds: f64) -> Self {
        Self {
            id: "speed_challenge".into(),
            completed: false,
            rule: ObjectiveRule::SpeedChallenge {
                min_speed,
                required_seconds,
                progress_seconds: 0.0,
            },
        }
    }

    pub fn kind(&self) -> ObjectiveKind {
        match self.rule {
            ObjectiveRule::Checkpoint { .. } => ObjectiveKind::Checkpoint,
            ObjectiveRule::TimeBonus { .. } => ObjectiveKind::TimeBonus,
            ObjectiveRule::SpeedChallenge { .. } => ObjectiveKind::SpeedChallenge,
        }
    }

    /// Seconds accumulated toward a speed challenge.
    pub fn progress_seconds(&self) -> Option<f64> {
        match self.rule {
            ObjectiveRule::SpeedChallenge {
                progress_seconds, ..
            } => Some(progress_seconds),
            _ => None,
        }
    }

    /// Advance by one tick. Returns `true` only on the tick that completes it.
    pub fn observe(&mut self, tick: &ObjectiveTick) -> bool {
        if self.completed {
            return false;
        }

        let done = match &mut self.rule {
            ObjectiveRule::Checkpoint { position, radius_m } => {
                geodesy::distance_m(tick.player, *position) < *radius_m
            }
            ObjectiveRule::TimeBonus { .. } => false,
            ObjectiveRule::SpeedChallenge {
                min_speed,
                required_seconds,
                progress_seconds,
            } => {
                if tick.player_speed >= *min_speed {
                    *progress_seconds += tick.dt_seconds;
                } else {
                    // continuous window: any slow tick starts over
                    *progress_seconds = 0.0;
                }

                if *progress_seconds >= *required_seconds {
                    *progress_seconds = *required_seconds;
                    true
                } else {
                    false
                }
            }
        };

        self.completed = done;
        done
    }

    /// Settle objectives that are judged at the moment of extraction.
    pub fn on_extracted(&mut self, elapsed_seconds: f64) -> bool {
        if self.completed {
            return false;
        }

        if let ObjectiveRule::TimeBonus { target_seconds } = self.rule {
            self.completed = elapsed_seconds <= target_seconds;
        }

        self.completed
    }
}

/// The standard Extraction-mode objective set.
pub fn extraction_objectives(
    config: &GameConfig,
    target: &MissionTarget,
    target_distance_km: f64,
) -> Vec<BonusObjective> {
    let mut objectives = Vec::with_capacity(3);

    if let Some(checkpoint) = target.checkpoint {
        objectives.push(BonusObjective::checkpoint(
            checkpoint,
            config.checkpoint_radius_m,
        ));
    }

    objectives.push(BonusObjective::time_bonus(
        config.time_bonus_seconds(target_distance_km),
    ));
    objectives.push(BonusObjective::speed_challenge(
        config.speed_challenge_min_kph,
        config.speed_challenge_seconds,
    ));

    objectives
}

pub fn completed_count(objectives: &[BonusObjective]) -> u32 {
    objectives.iter().filter(|o| o.completed).count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARIS: GeoPoint = GeoPoint::new(48.8566, 2.3522);

    fn tick(speed_kph: f64) -> ObjectiveTick {
        ObjectiveTick {
            player: PARIS,
            player_speed: Kph(speed_kph),
            dt_seconds: 1.0,
        }
    }

    #[test]
    fn test_speed_challenge_resets_on_slow_tick() {
        let mut challenge = BonusObjective::speed_challenge(Kph(8.0), 30.0);
        let mut progress = Vec::new();

        for speed in [9.0, 9.0, 9.0, 3.0, 9.0, 9.0] {
            challenge.observe(&tick(speed));
            progress.push(challenge.progress_seconds().unwrap());
        }

        assert_eq!(progress, vec![1.0, 2.0, 3.0, 0.0, 1.0, 2.0]);
        assert!(!challenge.completed);
    }

    #[test]
    fn test_speed_challenge_completes_and_stays_complete() {
        let mut challenge = BonusObjective::speed_challenge(Kph(8.0), 30.0);

        let completions = (0..30)
            .map(|_| challenge.observe(&tick(10.0)))
            .filter(|done| *done)
            .count();
        assert_eq!(completions, 1);
        assert!(challenge.completed);

        assert!(!challenge.observe(&tick(0.0)));
        assert!(challenge.completed);
        assert_eq!(challenge.progress_seconds(), Some(30.0));
    }

    #[test]
    fn test_speed_challenge_counts_exact_threshold() {
        let mut challenge = BonusObjective::speed_challenge(Kph(8.0), 30.0);

        challenge.observe(&tick(8.0));
        challenge.observe(&tick(8.0));
        assert_eq!(challenge.progress_seconds(), Some(2.0));

        challenge.observe(&tick(7.9));
        assert_eq!(challenge.progress_seconds(), Some(0.0));
    }

    #[test]
    fn test_checkpoint_is_idempotent() {
        let mut checkpoint = BonusObjective::checkpoint(PARIS, 30.0);

        assert!(checkpoint.observe(&tick(0.0)));
        assert!(!checkpoint.observe(&tick(0.0)));
        assert!(checkpoint.completed);
    }

    #[test]
    fn test_checkpoint_outside_radius() {
        let far = geodesy::destination(PARIS, 0.0, 31.0);
        let mut checkpoint = BonusObjective::checkpoint(far, 30.0);

        assert!(!checkpoint.observe(&tick(0.0)));
    }

    #[test]
    fn test_time_bonus_judged_at_extraction() {
        let mut early = BonusObjective::time_bonus(600.0);
        let mut late = BonusObjective::time_bonus(600.0);

        assert!(!early.observe(&tick(0.0)));
        assert!(early.on_extracted(599.0));
        assert!(!late.on_extracted(601.0));
    }

    #[test]
    fn test_extraction_objective_set() {
        let config = GameConfig::default();
        let target = MissionTarget::straight_line(PARIS, geodesy::destination(PARIS, 0.0, 2_000.0));

        let objectives = extraction_objectives(&config, &target, 2.0);

        let kinds = objectives.iter().map(|o| o.kind()).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                ObjectiveKind::Checkpoint,
                ObjectiveKind::TimeBonus,
                ObjectiveKind::SpeedChallenge
            ]
        );
        assert_eq!(completed_count(&objectives), 0);
        assert_eq!(ObjectiveKind::SpeedChallenge.to_string(), "SPEED_CHALLENGE");
    }
}
