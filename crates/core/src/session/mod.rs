//! Game-session orchestration.
//!
//! A [`Session`] owns every piece of mutable game state and is driven from a single task
//! through plain method calls. Each component only sees the slice of state handed to it.

pub mod snapshot;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    config::GameConfig,
    filter::PositionFilter,
    fog::ExplorationAccumulator,
    geodesy::{self, GeoPoint, PositionFix, area::ExploredArea},
    heading::{CompassReading, HeadingArbitrator},
    mission::{MissionLayout, objective, rank},
    pursuit::{
        PlayerSample, PursuitEngine, PursuitStatus,
        mode::{ExtractionMode, GameMode, SurvivalMode},
    },
    services::RunSummary,
};

pub use snapshot::SessionSnapshot;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    #[default]
    Idle,
    Active,
    Victory,
    GameOver,
}

/// How a finished run ended.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Victory,
    GameOver,
}

/// Bumped on every reset so late replies for an abandoned run can be recognized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RunGeneration(pub u64);

impl std::fmt::Display for RunGeneration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub rank: rank::Rank,
    pub duration_seconds: f64,
    pub distance_km: f64,
}

/// What the runtime needs to ask the routing service before launching.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MissionRequest {
    pub generation: RunGeneration,
    pub mode: GameMode,
    pub layout: MissionLayout,
}

impl MissionRequest {
    pub fn needs_route(&self) -> bool {
        self.mode == GameMode::Extraction
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("no game mode selected")]
    NoModeSelected,

    #[error("no position fix yet")]
    NoFix,

    #[error("session is {0}, not IDLE")]
    NotIdle(GameStatus),

    #[error("request is for run {request}, session is on run {current}")]
    StaleGeneration {
        request: RunGeneration,
        current: RunGeneration,
    },
}

#[derive(Debug, Default)]
struct PlayerTrack {
    fix: Option<PositionFix>,
    position: Option<GeoPoint>,
    compass: Option<f64>,
    heading: Option<f64>,
    path: Vec<GeoPoint>,
    max_speed_mps: f64,
}

struct Run {
    engine: PursuitEngine,
    target_distance_km: f64,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    outcome: Option<RunOutcome>,
}

pub struct Session {
    config: GameConfig,
    rng: StdRng,
    generation: RunGeneration,
    status: GameStatus,
    mode: Option<GameMode>,
    target_distance_km: f64,
    layout: Option<MissionLayout>,
    filter: PositionFilter,
    heading: HeadingArbitrator,
    fog: ExplorationAccumulator,
    player: PlayerTrack,
    location_error: Option<String>,
    run: Option<Run>,
}

impl Session {
    pub fn new(config: GameConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            rng,
            generation: RunGeneration::default(),
            status: GameStatus::Idle,
            mode: None,
            target_distance_km: config.target_distance_km,
            layout: None,
            filter: PositionFilter::new(
                config.filter_min_accuracy_m,
                config.filter_max_accuracy_m,
                config.filter_process_noise,
            ),
            heading: HeadingArbitrator::new(config.heading_min_speed_mps),
            fog: ExplorationAccumulator::new(config.exploration_radius_m, config.circle_steps),
            player: PlayerTrack::default(),
            location_error: None,
            run: None,
            config,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn generation(&self) -> RunGeneration {
        self.generation
    }

    pub fn mode(&self) -> Option<GameMode> {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.status == GameStatus::Active
    }

    pub fn user_position(&self) -> Option<GeoPoint> {
        self.player.position
    }

    /// Load the persisted explored area. Call once, before the first fix.
    pub fn restore_explored_area(&mut self, area: ExploredArea) {
        self.fog.restore(area);
    }

    /// The explored area, if it changed since the last call.
    pub fn take_explored_area_for_save(&mut self) -> Option<Arc<ExploredArea>> {
        self.fog.take_dirty()
    }

    pub fn select_mode(&mut self, mode: GameMode) -> Result<RunGeneration, SessionError> {
        if self.status != GameStatus::Idle {
            return Err(SessionError::NotIdle(self.status));
        }

        info!(%mode, generation = %self.generation, "mode selected");
        self.mode = Some(mode);
        Ok(self.generation)
    }

    pub fn set_target_distance_km(&mut self, km: f64) -> Result<(), SessionError> {
        if self.status != GameStatus::Idle {
            return Err(SessionError::NotIdle(self.status));
        }

        if !km.is_finite() || km <= 0.0 || km == self.target_distance_km {
            return Ok(());
        }

        self.target_distance_km = km;
        if self.layout.take().is_some() {
            // routes requested for the discarded layout must not launch
            self.generation = RunGeneration(self.generation.0 + 1);
            debug!(generation = %self.generation, km, "mission layout discarded");
        }
        Ok(())
    }

    pub fn apply_fix(&mut self, fix: PositionFix) {
        if !fix.is_valid() {
            debug!(?fix, "ignoring invalid fix");
            return;
        }

        let position = self
            .filter
            .process(fix.latitude, fix.longitude, fix.accuracy, fix.timestamp);

        self.player.fix = Some(fix);
        self.player.position = Some(position);
        self.player.heading = self
            .heading
            .select(fix.heading, fix.speed, self.player.compass);
        self.location_error = None;

        if self.is_active() {
            self.player.path.push(position);
            if let Some(speed) = fix.speed.filter(|s| s.is_finite()) {
                self.player.max_speed_mps = self.player.max_speed_mps.max(speed);
            }
            self.fog.update(position);
        } else if self.status == GameStatus::Idle {
            self.fog.preview(position);
        }
    }

    pub fn apply_compass(&mut self, reading: Option<CompassReading>) {
        self.player.compass = reading.and_then(CompassReading::heading);

        let (course, speed) = self
            .player
            .fix
            .map(|f| (f.heading, f.speed))
            .unwrap_or((None, None));
        self.player.heading = self.heading.select(course, speed, self.player.compass);
    }

    /// Non-fatal; the pursuit keeps using the last known position.
    pub fn report_location_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(%message, "location source error");
        self.location_error = Some(message);
    }

    /// Lay out the pending run. Stable until the next reset or distance change.
    pub fn mission_request(&mut self) -> Result<MissionRequest, SessionError> {
        if self.status != GameStatus::Idle {
            return Err(SessionError::NotIdle(self.status));
        }
        let mode = self.mode.ok_or(SessionError::NoModeSelected)?;
        let start = self.player.position.ok_or(SessionError::NoFix)?;

        let layout = match self.layout {
            Some(layout) => layout,
            None => {
                let layout = MissionLayout::random(start, self.target_distance_km, &mut self.rng);
                self.layout = Some(layout);
                layout
            }
        };

        Ok(MissionRequest {
            generation: self.generation,
            mode,
            layout,
        })
    }

    /// Start the run laid out by [`Session::mission_request`]. `route` is the routing
    /// service's answer, or `None` for the straight-line fallback.
    pub fn launch(
        &mut self,
        generation: RunGeneration,
        route: Option<Vec<GeoPoint>>,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        if generation != self.generation {
            return Err(SessionError::StaleGeneration {
                request: generation,
                current: self.generation,
            });
        }

        let request = self.mission_request()?;
        let layout = request.layout;
        let start = self.player.position.ok_or(SessionError::NoFix)?;
        let spawn = layout.shadow_spawn(self.config.shadow_spawn_distance_m);

        let engine = match request.mode {
            GameMode::Extraction => {
                let target = layout.target(route);
                let objectives =
                    objective::extraction_objectives(&self.config, &target, layout.target_distance_km);
                info!(
                    extraction = ?target.extraction_point,
                    routed = target.route.is_some(),
                    initial_distance_m = target.initial_distance_m,
                    "extraction run laid out"
                );

                PursuitEngine::new(
                    &self.config,
                    spawn,
                    start,
                    Box::new(ExtractionMode::new(target, self.config.extraction_radius_m)),
                    objectives,
                )
            }
            GameMode::Survival => {
                PursuitEngine::new(&self.config, spawn, start, Box::new(SurvivalMode), vec![])
            }
        };

        self.run = Some(Run {
            engine,
            target_distance_km: layout.target_distance_km,
            started_at: now,
            ended_at: None,
            outcome: None,
        });
        self.status = GameStatus::Active;
        self.player.path = vec![start];
        self.player.max_speed_mps = 0.0;
        self.fog.update(start);

        info!(mode = %request.mode, generation = %self.generation, "run started");
        Ok(())
    }

    /// Launch on the straight-line layout without consulting any routing service.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.launch(self.generation, None, now)
    }

    /// Advance the pursuit. A no-op outside ACTIVE. Returns the outcome on the tick
    /// the run ends.
    pub fn tick(&mut self, dt_seconds: f64, now: DateTime<Utc>) -> Option<RunOutcome> {
        if !self.is_active() {
            return None;
        }

        let sample = self.player.position.map(|position| PlayerSample {
            position,
            speed_mps: self.player.fix.and_then(|f| f.speed),
        });

        let run = self.run.as_mut()?;
        let status = run.engine.advance(sample, dt_seconds);
        if !status.is_terminal() {
            return None;
        }

        let result = run.engine.result();
        let captured = status == PursuitStatus::Captured;
        let rank = rank::rank(
            result.elapsed_seconds,
            run.target_distance_km,
            result.completed_objectives,
            result.total_objectives,
            captured,
        );
        let outcome = RunOutcome {
            status: if captured {
                RunStatus::GameOver
            } else {
                RunStatus::Victory
            },
            rank,
            duration_seconds: result.elapsed_seconds,
            distance_km: geodesy::path_length_m(&self.player.path) / 1_000.0,
        };

        run.outcome = Some(outcome);
        run.ended_at = Some(now);
        self.status = match outcome.status {
            RunStatus::Victory => GameStatus::Victory,
            RunStatus::GameOver => GameStatus::GameOver,
        };

        info!(
            status = %outcome.status,
            %rank,
            duration_seconds = outcome.duration_seconds,
            distance_km = outcome.distance_km,
            "run ended"
        );
        Some(outcome)
    }

    /// Back to IDLE from anywhere. Clears the run and the explored area.
    pub fn reset(&mut self) {
        self.generation = RunGeneration(self.generation.0 + 1);
        self.status = GameStatus::Idle;
        self.mode = None;
        self.layout = None;
        self.target_distance_km = self.config.target_distance_km;
        self.run = None;
        self.player.path.clear();
        self.player.max_speed_mps = 0.0;
        self.fog.reset();

        if let Some(position) = self.player.position {
            self.fog.preview(position);
        }

        info!(generation = %self.generation, "session reset");
    }

    pub fn outcome(&self) -> Option<RunOutcome> {
        self.run.as_ref().and_then(|r| r.outcome)
    }

    /// Telemetry for the finished run, ready for the history store.
    pub fn run_summary(&self) -> Option<RunSummary> {
        let run = self.run.as_ref()?;
        let outcome = run.outcome?;
        let result = run.engine.result();

        Some(RunSummary {
            mode: run.engine.mode(),
            status: outcome.status,
            rank: outcome.rank,
            path: self.player.path.clone(),
            duration_seconds: outcome.duration_seconds,
            distance_km: outcome.distance_km,
            objectives_completed: result.completed_objectives,
            objectives_total: result.total_objectives,
            finished_at: run.ended_at.unwrap_or(run.started_at),
        })
    }

    /// Everything explored so far, across runs until the next reset.
    pub fn explored_area(&self) -> Option<&Arc<ExploredArea>> {
        self.fog.accumulated()
    }

    pub fn coverage_m2(&self) -> f64 {
        self.fog.coverage_m2()
    }
}
