//! Contracts for the collaborators the core talks to.
//!
//! Routing is async and may be slow or absent; storage is synchronous and callers are
//! expected to move it off any latency-sensitive task.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    geodesy::{GeoPoint, area::ExploredArea},
    mission::rank::Rank,
    pursuit::mode::GameMode,
    session::RunStatus,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Authenticated identity that run history is keyed by.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PlayerId(Arc<str>);

impl PlayerId {
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(s.as_ref().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum TravelProfile {
    Walking,
}

#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("routing request failed: {0}")]
    Transport(String),

    #[error("routing service answered with status {0}")]
    Status(u16),

    #[error("routing service found no route")]
    NoRoute,

    #[error("routing request timed out")]
    TimedOut,

    #[error("unreadable routing response: {0}")]
    Decode(String),

    #[error("no routing service configured")]
    Unavailable,
}

pub trait RoutingService: Send + Sync {
    /// An ordered walkable polyline from `start` toward `destination`.
    fn route<'a>(
        &'a self,
        start: GeoPoint,
        destination: GeoPoint,
        profile: TravelProfile,
    ) -> BoxFuture<'a, Result<Vec<GeoPoint>, RoutingError>>;
}

/// Always fails, which sends every run down the straight-line path.
pub struct NoRouting;

impl RoutingService for NoRouting {
    fn route<'a>(
        &'a self,
        _start: GeoPoint,
        _destination: GeoPoint,
        _profile: TravelProfile,
    ) -> BoxFuture<'a, Result<Vec<GeoPoint>, RoutingError>> {
        Box::pin(async { Err(RoutingError::Unavailable) })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn backend(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Backend(Box::new(error))
    }
}

pub trait ExplorationStore: Send + Sync {
    fn load_explored_area(&self) -> Result<Option<ExploredArea>, StoreError>;
    fn save_explored_area(&self, area: &ExploredArea) -> Result<(), StoreError>;
}

/// Telemetry for one finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub mode: GameMode,
    pub status: RunStatus,
    pub rank: Rank,
    pub path: Vec<GeoPoint>,
    pub duration_seconds: f64,
    pub distance_km: f64,
    pub objectives_completed: u32,
    pub objectives_total: u32,
    pub finished_at: DateTime<Utc>,
}

/// Cumulative statistics across every recorded run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub total_distance_km: f64,
    pub games_played: u32,
    pub extractions: u32,
    pub captures: u32,
    pub best_rank: Option<Rank>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PlayerProfile {
    /// Fold one run into the totals.
    pub fn record(&mut self, run: &RunSummary) {
        self.total_distance_km += run.distance_km;
        self.games_played += 1;
        match run.status {
            RunStatus::Victory => self.extractions += 1,
            RunStatus::GameOver => self.captures += 1,
        }
        self.best_rank = Rank::best(self.best_rank, Some(run.rank));
        self.updated_at = Some(run.finished_at);
    }
}

pub trait RunHistoryStore: Send + Sync {
    /// Persist a run and return the updated profile.
    fn record_run(&self, player: &PlayerId, run: &RunSummary) -> Result<PlayerProfile, StoreError>;
    fn profile(&self, player: &PlayerId) -> Result<Option<PlayerProfile>, StoreError>;
    /// Most recent first.
    fn history(&self, player: &PlayerId, limit: usize) -> Result<Vec<RunSummary>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(status: RunStatus, rank: Rank, distance_km: f64) -> RunSummary {
        RunSummary {
            mode: GameMode::Extraction,
            status,
            rank,
            path: vec![],
            duration_seconds: 600.0,
            distance_km,
            objectives_completed: 0,
            objectives_total: 3,
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_profile_accumulates_runs() {
        let mut profile = PlayerProfile::default();

        profile.record(&run(RunStatus::Victory, Rank::B, 2.1));
        profile.record(&run(RunStatus::GameOver, Rank::F, 0.4));
        profile.record(&run(RunStatus::Victory, Rank::A, 1.9));

        assert_eq!(profile.games_played, 3);
        assert_eq!(profile.extractions, 2);
        assert_eq!(profile.captures, 1);
        assert_eq!(profile.best_rank, Some(Rank::A));
        assert!((profile.total_distance_km - 4.4).abs() < 1e-9);
    }

    #[test]
    fn test_worse_rank_does_not_replace_best() {
        let mut profile = PlayerProfile::default();

        profile.record(&run(RunStatus::Victory, Rank::S, 2.0));
        profile.record(&run(RunStatus::Victory, Rank::C, 2.0));

        assert_eq!(profile.best_rank, Some(Rank::S));
    }
}
