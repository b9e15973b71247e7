use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use shadow_runner_core::{
    geodesy::{GeoPoint, PositionFix},
    mission::objective::BonusObjective,
    pursuit::mode::GameMode,
    services::RunSummary,
    session::{GameStatus, RunOutcome},
    GameConfig, Session,
};

use crate::track::Track;

pub struct ReplayOptions {
    pub mode: GameMode,
    pub target_km: f64,
    pub speed_kph: f64,
    pub tick_ms: u64,
    pub accuracy_m: f64,
    pub toward_extraction: bool,
    pub max_minutes: f64,
}

#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub mode: GameMode,
    pub status: GameStatus,
    pub outcome: Option<RunOutcome>,
    pub extraction_point: Option<GeoPoint>,
    pub objectives: Vec<BonusObjective>,
    pub elapsed_seconds: f64,
    pub explored_m2: f64,
    pub max_speed_mps: f64,
    pub summary: Option<RunSummary>,
}

pub struct Replay {
    pub session: Session,
    pub report: ReplayReport,
}

/// Walk `track` at a constant speed, ticking the session until the run ends or
/// `max_minutes` of simulated time pass.
pub fn run(config: GameConfig, track: &Track, options: &ReplayOptions) -> Result<Replay> {
    let mut session = Session::new(config);
    session
        .set_target_distance_km(options.target_km)
        .context("Failed to set target distance")?;

    let start = track.start();
    session.apply_fix(PositionFix::at(start).with_accuracy(options.accuracy_m));
    session.select_mode(options.mode).context("Failed to select mode")?;

    let started_at = Utc::now();
    session.start(started_at).context("Failed to start run")?;

    let snapshot = session.snapshot();
    log::info!(
        "Run started at {:.5},{:.5}; extraction {:?}",
        start.latitude,
        start.longitude,
        snapshot.extraction_point
    );

    let path = match (options.toward_extraction, snapshot.extraction_point) {
        (true, Some(extraction)) => Track::new(vec![start, extraction])?,
        (true, None) => {
            log::warn!("--toward-extraction has no effect in {} mode", options.mode);
            track.clone()
        }
        (false, _) => track.clone(),
    };
    log::info!("Walking {:.0} m at {} km/h", path.length_m(), options.speed_kph);

    let speed_mps = options.speed_kph / 3.6;
    let dt = options.tick_ms.max(1) as f64 / 1_000.0;
    let max_ticks = (options.max_minutes * 60.0 / dt).ceil() as u64;

    let mut elapsed = 0.0;
    for tick in 0..max_ticks {
        elapsed += dt;
        let walked = speed_mps * elapsed;
        let moving = walked < path.length_m();

        let mut fix = PositionFix::at(path.position_at(walked))
            .with_accuracy(options.accuracy_m)
            .with_speed(if moving { speed_mps } else { 0.0 });
        if let Some(bearing) = path.bearing_at(walked).filter(|_| moving) {
            fix = fix.with_heading(bearing);
        }
        session.apply_fix(fix);

        if let Some(outcome) = session.tick(dt, clock(started_at, elapsed)) {
            log::info!(
                "Run ended after {} ticks: {} with rank {}",
                tick + 1,
                outcome.status,
                outcome.rank
            );
            break;
        }

        if tick % (60.0 / dt).max(1.0) as u64 == 0 {
            let snapshot = session.snapshot();
            log::debug!(
                "t={:.0}s shadow={:?}m extraction={:?}m",
                elapsed,
                snapshot.shadow_distance_m.map(f64::round),
                snapshot.distance_to_extraction_m.map(f64::round)
            );
        }
    }

    if session.status() == GameStatus::Active {
        log::warn!("Run still active after {} minutes", options.max_minutes);
    }

    let snapshot = session.snapshot();
    let report = ReplayReport {
        mode: options.mode,
        status: snapshot.status,
        outcome: snapshot.outcome,
        extraction_point: snapshot.extraction_point,
        objectives: snapshot.bonus_objectives,
        elapsed_seconds: snapshot.elapsed_seconds,
        explored_m2: session.coverage_m2(),
        max_speed_mps: snapshot.max_speed_mps,
        summary: session.run_summary(),
    };

    Ok(Replay { session, report })
}

fn clock(started_at: DateTime<Utc>, elapsed_seconds: f64) -> DateTime<Utc> {
    started_at + Duration::milliseconds((elapsed_seconds * 1_000.0) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadow_runner_core::{geodesy, mission::rank::Rank, session::RunStatus};

    const PARIS: GeoPoint = GeoPoint::new(48.8566, 2.3522);

    fn options(mode: GameMode, speed_kph: f64, toward_extraction: bool) -> ReplayOptions {
        ReplayOptions {
            mode,
            target_km: 1.0,
            speed_kph,
            tick_ms: 500,
            accuracy_m: 2.0,
            toward_extraction,
            max_minutes: 60.0,
        }
    }

    fn seeded() -> GameConfig {
        GameConfig {
            seed: Some(5),
            ..GameConfig::default()
        }
    }

    #[test]
    fn test_running_to_extraction_wins() {
        let track = Track::new(vec![PARIS]).unwrap();

        let replay = run(seeded(), &track, &options(GameMode::Extraction, 20.0, true)).unwrap();

        let outcome = replay.report.outcome.unwrap();
        assert_eq!(outcome.status, RunStatus::Victory);
        assert_eq!(replay.report.summary.unwrap().mode, GameMode::Extraction);
        assert!(replay.report.explored_m2 > 0.0);
    }

    #[test]
    fn test_standing_still_in_survival_is_caught() {
        let track = Track::new(vec![PARIS]).unwrap();

        let replay = run(seeded(), &track, &options(GameMode::Survival, 0.0, false)).unwrap();

        assert_eq!(replay.report.status, GameStatus::GameOver);
        assert_eq!(replay.report.outcome.unwrap().rank, Rank::F);
    }

    #[test]
    fn test_walking_away_from_extraction_does_not_win() {
        let track = Track::new(vec![PARIS, geodesy::destination(PARIS, 0.0, 200.0)]).unwrap();

        let replay = run(seeded(), &track, &options(GameMode::Extraction, 5.0, false)).unwrap();

        assert_ne!(replay.report.status, GameStatus::Victory);
    }
}
