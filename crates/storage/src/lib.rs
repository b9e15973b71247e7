//! SQLite persistence for explored areas and run history.

use std::{
    path::Path,
    str::FromStr,
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use shadow_runner_core::{
    geodesy::{
        GeoPoint,
        area::{self, ExploredArea},
    },
    mission::rank::Rank,
    pursuit::mode::GameMode,
    services::{ExplorationStore, PlayerId, PlayerProfile, RunHistoryStore, RunSummary, StoreError},
    session::RunStatus,
};
use tracing::{debug, info};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS explored_area (
        id          INTEGER PRIMARY KEY CHECK (id = 1),
        geojson     TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS runs (
        id                    INTEGER PRIMARY KEY AUTOINCREMENT,
        player_id             TEXT NOT NULL,
        mode                  TEXT NOT NULL,
        status                TEXT NOT NULL,
        rank                  TEXT NOT NULL,
        duration_seconds      REAL NOT NULL,
        distance_km           REAL NOT NULL,
        objectives_completed  INTEGER NOT NULL,
        objectives_total      INTEGER NOT NULL,
        path                  TEXT NOT NULL,
        finished_at           TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS runs_by_player ON runs (player_id, id);

    CREATE TABLE IF NOT EXISTS profiles (
        player_id          TEXT PRIMARY KEY,
        total_distance_km  REAL NOT NULL,
        games_played       INTEGER NOT NULL,
        extractions        INTEGER NOT NULL,
        captures           INTEGER NOT NULL,
        best_rank          TEXT,
        updated_at         TEXT
    );
";

/// Both stores on one SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(StoreError::backend)?;
        }

        let conn = Connection::open(path).map_err(StoreError::backend)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA busy_timeout=5000;
             PRAGMA synchronous=NORMAL;",
        )
        .map_err(StoreError::backend)?;

        info!(path = %path.display(), "opened store");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory().map_err(StoreError::backend)?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA).map_err(StoreError::backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// A panicked writer leaves SQLite consistent, so poisoning is ignored.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ExplorationStore for SqliteStore {
    fn load_explored_area(&self) -> Result<Option<ExploredArea>, StoreError> {
        let geojson: Option<String> = self
            .conn()
            .query_row("SELECT geojson FROM explored_area WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(StoreError::backend)?;

        geojson
            .map(|source| area::from_geojson(&source).map_err(|e| StoreError::Corrupt(e.to_string())))
            .transpose()
    }

    /// An empty area clears the stored one.
    fn save_explored_area(&self, explored: &ExploredArea) -> Result<(), StoreError> {
        let conn = self.conn();

        if explored.0.is_empty() {
            conn.execute("DELETE FROM explored_area", [])
                .map_err(StoreError::backend)?;
            debug!("cleared explored area");
            return Ok(());
        }

        conn.execute(
            "INSERT INTO explored_area (id, geojson, updated_at) VALUES (1, ?1, ?2)
             ON CONFLICT (id) DO UPDATE SET geojson = excluded.geojson,
                                            updated_at = excluded.updated_at",
            params![area::to_geojson(explored), Utc::now().to_rfc3339()],
        )
        .map_err(StoreError::backend)?;

        debug!(polygons = explored.0.len(), "saved explored area");
        Ok(())
    }
}

impl RunHistoryStore for SqliteStore {
    fn record_run(&self, player: &PlayerId, run: &RunSummary) -> Result<PlayerProfile, StoreError> {
        let path = serde_json::to_string(&run.path).map_err(StoreError::backend)?;

        let mut conn = self.conn();
        let tx = conn.transaction().map_err(StoreError::backend)?;

        tx.execute(
            "INSERT INTO runs (
                player_id, mode, status, rank, duration_seconds, distance_km,
                objectives_completed, objectives_total, path, finished_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                player.as_str(),
                run.mode.to_string(),
                run.status.to_string(),
                run.rank.to_string(),
                run.duration_seconds,
                run.distance_km,
                run.objectives_completed,
                run.objectives_total,
                path,
                run.finished_at.to_rfc3339(),
            ],
        )
        .map_err(StoreError::backend)?;

        let mut profile = select_profile(&tx, player)?.unwrap_or_default();
        profile.record(run);
        upsert_profile(&tx, player, &profile)?;

        tx.commit().map_err(StoreError::backend)?;

        info!(
            %player,
            rank = %run.rank,
            games_played = profile.games_played,
            "recorded run"
        );
        Ok(profile)
    }

    fn profile(&self, player: &PlayerId) -> Result<Option<PlayerProfile>, StoreError> {
        let conn = self.conn();
        select_profile(&conn, player)
    }

    fn history(&self, player: &PlayerId, limit: usize) -> Result<Vec<RunSummary>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT mode, status, rank, duration_seconds, distance_km,
                        objectives_completed, objectives_total, path, finished_at
                 FROM runs WHERE player_id = ?1
                 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(StoreError::backend)?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![player.as_str(), limit], RawRun::from_row)
            .map_err(StoreError::backend)?;

        rows.map(|row| row.map_err(StoreError::backend)?.into_summary())
            .collect()
    }
}

struct RawRun {
    mode: String,
    status: String,
    rank: String,
    duration_seconds: f64,
    distance_km: f64,
    objectives_completed: u32,
    objectives_total: u32,
    path: String,
    finished_at: String,
}

impl RawRun {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            mode: row.get(0)?,
            status: row.get(1)?,
            rank: row.get(2)?,
            duration_seconds: row.get(3)?,
            distance_km: row.get(4)?,
            objectives_completed: row.get(5)?,
            objectives_total: row.get(6)?,
            path: row.get(7)?,
            finished_at: row.get(8)?,
        })
    }

    fn into_summary(self) -> Result<RunSummary, StoreError> {
        let path: Vec<GeoPoint> = serde_json::from_str(&self.path)
            .map_err(|e| StoreError::Corrupt(format!("bad path in db: {e}")))?;

        Ok(RunSummary {
            mode: parse::<GameMode>(&self.mode, "mode")?,
            status: parse::<RunStatus>(&self.status, "status")?,
            rank: parse::<Rank>(&self.rank, "rank")?,
            path,
            duration_seconds: self.duration_seconds,
            distance_km: self.distance_km,
            objectives_completed: self.objectives_completed,
            objectives_total: self.objectives_total,
            finished_at: parse_time(&self.finished_at)?,
        })
    }
}

fn parse<T: FromStr>(value: &str, column: &str) -> Result<T, StoreError> {
    T::from_str(value).map_err(|_| StoreError::Corrupt(format!("bad {column} in db: {value:?}")))
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp in db: {e}")))
}

fn select_profile(conn: &Connection, player: &PlayerId) -> Result<Option<PlayerProfile>, StoreError> {
    let row = conn
        .query_row(
            "SELECT total_distance_km, games_played, extractions, captures, best_rank, updated_at
             FROM profiles WHERE player_id = ?1",
            params![player.as_str()],
            |row| {
                Ok((
                    row.get::<_, f64>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            },
        )
        .optional()
        .map_err(StoreError::backend)?;

    let Some((total_distance_km, games_played, extractions, captures, best_rank, updated_at)) = row
    else {
        return Ok(None);
    };

    Ok(Some(PlayerProfile {
        total_distance_km,
        games_played,
        extractions,
        captures,
        best_rank: best_rank
            .as_deref()
            .map(|r| parse::<Rank>(r, "best_rank"))
            .transpose()?,
        updated_at: updated_at.as_deref().map(parse_time).transpose()?,
    }))
}

fn upsert_profile(
    tx: &Transaction<'_>,
    player: &PlayerId,
    profile: &PlayerProfile,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO profiles (
            player_id, total_distance_km, games_played, extractions, captures, best_rank, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT (player_id) DO UPDATE SET
            total_distance_km = excluded.total_distance_km,
            games_played = excluded.games_played,
            extractions = excluded.extractions,
            captures = excluded.captures,
            best_rank = excluded.best_rank,
            updated_at = excluded.updated_at",
        params![
            player.as_str(),
            profile.total_distance_km,
            profile.games_played,
            profile.extractions,
            profile.captures,
            profile.best_rank.map(|r| r.to_string()),
            profile.updated_at.map(|t| t.to_rfc3339()),
        ],
    )
    .map_err(StoreError::backend)?;
    Ok(())
}
