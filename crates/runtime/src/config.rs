use std::{path::PathBuf, time::Duration};

use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use shadow_runner_core::GameConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub tick_interval_ms: u64,
    /// Delay between the first unsaved change to the explored area and writing it out.
    pub save_debounce_ms: u64,
    pub routing_timeout_ms: u64,
    /// OSRM-compatible server. Runs use straight-line missions when unset.
    pub routing_base_url: Option<String>,
    pub database_path: PathBuf,
    pub player_id: String,
    pub game: GameConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            save_debounce_ms: 3_000,
            routing_timeout_ms: 5_000,
            routing_base_url: None,
            database_path: PathBuf::from("shadow-runner.db"),
            player_id: "local".into(),
            game: GameConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn load(path: impl Into<PathBuf>) -> eyre::Result<Self> {
        let path = path.into();
        let source = std::fs::read_to_string(&path)
            .wrap_err_with(|| format!("failed to read config {}", path.display()))?;

        Self::from_json(&source).wrap_err_with(|| format!("invalid config {}", path.display()))
    }

    pub fn from_json(source: &str) -> eyre::Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn routing_timeout(&self) -> Duration {
        Duration::from_millis(self.routing_timeout_ms)
    }
}
