pub mod config;
pub mod driver;
pub mod routing;
pub mod telemetry;

use std::sync::Arc;

use eyre::WrapErr;
use shadow_runner_core::services::{NoRouting, RoutingService};
use shadow_runner_storage::SqliteStore;
use tracing::info;

pub use config::RuntimeConfig;
pub use driver::{DriverClosed, GameDriver, GameHandle, Services};
pub use routing::HttpRouter;

/// Wire up the SQLite store and router named by `config` and start a driver.
pub fn start(config: &RuntimeConfig) -> eyre::Result<GameHandle> {
    let store = Arc::new(
        SqliteStore::open(&config.database_path)
            .wrap_err_with(|| format!("failed to open {}", config.database_path.display()))?,
    );

    let router: Arc<dyn RoutingService> = match &config.routing_base_url {
        Some(url) => {
            info!(%url, "routing enabled");
            Arc::new(HttpRouter::new(url.as_str(), config.routing_timeout())?)
        }
        None => {
            info!("no routing server configured, missions will be straight lines");
            Arc::new(NoRouting)
        }
    };

    Ok(GameDriver::spawn(
        config,
        Services {
            router,
            exploration: store.clone(),
            history: store,
        },
    ))
}
