//! The task that owns a [`Session`] and feeds it from the outside world.

use std::sync::Arc;

use chrono::Utc;
use shadow_runner_core::{
    GameConfig, Session, SessionSnapshot,
    geodesy::{GeoPoint, PositionFix, area::ExploredArea},
    heading::CompassReading,
    pursuit::mode::GameMode,
    services::{
        ExplorationStore, PlayerId, RoutingError, RoutingService, RunHistoryStore, TravelProfile,
    },
    session::{GameStatus, RunGeneration},
};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{self, Duration, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::config::RuntimeConfig;

/// External collaborators a driver talks to.
#[derive(Clone)]
pub struct Services {
    pub router: Arc<dyn RoutingService>,
    pub exploration: Arc<dyn ExplorationStore>,
    pub history: Arc<dyn RunHistoryStore>,
}

#[derive(Debug, thiserror::Error)]
#[error("game driver is not running")]
pub struct DriverClosed;

#[derive(Debug, Clone)]
enum LocationUpdate {
    Fix(PositionFix),
    Error(String),
}

#[derive(Debug)]
enum Command {
    SelectMode {
        mode: GameMode,
        target_distance_km: Option<f64>,
    },
    Compass(Option<CompassReading>),
    Reset,
}

struct RouteReply {
    generation: RunGeneration,
    result: Result<Vec<GeoPoint>, RoutingError>,
}

/// Control surface for a running driver. Dropping it stops the driver.
pub struct GameHandle {
    commands: mpsc::UnboundedSender<Command>,
    location: watch::Sender<Option<LocationUpdate>>,
    snapshots: watch::Receiver<SessionSnapshot>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl GameHandle {
    /// Hand over the newest fix. Fixes the driver hasn't picked up yet are replaced.
    pub fn push_fix(&self, fix: PositionFix) {
        self.location.send_replace(Some(LocationUpdate::Fix(fix)));
    }

    pub fn push_location_error(&self, message: impl Into<String>) {
        self.location
            .send_replace(Some(LocationUpdate::Error(message.into())));
    }

    pub fn push_compass(&self, reading: Option<CompassReading>) -> Result<(), DriverClosed> {
        self.send(Command::Compass(reading))
    }

    pub fn select_mode(&self, mode: GameMode) -> Result<(), DriverClosed> {
        self.send(Command::SelectMode {
            mode,
            target_distance_km: None,
        })
    }

    pub fn select_mode_with_distance(
        &self,
        mode: GameMode,
        target_distance_km: f64,
    ) -> Result<(), DriverClosed> {
        self.send(Command::SelectMode {
            mode,
            target_distance_km: Some(target_distance_km),
        })
    }

    pub fn reset(&self) -> Result<(), DriverClosed> {
        self.send(Command::Reset)
    }

    pub fn snapshots(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Stop the driver, flushing any unsaved exploration first.
    pub async fn shutdown(mut self) -> eyre::Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            task.await?;
        }
        Ok(())
    }

    fn send(&self, command: Command) -> Result<(), DriverClosed> {
        self.commands.send(command).map_err(|_| DriverClosed)
    }
}

pub struct GameDriver {
    session: Session,
    services: Services,
    player: PlayerId,
    tick_interval: Duration,
    save_debounce: Duration,
    routing_timeout: Duration,

    commands: mpsc::UnboundedReceiver<Command>,
    location: watch::Receiver<Option<LocationUpdate>>,
    snapshots: watch::Sender<SessionSnapshot>,
    route_tx: mpsc::UnboundedSender<RouteReply>,
    route_rx: mpsc::UnboundedReceiver<RouteReply>,

    routing_for: Option<RunGeneration>,
    last_tick: Instant,
    unsaved: Option<Arc<ExploredArea>>,
    save_deadline: Option<Instant>,
}

impl GameDriver {
    /// Start a driver on the current tokio runtime.
    pub fn spawn(config: &RuntimeConfig, services: Services) -> GameHandle {
        Self::spawn_with(
            config.game.clone(),
            PlayerId::new(&config.player_id),
            config,
            services,
        )
    }

    pub fn spawn_with(
        game: GameConfig,
        player: PlayerId,
        config: &RuntimeConfig,
        services: Services,
    ) -> GameHandle {
        let session = Session::new(game);
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (location_tx, location) = watch::channel(None);
        let (snapshots, snapshots_rx) = watch::channel(session.snapshot());
        let (route_tx, route_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let driver = GameDriver {
            session,
            services,
            player,
            tick_interval: config.tick_interval(),
            save_debounce: config.save_debounce(),
            routing_timeout: config.routing_timeout(),
            commands,
            location,
            snapshots,
            route_tx,
            route_rx,
            routing_for: None,
            last_tick: Instant::now(),
            unsaved: None,
            save_deadline: None,
        };

        let task = tokio::spawn(driver.run(shutdown_rx));

        GameHandle {
            commands: commands_tx,
            location: location_tx,
            snapshots: snapshots_rx,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        self.restore().await;
        self.publish();

        let mut ticker = time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let ticking = self.session.is_active();
            let save_at = self.save_deadline;

            tokio::select! {
                _ = &mut shutdown => break,

                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command, &mut ticker),
                    None => break,
                },

                changed = self.location.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let update = self.location.borrow_and_update().clone();
                    match update {
                        Some(LocationUpdate::Fix(fix)) => self.session.apply_fix(fix),
                        Some(LocationUpdate::Error(message)) => self.session.report_location_error(message),
                        None => {}
                    }
                    self.try_launch(&mut ticker);
                }

                Some(reply) = self.route_rx.recv() => self.handle_route(reply, &mut ticker),

                _ = ticker.tick(), if ticking => self.tick(),

                _ = time::sleep_until(save_at.unwrap_or_else(Instant::now)), if save_at.is_some() => {
                    self.save_deadline = None;
                    self.flush_exploration().await;
                }
            }

            self.collect_unsaved();
            self.publish();
        }

        self.collect_unsaved();
        self.flush_exploration().await;
        info!("game driver stopped");
    }

    async fn restore(&mut self) {
        let store = Arc::clone(&self.services.exploration);
        match tokio::task::spawn_blocking(move || store.load_explored_area()).await {
            Ok(Ok(Some(area))) => self.session.restore_explored_area(area),
            Ok(Ok(None)) => debug!("no explored area to restore"),
            Ok(Err(error)) => warn!(%error, "failed to load explored area"),
            Err(error) => warn!(%error, "explored area load task failed"),
        }
    }

    fn handle_command(&mut self, command: Command, ticker: &mut time::Interval) {
        match command {
            Command::SelectMode {
                mode,
                target_distance_km,
            } => {
                let selected = target_distance_km
                    .map_or(Ok(()), |km| self.session.set_target_distance_km(km))
                    .and_then(|()| self.session.select_mode(mode));
                match selected {
                    Ok(_) => self.try_launch(ticker),
                    Err(error) => warn!(%error, %mode, "mode selection rejected"),
                }
            }
            Command::Compass(reading) => self.session.apply_compass(reading),
            Command::Reset => {
                self.session.reset();
                self.routing_for = None;
            }
        }
    }

    /// Launch as soon as a mode and a fix are both in. Extraction asks the router first.
    fn try_launch(&mut self, ticker: &mut time::Interval) {
        if self.session.status() != GameStatus::Idle || self.session.mode().is_none() {
            return;
        }
        if self.routing_for == Some(self.session.generation()) {
            return;
        }

        let request = match self.session.mission_request() {
            Ok(request) => request,
            Err(error) => {
                debug!(%error, "not ready to launch");
                return;
            }
        };

        if !request.needs_route() {
            self.launch(request.generation, None, ticker);
            return;
        }

        self.routing_for = Some(request.generation);
        let router = Arc::clone(&self.services.router);
        let replies = self.route_tx.clone();
        let timeout = self.routing_timeout;
        let start = request.layout.start;
        let destination = request.layout.rough_destination();

        tokio::spawn(async move {
            let result = time::timeout(timeout, router.route(start, destination, TravelProfile::Walking))
                .await
                .unwrap_or(Err(RoutingError::TimedOut));

            let _ = replies.send(RouteReply {
                generation: request.generation,
                result,
            });
        });
    }

    fn handle_route(&mut self, reply: RouteReply, ticker: &mut time::Interval) {
        if reply.generation != self.session.generation() {
            debug!(generation = %reply.generation, "dropping route for an abandoned run");
            return;
        }
        self.routing_for = None;

        let route = match reply.result {
            Ok(route) => Some(route),
            Err(error) => {
                warn!(%error, "routing failed, using straight-line mission");
                None
            }
        };

        self.launch(reply.generation, route, ticker);
    }

    fn launch(
        &mut self,
        generation: RunGeneration,
        route: Option<Vec<GeoPoint>>,
        ticker: &mut time::Interval,
    ) {
        if let Err(error) = self.session.launch(generation, route, Utc::now()) {
            warn!(%error, "launch rejected");
            return;
        }

        ticker.reset();
        self.last_tick = Instant::now();
    }

    fn tick(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_tick).as_secs_f64();
        self.last_tick = now;

        if self.session.tick(dt, Utc::now()).is_some() {
            self.record_run();
        }
    }

    fn record_run(&self) {
        let Some(summary) = self.session.run_summary() else {
            return;
        };

        let history = Arc::clone(&self.services.history);
        let player = self.player.clone();
        tokio::task::spawn_blocking(move || match history.record_run(&player, &summary) {
            Ok(profile) => info!(
                %player,
                games_played = profile.games_played,
                best_rank = ?profile.best_rank,
                "run recorded"
            ),
            Err(error) => warn!(%error, %player, "failed to record run"),
        });
    }

    fn collect_unsaved(&mut self) {
        if let Some(area) = self.session.take_explored_area_for_save() {
            self.unsaved = Some(area);
            if self.save_deadline.is_none() {
                self.save_deadline = Some(Instant::now() + self.save_debounce);
            }
        }
    }

    async fn flush_exploration(&mut self) {
        let Some(area) = self.unsaved.take() else {
            return;
        };

        let store = Arc::clone(&self.services.exploration);
        match tokio::task::spawn_blocking(move || store.save_explored_area(&area)).await {
            Ok(Ok(())) => debug!("explored area saved"),
            Ok(Err(error)) => warn!(%error, "failed to save explored area"),
            Err(error) => warn!(%error, "explored area save task failed"),
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.session.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use shadow_runner_core::{
        geodesy::{self, area},
        mission::rank::Rank,
        services::{BoxFuture, NoRouting, PlayerProfile, RunSummary, StoreError},
        session::RunStatus,
    };

    const PARIS: GeoPoint = GeoPoint::new(48.8566, 2.3522);

    #[derive(Default)]
    struct MemoryStore {
        area: Mutex<Option<ExploredArea>>,
        saves: Mutex<u32>,
        runs: Mutex<Vec<RunSummary>>,
    }

    impl ExplorationStore for MemoryStore {
        fn load_explored_area(&self) -> Result<Option<ExploredArea>, StoreError> {
            Ok(self.area.lock().unwrap().clone())
        }

        fn save_explored_area(&self, area: &ExploredArea) -> Result<(), StoreError> {
            *self.area.lock().unwrap() = Some(area.clone());
            *self.saves.lock().unwrap() += 1;
            Ok(())
        }
    }

    impl RunHistoryStore for MemoryStore {
        fn record_run(&self, _: &PlayerId, run: &RunSummary) -> Result<PlayerProfile, StoreError> {
            let mut runs = self.runs.lock().unwrap();
            runs.push(run.clone());
            let mut profile = PlayerProfile::default();
            runs.iter().for_each(|r| profile.record(r));
            Ok(profile)
        }

        fn profile(&self, _: &PlayerId) -> Result<Option<PlayerProfile>, StoreError> {
            Ok(None)
        }

        fn history(&self, _: &PlayerId, _: usize) -> Result<Vec<RunSummary>, StoreError> {
            Ok(self.runs.lock().unwrap().clone())
        }
    }

    /// Answers after `delay` with a route that ends 100 m east of the requested destination.
    struct DelayedRouter {
        delay: Duration,
    }

    impl RoutingService for DelayedRouter {
        fn route<'a>(
            &'a self,
            start: GeoPoint,
            destination: GeoPoint,
            _profile: TravelProfile,
        ) -> BoxFuture<'a, Result<Vec<GeoPoint>, RoutingError>> {
            Box::pin(async move {
                time::sleep(self.delay).await;
                Ok(vec![start, geodesy::destination(destination, 90.0, 100.0)])
            })
        }
    }

    fn config() -> RuntimeConfig {
        RuntimeConfig {
            game: GameConfig {
                seed: Some(7),
                ..GameConfig::default()
            },
            ..RuntimeConfig::default()
        }
    }

    fn services(router: Arc<dyn RoutingService>, store: &Arc<MemoryStore>) -> Services {
        Services {
            router,
            exploration: Arc::clone(store) as Arc<dyn ExplorationStore>,
            history: Arc::clone(store) as Arc<dyn RunHistoryStore>,
        }
    }

    async fn wait_for(
        handle: &GameHandle,
        what: impl FnMut(&SessionSnapshot) -> bool,
    ) -> SessionSnapshot {
        let mut snapshots = handle.snapshots();
        let snapshot = time::timeout(Duration::from_secs(3_600), snapshots.wait_for(what))
            .await
            .expect("timed out waiting for snapshot")
            .expect("driver stopped");
        snapshot.clone()
    }

    async fn settle(handle: &GameHandle, at: GeoPoint) {
        for _ in 0..50 {
            handle.push_fix(PositionFix::at(at).with_accuracy(3.0));
            time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_survival_run_is_caught_and_recorded() {
        let store = Arc::new(MemoryStore::default());
        let handle = GameDriver::spawn(&config(), services(Arc::new(NoRouting), &store));

        settle(&handle, PARIS).await;
        handle.select_mode(GameMode::Survival).unwrap();
        wait_for(&handle, |s| s.status == GameStatus::Active).await;

        let over = wait_for(&handle, |s| s.status == GameStatus::GameOver).await;
        assert_eq!(over.final_rank, Some(Rank::F));
        assert_eq!(over.hazard_intensity, 0.8);
        // 500 m at 15 km/h
        assert!(over.elapsed_seconds > 110.0 && over.elapsed_seconds < 130.0);

        for _ in 0..100 {
            if !store.runs.lock().unwrap().is_empty() {
                break;
            }
            time::sleep(Duration::from_millis(50)).await;
        }
        let runs = store.runs.lock().unwrap().clone();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::GameOver);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_extraction_uses_route_reply() {
        let store = Arc::new(MemoryStore::default());
        let router = Arc::new(DelayedRouter {
            delay: Duration::from_secs(1),
        });
        let handle = GameDriver::spawn(&config(), services(router, &store));

        settle(&handle, PARIS).await;
        handle.select_mode_with_distance(GameMode::Extraction, 1.5).unwrap();

        let active = wait_for(&handle, |s| s.status == GameStatus::Active).await;
        let route = active.route.unwrap();
        assert_eq!(active.extraction_point, route.last().copied());
        assert_eq!(active.bonus_objectives.len(), 3);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_router_falls_back_to_straight_line() {
        let store = Arc::new(MemoryStore::default());
        let router = Arc::new(DelayedRouter {
            delay: Duration::from_secs(60),
        });
        let handle = GameDriver::spawn(&config(), services(router, &store));

        settle(&handle, PARIS).await;
        let requested_at = Instant::now();
        handle.select_mode(GameMode::Extraction).unwrap();

        let active = wait_for(&handle, |s| s.status == GameStatus::Active).await;
        assert!(active.route.is_none());
        assert!(active.extraction_point.is_some());
        let waited = requested_at.elapsed();
        assert!(waited >= Duration::from_secs(5) && waited < Duration::from_secs(6));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_route_for_reset_run_is_dropped() {
        let store = Arc::new(MemoryStore::default());
        let router = Arc::new(DelayedRouter {
            delay: Duration::from_secs(2),
        });
        let handle = GameDriver::spawn(&config(), services(router, &store));

        settle(&handle, PARIS).await;
        handle.select_mode(GameMode::Extraction).unwrap();
        time::sleep(Duration::from_millis(500)).await;
        handle.reset().unwrap();

        time::sleep(Duration::from_secs(10)).await;

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.status, GameStatus::Idle);
        assert_eq!(snapshot.mode, None);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_distance_change_while_routing_uses_new_layout() {
        let store = Arc::new(MemoryStore::default());
        let router = Arc::new(DelayedRouter {
            delay: Duration::from_secs(2),
        });
        let handle = GameDriver::spawn(&config(), services(router, &store));

        settle(&handle, PARIS).await;
        handle.select_mode_with_distance(GameMode::Extraction, 1.5).unwrap();
        time::sleep(Duration::from_millis(500)).await;
        handle.select_mode_with_distance(GameMode::Extraction, 4.0).unwrap();

        let active = wait_for(&handle, |s| s.status == GameStatus::Active).await;
        let extraction = active.extraction_point.unwrap();
        let route = active.route.unwrap();
        assert_eq!(route.last().copied(), Some(extraction));
        // the router lands 100 m off the rough 4 km destination
        let distance = geodesy::distance_m(PARIS, extraction);
        assert!(distance > 3_850.0 && distance < 4_150.0, "{distance}");

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_exploration_restored_and_saved_after_debounce() {
        let store = Arc::new(MemoryStore::default());
        let restored = ExploredArea::new(vec![area::circle(
            geodesy::destination(PARIS, 0.0, 400.0),
            50.0,
            32,
        )]);
        *store.area.lock().unwrap() = Some(restored.clone());

        let handle = GameDriver::spawn(&config(), services(Arc::new(NoRouting), &store));
        settle(&handle, PARIS).await;
        assert_eq!(*store.saves.lock().unwrap(), 0);

        handle.select_mode(GameMode::Survival).unwrap();
        wait_for(&handle, |s| s.status == GameStatus::Active).await;
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*store.saves.lock().unwrap(), 0);

        time::sleep(Duration::from_secs(4)).await;
        assert!(*store.saves.lock().unwrap() >= 1);

        let saved = store.area.lock().unwrap().clone().unwrap();
        assert!(area::area_m2(&saved) > area::area_m2(&restored) * 1.5);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_location_error_reaches_snapshot() {
        let store = Arc::new(MemoryStore::default());
        let handle = GameDriver::spawn(&config(), services(Arc::new(NoRouting), &store));

        handle.push_location_error("position unavailable");

        let snapshot = wait_for(&handle, |s| s.gps_error.is_some()).await;
        assert_eq!(snapshot.gps_error.as_deref(), Some("position unavailable"));

        handle.shutdown().await.unwrap();
    }
}
