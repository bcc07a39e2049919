use anyhow::{Context as _, Result};
use chrono::Local;
use healthpulse_daemon::{
    collector::{LinuxMetricsSource, MetricsSource},
    config::Config,
    db::Database,
    detector::AnomalySignal,
    learner,
    metrics::HistoryRow,
    notifier::Notifier,
    profile::BaselineProfile,
    protocol::{AlertData, LimitParams, Request, Response, StatusData},
    session::HealthSession,
    socket::{encode, handle_client, RequestHandler, SocketServer},
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_QUERY_LIMIT: u32 = 100;
const CLEANUP_EVERY: Duration = Duration::from_secs(24 * 60 * 60);

struct DaemonState {
    source: Arc<LinuxMetricsSource>,
    session: HealthSession,
    db: Mutex<Database>,
    notifier: Notifier,
    config: Config,
    db_path: PathBuf,
    profile_path: PathBuf,
    broadcast_tx: broadcast::Sender<String>,
    latest: RwLock<Option<StatusData>>,
    rebuilding: AtomicBool,
}

impl DaemonState {
    /// Runs a collector read on a blocking worker; the `/proc` scans touch
    /// every process on the host.
    async fn collect<T, F>(&self, read: F) -> Option<T>
    where
        F: FnOnce(&LinuxMetricsSource) -> T + Send + 'static,
        T: Send + 'static,
    {
        let source = Arc::clone(&self.source);
        match tokio::task::spawn_blocking(move || read(&source)).await {
            Ok(value) => Some(value),
            Err(e) => {
                error!("Collector task failed: {}", e);
                None
            }
        }
    }

    fn broadcast(&self, response: &Response) {
        if let Some(json) = encode(response) {
            // No receivers just means no client is connected.
            let _ = self.broadcast_tx.send(json);
        }
    }

    async fn handle_alert(&self, signal: AnomalySignal) {
        let message = signal.message();
        let top_process = self
            .collect(|source| source.top_process())
            .await
            .flatten()
            .map(|p| p.name);
        let body = match &top_process {
            Some(name) => format!("{}. Busiest process: {}", message, name),
            None => message.clone(),
        };
        warn!("Anomaly: {}", body);

        {
            let db = self.db.lock().await;
            if let Err(e) = db.insert_event("anomaly", &body) {
                error!("Failed to save alert: {}", e);
            }
        }

        // notify-rust talks to D-Bus synchronously
        let title = format!("HealthPulse: unusual {} usage", signal.kind);
        let notifier = self.notifier.clone();
        tokio::task::spawn_blocking(move || notifier.send(&title, &body));

        self.broadcast(&Response::Alert {
            data: AlertData { signal, message, top_process },
        });
    }

    /// Rebuilds the baseline off the async runtime and publishes it.
    async fn rebuild_profile(&self) -> Result<Option<Arc<BaselineProfile>>> {
        if self.rebuilding.swap(true, Ordering::SeqCst) {
            anyhow::bail!("profile rebuild already in progress");
        }

        let db_path = self.db_path.clone();
        let profile_path = self.profile_path.clone();
        let schedule = self.config.baseline.schedule();
        let limit = self.config.general.history_limit;
        let now = Local::now().naive_local();
        let result = tokio::task::spawn_blocking(move || {
            learner::rebuild_profile(&db_path, &profile_path, schedule, limit, now)
        })
        .await;
        self.rebuilding.store(false, Ordering::SeqCst);

        let Some(profile) = result.context("profile rebuild task panicked")?? else {
            return Ok(None);
        };
        self.session.publish_profile(profile);
        {
            let db = self.db.lock().await;
            if let Err(e) = db.insert_event("profile", "Baseline profile rebuilt") {
                error!("Failed to record profile rebuild: {}", e);
            }
        }
        Ok(self.session.profile())
    }
}

#[async_trait::async_trait]
impl RequestHandler for DaemonState {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => match self.latest.read().await.clone() {
                Some(data) => Response::Status { data },
                None => Response::error("no sample taken yet"),
            },

            Request::GetSystemInfo => Response::SystemInfo { data: self.source.system_info() },

            Request::GetHistory { params: LimitParams { limit } } => {
                let db = self.db.lock().await;
                match db.get_recent_history(limit.unwrap_or(DEFAULT_QUERY_LIMIT)) {
                    Ok(rows) => Response::data(serde_json::json!(rows)),
                    Err(e) => Response::error(e.to_string()),
                }
            }

            Request::GetEvents { params: LimitParams { limit } } => {
                let db = self.db.lock().await;
                match db.get_events(limit.unwrap_or(DEFAULT_QUERY_LIMIT)) {
                    Ok(events) => Response::data(serde_json::json!(events)),
                    Err(e) => Response::error(e.to_string()),
                }
            }

            Request::GetProfile => match self.session.profile() {
                Some(profile) => Response::data(serde_json::json!(*profile)),
                None => Response::error("no baseline profile yet"),
            },

            Request::RebuildProfile => match self.rebuild_profile().await {
                Ok(Some(profile)) => Response::data(serde_json::json!(*profile)),
                Ok(None) => Response::error("no history recorded yet"),
                Err(e) => Response::error(e.to_string()),
            },

            Request::GetConfig => Response::Config { data: Box::new(self.config.clone()) },
        }
    }
}

/// Scores the host every display tick and raises debounced alerts.
async fn display_loop(state: Arc<DaemonState>) {
    let period = Duration::from_secs(state.config.general.display_interval_secs.max(1));
    let mut interval = tokio::time::interval(period);
    let mut last_status = None;

    loop {
        interval.tick().await;

        let Some(metrics) = state.collect(|source| source.get_all_metrics()).await else {
            continue;
        };
        let now = Local::now().naive_local();
        let evaluation = state.session.evaluate(&metrics, now);
        let health = evaluation.health;

        if last_status != Some(health.status) {
            info!("Health is now {} ({:.0})", health.status.label(), health.score);
            last_status = Some(health.status);
        }
        debug!("Health score {:.1}, {} anomalies", health.score, evaluation.anomalies.len());

        let status = StatusData {
            timestamp: now,
            score: health.score,
            status: health.status,
            color: health.status.color().to_string(),
            blink: health.status.blinks(),
            metrics,
            has_battery: state.source.has_battery(),
            has_temperature: state.source.has_temperature_sensor(),
            profile_loaded: state.session.profile().is_some(),
        };
        state.broadcast(&Response::Status { data: status.clone() });
        *state.latest.write().await = Some(status);

        for signal in evaluation.alerts {
            state.handle_alert(signal).await;
        }
    }
}

/// Writes one history row per logger tick and prunes old rows daily.
async fn logger_loop(state: Arc<DaemonState>) {
    let period = Duration::from_secs(state.config.general.logger_interval_secs.max(1));
    let mut interval = tokio::time::interval(period);
    let mut last_cleanup = Instant::now();

    loop {
        interval.tick().await;

        let Some(row) = state
            .collect(|source| {
                let metrics = source.get_all_metrics();
                HistoryRow::from_metrics(Local::now().naive_local(), &metrics)
                    .with_charging(source.is_charging())
                    .with_top_process(source.top_process())
            })
            .await
        else {
            continue;
        };

        let db = state.db.lock().await;
        match db.insert_metric(&row) {
            Ok(_) => debug!("History row saved"),
            Err(e) => error!("Failed to save history row: {}", e),
        }

        if last_cleanup.elapsed() >= CLEANUP_EVERY {
            last_cleanup = Instant::now();
            match db.cleanup_old_data(state.config.general.retention_days) {
                Ok(removed) => info!("Pruned {} old history rows", removed),
                Err(e) => error!("Failed to prune history: {}", e),
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!("HealthPulse daemon starting...");

    let config = Config::load_or_default(&Config::config_path());

    // Initialize database
    let db_path = Config::database_path();
    let db = Database::open(&db_path).with_context(|| format!("opening {:?}", db_path))?;
    db.init_schema()?;
    match db.cleanup_old_data(config.general.retention_days) {
        Ok(removed) if removed > 0 => info!("Pruned {} old history rows", removed),
        Ok(_) => {}
        Err(e) => warn!("Failed to prune history: {}", e),
    }

    // Load the last learned baseline; detection falls back to defaults without one
    let profile_path = Config::profile_path();
    let profile = BaselineProfile::load_optional(&profile_path).unwrap_or_else(|e| {
        warn!("Ignoring unreadable profile {:?}: {}", profile_path, e);
        None
    });
    match &profile {
        Some(p) => info!("Loaded baseline profile created {}", p.created_at),
        None => info!("No baseline profile yet, using fallback thresholds"),
    }

    let source = LinuxMetricsSource::new();
    let info = source.system_info();
    info!(
        "Monitoring {} {} ({}), {} CPUs, battery: {}, temperature: {}",
        info.os,
        info.release,
        info.machine,
        info.cpu_count,
        source.has_battery(),
        source.has_temperature_sensor()
    );

    let socket_path = SocketServer::socket_path();
    let server = SocketServer::bind(&socket_path).await?;

    let state = Arc::new(DaemonState {
        source: Arc::new(source),
        session: HealthSession::new(&config, profile),
        db: Mutex::new(db),
        notifier: Notifier::new(config.general.notifications),
        db_path,
        profile_path,
        broadcast_tx: server.broadcast_sender(),
        latest: RwLock::new(None),
        rebuilding: AtomicBool::new(false),
        config,
    });

    if state.config.baseline.rebuild_on_startup {
        let rebuild_state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = rebuild_state.rebuild_profile().await {
                error!("Baseline rebuild failed: {:#}", e);
            }
        });
    }

    tokio::spawn(display_loop(Arc::clone(&state)));
    tokio::spawn(logger_loop(Arc::clone(&state)));

    info!("Daemon ready, listening for connections...");

    loop {
        tokio::select! {
            accepted = server.accept() => match accepted {
                Ok(stream) => {
                    let state = Arc::clone(&state);
                    let broadcast_rx = server.broadcast_sender().subscribe();
                    tokio::spawn(async move {
                        handle_client(stream, broadcast_rx, state).await;
                    });
                }
                Err(e) => error!("Failed to accept connection: {}", e),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }
    Ok(())
}
