use anyhow::{Context, Result};
use axum::{routing::get, Router};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod db;
mod error;
mod models;
mod services;

use api::voice::VoiceRecording;
use config::AppConfig;
use services::media_probe::MediaProbe;
use services::recorder::CaptureSlots;
use services::registry::SessionRegistry;
use services::showcase::Showcase;
use services::view_tracking::PlaybackSession;

/// How often the reaper looks for idle sessions
const REAPER_INTERVAL: Duration = Duration::from_secs(60);

/// Tracks all background task handles for graceful shutdown
struct BackgroundTasks {
    handles: Vec<(&'static str, JoinHandle<()>)>,
    shutdown: CancellationToken,
}

impl BackgroundTasks {
    fn new() -> Self {
        Self {
            handles: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    fn token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.handles.push((name, handle));
    }

    async fn shutdown(self) {
        tracing::info!("Initiating graceful shutdown...");

        // Signal all tasks to stop
        self.shutdown.cancel();

        // Wait for all tasks with a timeout
        for (name, handle) in self.handles {
            tracing::debug!("Waiting for {} to finish...", name);
            match tokio::time::timeout(Duration::from_secs(10), handle).await {
                Ok(Ok(())) => tracing::debug!("{} finished cleanly", name),
                Ok(Err(e)) => tracing::warn!("{} panicked: {}", name, e),
                Err(_) => tracing::warn!("{} timed out during shutdown", name),
            }
        }

        tracing::info!("All background tasks stopped");
    }
}

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: AppConfig,
    /// Mounted ad showcases (sequencer + carousels)
    pub showcases: SessionRegistry<Showcase>,
    /// Mounted players, one view guard each
    pub playback: SessionRegistry<PlaybackSession>,
    /// Voice recordings in progress or awaiting send
    pub recordings: SessionRegistry<VoiceRecording>,
    /// Per-user exclusive capture slots
    pub capture: CaptureSlots,
    pub probe: MediaProbe,
}

impl AppState {
    pub fn new(db: sqlx::SqlitePool, config: AppConfig) -> Self {
        let probe = MediaProbe::new(config.ads.probe_timeout());
        Self {
            db,
            config,
            showcases: SessionRegistry::new("showcase"),
            playback: SessionRegistry::new("playback"),
            recordings: SessionRegistry::new("recording"),
            capture: CaptureSlots::new(),
            probe,
        }
    }

    /// Drop every session idle for longer than `max_idle`
    async fn reap_idle_sessions(&self, max_idle: Duration) -> usize {
        let showcases = self.showcases.reap_idle(max_idle).await;
        for showcase in &showcases {
            showcase.unmount();
        }
        let players = self.playback.reap_idle(max_idle).await;
        let recordings = self.recordings.reap_idle(max_idle).await;

        showcases.len() + players.len() + recordings.len()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reelcast=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = AppConfig::load();

    config
        .paths
        .ensure_dirs()
        .await
        .context("Failed to create application directories")?;

    config.log_config();

    // Database setup
    let database_url = config.database_url();
    tracing::debug!("Database URL: {}", database_url);

    let connect_options = SqliteConnectOptions::from_str(&database_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        // Comments cascade with their content row
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .test_before_acquire(true)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                use sqlx::Executor;
                // Cache size: -16000 = 16MB (negative = KB)
                conn.execute("PRAGMA cache_size = -16000").await?;
                conn.execute("PRAGMA temp_store = MEMORY").await?;
                Ok(())
            })
        })
        .connect_with(connect_options)
        .await
        .context("Failed to open database")?;

    tracing::info!("SQLite configured: WAL mode, 16MB cache (per connection)");

    db::migrate(&pool).await?;

    let state = Arc::new(AppState::new(pool, config.clone()));

    // Initialize background task manager with graceful shutdown support
    let mut bg_tasks = BackgroundTasks::new();
    let shutdown_token = bg_tasks.token();

    // Spawn idle session reaper with cancellation
    {
        let reaper_state = state.clone();
        let cancel = shutdown_token.clone();
        let max_idle = config.session_idle();
        bg_tasks.spawn("session-reaper", async move {
            tracing::info!(
                "Session reaper started (idle limit: {} minutes)",
                max_idle.as_secs() / 60
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Session reaper received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(REAPER_INTERVAL) => {
                        let removed = reaper_state.reap_idle_sessions(max_idle).await;
                        if removed > 0 {
                            tracing::info!("Reaped {} idle sessions", removed);
                        }
                    }
                }
            }
        });
    }

    // Build router
    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(api::routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", config.bind_address))?;
    tracing::info!("Starting server on {}", addr);

    // Create shutdown signal listener
    let shutdown_signal = async {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
            _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
        }
    };

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    // After server stops, gracefully shutdown background tasks
    bg_tasks.shutdown().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}
