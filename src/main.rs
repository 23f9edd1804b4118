//! SeatMeter Server: connection admission and usage metering.
//!
//! Main entry point that wires all crates together and starts the server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing;
use tracing_subscriber::{EnvFilter, fmt};

use seatmeter_api::{AppState, build_app};
use seatmeter_auth::JwtDecoder;
use seatmeter_core::config::{AppConfig, StoreBackend};
use seatmeter_core::error::AppError;
use seatmeter_database::{
    AccountRepository, AllowanceRepository, DatabasePool, MemoryAccountStore,
    MemoryAllowanceStore, MemorySessionDirectory, SessionRepository,
};
use seatmeter_realtime::{EngineStores, RealtimeEngine};
use seatmeter_worker::{AllowanceSweep, CronScheduler, SessionSweep};

#[tokio::main]
async fn main() {
    let env = std::env::var("SEATMETER_ENV").unwrap_or_else(|_| "development".to_string());

    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);
    tracing::info!("Configuration loaded (env: {})", env);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Build the collaborator stores for the configured backend.
async fn build_stores(
    config: &AppConfig,
) -> Result<(EngineStores, Option<DatabasePool>), AppError> {
    let identity = Arc::new(JwtDecoder::new(&config.auth));

    match config.database.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory stores; allowances are lost on restart");
            let stores = EngineStores {
                identity,
                accounts: Arc::new(MemoryAccountStore::new()),
                allowances: Arc::new(MemoryAllowanceStore::new()),
                sessions: Arc::new(MemorySessionDirectory::new()),
            };
            Ok((stores, None))
        }
        StoreBackend::Postgres => {
            let db = DatabasePool::connect(&config.database).await?;
            seatmeter_database::migration::run_migrations(&db.pool()).await?;
            let stores = EngineStores {
                identity,
                accounts: Arc::new(AccountRepository::new(db.pool())),
                allowances: Arc::new(AllowanceRepository::new(db.pool())),
                sessions: Arc::new(SessionRepository::new(db.pool())),
            };
            Ok((stores, Some(db)))
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting SeatMeter v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(config);
    let (stores, db) = build_stores(&config).await?;
    let sessions = Arc::clone(&stores.sessions);
    let allowances = Arc::clone(&stores.allowances);

    let engine = Arc::new(RealtimeEngine::new(&config, stores));

    let mut scheduler = if config.worker.enabled {
        let scheduler = CronScheduler::new(engine.meter.clock()).await?;
        scheduler
            .register_default_tasks(
                &config.worker,
                Arc::new(SessionSweep::new(sessions, &config.session)),
                Arc::new(AllowanceSweep::new(
                    allowances,
                    Arc::clone(&engine.lanes),
                    Arc::clone(&engine.dispatcher),
                    config.metering.expiring_soon_days,
                )),
            )
            .await?;
        scheduler.start().await?;
        Some(scheduler)
    } else {
        tracing::info!("Background sweeps disabled");
        None
    };

    let app = build_app(AppState::new(Arc::clone(&config), Arc::clone(&engine)));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {}: {}", addr, e)))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| AppError::internal(format!("Server failed: {}", e)))?;

    tracing::info!("HTTP server stopped, draining");

    if let Some(scheduler) = scheduler.as_mut() {
        scheduler.shutdown().await?;
    }

    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    if tokio::time::timeout(grace, engine.shutdown()).await.is_err() {
        tracing::warn!("Engine shutdown exceeded {}s grace period", grace.as_secs());
    }

    if let Some(db) = db {
        db.close().await;
    }

    tracing::info!("SeatMeter stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
