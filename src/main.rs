//! GeoStitch server — chunked GeoTIFF reassembly for drone-survey bookings.
//!
//! Main entry point that wires all crates together and starts the server.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

use geostitch_core::config::AppConfig;
use geostitch_core::error::AppError;
use geostitch_core::traits::object_store::ObjectStore;
use geostitch_database::connection::DatabasePool;
use geostitch_database::migration::run_migrations;
use geostitch_database::repositories::resource::ResourceRepository;
use geostitch_database::repositories::session::SessionRepository;
use geostitch_entity::registry::{ResourceCatalog, SessionRegistry};
use geostitch_service::dispatch::{ReassemblyService, TriggerDispatcher};
use geostitch_service::finalizer::Finalizer;
use geostitch_service::imagery::ImageryLookup;
use geostitch_storage::chunked::assembler::ReassemblyEngine;
use geostitch_storage::chunked::completion::CompletionChecker;
use geostitch_storage::chunked::locator::ChunkLocator;
use geostitch_storage::chunked::manifest::ManifestResolver;
use geostitch_storage::providers::build_store;
use geostitch_worker::CronScheduler;
use geostitch_worker::executor::JobExecutor;
use geostitch_worker::jobs::janitor::MultipartJanitorHandler;
use geostitch_worker::jobs::sweep::SweepJobHandler;

#[tokio::main]
async fn main() {
    let env = std::env::var("GEOSTITCH_ENV").unwrap_or_else(|_| "development".to_string());
    let config = match AppConfig::load(&env) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

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
                .init();
        }
        _ => {
            fmt().pretty().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting GeoStitch v{}", env!("CARGO_PKG_VERSION"));
    let config = Arc::new(config);

    // Infrastructure
    let db = DatabasePool::connect(&config.database).await?;
    run_migrations(db.pool()).await?;
    let store: Arc<dyn ObjectStore> = build_store(&config.object_store).await?;

    // Registries
    let registry: Arc<dyn SessionRegistry> =
        Arc::new(SessionRepository::new(db.pool().clone()));
    let catalog: Arc<dyn ResourceCatalog> =
        Arc::new(ResourceRepository::new(db.pool().clone()));

    // Reassembly pipeline
    let presign_expiry =
        Duration::from_secs(config.object_store.presign_expiry_days * 24 * 3600);
    let resolver = ManifestResolver::new(Arc::clone(&store), Arc::clone(&registry));
    let locator = ChunkLocator::new(Arc::clone(&store));
    let checker = CompletionChecker::new(Arc::clone(&store), Arc::clone(&registry));
    let engine = ReassemblyEngine::new(
        Arc::clone(&store),
        config.object_store.min_part_size_bytes,
    );
    let finalizer = Finalizer::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&catalog),
        presign_expiry,
    );
    let service = Arc::new(ReassemblyService::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        resolver,
        locator,
        checker,
        engine,
        finalizer,
    ));
    let dispatcher = Arc::new(TriggerDispatcher::new(
        service,
        Arc::clone(&registry),
        config.worker.sweep_batch_size,
    ));
    let imagery = Arc::new(ImageryLookup::new(
        Arc::clone(&registry),
        Arc::clone(&store),
        presign_expiry,
    ));

    // Background worker
    let mut scheduler = None;
    if config.worker.enabled {
        let mut executor = JobExecutor::new();
        executor.register(Arc::new(SweepJobHandler::new(Arc::clone(&dispatcher))));
        executor.register(Arc::new(MultipartJanitorHandler::new(
            Arc::clone(&store),
            config.worker.janitor_max_age_hours,
        )));

        let cron = CronScheduler::new(Arc::new(executor), config.worker.clone()).await?;
        cron.register_default_tasks().await?;
        cron.start().await?;
        scheduler = Some(cron);
    }

    // HTTP server
    let state = geostitch_api::state::AppState {
        config: Arc::clone(&config),
        db: db.clone(),
        store,
        catalog,
        dispatcher,
        imagery,
    };
    let router = geostitch_api::router::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

    if let Some(mut cron) = scheduler {
        cron.shutdown().await?;
    }
    db.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl-C.
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Shutdown signal received");
    }
}
