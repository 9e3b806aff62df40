//! HTTP server bootstrap: wires config into a `Database`, `PayloadRegistry`,
//! `BlobLocator`, `JobService`, and `AuthService`, then serves the router
//! with graceful shutdown (spec §2, §6.1).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use orchestrator_core::{
    auto_migrate, create_pool, load_class_specs_from_file, AuthService, BlobLocator, Config,
    Database, JobRepository, JobService, PayloadRegistry, Result, Sweeper, SweeperConfig,
};
use tracing::info;

use crate::routes::create_router;
use crate::state::AppState;

pub async fn run(config: Config) -> Result<()> {
    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .map_err(|e| orchestrator_core::Error::config(format!("invalid host: {}", e)))?,
        config.server.port,
    ));

    let app_state = create_app_state(&config).await?;

    let app = create_router(app_state);

    info!("orchestrator API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| orchestrator_core::Error::transient(format!("failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.graceful_shutdown_timeout_secs))
        .await
        .map_err(|e| orchestrator_core::Error::transient(e.to_string()))?;

    Ok(())
}

async fn create_app_state(config: &Config) -> Result<AppState> {
    let pool = create_pool(&config.database).await?;
    auto_migrate(&pool).await?;
    let db = Database::new(pool.clone());

    let specs = load_class_specs_from_file(&config.registry.classes_file)?;
    let registry = Arc::new(PayloadRegistry::new(specs)?);

    let shared_config = aws_config::load_from_env().await;
    let s3_client = aws_sdk_s3::Client::new(&shared_config);
    let blob = Arc::new(BlobLocator::new(s3_client, &config.blob));

    let repository = JobRepository::new(db.clone());
    let job_service = Arc::new(JobService::new(
        repository.clone(),
        registry.clone(),
        blob.clone(),
    ));

    let sweeper_config = SweeperConfig {
        grace: chrono::Duration::minutes(config.sweeper.grace_minutes),
        tick: Duration::from_secs(config.sweeper.tick_secs),
    };
    let sweeper = Arc::new(Sweeper::new(Arc::new(repository), sweeper_config));
    sweeper.spawn();

    let auth_service = Arc::new(AuthService::new(config.security.clone()));

    Ok(AppState::new(job_service, auth_service, db))
}

/// Waits for ctrl-c or SIGTERM, then gives in-flight requests a grace
/// window before the listener is dropped.
async fn shutdown_signal(grace_secs: u64) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, draining in-flight requests");
    tokio::time::sleep(Duration::from_secs(grace_secs.min(5))).await;
}
