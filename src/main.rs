use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use incident_bridge::clients::{BetterStackClient, ThrukClient};
use incident_bridge::config::{AppConfig, StoreBackendKind};
use incident_bridge::db::{CorrelationBackend, MemoryBackend, SqliteBackend, Store};
use incident_bridge::services::backup::{finalize_store, spawn_periodic_backup};
use incident_bridge::{routes, AppState};
use mimalloc::MiMalloc;
use tokio::signal;
use tokio::sync::Notify;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// M-MIMALLOC-APP: Use mimalloc as global allocator for improved performance.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "incident_bridge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    let backend: Arc<dyn CorrelationBackend> = match config.store_backend {
        StoreBackendKind::Sqlite => {
            let path = config
                .sqlite_db_path
                .as_deref()
                .context("SQLITE_DB_PATH is required for the sqlite store")?;
            Arc::new(SqliteBackend::connect(path).await?)
        }
        StoreBackendKind::Memory => {
            tracing::warn!("Using in-memory correlation store; state is lost on restart");
            Arc::new(MemoryBackend::new())
        }
    };
    let store = Store::new(backend, config.backup_directory.clone());

    let incidents = BetterStackClient::new(
        config.better_stack_api_key.clone(),
        config.better_stack_base_url.clone(),
        config.retry,
        config.request_timeout,
    )?;
    let monitoring = ThrukClient::new(
        config.nagios_api_user.clone(),
        config.nagios_api_key.clone(),
        &config.nagios_base_url,
        config.nagios_site_name.clone(),
        config.retry,
        config.request_timeout,
    )?;

    let state = AppState {
        store: store.clone(),
        incidents: Arc::new(incidents),
        monitoring: Arc::new(monitoring),
        relay: config.relay.clone(),
    };

    let backups = spawn_periodic_backup(store.clone(), config.backup_interval);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, config.port))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(host = %addr, "Starting incident bridge");

    let app = routes::router(state, config.request_timeout);
    let stop = Arc::new(Notify::new());
    let mut server = tokio::spawn({
        let stop = stop.clone();
        async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { stop.notified().await })
            .await
        }
    });

    tokio::select! {
        result = &mut server => {
            result??;
        }
        () = shutdown_signal() => {
            stop.notify_one();
            match tokio::time::timeout(config.shutdown_grace, &mut server).await {
                Ok(result) => result??,
                Err(_) => {
                    tracing::warn!(
                        grace_secs = config.shutdown_grace.as_secs(),
                        "In-flight requests did not finish within the grace period"
                    );
                    server.abort();
                }
            }
        }
    }

    backups.abort();
    finalize_store(&store, config.shutdown_grace).await?;
    tracing::info!("Incident bridge stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
