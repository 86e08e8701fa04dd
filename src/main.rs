//! Redis Mirror - A read-through local mirror of a Redis keyspace
//!
//! Runs a mirror of one database and serves it over a small HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use redis_mirror::api::create_router;
use redis_mirror::{
    spawn_event_task, spawn_resync_task, AppState, Config, IdentityFormatter, Mirror,
};

/// Main entry point for the mirror service.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Connect to the backing store, enabling notifications if configured
/// 4. Run the initial bootstrap scan
/// 5. Start the event task and, if configured, the resync task
/// 6. Serve the HTTP API until SIGINT/SIGTERM
/// 7. Cancel background tasks and wait for the subscription to close
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber with env filter
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "redis_mirror=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Redis Mirror");

    // Load configuration from environment variables
    let config = Config::from_env();
    info!(
        "Configuration loaded: network={}, addr={}, db={}, batch_size={}, port={}",
        config.redis_network,
        config.redis_addr,
        config.db_index,
        config.scan_batch_size,
        config.server_port
    );

    let transport = config.transport()?;
    let mirror = Mirror::connect(&transport, IdentityFormatter, config.mirror_options())
        .await
        .context("connecting to backing store")?;

    if let Some(flags) = &config.notify_keyspace_events {
        mirror.backend().enable_keyspace_events(flags).await?;
    }

    let report = mirror.sync().await.context("initial sync")?;
    info!("Initial sync stored {} of {} keys", report.stored, report.scanned);

    let mirror = Arc::new(mirror);
    let cancel = CancellationToken::new();

    // Start background tasks
    let events_handle = spawn_event_task(mirror.clone(), cancel.clone());
    let resync_handle = config
        .resync_interval()
        .map(|every| spawn_resync_task(mirror.clone(), every, cancel.clone()));

    let app = create_router(AppState::new(mirror));

    // Bind to configured port
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Server listening on http://{}", addr);

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    events_handle.await?;
    if let Some(handle) = resync_handle {
        handle.await?;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then cancels background tasks.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    cancel.cancel();
    warn!("Background tasks cancelled");
}
