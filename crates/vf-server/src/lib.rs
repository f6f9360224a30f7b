//! vf-server: HTTP API server and background queue workers.
//!
//! This crate ties the vf-* crates together into a running application:
//!
//! - Axum HTTP API with JWT cookie authentication and rate limiting
//! - Catalog and HLS streaming routes
//! - Database-backed job queue with embedded or standalone workers
//! - Graceful shutdown via signal handling

pub mod accounts;
pub mod catalog;
pub mod context;
pub mod error;
pub mod hls;
pub mod jwt;
pub mod mailer;
pub mod middleware;
pub mod queue;
pub mod router;
pub mod routes;
pub mod worker;

use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;
use vf_core::config::Config;

use crate::context::AppContext;
use crate::worker::WorkerOptions;

/// Open the database, discover tools and build the mailer for `config`.
pub fn build_context(config: Config) -> vf_core::Result<AppContext> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let db_path = &config.server.db_path;
    let existed = db_path.exists();
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
            tracing::info!("Created database directory {}", parent.display());
        }
    }
    let db_str = db_path.to_string_lossy();
    let db = vf_db::pool::init_pool(&*db_str)?;
    if existed {
        tracing::info!("Database opened (existing) at {db_str}");
    } else {
        tracing::info!("Database created (new) at {db_str}");
    }

    std::fs::create_dir_all(&config.server.media_root)?;

    let tools = vf_av::ToolRegistry::discover(&config.tools);
    for info in tools.check_all() {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            tracing::warn!("Tool not found: {}", info.name);
        }
    }

    let mailer = mailer::from_config(&config.mail)?;
    tracing::debug!(transport = mailer.name(), "Mailer ready");

    Ok(AppContext::new(config, db, tools, mailer))
}

/// Start the videoflix server.
///
/// Serves HTTP until a shutdown signal arrives. Embedded workers and the
/// maintenance loop run alongside when `worker.embedded` is set.
pub async fn start(config: Config) -> vf_core::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| vf_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let ctx = build_context(config)?;
    let cancel = CancellationToken::new();

    let maintenance = tokio::spawn(worker::run_maintenance(ctx.clone(), cancel.clone()));
    let workers = if ctx.config.worker.embedded {
        let options = WorkerOptions::from_config(&ctx.config.worker);
        Some(tokio::spawn(worker::run_workers(ctx.clone(), options, cancel.clone())))
    } else {
        None
    };

    let app = router::build_router(ctx);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| vf_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;
    tracing::info!("Starting server on {addr}");

    let shutdown_cancel = cancel.clone();
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move { shutdown_signal(shutdown_cancel).await })
        .await?;

    cancel.cancel();
    if let Some(handle) = workers {
        let _ = handle.await;
    }
    let _ = maintenance.await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for SIGINT, SIGTERM or cancellation.
pub async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}
