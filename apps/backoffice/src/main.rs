//! # SmartRetail Back-Office Server
//!
//! ## Usage
//! ```bash
//! # Hosted backend, settings from the environment
//! SUPABASE_URL=... SUPABASE_KEY=... SUPABASE_SERVICE_ROLE_KEY=... backoffice
//!
//! # Everything in memory, with the demo catalogue
//! RETAIL_BACKEND=memory RETAIL_SEED_DEMO=true backoffice
//!
//! # Explicit config file
//! backoffice --config ./backoffice.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use retail_backoffice::session::{MemorySessionStore, RedisSessionStore, SessionStore};
use retail_backoffice::{build_router, AppState, ServerConfig};
use retail_mail::{build_mailer, MailDispatcher};
use retail_store::{demo, Backend, BackendKind, IdentityServices, MemoryIdentity};

const DEFAULT_LOG_FILTER: &str = "info,retail_backoffice=debug,retail_store=info,retail_mail=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with_target(true)
        .init();

    info!("Starting SmartRetail back-office server...");

    let config = ServerConfig::load(config_path_arg()).context("loading configuration")?;
    info!(
        bind = %config.server.bind,
        backend = ?config.backend.kind,
        mail = ?config.mail.provider,
        "Configuration loaded"
    );

    // Backend and identity
    let backend = Backend::connect(&config.backend)
        .await
        .context("connecting to the data backend")?;
    info!(backend = backend.backend_name(), "Connected to backend");

    let identity = match config.backend.kind {
        BackendKind::Memory => IdentityServices::in_memory(MemoryIdentity::new(), true),
        BackendKind::Rest | BackendKind::Postgres => IdentityServices::gotrue(
            &config.backend.supabase_url,
            &config.backend.supabase_key,
            config.backend.service_role_key.as_deref(),
        )
        .context("building identity clients")?,
    };
    if identity.admin.is_none() {
        warn!("No service-role key; invitation acceptance cannot create confirmed accounts");
    }

    if config.backend.kind == BackendKind::Memory && config.server.seed_demo {
        let products = demo::seed_catalogue(&backend).await?;
        let sales = demo::seed_sales(&backend, &products, 14, 4).await?;
        info!(products = products.len(), sales, "Seeded demo data");
    }

    // Mail dispatcher
    let mailer = build_mailer(&config.mail).context("building mailer")?;
    let (mail, mail_worker) = MailDispatcher::spawn(mailer, &config.mail);

    // Sessions
    let session_store: Arc<dyn SessionStore> = match config.auth.redis_url.as_deref() {
        Some(url) => Arc::new(
            RedisSessionStore::connect(url)
                .await
                .context("connecting to Redis")?,
        ),
        None => {
            info!("Using in-memory session store");
            Arc::new(MemorySessionStore::new())
        }
    };

    let bind = config.server.bind.clone();
    let state = AppState::new(config, backend, identity, mail.clone(), session_store);
    let app = build_router(state);

    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {}", bind))?;
    info!(addr = %bind, "Starting HTTP server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let queued invitations go out before exiting.
    if let Err(e) = mail.shutdown().await {
        warn!(error = %e, "Mail dispatcher already stopped");
    }
    if let Err(e) = mail_worker.await {
        warn!(error = %e, "Mail worker ended abnormally");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// `--config <path>` from the command line, if given.
fn config_path_arg() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received, starting graceful shutdown...");
}
