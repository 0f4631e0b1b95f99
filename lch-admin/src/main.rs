//! lch-admin - parish administration maintenance service
//!
//! `serve` (the default) hosts the maintenance API; `reformat-member-codes`
//! runs the member-code reconciler once from the command line as a named
//! superadmin.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use lch_common::api::load_shared_secret;
use lch_common::config::{self, ServiceConfig};
use lch_common::db::init_database;
use sqlx::SqlitePool;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lch_admin::claims;
use lch_admin::reconcile::{ReconcileOptions, Reconciler};
use lch_admin::{build_router, AppState};

/// Command-line arguments for lch-admin
#[derive(Parser, Debug)]
#[command(name = "lch-admin")]
#[command(about = "Parish administration maintenance service")]
#[command(version)]
struct Args {
    /// Root folder holding the database
    #[arg(short, long, global = true)]
    root_folder: Option<PathBuf>,

    /// Config file (defaults to ~/.config/lch/config.toml, then /etc/lch/config.toml)
    #[arg(short, long, global = true, env = "LCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long, env = "LCH_ADMIN_PORT")]
        port: Option<u16>,

        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,
    },

    /// Reformat and synchronize every member code
    ReformatMemberCodes {
        /// Username of the superadmin performing the run
        #[arg(short, long)]
        admin: String,

        /// Run all passes, report, then roll back
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config problems are reported after tracing is up
    let (service_config, config_warning) = load_config(args.config.as_deref());

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&service_config.logging.level)),
        )
        .init();

    info!(
        "Starting lch-admin v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    if let Some(warning) = config_warning {
        warn!("{}; using defaults", warning);
    }

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), &service_config);
    let db_path = config::database_path(&root_folder, &service_config);
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    match args.command.unwrap_or(Command::Serve {
        port: None,
        host: None,
    }) {
        Command::Serve { port, host } => {
            let host = host.unwrap_or_else(|| service_config.server.host.clone());
            let port = port.unwrap_or(service_config.server.port);
            serve(pool, &host, port).await
        }
        Command::ReformatMemberCodes { admin, dry_run } => {
            reformat_member_codes(pool, &admin, dry_run).await
        }
    }
}

/// Read the config file, falling back to defaults on any error
fn load_config(explicit: Option<&std::path::Path>) -> (ServiceConfig, Option<String>) {
    let loaded = match explicit {
        Some(path) => ServiceConfig::from_file(path)
            .map_err(|e| format!("Failed to load config {}: {}", path.display(), e)),
        None => ServiceConfig::load_default_location()
            .map_err(|e| format!("Failed to load config: {}", e)),
    };

    match loaded {
        Ok(config) => (config, None),
        Err(warning) => (ServiceConfig::default(), Some(warning)),
    }
}

async fn serve(pool: SqlitePool, host: &str, port: u16) -> Result<()> {
    let shared_secret = load_shared_secret(&pool)
        .await
        .context("Failed to load shared secret")?;
    if shared_secret == 0 {
        info!("API authentication disabled (shared_secret = 0)");
    } else {
        info!("Loaded shared secret for API authentication");
    }

    let app = build_router(AppState::new(pool, shared_secret));

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!("lch-admin listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn reformat_member_codes(pool: SqlitePool, admin: &str, dry_run: bool) -> Result<()> {
    let claims = claims::load_by_username(&pool, admin)
        .await?
        .ok_or_else(|| anyhow!("Unknown or inactive admin: {}", admin))?;
    let grant = claims.require_superadmin()?;

    let report = Reconciler::new(pool)
        .run(&grant, ReconcileOptions { dry_run })
        .await?;

    for change in &report.changes {
        info!("{} -> {} (member {})", change.previous_code, change.code, change.member_id);
    }
    for skipped in &report.skipped {
        warn!(
            "Skipped member {} (code {:?}): {:?}",
            skipped.member_id, skipped.member_code, skipped.reason
        );
    }
    if !report.conflicting_heads.is_empty() {
        warn!("Families with several heads: {:?}", report.conflicting_heads);
    }

    if report.dry_run {
        info!("Dry run, nothing saved: {}", report.summary());
    } else {
        info!("Done: {}", report.summary());
    }

    if report.updated_members == 0 && report.skipped.is_empty() && !report.dry_run {
        info!("All member codes were already canonical");
    }

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
