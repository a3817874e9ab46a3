//! afw-api - audit firm workflow service
//!
//! Serves the spec-driven entity API, chat threads, reactions and the
//! realtime event stream over HTTP, backed by SQLite.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use afw_api::auth::{ensure_user, issue_session, purge_expired_sessions};
use afw_api::{build_router, AppState};
use afw_common::config::AppConfig;
use afw_common::db::{init_database, init_memory_database};
use afw_common::spec::Role;
use afw_common::SpecRegistry;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Interval between rate-limiter and session cleanups
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(300);

/// Command-line arguments for afw-api
#[derive(Parser, Debug)]
#[command(name = "afw-api")]
#[command(about = "Audit firm workflow API service")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides config)
    #[arg(short, long, env = "AFW_PORT")]
    port: Option<u16>,

    /// Root folder holding the database (overrides AFW_ROOT_FOLDER and config)
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Config file (default: platform config location)
    #[arg(short, long, env = "AFW_CONFIG")]
    config: Option<PathBuf>,

    /// Use a throwaway in-memory database
    #[arg(long)]
    in_memory: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the user if needed and print a new session token
    IssueToken {
        email: String,

        #[arg(long, default_value = "partner")]
        role: String,

        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Read before tracing init, so warnings from loading are not logged
    let config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    let default_filter = format!(
        "afw_api={level},afw_common={level},tower_http={level}",
        level = config.log_level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting afw-api v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = config.resolve_root_folder(args.root_folder.as_deref());
    info!("Root folder: {}", root_folder.display());

    let spec_path = config.entity_spec_path(&root_folder);
    let registry = Arc::new(
        SpecRegistry::load(spec_path.as_deref()).context("Failed to load entity specs")?,
    );
    info!("Loaded {} entity specs", registry.len());

    let pool = if args.in_memory {
        warn!("Using in-memory database; all data is lost on exit");
        init_memory_database(&registry).await
    } else {
        let db_path = config.database_path(&root_folder);
        info!("Database path: {}", db_path.display());
        init_database(&db_path, &registry).await
    }
    .context("Failed to initialize database")?;

    if let Some(Command::IssueToken { email, role, name }) = args.command {
        return issue_token(&pool, &config, &email, &role, name.as_deref()).await;
    }

    let purged = purge_expired_sessions(&pool)
        .await
        .context("Failed to purge expired sessions")?;
    if purged > 0 {
        info!("Purged {} expired sessions", purged);
    }

    let port = args.port.unwrap_or(config.port);
    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(pool, registry, config);
    let app = build_router(state.clone());
    let housekeeping = state.spawn_housekeeping(HOUSEKEEPING_INTERVAL);

    let addr: SocketAddr = format!("{}:{}", bind_addr, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", bind_addr, port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("afw-api listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    housekeeping.abort();
    state.shutdown();
    info!("Server shutdown complete");
    Ok(())
}

async fn issue_token(
    pool: &SqlitePool,
    config: &AppConfig,
    email: &str,
    role: &str,
    name: Option<&str>,
) -> Result<()> {
    let role: Role = role.parse().context("Invalid --role")?;
    let name = name.unwrap_or_else(|| email.split('@').next().unwrap_or(email));

    let user_id = ensure_user(pool, email, name, role)
        .await
        .context("Failed to create user")?;
    let token = issue_session(pool, &user_id, config.sessions.ttl_hours)
        .await
        .context("Failed to issue session")?;

    info!("Issued session for {} ({})", email, role);
    println!("{}", token);
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}
