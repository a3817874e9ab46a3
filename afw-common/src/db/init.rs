//! Database initialization
//!
//! Opens (or creates) the SQLite database and brings every entity table in
//! line with the registered specs.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::db::schema_sync::sync_entity_table;
use crate::spec::SpecRegistry;
use crate::Result;

/// How long a connection waits on a locked database before failing
const BUSY_TIMEOUT_MS: u64 = 5000;

/// Open the database file, creating it if needed, and initialize its schema
pub async fn init_database(db_path: &Path, registry: &SpecRegistry) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Per-connection settings: every pooled connection gets them on open
    let options = connection_options(SqliteConnectOptions::new().filename(db_path))
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    init_schema(&pool, registry).await?;
    Ok(pool)
}

/// Single-connection in-memory database with the full schema
///
/// Used by tests and the `--in-memory` developer mode. The pool is capped at
/// one connection because every SQLite memory connection is its own database.
pub async fn init_memory_database(registry: &SpecRegistry) -> Result<SqlitePool> {
    let options = connection_options("sqlite::memory:".parse::<SqliteConnectOptions>()?);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    init_schema(&pool, registry).await?;
    Ok(pool)
}

fn connection_options(options: SqliteConnectOptions) -> SqliteConnectOptions {
    options
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
}

/// Create infrastructure tables and sync every entity table
pub async fn init_schema(pool: &SqlitePool, registry: &SpecRegistry) -> Result<()> {
    create_sessions_table(pool).await?;

    for spec in registry.iter() {
        sync_entity_table(pool, spec).await?;
    }

    info!("Database schema ready ({} entities)", registry.len());
    Ok(())
}

/// Session tokens, stored only as SHA-256 digests
async fn create_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            token_hash TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id)")
        .execute(pool)
        .await?;

    Ok(())
}
