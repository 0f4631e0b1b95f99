//! Database initialization
//!
//! Opens (or creates) the SQLite database and brings the schema up to date.
//! Every statement is idempotent, so initialization runs on every startup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Busy timeout used until the settings table provides one
const DEFAULT_BUSY_TIMEOUT_MS: i64 = 5000;

const MAX_CONNECTIONS: u32 = 10;

/// Initialize database connection and create tables if needed
///
/// Foreign keys, WAL and the busy timeout are connection options, so every
/// pooled connection carries them.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = connect(options.clone(), DEFAULT_BUSY_TIMEOUT_MS).await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    init_default_settings(&pool).await?;

    let timeout_ms = configured_busy_timeout(&pool).await?;
    let pool = if timeout_ms == DEFAULT_BUSY_TIMEOUT_MS {
        pool
    } else {
        // Reopen so every connection picks up the stored timeout
        pool.close().await;
        connect(options, timeout_ms).await?
    };

    info!("Database busy timeout set to {} ms", timeout_ms);

    Ok(pool)
}

async fn connect(options: SqliteConnectOptions, busy_timeout_ms: i64) -> Result<SqlitePool> {
    let busy_timeout = Duration::from_millis(busy_timeout_ms.max(0) as u64);
    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options.busy_timeout(busy_timeout))
        .await?;

    Ok(pool)
}

/// Busy timeout from `settings.database_busy_timeout_ms`
async fn configured_busy_timeout(pool: &SqlitePool) -> Result<i64> {
    let timeout_ms: Option<i64> = sqlx::query_scalar(
        "SELECT CAST(value AS INTEGER) FROM settings WHERE key = 'database_busy_timeout_ms'",
    )
    .fetch_optional(pool)
    .await?;

    Ok(timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS))
}

/// Initialize a private in-memory database with the full schema
///
/// The pool holds a single connection that never expires; each SQLite
/// in-memory connection is its own database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_admin_users_table(pool).await?;
    create_members_table(pool).await?;
    create_offerings_table(pool).await?;
    create_tickets_table(pool).await?;
    create_activity_logs_table(pool).await?;
    Ok(())
}

/// Create the settings table
///
/// Stores application configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_admin_users_table(pool: &SqlitePool) -> Result<()> {
    // is_superadmin holds the literal 'yes' or 'no'
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS admin_users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL DEFAULT '',
            role TEXT NOT NULL DEFAULT 'admin',
            is_superadmin TEXT NOT NULL DEFAULT 'no',
            status TEXT NOT NULL DEFAULT 'active',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_members_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS members (
            id TEXT PRIMARY KEY,
            member_code TEXT NOT NULL DEFAULT '',
            name TEXT NOT NULL DEFAULT '',
            member_serial_num INTEGER,
            member_order INTEGER,
            head_of_family TEXT,
            member_status TEXT NOT NULL DEFAULT 'active',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_members_serial ON members(member_serial_num)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_offerings_table(pool: &SqlitePool) -> Result<()> {
    // member_id is a logical reference only; rows outlive deleted members
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS offerings (
            id TEXT PRIMARY KEY,
            member_id TEXT,
            member_name TEXT,
            member_code TEXT,
            date TEXT,
            amount REAL NOT NULL DEFAULT 0,
            offer_type TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_offerings_member ON offerings(member_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_tickets_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tickets (
            id TEXT PRIMARY KEY,
            ticket_number TEXT,
            member_id TEXT,
            member_name TEXT,
            member_code TEXT,
            subject TEXT,
            status TEXT NOT NULL DEFAULT 'Open',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tickets_member ON tickets(member_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_activity_logs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS activity_logs (
            id TEXT PRIMARY KEY,
            admin_id TEXT,
            admin_name TEXT NOT NULL,
            module TEXT NOT NULL,
            action TEXT NOT NULL,
            target_id TEXT,
            details TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Ensure every required setting exists with its default value
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "database_busy_timeout_ms", &DEFAULT_BUSY_TIMEOUT_MS.to_string()).await?;
    Ok(())
}

/// Insert `key` with `default_value` unless it already has a non-NULL value
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value WHERE settings.value IS NULL
        "#,
    )
    .bind(key)
    .bind(default_value)
    .execute(pool)
    .await?;

    Ok(())
}
