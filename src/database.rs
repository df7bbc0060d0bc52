//! SQLite pool setup and schema management.

use anyhow::{Context, Result, bail};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;

/// Schema applied by `--migrate`.
pub const MIGRATION_SQL: &str = include_str!("../migrations/0001_init.sql");

/// Tables the service expects to find at startup.
pub const REQUIRED_TABLES: [&str; 2] = ["t_ad", "t_photo"];

/// Open the connection pool.
///
/// The database file (and its directory) is only created when `create` is
/// set, which the migration mode does.
pub async fn connect(database_url: &str, create: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("parsing database URL `{}`", database_url))?
        .create_if_missing(create);

    if create {
        let db_path = options.get_filename();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("connecting to {}", database_url))?;
    Ok(pool)
}

/// Apply the embedded schema statement by statement.
pub async fn run_migrations(db: &SqlitePool) -> Result<()> {
    let statements = MIGRATION_SQL
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        tracing::debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(())
}

/// Required tables that do not exist yet.
pub async fn missing_tables(db: &SqlitePool) -> Result<Vec<&'static str>, sqlx::Error> {
    let mut missing = Vec::new();
    for table in REQUIRED_TABLES {
        let found: Option<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_optional(db)
                .await?;
        if found.is_none() {
            missing.push(table);
        }
    }
    Ok(missing)
}

/// Refuse to run against a database that has not been migrated.
pub async fn ensure_schema(db: &SqlitePool) -> Result<()> {
    let missing = missing_tables(db).await?;
    if !missing.is_empty() {
        bail!(
            "database schema is missing tables {:?}; run with --migrate first",
            missing
        );
    }
    Ok(())
}
