use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result as AnyResult};
use futures::future::BoxFuture;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

pub async fn open_sqlite_pool(db_path: &Path) -> AnyResult<SqlitePool> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            tracing::error!(
                target: "needful",
                error = %e,
                event = "data_dir_create_failed",
                path = %parent.display()
            );
            e
        })?;
    }
    tracing::info!(target: "needful", event = "db_path", path = %db_path.display());

    let opts = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(opts)
        .await
        .with_context(|| format!("open database {}", db_path.display()))?;

    log_effective_pragmas(&pool).await;

    Ok(pool)
}

/// Single-connection in-memory pool with foreign keys on. The database lives
/// as long as that one connection does.
pub async fn open_memory_pool() -> AnyResult<SqlitePool> {
    let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(opts)
        .await
        .context("open in-memory database")?;
    Ok(pool)
}

async fn log_effective_pragmas(pool: &SqlitePool) {
    use tracing::{info, warn};

    let (sqlite_ver,): (String,) = sqlx::query_as("select sqlite_version()")
        .fetch_one(pool)
        .await
        .unwrap_or((String::from("unknown"),));

    let jm: (String,) = sqlx::query_as("PRAGMA journal_mode;")
        .fetch_one(pool)
        .await
        .unwrap_or((String::from("unknown"),));

    let fks: (i64,) = sqlx::query_as("PRAGMA foreign_keys;")
        .fetch_one(pool)
        .await
        .unwrap_or((i64::MIN,));

    info!(
        target: "needful",
        event = "db_open",
        sqlite_version = %sqlite_ver,
        journal_mode = %jm.0,
        foreign_keys = %fks.0
    );

    if !jm.0.eq_ignore_ascii_case("wal") {
        warn!(
            target: "needful",
            event = "db_open_warning",
            msg = "journal_mode != WAL; running with reduced crash safety"
        );
    }
}

/// Run work inside a transaction. Commits on success, rolls back on error.
pub async fn run_in_tx<R, E, F>(pool: &SqlitePool, f: F) -> Result<R, E>
where
    E: From<sqlx::Error>,
    F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<R, E>>,
{
    use tracing::{debug, error, warn};

    let mut tx: sqlx::Transaction<'static, Sqlite> = pool.begin().await.map_err(E::from)?;
    debug!(target: "needful", event = "db_tx_begin");
    match f(&mut *tx).await {
        Ok(val) => {
            tx.commit().await.map_err(E::from)?;
            debug!(target: "needful", event = "db_tx_commit");
            Ok(val)
        }
        Err(e) => {
            if let Err(rb) = tx.rollback().await {
                error!(target: "needful", event = "db_tx_rollback_failed", error = %rb);
            } else {
                warn!(target: "needful", event = "db_tx_rollback");
            }
            Err(e)
        }
    }
}
