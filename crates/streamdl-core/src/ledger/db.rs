//! SQLite-backed ledger implementation.
//!
//! Handles connection, migrations, timestamps and fault degradation. Record
//! reads and writes live in `jobs`.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Stable key for a source URL: hex MD5 of the URL bytes.
pub fn source_key(source_url: &str) -> String {
    format!("{:x}", md5::compute(source_url.as_bytes()))
}

/// Handle to the SQLite-backed job ledger. Cheap to clone; all clones share
/// one connection pool, and SQLite serializes writers.
#[derive(Clone)]
pub struct Ledger {
    pub(crate) pool: Pool<Sqlite>,
}

impl Ledger {
    /// Open (or create) the ledger at `path` and run migrations. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        let ledger = Ledger { pool };
        ledger.migrate().await?;
        tracing::info!(path = %path.display(), "ledger opened");
        Ok(ledger)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS downloads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_key TEXT UNIQUE NOT NULL,
                source_url TEXT NOT NULL,
                title TEXT NOT NULL,
                site TEXT,
                final_path TEXT,
                temp_path TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                download_time INTEGER,
                size_bytes INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        for stmt in [
            "CREATE INDEX IF NOT EXISTS idx_source_key ON downloads(source_key)",
            "CREATE INDEX IF NOT EXISTS idx_status ON downloads(status)",
            "CREATE INDEX IF NOT EXISTS idx_site ON downloads(site)",
        ] {
            sqlx::query(stmt).execute(&self.pool).await?;
        }

        Ok(())
    }

    /// Close every pooled connection. Later calls degrade to their fallbacks.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("ledger closed");
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

/// Log a storage fault and substitute the conservative `fallback`.
pub(crate) fn degrade<T>(op: &str, result: Result<T>, fallback: T) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(op, "ledger operation failed: {:#}", e);
            fallback
        }
    }
}

/// Current time as Unix seconds (for ledger timestamps).
pub(crate) fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
/// Open an in-memory ledger for tests (no disk I/O).
pub(crate) async fn open_memory() -> Result<Ledger> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let ledger = Ledger { pool };
    ledger.migrate().await?;
    Ok(ledger)
}
