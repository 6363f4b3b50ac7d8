use libsql::Connection;

use crate::error::StorageError;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 1;

/// Bring the history database up to [`SCHEMA_VERSION`].
pub(super) async fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::debug!("History schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Service check history").await?;
    }

    Ok(())
}

async fn get_current_version(conn: &Connection) -> Result<i32, StorageError> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

async fn record_migration(
    conn: &Connection,
    version: i32,
    description: &str,
) -> Result<(), StorageError> {
    let now = chrono::Utc::now().timestamp();

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: one row per service, history stored as a JSON array
async fn run_migration_v1(conn: &Connection) -> Result<(), StorageError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS service_check_history (
            service_name TEXT PRIMARY KEY,
            history TEXT NOT NULL DEFAULT '[]',
            uptime REAL NOT NULL DEFAULT 100.0,
            last_check INTEGER,
            error_message TEXT NOT NULL DEFAULT '',
            updated_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    Ok(())
}
