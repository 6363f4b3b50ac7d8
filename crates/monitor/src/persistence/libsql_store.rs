use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params;

use super::migrations::run_migrations;
use super::pool::{LibsqlManager, LibsqlPool};
use super::{HistoryStore, ServiceCheckHistory};
use crate::error::StorageError;

const DATABASE_FILE: &str = "status.db";
const POOL_SIZE: usize = 4;

/// Check history stored in a local libsql database
pub struct LibsqlHistoryStore {
    pool: LibsqlPool,
}

impl LibsqlHistoryStore {
    /// Open (or create) `<data_dir>/status.db` and run migrations.
    pub async fn open(data_dir: &Path) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join(DATABASE_FILE);

        let database = libsql::Builder::new_local(&db_path).build().await?;
        let pool = LibsqlPool::builder(LibsqlManager::new(database))
            .max_size(POOL_SIZE)
            .build()
            .map_err(|e| StorageError::Pool(e.to_string()))?;

        let store = Self { pool };
        let conn = store.get_conn().await?;
        run_migrations(&conn).await?;

        tracing::info!(path = %db_path.display(), "Opened check history database");
        Ok(store)
    }

    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>, StorageError> {
        self.pool.get().await.map_err(|e| StorageError::Pool(e.to_string()))
    }
}

#[async_trait]
impl HistoryStore for LibsqlHistoryStore {
    async fn save_service_check_history(
        &self,
        history: &ServiceCheckHistory,
    ) -> Result<(), StorageError> {
        let conn = self.get_conn().await?;
        let points = serde_json::to_string(&history.history)?;
        let last_check = history.last_check.map(|at| at.timestamp_millis());

        conn.execute(
            "INSERT INTO service_check_history
                (service_name, history, uptime, last_check, error_message, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(service_name) DO UPDATE SET
                history = excluded.history,
                uptime = excluded.uptime,
                last_check = excluded.last_check,
                error_message = excluded.error_message,
                updated_at = excluded.updated_at",
            params![
                history.service_name.clone(),
                points,
                history.uptime,
                last_check,
                history.error_message.clone(),
                Utc::now().timestamp_millis(),
            ],
        )
        .await?;

        Ok(())
    }

    async fn get_all_service_check_history(
        &self,
    ) -> Result<HashMap<String, ServiceCheckHistory>, StorageError> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(
                "SELECT service_name, history, uptime, last_check, error_message
                 FROM service_check_history",
            )
            .await?;

        let mut rows = stmt.query(()).await?;
        let mut snapshots = HashMap::new();

        while let Some(row) = rows.next().await? {
            let service_name: String = row.get(0)?;
            let history: String = row.get(1)?;
            let last_check: Option<i64> = row.get(3)?;

            snapshots.insert(
                service_name.clone(),
                ServiceCheckHistory {
                    service_name,
                    history: serde_json::from_str(&history)?,
                    uptime: row.get(2)?,
                    last_check: last_check.and_then(DateTime::<Utc>::from_timestamp_millis),
                    error_message: row.get(4)?,
                },
            );
        }

        Ok(snapshots)
    }
}
