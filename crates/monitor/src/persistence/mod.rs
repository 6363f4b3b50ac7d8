//! Durable per-service check history.
//!
//! The engine never waits on storage: snapshots are handed to a
//! [`PersistenceGateway`] whose single writer task applies them in order.

mod libsql_store;
mod memory;
mod migrations;
mod pool;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::types::{HistoryPoint, MAX_HISTORY, ServiceStatus, Status};

pub use self::libsql_store::LibsqlHistoryStore;
pub use self::memory::MemoryHistoryStore;

/// One persisted history point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckPoint {
    pub timestamp: DateTime<Utc>,
    pub response_time_ms: i64,
    pub status: String,
    pub status_code: i64,
}

/// Last persisted snapshot of a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCheckHistory {
    pub service_name: String,
    pub history: Vec<CheckPoint>,
    pub uptime: f64,
    pub last_check: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: String,
}

impl From<&HistoryPoint> for CheckPoint {
    fn from(point: &HistoryPoint) -> Self {
        Self {
            timestamp: point.timestamp,
            response_time_ms: point.response_time_ms,
            status: point.status.as_str().to_string(),
            status_code: point.status_code,
        }
    }
}

impl From<&CheckPoint> for HistoryPoint {
    fn from(point: &CheckPoint) -> Self {
        Self {
            timestamp: point.timestamp,
            response_time_ms: point.response_time_ms,
            status: Status::from_label(&point.status),
            status_code: point.status_code,
        }
    }
}

impl From<&ServiceStatus> for ServiceCheckHistory {
    fn from(status: &ServiceStatus) -> Self {
        Self {
            service_name: status.name.clone(),
            history: status.history.iter().map(CheckPoint::from).collect(),
            uptime: status.uptime,
            last_check: status.last_check,
            error_message: status.error_message.clone(),
        }
    }
}

impl ServiceCheckHistory {
    /// Seed a fresh status from this snapshot.
    ///
    /// Current classification, response time and code come from the newest
    /// restored point; uptime is taken as persisted.
    pub fn restore_into(&self, status: &mut ServiceStatus) {
        let skip = self.history.len().saturating_sub(MAX_HISTORY);
        status.history = self.history.iter().skip(skip).map(HistoryPoint::from).collect();
        status.uptime = self.uptime;
        status.last_check = self.last_check;
        status.error_message = self.error_message.clone();

        if let Some(last) = status.history.last() {
            status.status = last.status;
            status.response_time_ms = last.response_time_ms;
            status.status_code = last.status_code;
        }
    }
}

/// Storage backend for check history
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Insert or replace the snapshot for `history.service_name`
    async fn save_service_check_history(
        &self,
        history: &ServiceCheckHistory,
    ) -> Result<(), StorageError>;

    /// Every stored snapshot keyed by service name
    async fn get_all_service_check_history(
        &self,
    ) -> Result<HashMap<String, ServiceCheckHistory>, StorageError>;
}

enum Command {
    Save(ServiceCheckHistory),
    Flush(oneshot::Sender<()>),
}

/// Snapshots queued ahead of the writer before new ones are dropped
pub const PENDING_WRITES: usize = 1024;

/// Fire-and-forget front for a [`HistoryStore`].
///
/// `save` never blocks, so it is safe to call while holding the status lock.
/// Writes are applied in submission order and failures are logged, not retried.
/// When the queue is full the snapshot is dropped.
#[derive(Clone)]
pub struct PersistenceGateway {
    tx: mpsc::Sender<Command>,
}

impl PersistenceGateway {
    /// Spawn the writer task. It exits once every gateway handle is dropped.
    pub fn spawn(store: Arc<dyn HistoryStore>) -> Self {
        Self::with_capacity(store, PENDING_WRITES)
    }

    pub fn with_capacity(store: Arc<dyn HistoryStore>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel(capacity.max(1));

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    Command::Save(snapshot) => {
                        if let Err(e) = store.save_service_check_history(&snapshot).await {
                            warn!(
                                service = %snapshot.service_name,
                                error = %e,
                                "Failed to persist check history"
                            );
                        }
                    }
                    Command::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("Persistence writer stopped");
        });

        Self { tx }
    }

    pub fn save(&self, snapshot: ServiceCheckHistory) {
        match self.tx.try_send(Command::Save(snapshot)) {
            Ok(()) => {}
            Err(TrySendError::Full(Command::Save(snapshot))) => {
                warn!(
                    service = %snapshot.service_name,
                    "Persistence queue full, dropping snapshot"
                );
            }
            Err(_) => warn!("Persistence writer is gone, dropping snapshot"),
        }
    }

    /// Wait until every snapshot submitted before this call has been written.
    pub async fn flush(&self) -> Result<(), StorageError> {
        let (done, wait) = oneshot::channel();
        self.tx.send(Command::Flush(done)).await.map_err(|_| StorageError::Closed)?;
        wait.await.map_err(|_| StorageError::Closed)
    }
}
