use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{HistoryStore, ServiceCheckHistory};
use crate::error::StorageError;

/// Process-local store for tests and storage-less runs
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    snapshots: RwLock<HashMap<String, ServiceCheckHistory>>,
    saves: AtomicUsize,
}

impl MemoryHistoryStore {
    /// Pre-populated store, as if a previous run had saved `snapshots`
    pub fn with_snapshots(snapshots: impl IntoIterator<Item = ServiceCheckHistory>) -> Self {
        let snapshots = snapshots
            .into_iter()
            .map(|snapshot| (snapshot.service_name.clone(), snapshot))
            .collect();
        Self { snapshots: RwLock::new(snapshots), saves: AtomicUsize::new(0) }
    }

    /// Number of successful saves since construction
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }

    pub async fn get(&self, service_name: &str) -> Option<ServiceCheckHistory> {
        self.snapshots.read().await.get(service_name).cloned()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn save_service_check_history(
        &self,
        history: &ServiceCheckHistory,
    ) -> Result<(), StorageError> {
        self.snapshots.write().await.insert(history.service_name.clone(), history.clone());
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn get_all_service_check_history(
        &self,
    ) -> Result<HashMap<String, ServiceCheckHistory>, StorageError> {
        Ok(self.snapshots.read().await.clone())
    }
}
