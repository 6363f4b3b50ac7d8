use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::persistence::ServiceCheckHistory;
use crate::service::Service;
use crate::types::{ServiceStatus, Status};

/// Current status of every configured service.
///
/// One reader/writer lock guards the whole map; probes never run under it.
pub struct StatusStore {
    order: Vec<String>,
    statuses: RwLock<HashMap<String, ServiceStatus>>,
}

impl StatusStore {
    /// One entry per service, seeded from `restored` where a snapshot exists.
    pub fn new(services: &[Service], restored: &HashMap<String, ServiceCheckHistory>) -> Self {
        let mut statuses = HashMap::with_capacity(services.len());
        for service in services {
            let mut status = ServiceStatus::new(service);
            if let Some(snapshot) = restored.get(&service.name) {
                snapshot.restore_into(&mut status);
            }
            statuses.insert(service.name.clone(), status);
        }

        Self {
            order: services.iter().map(|service| service.name.clone()).collect(),
            statuses: RwLock::new(statuses),
        }
    }

    /// Mutate one entry under the write lock. Returns `None` for unknown names.
    pub async fn update<R>(
        &self,
        name: &str,
        apply: impl FnOnce(&mut ServiceStatus) -> R,
    ) -> Option<R> {
        let mut statuses = self.statuses.write().await;
        statuses.get_mut(name).map(apply)
    }

    pub async fn get(&self, name: &str) -> Option<ServiceStatus> {
        self.statuses.read().await.get(name).cloned()
    }

    /// Deep copies in configuration order
    pub async fn all(&self) -> Vec<ServiceStatus> {
        let statuses = self.statuses.read().await;
        self.order.iter().filter_map(|name| statuses.get(name).cloned()).collect()
    }

    pub async fn overall(&self) -> Status {
        let statuses = self.statuses.read().await;
        aggregate(statuses.values().map(|status| status.status))
    }
}

/// Majority-outage policy.
///
/// Down only when strictly more than half the services are down; any down or
/// degraded service otherwise makes the system degraded. No services reads as
/// operational.
pub fn aggregate(statuses: impl IntoIterator<Item = Status>) -> Status {
    let (mut total, mut down, mut degraded) = (0usize, 0usize, 0usize);
    for status in statuses {
        total += 1;
        match status {
            Status::Down => down += 1,
            Status::Degraded => degraded += 1,
            _ => {}
        }
    }

    if total == 0 {
        Status::Operational
    } else if down > total / 2 {
        Status::Down
    } else if down > 0 || degraded > 0 {
        Status::Degraded
    } else {
        Status::Operational
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::service::{Check, Endpoint};
    use crate::types::ProbeOutcome;
    use crate::types::Status::*;

    fn service(name: &str) -> Service {
        Service {
            name: name.to_string(),
            group: "core".to_string(),
            description: String::new(),
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
            check: Check::Tcp(Endpoint::raw("127.0.0.1:1")),
        }
    }

    #[test]
    fn test_aggregate_majority_down() {
        assert_eq!(aggregate([Down, Down, Down, Operational]), Down);
    }

    #[test]
    fn test_aggregate_partial_outage_is_degraded() {
        assert_eq!(aggregate([Down, Degraded, Operational, Operational]), Degraded);
        // exactly half is not a majority
        assert_eq!(aggregate([Down, Down, Operational, Operational]), Degraded);
    }

    #[test]
    fn test_aggregate_all_operational_and_empty() {
        assert_eq!(aggregate([Operational, Operational, Operational]), Operational);
        assert_eq!(aggregate([]), Operational);
    }

    #[test]
    fn test_aggregate_unknown_counts_toward_total_only() {
        assert_eq!(aggregate([Unknown, Unknown]), Operational);
        assert_eq!(aggregate([Unknown, Down, Operational]), Degraded);
    }

    #[tokio::test]
    async fn test_all_preserves_configuration_order() {
        let services: Vec<_> = ["zeta", "alpha", "mid"].into_iter().map(service).collect();
        let store = StatusStore::new(&services, &HashMap::new());

        let names: Vec<_> = store.all().await.into_iter().map(|status| status.name).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
        assert_eq!(store.overall().await, Operational);
    }

    #[tokio::test]
    async fn test_update_unknown_service_is_ignored() {
        let store = StatusStore::new(&[service("api")], &HashMap::new());

        let applied = store
            .update("missing", |status| {
                status.record(&ProbeOutcome::down(Duration::ZERO, 0, "x"), chrono::Utc::now(), 90)
            })
            .await;
        assert!(applied.is_none());
        assert_eq!(store.get("api").await.unwrap().status, Unknown);
    }
}
