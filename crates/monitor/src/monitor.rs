//! The monitoring engine.
//!
//! One task per service runs an immediate check and then one check per
//! interval. Every outcome flows through the same update path: record in the
//! status store, hand a snapshot to persistence, publish to subscribers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::broadcast::{Broadcaster, Subscription};
use crate::error::ProbeError;
use crate::persistence::{HistoryStore, PersistenceGateway, ServiceCheckHistory};
use crate::probe::Prober;
use crate::service::Service;
use crate::store::StatusStore;
use crate::types::{MAX_HISTORY, ProbeOutcome, ServiceStatus, Status};

pub struct Monitor {
    engine: Arc<Engine>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    started: AtomicBool,
}

struct Engine {
    services: Vec<Service>,
    /// One permit per service; held from probe start until the update is published
    in_flight: HashMap<String, Mutex<()>>,
    store: StatusStore,
    broadcaster: Broadcaster,
    prober: Prober,
    gateway: Option<PersistenceGateway>,
}

impl Monitor {
    /// Build the engine, restoring any persisted history from `history`.
    ///
    /// A failed restore is logged and the engine starts cold.
    pub async fn new(
        services: Vec<Service>,
        history: Option<Arc<dyn HistoryStore>>,
    ) -> Result<Self, ProbeError> {
        let restored = match &history {
            Some(store) => match store.get_all_service_check_history().await {
                Ok(snapshots) => {
                    debug!(count = snapshots.len(), "Restored check history");
                    snapshots
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load check history, starting cold");
                    HashMap::new()
                }
            },
            None => HashMap::new(),
        };

        let engine = Engine {
            store: StatusStore::new(&services, &restored),
            in_flight: services
                .iter()
                .map(|service| (service.name.clone(), Mutex::new(())))
                .collect(),
            services,
            broadcaster: Broadcaster::new(),
            prober: Prober::new()?,
            gateway: history.map(PersistenceGateway::spawn),
        };

        Ok(Self {
            engine: Arc::new(engine),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            started: AtomicBool::new(false),
        })
    }

    /// Spawn one check loop per service. Calling it again has no effect.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        for service in &self.engine.services {
            let engine = self.engine.clone();
            let cancel = self.cancel.clone();
            let service = service.clone();
            self.tracker.spawn(async move { engine.run_service(service, cancel).await });
        }
        info!(services = self.engine.services.len(), "Monitoring started");
    }

    /// Signal every check loop to stop without waiting for them.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop, wait for every check loop to exit and drain pending history writes.
    pub async fn shutdown(&self) {
        self.stop();
        self.tracker.close();
        self.tracker.wait().await;

        if let Some(gateway) = &self.engine.gateway {
            if let Err(e) = gateway.flush().await {
                warn!(error = %e, "Failed to drain check history writes");
            }
        }
        info!("Monitoring stopped");
    }

    pub fn services(&self) -> &[Service] {
        &self.engine.services
    }

    pub async fn get_all_statuses(&self) -> Vec<ServiceStatus> {
        self.engine.store.all().await
    }

    pub async fn get_status(&self, name: &str) -> Option<ServiceStatus> {
        self.engine.store.get(name).await
    }

    pub async fn get_overall_status(&self) -> Status {
        self.engine.store.overall().await
    }

    pub async fn subscribe(&self) -> Subscription {
        self.engine.broadcaster.subscribe().await
    }

    pub async fn unsubscribe(&self, id: u64) -> bool {
        self.engine.broadcaster.unsubscribe(id).await
    }

    /// Probe one service right away through the normal update path.
    ///
    /// Waits for any check of the same service already in flight, so checks of
    /// one service never overlap even while the loops are running.
    pub async fn check_now(&self, name: &str) -> Option<Arc<ServiceStatus>> {
        let service = self.engine.services.iter().find(|service| service.name == name)?;
        self.engine.check(service).await
    }

    /// Probe every service once, concurrently, and return the resulting
    /// statuses in configuration order. Same serialization as [`Self::check_now`].
    pub async fn check_all(&self) -> Vec<ServiceStatus> {
        let mut checks = JoinSet::new();
        for service in &self.engine.services {
            let engine = self.engine.clone();
            let service = service.clone();
            checks.spawn(async move {
                engine.check(&service).await;
            });
        }
        while let Some(result) = checks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Check task failed");
            }
        }
        self.get_all_statuses().await
    }
}

impl Engine {
    async fn run_service(&self, service: Service, cancel: CancellationToken) {
        debug!(
            service = %service.name,
            kind = %service.kind(),
            interval = ?service.interval,
            "Check loop started"
        );

        // The first tick completes immediately.
        let mut ticker = interval(service.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.check(&service) => {}
            }
        }

        debug!(service = %service.name, "Check loop stopped");
    }

    async fn check(&self, service: &Service) -> Option<Arc<ServiceStatus>> {
        let _serial = self.in_flight.get(&service.name)?.lock().await;
        let outcome = self.prober.run(service).await;
        self.update_status(&service.name, outcome).await
    }

    /// Record an outcome, queue it for persistence and publish the new status.
    async fn update_status(&self, name: &str, outcome: ProbeOutcome) -> Option<Arc<ServiceStatus>> {
        let now = Utc::now();
        let (previous, snapshot) = self
            .store
            .update(name, |status| {
                let previous = status.status;
                status.record(&outcome, now, MAX_HISTORY);
                if let Some(gateway) = &self.gateway {
                    gateway.save(ServiceCheckHistory::from(&*status));
                }
                (previous, Arc::new(status.clone()))
            })
            .await?;

        debug!(
            service = name,
            status = %outcome.status,
            response_time_ms = snapshot.response_time_ms,
            code = outcome.code,
            "Check completed"
        );
        log_transition(name, previous, &snapshot);

        self.broadcaster.publish(snapshot.clone()).await;
        Some(snapshot)
    }
}

fn log_transition(name: &str, previous: Status, current: &ServiceStatus) {
    if previous == current.status {
        return;
    }
    if current.status == Status::Down {
        warn!(
            service = name,
            from = %previous,
            error = %current.error_message,
            "Service is down"
        );
    } else {
        info!(service = name, from = %previous, to = %current.status, "Service status changed");
    }
}
