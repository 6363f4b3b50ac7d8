//! History survives a restart through the libsql store

mod support;

use std::sync::Arc;
use std::time::Duration;

use status_monitor::{HistoryStore, LibsqlHistoryStore, Monitor, Status};
use support::*;

#[tokio::test]
async fn test_history_survives_restart() {
    let _ = tracing_subscriber::fmt::try_init();
    let dir = tempfile::tempdir().unwrap();
    let up = silent_tcp_server().await;
    let down = closed_tcp_port().await;
    let services =
        vec![endpoint_service("tcp", up, Duration::from_millis(500)), {
            let mut svc = endpoint_service("tcp", down, Duration::from_millis(500));
            svc.name = "tcp-closed".to_string();
            svc
        }];

    {
        let store = Arc::new(LibsqlHistoryStore::open(dir.path()).await.unwrap());
        let monitor = Monitor::new(services.clone(), Some(store)).await.unwrap();
        for _ in 0..3 {
            monitor.check_all().await;
        }
        monitor.shutdown().await;
    }

    let store = Arc::new(LibsqlHistoryStore::open(dir.path()).await.unwrap());
    let saved = store.get_all_service_check_history().await.unwrap();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved["tcp-under-test"].history.len(), 3);

    let monitor = Monitor::new(services, Some(store)).await.unwrap();
    let open = monitor.get_status("tcp-under-test").await.unwrap();
    assert_eq!(open.status, Status::Operational);
    assert_eq!(open.history.len(), 3);
    assert_eq!(open.uptime, 100.0);

    let closed = monitor.get_status("tcp-closed").await.unwrap();
    assert_eq!(closed.status, Status::Down);
    assert_eq!(closed.uptime, 0.0);
    assert!(!closed.error_message.is_empty());
    assert_eq!(monitor.get_overall_status().await, Status::Degraded);
}
