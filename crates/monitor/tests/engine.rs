//! Engine behaviour: warm start, aggregation and slow subscribers

mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use status_monitor::{
    CheckPoint, Config, MemoryHistoryStore, Monitor, SUBSCRIBER_CAPACITY, Service,
    ServiceCheckHistory, Status,
};
use support::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn tcp_services(entries: &[(&str, std::net::SocketAddr)]) -> Vec<Service> {
    let toml: String = entries
        .iter()
        .map(|(name, address)| {
            format!(
                "[[services]]\nname = \"{name}\"\ntype = \"tcp\"\nhost = \"{}\"\nport = {}\n\
                 timeout = \"500ms\"\ninterval = \"1h\"\n\n",
                address.ip(),
                address.port()
            )
        })
        .collect();
    Config::from_toml(&toml).unwrap().services().unwrap()
}

fn snapshot(name: &str, statuses: &[&str], uptime: f64, error: &str) -> ServiceCheckHistory {
    let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let history: Vec<CheckPoint> = statuses
        .iter()
        .enumerate()
        .map(|(i, status)| CheckPoint {
            timestamp: base + chrono::Duration::minutes(i as i64),
            response_time_ms: 10 + i as i64,
            status: status.to_string(),
            status_code: if *status == "down" { 0 } else { 200 },
        })
        .collect();
    ServiceCheckHistory {
        service_name: name.to_string(),
        last_check: history.last().map(|point| point.timestamp),
        history,
        uptime,
        error_message: error.to_string(),
    }
}

#[tokio::test]
async fn test_warm_start_restores_snapshot() {
    let _ = tracing_subscriber::fmt::try_init();
    let address = silent_tcp_server().await;

    let mut points = vec!["operational"; 9];
    points.push("down");
    let store = MemoryHistoryStore::with_snapshots([snapshot("api", &points, 87.5, "timeout")]);
    let monitor = Monitor::new(tcp_services(&[("api", address)]), Some(Arc::new(store)))
        .await
        .unwrap();

    let status = monitor.get_status("api").await.unwrap();
    assert_eq!(status.history.len(), 10);
    assert_eq!(status.uptime, 87.5);
    assert_eq!(status.error_message, "timeout");
    assert_eq!(status.status, Status::Down);
    assert_eq!(status.response_time_ms, 19);
    assert_eq!(status.status_code, 0);
    assert_eq!(monitor.get_overall_status().await, Status::Down);

    let status = monitor.check_now("api").await.unwrap();
    assert_eq!(status.history.len(), 11);
    assert_eq!(status.status, Status::Operational);
    assert!((status.uptime - 10.0 / 11.0 * 100.0).abs() < 1e-9);

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_warm_start_ignores_unconfigured_services() {
    let address = silent_tcp_server().await;
    let store = MemoryHistoryStore::with_snapshots([snapshot("retired", &["down"], 0.0, "gone")]);
    let monitor = Monitor::new(tcp_services(&[("api", address)]), Some(Arc::new(store)))
        .await
        .unwrap();

    assert!(monitor.get_status("retired").await.is_none());
    assert_eq!(monitor.get_status("api").await.unwrap().status, Status::Unknown);
    assert_eq!(monitor.get_overall_status().await, Status::Operational);
}

#[tokio::test]
async fn test_overall_status_from_restored_snapshots() {
    let address = silent_tcp_server().await;
    let names = ["a", "b", "c", "d"];
    let services = tcp_services(&names.map(|name| (name, address)));

    let cases: [(&[&str], Status); 4] = [
        (&["operational", "operational", "operational", "operational"], Status::Operational),
        (&["operational", "degraded", "operational", "operational"], Status::Degraded),
        (&["down", "down", "operational", "operational"], Status::Degraded),
        (&["down", "down", "down", "operational"], Status::Down),
    ];

    for (current, expected) in cases {
        let store = MemoryHistoryStore::with_snapshots(
            names.iter().zip(current).map(|(name, status)| snapshot(name, &[*status], 100.0, "")),
        );
        let monitor = Monitor::new(services.clone(), Some(Arc::new(store))).await.unwrap();
        assert_eq!(monitor.get_overall_status().await, expected, "{current:?}");
    }
}

#[tokio::test]
async fn test_statuses_follow_configuration_order() {
    let address = silent_tcp_server().await;
    let monitor = Monitor::new(
        tcp_services(&[("zeta", address), ("alpha", address), ("mid", address)]),
        None,
    )
    .await
    .unwrap();

    let statuses = monitor.check_all().await;
    let names: Vec<_> = statuses.iter().map(|status| status.name.as_str()).collect();
    assert_eq!(names, ["zeta", "alpha", "mid"]);
    assert!(statuses.iter().all(|status| status.status == Status::Operational));
}

#[tokio::test]
async fn test_stalled_subscriber_does_not_block_checks() {
    let address = closed_tcp_port().await;
    let monitor = Monitor::new(tcp_services(&[("api", address)]), None).await.unwrap();

    let mut stalled = monitor.subscribe().await;
    let checks = SUBSCRIBER_CAPACITY + 20;
    tokio::time::timeout(Duration::from_secs(30), async {
        for _ in 0..checks {
            monitor.check_now("api").await.unwrap();
        }
    })
    .await
    .expect("checks blocked on a full subscriber");

    let mut received = 0;
    while stalled.receiver.try_recv().is_ok() {
        received += 1;
    }
    assert_eq!(received, SUBSCRIBER_CAPACITY);

    let status = monitor.get_status("api").await.unwrap();
    assert_eq!(status.history.len(), 90);
}

#[tokio::test]
async fn test_unsubscribe_closes_stream() {
    let address = silent_tcp_server().await;
    let monitor = Monitor::new(tcp_services(&[("api", address)]), None).await.unwrap();

    let mut sub = monitor.subscribe().await;
    assert!(monitor.unsubscribe(sub.id).await);
    assert!(!monitor.unsubscribe(sub.id).await);

    monitor.check_now("api").await.unwrap();
    assert!(sub.receiver.recv().await.is_none());
}

/// Redis stand-in that answers PING after a pause and records the highest
/// number of connections it was serving at once.
async fn slow_redis(peak: Arc<AtomicUsize>) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let active = Arc::new(AtomicUsize::new(0));

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let (active, peak) = (active.clone(), peak.clone());
            tokio::spawn(async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);

                let mut buf = [0u8; 64];
                let _ = stream.read(&mut buf).await;
                tokio::time::sleep(Duration::from_millis(150)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                let _ = stream.write_all(b"+PONG\r\n").await;
            });
        }
    });

    address
}

#[tokio::test]
async fn test_manual_checks_never_overlap_running_loop() {
    let peak = Arc::new(AtomicUsize::new(0));
    let address = slow_redis(peak.clone()).await;
    let service = endpoint_service("redis", address, Duration::from_secs(2));
    let monitor = Monitor::new(vec![service], None).await.unwrap();

    monitor.start();
    let (first, second) = tokio::join!(
        monitor.check_now("redis-under-test"),
        monitor.check_now("redis-under-test")
    );
    monitor.shutdown().await;

    // Slower than the Redis threshold, so degraded rather than operational.
    assert_eq!(first.unwrap().status, Status::Degraded);
    assert_eq!(second.unwrap().status, Status::Degraded);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert!(monitor.get_status("redis-under-test").await.unwrap().history.len() >= 2);
}
