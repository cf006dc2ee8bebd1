//! Connection manager behaviour against the simulated link.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use atomlink_common::{AccessPointRecord, AuthMode, ConnectionStatus, ErrorKind};
use atomlink_net::{ConnectionConfig, ConnectionManager, LinkScript, SimulatedLink};

type Seen = Arc<Mutex<Vec<(ConnectionStatus, u8)>>>;

fn manager_with(link: &SimulatedLink) -> (ConnectionManager, Seen) {
    let manager = ConnectionManager::new(Arc::new(link.clone()));
    manager.init().expect("init failed");

    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    manager.set_callback(move |status, info| {
        sink.lock().unwrap().push((status, info.retry_count));
    });
    (manager, seen)
}

fn statuses(seen: &Seen) -> Vec<ConnectionStatus> {
    seen.lock().unwrap().iter().map(|(s, _)| *s).collect()
}

async fn wait_for_status(manager: &ConnectionManager, status: ConnectionStatus) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while manager.status() != status {
        assert!(Instant::now() < deadline, "status never became {}", status);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[test]
fn test_init_requires_runtime() {
    let manager = ConnectionManager::new(Arc::new(SimulatedLink::default()));
    let err = manager.init().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(!manager.is_initialized());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_init_is_idempotent() {
    let link = SimulatedLink::default();
    let (manager, _) = manager_with(&link);
    assert!(manager.init().is_ok());
    assert!(manager.is_initialized());
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_driver_init_failure_is_out_of_memory() {
    let manager = ConnectionManager::new(Arc::new(SimulatedLink::default().with_init_failure()));
    let err = manager.init().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfMemory);
    assert!(!manager.is_initialized());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connect_before_init() {
    let manager = ConnectionManager::new(Arc::new(SimulatedLink::default()));
    let err = manager
        .connect(&ConnectionConfig::new("net-A", ""))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(
        manager.disconnect().unwrap_err().kind(),
        ErrorKind::InvalidState
    );
    assert_eq!(
        manager.scan_start().unwrap_err().kind(),
        ErrorKind::InvalidState
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connect_rejects_invalid_config() {
    let link = SimulatedLink::default();
    let (manager, seen) = manager_with(&link);

    for config in [
        ConnectionConfig::new("", ""),
        ConnectionConfig::new("n".repeat(33), ""),
        ConnectionConfig::new("net-A", "k".repeat(65)),
        ConnectionConfig::new("net-A", "").with_timeout_ms(0),
    ] {
        let err = manager.connect(&config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(link.connect_calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connect_success() {
    let link = SimulatedLink::default();
    let (manager, seen) = manager_with(&link);

    manager
        .connect(&ConnectionConfig::new("net-A", "secret").with_timeout_ms(1000))
        .await
        .expect("connect failed");

    assert!(manager.is_connected());
    assert_eq!(
        statuses(&seen),
        vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
    );

    let info = manager.info();
    assert_eq!(info.status, ConnectionStatus::Connected);
    assert_eq!(info.ssid, "net-A");
    assert_eq!(info.retry_count, 0);
    assert_eq!(info.address.map(|a| a.to_string()).as_deref(), Some("192.168.4.20"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_retries_then_connects() {
    let link = SimulatedLink::new(LinkScript::Associate { drops_before: 2 });
    let (manager, seen) = manager_with(&link);

    manager
        .connect(&ConnectionConfig::new("net-A", "").with_max_retry(5))
        .await
        .expect("connect failed");

    assert_eq!(link.connect_calls(), 3);
    let seen = seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            (ConnectionStatus::Connecting, 0),
            (ConnectionStatus::Connecting, 1),
            (ConnectionStatus::Connecting, 2),
            (ConnectionStatus::Connected, 0),
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_retry_budget_exhausted() {
    let link = SimulatedLink::new(LinkScript::AlwaysDrop);
    let (manager, seen) = manager_with(&link);

    let config = ConnectionConfig::new("net-A", "")
        .with_timeout_ms(5000)
        .with_max_retry(3);
    let err = manager.connect(&config).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConnectionFailure);
    assert_eq!(manager.status(), ConnectionStatus::Failed);
    // One initial association plus exactly three reconnects.
    assert_eq!(link.connect_calls(), 4);

    let seen = seen.lock().unwrap().clone();
    let reconnects = seen
        .iter()
        .filter(|(s, retry)| *s == ConnectionStatus::Connecting && *retry > 0)
        .count();
    assert_eq!(reconnects, 3);
    assert_eq!(seen.last(), Some(&(ConnectionStatus::Failed, 3)));
    assert!(!manager.is_connected());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_zero_retry_budget_fails_on_first_drop() {
    let link = SimulatedLink::new(LinkScript::AlwaysDrop);
    let (manager, _) = manager_with(&link);

    let err = manager
        .connect(&ConnectionConfig::new("net-A", "").with_max_retry(0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionFailure);
    assert_eq!(link.connect_calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connect_times_out() {
    let link = SimulatedLink::new(LinkScript::Silent);
    let (manager, seen) = manager_with(&link);

    let started = Instant::now();
    let err = manager
        .connect(&ConnectionConfig::new("net-A", "").with_timeout_ms(200))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(manager.status(), ConnectionStatus::TimedOut);
    assert_eq!(statuses(&seen).last(), Some(&ConnectionStatus::TimedOut));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_late_address_after_timeout_is_ignored() {
    let link = SimulatedLink::default().with_latency(Duration::from_millis(150));
    let (manager, _) = manager_with(&link);

    // StationStarted lands at 150 ms and the address at 300 ms.
    let err = manager
        .connect(&ConnectionConfig::new("net-A", "").with_timeout_ms(200))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(manager.status(), ConnectionStatus::TimedOut);
    assert!(!manager.is_connected());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_waiter() {
    let link = SimulatedLink::new(LinkScript::Silent);
    let (manager, _) = manager_with(&link);

    let first = {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .connect(&ConnectionConfig::new("net-A", "").with_timeout_ms(300))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = manager
        .connect(&ConnectionConfig::new("net-B", ""))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let first = first.await.unwrap().unwrap_err();
    assert_eq!(first.kind(), ErrorKind::Timeout);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_is_connected_tracks_last_callback() {
    let link = SimulatedLink::default();
    let (manager, seen) = manager_with(&link);

    manager
        .connect(&ConnectionConfig::new("net-A", ""))
        .await
        .unwrap();
    assert_eq!(statuses(&seen).last(), Some(&ConnectionStatus::Connected));
    assert!(manager.is_connected());

    manager.disconnect().unwrap();
    assert_eq!(statuses(&seen).last(), Some(&ConnectionStatus::Disconnected));
    assert!(!manager.is_connected());
    assert!(manager.info().address.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reconnect_after_explicit_disconnect() {
    let link = SimulatedLink::default();
    let (manager, _) = manager_with(&link);
    let config = ConnectionConfig::new("net-A", "");

    manager.connect(&config).await.unwrap();
    manager.disconnect().unwrap();
    manager.connect(&config).await.unwrap();

    assert!(manager.is_connected());
    assert_eq!(link.connect_calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_auto_reconnect_on_link_loss() {
    let link = SimulatedLink::default();
    let (manager, seen) = manager_with(&link);

    manager
        .connect(&ConnectionConfig::new("net-A", "").with_auto_reconnect(true))
        .await
        .unwrap();
    seen.lock().unwrap().clear();

    link.drop_link();
    tokio::time::sleep(Duration::from_millis(50)).await;
    wait_for_status(&manager, ConnectionStatus::Connected).await;

    assert_eq!(
        statuses(&seen),
        vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_link_loss_without_auto_reconnect() {
    let link = SimulatedLink::default();
    let (manager, seen) = manager_with(&link);

    manager
        .connect(&ConnectionConfig::new("net-A", "").with_auto_reconnect(false))
        .await
        .unwrap();

    link.drop_link();
    wait_for_status(&manager, ConnectionStatus::Disconnected).await;
    assert_eq!(statuses(&seen).last(), Some(&ConnectionStatus::Disconnected));
    assert_eq!(link.connect_calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scan_results() {
    let networks = vec![
        AccessPointRecord {
            ssid: "net-A".to_string(),
            bssid: [0x24, 0x0a, 0xc4, 0x00, 0x00, 0x0a],
            channel: 1,
            rssi: -48,
            auth_mode: AuthMode::Wpa2Psk,
        },
        AccessPointRecord {
            ssid: "cafe".to_string(),
            bssid: [0x24, 0x0a, 0xc4, 0x00, 0x00, 0x0b],
            channel: 11,
            rssi: -80,
            auth_mode: AuthMode::Open,
        },
    ];
    let link = SimulatedLink::default().with_networks(networks);
    let (manager, _) = manager_with(&link);

    assert_eq!(
        manager.scan_count().unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );

    manager.scan_start().unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while manager.scan_count().is_err() {
        assert!(Instant::now() < deadline, "scan never completed");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(manager.scan_count().unwrap(), 2);
    assert_eq!(manager.scan_result(1).unwrap().ssid, "cafe");
    assert_eq!(
        manager.scan_result(2).unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deinit_and_reinit() {
    let link = SimulatedLink::default();
    let (manager, seen) = manager_with(&link);
    let config = ConnectionConfig::new("net-A", "");

    manager.connect(&config).await.unwrap();
    manager.deinit().unwrap();

    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    assert_eq!(statuses(&seen).last(), Some(&ConnectionStatus::Disconnected));
    assert!(manager.deinit().is_ok());
    assert_eq!(
        manager.connect(&config).await.unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
    assert_eq!(
        manager.scan_count().unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );

    manager.init().unwrap();
    manager.connect(&config).await.unwrap();
    assert!(manager.is_connected());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deinit_wakes_waiting_connect() {
    let link = SimulatedLink::new(LinkScript::Silent);
    let (manager, _) = manager_with(&link);

    let pending = {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .connect(&ConnectionConfig::new("net-A", "").with_timeout_ms(10_000))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    manager.deinit().unwrap();
    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionFailure);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disconnect_wakes_waiting_connect() {
    let link = SimulatedLink::new(LinkScript::Silent);
    let (manager, seen) = manager_with(&link);

    let pending = {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .connect(&ConnectionConfig::new("net-A", "").with_timeout_ms(300))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    manager.disconnect().unwrap();
    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionFailure);
    assert!(started.elapsed() < Duration::from_millis(250));

    // Outlive the original wait budget; nothing may revive or expire the link.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    assert_eq!(
        statuses(&seen),
        vec![ConnectionStatus::Connecting, ConnectionStatus::Disconnected]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_clear_callback() {
    let link = SimulatedLink::default();
    let (manager, seen) = manager_with(&link);
    manager.clear_callback();

    manager
        .connect(&ConnectionConfig::new("net-A", ""))
        .await
        .unwrap();
    assert!(seen.lock().unwrap().is_empty());
}
