// Scanner and session scans against mock devices.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rpmanager_core::config::{self, ManagerConfig};
use rpmanager_core::{Probe, ScanConfig, Scanner, Session, Store};

fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn device_server(name: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/discover"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": name,
            "description": "test device",
            "version": "1.0.0"
        })))
        .mount(&server)
        .await;
    server
}

fn scan_config(hosts: &[&str], ports: Vec<u16>) -> ScanConfig {
    ScanConfig {
        hosts: hosts.iter().map(|h| h.to_string()).collect(),
        subnet: None,
        ports,
        timeout: Duration::from_millis(500),
    }
}

fn manager_config(scan: ScanConfig) -> ManagerConfig {
    let mut config = config::resolve(None, |_| None).unwrap();
    config.scan = scan;
    config
}

#[tokio::test]
async fn test_only_answering_port_is_found() {
    let server = device_server("Pi").await;
    let live = server.address().port();

    let scanner = Scanner::new(
        Probe::new().unwrap(),
        scan_config(&["127.0.0.1"], vec![live, closed_port()]),
    )
    .unwrap();

    let devices = scanner.scan().await;
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].host, "127.0.0.1");
    assert_eq!(devices[0].port, live);
    assert_eq!(devices[0].name, "Pi");
    assert_eq!(devices[0].version, "1.0.0");
}

#[tokio::test]
async fn test_duplicate_hosts_yield_one_device() {
    let server = device_server("Pi").await;
    let live = server.address().port();

    let scanner = Scanner::new(
        Probe::new().unwrap(),
        scan_config(&["127.0.0.1", "127.0.0.1", " 127.0.0.1 "], vec![live, live]),
    )
    .unwrap();

    let devices = scanner.scan().await;
    assert_eq!(devices.len(), 1);
}

#[tokio::test]
async fn test_rejecting_and_broken_candidates_are_excluded() {
    let good = device_server("Good").await;

    let locked = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/discover"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&locked)
        .await;

    let broken = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/discover"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&broken)
        .await;

    let ports = vec![
        good.address().port(),
        locked.address().port(),
        broken.address().port(),
    ];
    let scanner = Scanner::new(Probe::new().unwrap(), scan_config(&["127.0.0.1"], ports)).unwrap();

    let devices = scanner.scan().await;
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].name, "Good");
}

#[tokio::test]
async fn test_scan_is_bounded_by_probe_timeout() {
    let slow = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/discover"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"name": "Slow"}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&slow)
        .await;

    let mut config = scan_config(&["127.0.0.1"], vec![slow.address().port(), closed_port()]);
    config.timeout = Duration::from_millis(200);
    let scanner = Scanner::new(Probe::new().unwrap(), config).unwrap();

    let started = Instant::now();
    let devices = scanner.scan().await;
    assert!(devices.is_empty());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_results_share_completion_time() {
    let a = device_server("A").await;
    let b = device_server("B").await;

    let scanner = Scanner::new(
        Probe::new().unwrap(),
        scan_config(&["127.0.0.1"], vec![a.address().port(), b.address().port()]),
    )
    .unwrap();

    let devices = scanner.scan().await;
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].discovered, devices[1].discovered);
}

#[tokio::test]
async fn test_session_scan_records_and_remembers_devices() {
    let server = device_server("Pi").await;
    let live = server.address().port();
    let store = Arc::new(Store::in_memory());

    let config = manager_config(scan_config(&["127.0.0.1"], vec![live]));
    let session = Session::with_store(&config, store.clone()).unwrap();

    let summary = session.scan().await.unwrap();
    assert_eq!(summary.generation, 1);
    assert!(summary.published);
    assert_eq!(summary.discovered, 1);
    assert_eq!(summary.devices.len(), 1);
    assert!(summary.devices[0].is_online());

    let stored = store.find_device(&format!("127.0.0.1:{}", live)).await.unwrap();
    assert_eq!(stored.name, "Pi");
    assert!(stored.api_key.is_none());

    // Nothing answers any more: the device is still listed, as remembered
    let config = manager_config(scan_config(&["127.0.0.1"], vec![closed_port()]));
    let later = Session::with_store(&config, store.clone()).unwrap();
    let summary = later.scan().await.unwrap();
    assert_eq!(summary.discovered, 0);
    assert_eq!(summary.devices.len(), 1);
    assert!(!summary.devices[0].is_online());
    assert_eq!(summary.devices[0].name(), "Pi");
    assert_eq!(store.list_devices().await.len(), 1);
}
