// Probe behavior against mock devices.

use std::time::{Duration, Instant};

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rpmanager_core::{Probe, ProbeOutcome};

const HOST: &str = "127.0.0.1";
const TIMEOUT: Duration = Duration::from_secs(2);

fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn setup() -> (MockServer, Probe, u16) {
    let server = MockServer::start().await;
    let port = server.address().port();
    (server, Probe::new().unwrap(), port)
}

#[tokio::test]
async fn test_discover_success() {
    let (server, probe, port) = setup().await;

    Mock::given(method("GET"))
        .and(path("/discover"))
        .and(header("Accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Kitchen Pi",
            "description": "Lights and sensors",
            "version": "1.2.0",
            "timestamp": "2024-05-01T10:00:00"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let info = probe.discover(HOST, port, TIMEOUT).await.ok().unwrap();
    assert_eq!(info.name, "Kitchen Pi");
    assert_eq!(info.description, "Lights and sensors");
    assert_eq!(info.version, "1.2.0");
}

#[tokio::test]
async fn test_list_functions_sends_api_key() {
    let (server, probe, port) = setup().await;

    Mock::given(method("GET"))
        .and(path("/functions"))
        .and(header("X-API-Key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "functions": [{"id": "reboot", "name": "Reboot", "inputs": []}],
            "count": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let catalog = probe
        .list_functions(HOST, port, Some("secret"), TIMEOUT)
        .await
        .ok()
        .unwrap();
    assert_eq!(catalog.count, 1);
    assert!(catalog.find("reboot").is_some());
}

#[tokio::test]
async fn test_auth_statuses_are_unauthorized() {
    let (server, probe, port) = setup().await;

    Mock::given(method("GET"))
        .and(path("/functions"))
        .and(header("X-API-Key", "wrong"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Invalid API key"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/call/reboot"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let outcome = probe.list_functions(HOST, port, Some("wrong"), TIMEOUT).await;
    assert_eq!(outcome, ProbeOutcome::Unauthorized);

    let outcome = probe
        .invoke(HOST, port, "reboot", Default::default(), Some("wrong"), TIMEOUT)
        .await;
    assert_eq!(outcome, ProbeOutcome::Unauthorized);
}

#[tokio::test]
async fn test_error_status_is_unreachable() {
    let (server, probe, port) = setup().await;

    Mock::given(method("POST"))
        .and(path("/call/explode"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "GPIO busy"})))
        .mount(&server)
        .await;

    let outcome = probe
        .invoke(HOST, port, "explode", Default::default(), Some("secret"), TIMEOUT)
        .await;
    match outcome {
        ProbeOutcome::Unreachable(reason) => assert!(reason.contains("GPIO busy")),
        other => panic!("expected Unreachable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_undecodable_body_is_unreachable() {
    let (server, probe, port) = setup().await;

    Mock::given(method("GET"))
        .and(path("/discover"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>router login</html>"))
        .mount(&server)
        .await;

    let outcome = probe.discover(HOST, port, TIMEOUT).await;
    assert!(matches!(outcome, ProbeOutcome::Unreachable(_)));
}

#[tokio::test]
async fn test_timeout_is_unreachable_and_bounded() {
    let (server, probe, port) = setup().await;

    Mock::given(method("GET"))
        .and(path("/discover"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"name": "Slow Pi"}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let started = Instant::now();
    let outcome = probe.discover(HOST, port, Duration::from_millis(150)).await;
    let elapsed = started.elapsed();

    match outcome {
        ProbeOutcome::Unreachable(reason) => assert!(reason.contains("timed out")),
        other => panic!("expected Unreachable, got {:?}", other),
    }
    assert!(elapsed < Duration::from_secs(2), "probe took {:?}", elapsed);
}

#[tokio::test]
async fn test_refused_connection_is_unreachable() {
    let probe = Probe::new().unwrap();
    let outcome = probe.discover(HOST, closed_port(), TIMEOUT).await;
    assert!(matches!(outcome, ProbeOutcome::Unreachable(_)));
}

#[tokio::test]
async fn test_invoke_posts_inputs() {
    let (server, probe, port) = setup().await;

    Mock::given(method("POST"))
        .and(path("/call/set_led"))
        .and(header("X-API-Key", "secret"))
        .and(body_json(json!({"on": true, "brightness": 128})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "led": "on"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut inputs = serde_json::Map::new();
    inputs.insert("on".to_string(), json!(true));
    inputs.insert("brightness".to_string(), json!(128));

    let result = probe
        .invoke(HOST, port, "set_led", inputs, Some("secret"), TIMEOUT)
        .await
        .ok()
        .unwrap();
    assert_eq!(result["led"], "on");
}

#[tokio::test]
async fn test_invoke_without_inputs_sends_empty_object() {
    let (server, probe, port) = setup().await;

    Mock::given(method("POST"))
        .and(path("/call/uptime"))
        .and(body_json(json!({})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uptime": 42})))
        .expect(1)
        .mount(&server)
        .await;

    let result = probe
        .invoke(HOST, port, "uptime", Default::default(), Some("secret"), TIMEOUT)
        .await
        .ok()
        .unwrap();
    assert_eq!(result["uptime"], 42);
}
