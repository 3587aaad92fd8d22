#![allow(clippy::unwrap_used)]
// Integration tests for the hub: cloud pairing and virtual LED groups.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reefsync_core::{
    CloudConfig, CoreError, DataPath, DeviceConfig, DeviceHandle, DeviceKind, Hub, LinkState, RetryPolicy,
    SyncSettings, TransportConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn fast_sync() -> SyncSettings {
    SyncSettings {
        transport: TransportConfig::default(),
        retry: RetryPolicy::new(5, Duration::from_millis(1)),
        command_grace: Duration::ZERO,
    }
}

async fn serve(server: &MockServer, verb: &str, endpoint: &str, body: Value) {
    Mock::given(method(verb))
        .and(path(endpoint))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mock_wave_pump(hwid: &str) -> MockServer {
    let stock = json!({"uid": "stock", "type": "ra", "frt": 10, "rrt": 5, "default": true});
    mock_wave_pump_with(hwid, &stock).await
}

async fn mock_wave_pump_with(hwid: &str, wave: &Value) -> MockServer {
    let server = MockServer::start().await;
    serve(&server, "GET", "/device-info", json!({"hwid": hwid, "name": "wave"})).await;
    serve(&server, "GET", "/firmware", json!({"version": "1.0"})).await;
    serve(
        &server,
        "GET",
        "/auto",
        json!({"intervals": [{"st": 0, "wave": wave}, {"st": 720, "wave": wave}]}),
    )
    .await;
    serve(&server, "GET", "/mode", json!({"mode": "auto"})).await;
    server
}

async fn mock_cloud(hwids: &[&str]) -> MockServer {
    let server = MockServer::start().await;
    serve(&server, "POST", "/oauth/token", json!({"access_token": "tok"})).await;
    serve(&server, "GET", "/user", json!({"email": "me@example.com"})).await;
    serve(&server, "GET", "/aquarium", json!([{"name": "display"}])).await;
    let devices: Vec<Value> = hwids.iter().map(|h| json!({"hwid": h})).collect();
    serve(&server, "GET", "/device", Value::Array(devices)).await;
    serve(&server, "GET", "/reef-lights/library", json!([])).await;
    serve(&server, "GET", "/reef-wave/library", json!([{"uid": "stock"}])).await;
    serve(&server, "GET", "/reef-dosing/supplement", json!([])).await;
    server
}

fn cloud_config(server: &MockServer) -> CloudConfig {
    let mut config = CloudConfig::new(
        "me@example.com",
        "me@example.com",
        SecretString::from("pw".to_owned()),
    );
    config.base_url = server.uri();
    config.sync = fast_sync();
    config
}

fn device_config(server: &MockServer, id: &str, kind: DeviceKind, model: &str) -> DeviceConfig {
    let mut config = DeviceConfig::new(id, kind, model, server.uri());
    config.sync = fast_sync();
    config
}

async fn wait_for_link(handle: &DeviceHandle) -> LinkState {
    for _ in 0..200 {
        if handle.link_state() == LinkState::Linked {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    handle.link_state()
}

// ── Cloud pairing ───────────────────────────────────────────────────

async fn mount_schedule_patch(cloud: &MockServer, hwid: &str) {
    Mock::given(method("PATCH"))
        .and(path(format!("/reef-wave/schedule/{hwid}")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(cloud)
        .await;
}

/// Interval list sent with the single schedule PATCH.
async fn patched_intervals(cloud: &MockServer) -> Vec<Value> {
    let requests = cloud.received_requests().await.unwrap();
    let patch = requests
        .iter()
        .find(|r| r.method.as_str() == "PATCH")
        .expect("schedule was patched");
    let body: Value = serde_json::from_slice(&patch.body).unwrap();
    body["intervals"].as_array().cloned().unwrap()
}

async fn linked_pump(hub: &Hub, pump: &MockServer, cloud: &MockServer) -> Arc<DeviceHandle> {
    let handle = hub
        .add_device(device_config(pump, "wave", DeviceKind::Wave, "RSWAVE25"))
        .await
        .unwrap();
    hub.add_cloud(&cloud_config(cloud)).await.unwrap();
    assert_eq!(wait_for_link(&handle).await, LinkState::Linked);
    handle
        .lock()
        .await
        .set_data(&DataPath::local("/wave/preview"), json!({"type": "ra", "frt": 12}))
        .unwrap();
    handle
}

#[tokio::test]
async fn test_account_links_device_it_knows() {
    let pump = mock_wave_pump("wave-1").await;
    let cloud = mock_cloud(&["wave-1"]).await;

    let hub = Hub::new();
    let handle = hub
        .add_device(device_config(&pump, "wave", DeviceKind::Wave, "RSWAVE25"))
        .await
        .unwrap();
    let account = hub.add_cloud(&cloud_config(&cloud)).await.unwrap();
    assert_eq!(account.wave_library().await.len(), 1);

    assert_eq!(wait_for_link(&handle).await, LinkState::Linked);
    assert_eq!(handle.linked_account().as_deref(), Some("me@example.com"));

    hub.shutdown().await;
}

#[tokio::test]
async fn test_cloud_wave_from_default_creates_library_wave() {
    let pump = mock_wave_pump("wave-1").await;
    let cloud = mock_cloud(&["wave-1"]).await;
    Mock::given(method("POST"))
        .and(path("/reef-wave/library"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uid": "mine"})))
        .expect(1)
        .mount(&cloud)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&cloud)
        .await;
    mount_schedule_patch(&cloud, "wave-1").await;

    let hub = Hub::new();
    let handle = linked_pump(&hub, &pump, &cloud).await;

    // 10:30 falls in the interval starting at midnight
    handle.set_wave_at(true, 630).await.unwrap();

    let intervals = patched_intervals(&cloud).await;
    assert_eq!(intervals[0]["wave"]["uid"], json!("mine"));
    assert_eq!(intervals[0]["wave"]["frt"], json!(12));
    assert_eq!(intervals[0]["wave"]["default"], json!(false));
    assert_eq!(intervals[1]["wave"]["uid"], json!("stock"));

    let cached = handle
        .lock()
        .await
        .get_data(&DataPath::source("/auto", "/intervals/0/wave/uid"), false)
        .unwrap();
    assert_eq!(cached, Some(json!("mine")));

    hub.shutdown().await;
}

#[tokio::test]
async fn test_cloud_wave_edits_own_library_wave_in_place() {
    let custom = json!({"uid": "custom", "type": "ra", "frt": 10, "rrt": 5, "default": false});
    let pump = mock_wave_pump_with("wave-1", &custom).await;
    let cloud = mock_cloud(&["wave-1"]).await;
    Mock::given(method("PUT"))
        .and(path("/reef-wave/library/custom"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&cloud)
        .await;
    Mock::given(method("POST"))
        .and(path("/reef-wave/library"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uid": "other"})))
        .expect(0)
        .mount(&cloud)
        .await;
    mount_schedule_patch(&cloud, "wave-1").await;

    let hub = Hub::new();
    let handle = linked_pump(&hub, &pump, &cloud).await;

    // 13:00 falls in the interval starting at noon
    handle.set_wave_at(true, 780).await.unwrap();

    let intervals = patched_intervals(&cloud).await;
    assert_eq!(intervals[1]["wave"]["uid"], json!("custom"));
    assert_eq!(intervals[1]["wave"]["frt"], json!(12));
    assert_eq!(intervals[0]["wave"]["frt"], json!(10));

    hub.shutdown().await;
}

#[tokio::test]
async fn test_removing_account_clears_link() {
    let pump = mock_wave_pump("wave-1").await;
    let cloud = mock_cloud(&["wave-1"]).await;

    let hub = Hub::new();
    let handle = hub
        .add_device(device_config(&pump, "wave", DeviceKind::Wave, "RSWAVE25"))
        .await
        .unwrap();
    hub.add_cloud(&cloud_config(&cloud)).await.unwrap();
    assert_eq!(wait_for_link(&handle).await, LinkState::Linked);

    assert!(hub.remove_cloud("me@example.com"));
    assert_ne!(handle.link_state(), LinkState::Linked);
    assert!(handle.cloud_client().is_none());
    let result = handle.set_wave(true).await;
    assert!(matches!(result, Err(CoreError::NotLinked { .. })));
    assert!(!hub.remove_cloud("me@example.com"));

    hub.shutdown().await;
}

#[tokio::test]
async fn test_account_ignores_unknown_hardware() {
    let pump = mock_wave_pump("wave-9").await;
    let cloud = mock_cloud(&["wave-1"]).await;

    let hub = Hub::new();
    let handle = hub
        .add_device(device_config(&pump, "wave", DeviceKind::Wave, "RSWAVE25"))
        .await
        .unwrap();
    hub.add_cloud(&cloud_config(&cloud)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(handle.link_state(), LinkState::LinkRequested);

    hub.shutdown().await;
}

// ── Virtual LED ─────────────────────────────────────────────────────

async fn mock_led(white: u64, blue: u64) -> MockServer {
    let server = MockServer::start().await;
    serve(&server, "GET", "/device-info", json!({"hwid": "led"})).await;
    serve(&server, "GET", "/firmware", json!({"version": "3.0"})).await;
    serve(&server, "GET", "/dashboard", json!({"fan": 30})).await;
    serve(&server, "GET", "/preset_name", json!({"name": "reef"})).await;
    serve(&server, "GET", "/mode", json!({"mode": "manual"})).await;
    serve(&server, "GET", "/manual", json!({"white": white, "blue": blue, "moon": 0})).await;
    serve(&server, "GET", "/auto", json!({})).await;
    serve(&server, "GET", "/acclimation", json!({"enabled": false})).await;
    server
}

#[tokio::test]
async fn test_virtual_led_aggregates_members() {
    let first = mock_led(80, 40).await;
    let second = mock_led(60, 20).await;
    let hub = Hub::new();
    hub.add_device(device_config(&first, "left", DeviceKind::LedG1, "RSLED160"))
        .await
        .unwrap();
    hub.add_device(device_config(&second, "right", DeviceKind::LedG1, "RSLED160"))
        .await
        .unwrap();

    let group = hub
        .add_virtual("tank", &["left".to_owned(), "right".to_owned()])
        .unwrap();
    assert_eq!(group.members().len(), 2);
    assert!(group.only_g1());

    let white = group
        .get_data(&DataPath::source("/manual", "/white"), false)
        .await
        .unwrap();
    assert_eq!(white, Some(json!(70)));
    let mode = group
        .get_data(&DataPath::source("/mode", "/mode"), false)
        .await
        .unwrap();
    assert_eq!(mode, Some(json!("manual")));

    hub.remove_device("right");
    assert_eq!(group.members().len(), 1);
    let white = group
        .get_data(&DataPath::source("/manual", "/white"), false)
        .await
        .unwrap();
    assert_eq!(white, Some(json!(80)));

    hub.shutdown().await;
}

#[tokio::test]
async fn test_virtual_led_rejects_non_led_members() {
    let pump = mock_wave_pump("wave-1").await;
    let hub = Hub::new();
    hub.add_device(device_config(&pump, "wave", DeviceKind::Wave, "RSWAVE25"))
        .await
        .unwrap();

    let result = hub.add_virtual("tank", &["wave".to_owned()]);
    assert!(matches!(result, Err(CoreError::Config { .. })));
    let result = hub.add_virtual("tank", &["ghost".to_owned()]);
    assert!(matches!(result, Err(CoreError::Config { .. })));

    let empty = hub.add_virtual("empty", &[]).unwrap();
    let value = empty
        .get_data(&DataPath::source("/manual", "/white"), false)
        .await
        .unwrap();
    assert_eq!(value, None);
    assert_eq!(Arc::strong_count(&empty), 2);

    hub.shutdown().await;
}

// ── Removal ─────────────────────────────────────────────────────────

fn manual_gets(requests: &[wiremock::Request]) -> usize {
    requests
        .iter()
        .filter(|r| r.method.as_str() == "GET" && r.url.path() == "/manual")
        .count()
}

#[tokio::test]
async fn test_removed_device_is_no_longer_polled() {
    let led = mock_led(80, 40).await;
    let mut config = device_config(&led, "led", DeviceKind::LedG1, "RSLED160");
    config.scan_interval = Duration::from_secs(1);

    let hub = Hub::new();
    let handle = hub.add_device(config).await.unwrap();
    let weak = Arc::downgrade(&handle);
    drop(handle);

    assert!(hub.remove_device("led"));
    assert!(hub.device("led").is_none());
    assert!(!hub.remove_device("led"));

    let before = manual_gets(&led.received_requests().await.unwrap());
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    let after = manual_gets(&led.received_requests().await.unwrap());
    assert_eq!(before, after);
    assert!(weak.upgrade().is_none());

    hub.shutdown().await;
}
