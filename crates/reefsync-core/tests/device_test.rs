#![allow(clippy::unwrap_used)]
// Integration tests for device adapters against a mocked device.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reefsync_core::device::dose::BUNDLE_UIDS;
use reefsync_core::{
    CalibrationStep, CoreError, DataPath, Device, DeviceConfig, DeviceKind, Method, RetryPolicy, SyncSettings,
    TransportConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn fast_sync() -> SyncSettings {
    SyncSettings {
        transport: TransportConfig::default(),
        retry: RetryPolicy::new(5, Duration::from_millis(1)),
        command_grace: Duration::ZERO,
    }
}

fn config(server: &MockServer, kind: DeviceKind, model: &str) -> DeviceConfig {
    let mut config = DeviceConfig::new("dev", kind, model, server.uri());
    config.sync = fast_sync();
    config
}

async fn serve(server: &MockServer, endpoint: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(endpoint))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn expect_write(server: &MockServer, verb: &str, endpoint: &str, body: Value) {
    Mock::given(method(verb))
        .and(path(endpoint))
        .and(body_json(body))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(server)
        .await;
}

async fn serve_identity(server: &MockServer, hwid: &str) {
    serve(server, "/device-info", json!({"hwid": hwid, "name": "tank", "hw_model": "X"})).await;
    serve(server, "/firmware", json!({"version": "2.1.0"})).await;
}

// ── Boot ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_initial_data_fills_every_device_info_source() {
    let server = MockServer::start().await;
    serve_identity(&server, "ato-1").await;
    serve(&server, "/configuration", json!({"auto_fill": true})).await;
    serve(&server, "/dashboard", json!({"volume_left": 1200})).await;

    let mut dev = Device::new(config(&server, DeviceKind::Ato, "RSATO+")).unwrap();
    dev.get_initial_data().await.unwrap();

    for source in dev.sources().iter() {
        assert!(source.has_payload(), "{} is empty", source.name);
    }
    assert!(!dev.in_error());
    let info = dev.info();
    assert_eq!(info.hwid.as_deref(), Some("ato-1"));
    assert_eq!(info.firmware.as_deref(), Some("2.1.0"));
}

#[tokio::test]
async fn test_fetch_config_names_a_registered_source() {
    let server = MockServer::start().await;
    serve_identity(&server, "ato-1").await;
    serve(&server, "/configuration", json!({"auto_fill": true})).await;
    serve(&server, "/dashboard", json!({"volume_left": 1200})).await;

    let mut dev = Device::new(config(&server, DeviceKind::Ato, "RSATO+")).unwrap();
    dev.get_initial_data().await.unwrap();

    let report = dev.fetch_config(Some("/configuration")).await.unwrap();
    assert_eq!(report.fetched, vec!["/configuration".to_owned()]);
    assert!(report.is_complete());

    let err = dev.fetch_config(Some("/unknown")).await.unwrap_err();
    assert!(matches!(err, CoreError::UnknownSource { ref name } if name == "/unknown"));
}

#[tokio::test]
async fn test_unreachable_device_aborts_boot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/device-info"))
        .respond_with(ResponseTemplate::new(500))
        .expect(5)
        .mount(&server)
        .await;
    serve(&server, "/firmware", json!({"version": "1"})).await;

    let mut dev = Device::new(config(&server, DeviceKind::Mat, "RSMAT500")).unwrap();
    let result = dev.get_initial_data().await;
    assert!(
        matches!(result, Err(CoreError::DeviceUnreachable { .. })),
        "expected unreachable, got: {result:?}"
    );
    assert!(dev.in_error());
}

#[tokio::test]
async fn test_steady_tick_keeps_stale_payload_on_failure() {
    let server = MockServer::start().await;
    serve_identity(&server, "ato-1").await;
    serve(&server, "/configuration", json!({})).await;
    Mock::given(method("GET"))
        .and(path("/dashboard"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"volume_left": 900})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dashboard"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut dev = Device::new(config(&server, DeviceKind::Ato, "RSATO+")).unwrap();
    dev.get_initial_data().await.unwrap();

    let report = dev.refresh().await;
    assert!(!report.is_complete());
    assert_eq!(report.failed_names().collect::<Vec<_>>(), ["/dashboard"]);
    assert!(dev.in_error());

    let level = dev
        .get_data(&DataPath::source("/dashboard", "/volume_left"), false)
        .unwrap();
    assert_eq!(level, Some(json!(900)));
}

#[tokio::test]
async fn test_led_dashboard_patches_sources() {
    let server = MockServer::start().await;
    serve_identity(&server, "led-1").await;
    serve(&server, "/", json!({"hwid": "led-1"})).await;
    serve(&server, "/manual", json!({"white": 80, "blue": 40, "moon": 0})).await;
    serve(&server, "/mode", json!({"mode": "auto"})).await;

    let mut dev = Device::new(config(&server, DeviceKind::LedG1, "RSLED160")).unwrap();
    dev.get_initial_data().await.unwrap();

    let names: Vec<&str> = dev.sources().iter().map(|s| s.name.as_str()).collect();
    assert!(names.contains(&"/"));
    assert!(!names.contains(&"/dashboard"));
    assert!(!names.contains(&"/preset_name"));
    assert!(names.contains(&"/preset_name/1") && names.contains(&"/preset_name/7"));

    let kelvin = dev.get_data(&DataPath::local("/leds/kelvin"), false).unwrap();
    assert_eq!(kelvin, Some(json!(12000.0)));
}

#[tokio::test]
async fn test_led_rides_out_busy_dashboard() {
    let server = MockServer::start().await;
    serve_identity(&server, "led-1").await;
    Mock::given(method("GET"))
        .and(path("/dashboard"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    serve(&server, "/dashboard", json!({"fan": 30})).await;
    serve(&server, "/manual", json!({"white": 80, "blue": 40, "moon": 0})).await;

    let mut dev = Device::new(config(&server, DeviceKind::LedG1, "RSLED160")).unwrap();
    dev.get_initial_data().await.unwrap();

    let names: Vec<&str> = dev.sources().iter().map(|s| s.name.as_str()).collect();
    assert!(names.contains(&"/dashboard"));
    assert!(!names.contains(&"/"));
    assert_eq!(
        dev.get_data(&DataPath::source("/dashboard", "/fan"), false).unwrap(),
        Some(json!(30))
    );
}

// ── Cache contract ──────────────────────────────────────────────────

#[tokio::test]
async fn test_set_then_get_returns_value() {
    let server = MockServer::start().await;
    let mut dev = Device::new(config(&server, DeviceKind::Mat, "RSMAT500")).unwrap();

    let staged = DataPath::local("/roll/name");
    dev.set_data(&staged, json!("fleece-2")).unwrap();
    assert_eq!(dev.get_data(&staged, false).unwrap(), Some(json!("fleece-2")));

    let missing = DataPath::source("/dashboard", "/nope");
    assert_eq!(dev.get_data(&missing, true).unwrap(), None);
    assert!(matches!(dev.get_data(&missing, false), Err(CoreError::PathNotFound { .. })));
}

// ── Mat ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_new_roll_fresh_uses_model_maximum() {
    let server = MockServer::start().await;
    expect_write(
        &server,
        "POST",
        "/new-roll",
        json!({"external_diameter": 20.0, "is_partial": false, "name": "", "thickness": 0.0085}),
    )
    .await;

    let mut dev = Device::new(config(&server, DeviceKind::Mat, "RSMAT500")).unwrap();
    dev.press("new_roll", None).await.unwrap();
}

#[tokio::test]
async fn test_new_roll_partial_uses_staged_diameter() {
    let server = MockServer::start().await;
    expect_write(
        &server,
        "POST",
        "/new-roll",
        json!({"external_diameter": 9.5, "is_partial": true, "name": "half", "thickness": 0.0085}),
    )
    .await;

    let mut dev = Device::new(config(&server, DeviceKind::Mat, "RSMAT500")).unwrap();
    dev.set_data(&DataPath::local("/roll/diameter"), json!(9.5)).unwrap();
    dev.set_data(&DataPath::local("/roll/name"), json!("half")).unwrap();
    dev.new_roll().await.unwrap();

    let reset = dev.get_data(&DataPath::local("/roll/diameter"), false).unwrap();
    assert_eq!(reset, Some(json!(4.0)));
}

// ── Dose ────────────────────────────────────────────────────────────

async fn boot_doser(server: &MockServer) -> Device {
    serve_identity(server, "dose-1").await;
    serve(server, "/device-settings", json!({"bundled_heads": false})).await;
    serve(server, "/dashboard", json!({})).await;
    for head in 1..=4 {
        let mut settings = json!({"head": head, "daily_dose": head * 2});
        if head == 1 {
            settings["supplement"] = json!({"uid": BUNDLE_UIDS[0], "name": "Foundation A"});
        }
        serve(server, &format!("/head/{head}/settings"), settings).await;
    }

    let mut config = config(server, DeviceKind::Dose, "RSDOSE4");
    config.heads_nb = 4;
    let mut dev = Device::new(config).unwrap();
    dev.get_initial_data().await.unwrap();
    dev
}

#[tokio::test]
async fn test_push_one_head_sends_only_that_head() {
    let server = MockServer::start().await;
    let mut dev = boot_doser(&server).await;

    let head_sources: Vec<&str> = dev
        .sources()
        .iter()
        .map(|s| s.name.as_str())
        .filter(|n| n.starts_with("/head/"))
        .collect();
    assert_eq!(head_sources.len(), 4);
    let local = dev.get_data(&DataPath::local("/head"), false).unwrap().unwrap();
    assert_eq!(local.as_object().unwrap().len(), 4);

    expect_write(&server, "PUT", "/head/2/settings", json!({"head": 2, "daily_dose": 4})).await;
    dev.push_values("/head/2/settings", Method::Put).await.unwrap();

    let puts: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "PUT")
        .map(|r| r.url.path().to_owned())
        .collect();
    assert_eq!(puts, ["/head/2/settings"]);
}

#[tokio::test]
async fn test_manual_dose_uses_staged_volume() {
    let server = MockServer::start().await;
    let mut dev = boot_doser(&server).await;
    expect_write(&server, "POST", "/head/3/manual", json!({"volume": 2.5})).await;

    dev.set_data(&DataPath::local("/head/3/manual_dose"), json!(2.5)).unwrap();
    dev.press("manual", Some(3)).await.unwrap();

    let missing_head = dev.press("manual", None).await;
    assert!(matches!(missing_head, Err(CoreError::Validation { .. })));
    let bad_head = dev.press("prime", Some(5)).await;
    assert!(matches!(bad_head, Err(CoreError::Validation { .. })));
}

#[tokio::test]
async fn test_end_setup_enables_bundle_and_strips_locked_fields() {
    let server = MockServer::start().await;
    let mut dev = boot_doser(&server).await;
    expect_write(&server, "POST", "/head/1/end-setup", json!({})).await;
    expect_write(&server, "PUT", "/device-settings", json!({"bundled_heads": true})).await;

    dev.calibration(CalibrationStep::EndSetup, Some(1)).await.unwrap();
    let flag = dev
        .get_data(&DataPath::source("/device-settings", "/bundled_heads"), false)
        .unwrap();
    assert_eq!(flag, Some(json!(true)));

    expect_write(&server, "PUT", "/head/1/settings", json!({"head": 1, "daily_dose": 2})).await;
    dev.push_values("/head/1/settings", Method::Put).await.unwrap();
}

// ── ATO ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ato_resume_and_volume() {
    let server = MockServer::start().await;
    expect_write(&server, "POST", "/resume", json!({})).await;
    expect_write(&server, "POST", "/update-volume", json!({"volume": 3000.0})).await;

    let mut dev = Device::new(config(&server, DeviceKind::Ato, "RSATO+")).unwrap();
    dev.press("resume", None).await.unwrap();
    dev.set_volume_left(3000.0).await.unwrap();
    assert!(matches!(dev.set_volume_left(-1.0).await, Err(CoreError::Validation { .. })));
}

#[tokio::test]
async fn test_rejected_write_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/resume"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let mut dev = Device::new(config(&server, DeviceKind::Ato, "RSATO+")).unwrap();
    let result = dev.resume().await;
    assert!(matches!(result, Err(CoreError::Rejected { status: Some(400), .. })));
}

// ── Run ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_pump_intensity_edits_entry_in_force() {
    let server = MockServer::start().await;
    serve_identity(&server, "run-1").await;
    serve(
        &server,
        "/pump/settings",
        json!({"pump_1": {"schedule": [{"st": 0, "ti": 10}, {"st": 600, "ti": 20}, {"st": 900, "ti": 30}]}}),
    )
    .await;
    serve(&server, "/dashboard", json!({"pump_1": {"state": "on"}})).await;
    expect_write(
        &server,
        "PUT",
        "/pump/settings",
        json!({"pump_1": {"schedule": [{"st": 0, "ti": 10}, {"st": 600, "ti": 70}, {"st": 900, "ti": 30}]}}),
    )
    .await;

    let mut dev = Device::new(config(&server, DeviceKind::Run, "RSRUN")).unwrap();
    dev.get_initial_data().await.unwrap();
    dev.set_pump_intensity_at(1, 70, 630).await.unwrap();
    assert_eq!(dev.pump_intensity_at(1, 630), Some(70));
}

// ── Wave ────────────────────────────────────────────────────────────

fn wave_program() -> Value {
    let wave = |uid: &str| {
        json!({"uid": uid, "type": "ra", "direction": "fw", "frt": 10, "rrt": 5,
               "fti": 60, "rti": 40, "sn": 3, "pd": 0, "default": true})
    };
    json!({"intervals": [
        {"st": 0, "wave": wave("w0")},
        {"st": 600, "wave": wave("w1")},
        {"st": 900, "wave": wave("w2")},
    ]})
}

#[tokio::test]
async fn test_set_wave_via_cloud_without_link_fails() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut dev = Device::new(config(&server, DeviceKind::Wave, "RSWAVE45")).unwrap();
    let result = dev.set_wave_at(None, true, 630).await;
    assert!(
        matches!(result, Err(CoreError::NotLinked { .. })),
        "expected not linked, got: {result:?}"
    );
}

#[tokio::test]
async fn test_set_wave_locally_stops_preview_then_uploads() {
    let server = MockServer::start().await;
    serve_identity(&server, "wave-1").await;
    serve(&server, "/auto", wave_program()).await;
    serve(&server, "/mode", json!({"mode": "preview"})).await;

    Mock::given(method("DELETE"))
        .and(path("/preview"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    expect_write(&server, "POST", "/mode", json!({"mode": "auto"})).await;
    expect_write(&server, "POST", "/auto/init", json!({"nb": 3})).await;
    expect_write(&server, "POST", "/auto/1", wave_program()["intervals"][0].clone()).await;
    let mut edited = wave_program()["intervals"][1].clone();
    edited["wave"]["type"] = json!("st");
    edited["wave"]["frt"] = json!(7);
    expect_write(&server, "POST", "/auto/2", edited).await;
    expect_write(&server, "POST", "/auto/3", wave_program()["intervals"][2].clone()).await;
    expect_write(&server, "POST", "/auto/complete", json!({})).await;
    expect_write(&server, "POST", "/auto/apply", json!({})).await;

    let mut dev = Device::new(config(&server, DeviceKind::Wave, "RSWAVE45")).unwrap();
    dev.get_initial_data().await.unwrap();
    dev.set_data(&DataPath::local("/wave/preview"), json!({"type": "st", "frt": 7}))
        .unwrap();
    dev.set_wave_at(None, false, 630).await.unwrap();

    let mode = dev.get_data(&DataPath::source("/mode", "/mode"), false).unwrap();
    assert_eq!(mode, Some(json!("auto")));
    let stored = dev
        .get_data(&DataPath::source("/auto", "/intervals/1/wave/type"), false)
        .unwrap();
    assert_eq!(stored, Some(json!("st")));
}
