#![allow(clippy::unwrap_used)]
// Loading and translating TOML configuration files.

use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use reefsync_config::{Config, ConfigError, DeviceProfile, VirtualProfile, load_config_from, save_config_to};
use reefsync_core::DeviceKind;

const SAMPLE: &str = r#"
[defaults]
timeout = 5
retries = 3
retry_delay_ms = 250

[devices.left]
ip = "192.168.1.20"
kind = "led-g1"
model = "RSLED160"

[devices.right]
ip = "192.168.1.21"
kind = "led-g2"
model = "RSLED115"
scan_interval = 30

[devices.doser]
ip = "192.168.1.30:8080"
kind = "dose"
model = "RSDOSE2"
heads_nb = 2
live_config = true

[cloud]
username = "me@example.com"
password = "plain"
host = "cloud.example.com"

[virtual.tank]
members = ["left", "right"]
"#;

fn write(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_load_sample_profiles() {
    let dir = TempDir::new().unwrap();
    let config = load_config_from(&write(&dir, SAMPLE)).unwrap();

    assert_eq!(config.devices.len(), 3);
    assert_eq!(config.virtuals["tank"].members, ["left", "right"]);

    let doser = config.device_config("doser").unwrap();
    assert_eq!(doser.kind, DeviceKind::Dose);
    assert_eq!(doser.base_url, "http://192.168.1.30:8080");
    assert_eq!(doser.heads_nb, 2);
    assert!(doser.live_config);
    assert_eq!(doser.scan_interval, Duration::from_secs(120));
    assert_eq!(doser.sync.retry.max_attempts, 3);
    assert_eq!(doser.sync.retry.delay, Duration::from_millis(250));
    assert_eq!(doser.sync.transport.timeout, Duration::from_secs(5));

    let right = config.device_config("right").unwrap();
    assert_eq!(right.scan_interval, Duration::from_secs(30));

    let names: Vec<String> = config.device_configs().unwrap().into_iter().map(|c| c.id).collect();
    assert_eq!(names, ["doser", "left", "right"]);
}

#[test]
fn test_cloud_profile_translates() {
    let dir = TempDir::new().unwrap();
    let config = load_config_from(&write(&dir, SAMPLE)).unwrap();
    let cloud = config.cloud_config().unwrap().unwrap();
    assert_eq!(cloud.id, "me@example.com");
    assert_eq!(cloud.base_url, "https://cloud.example.com");
    assert_eq!(cloud.scan_interval, Duration::from_secs(600));
}

#[test]
fn test_missing_file_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
    assert!(config.devices.is_empty());
    assert!(config.cloud.is_none());
    assert_eq!(config.defaults.retries, 5);
}

#[test]
fn test_invalid_head_count_is_rejected() {
    let dir = TempDir::new().unwrap();
    let body = "[devices.doser]\nip = \"10.0.0.2\"\nkind = \"dose\"\nheads_nb = 3\n";
    let result = load_config_from(&write(&dir, body));
    assert!(matches!(result, Err(ConfigError::Validation { .. })));
}

#[test]
fn test_virtual_member_must_be_led() {
    let dir = TempDir::new().unwrap();
    let body = "[devices.ato]\nip = \"10.0.0.3\"\nkind = \"ato\"\n\n[virtual.tank]\nmembers = [\"ato\"]\n";
    let result = load_config_from(&write(&dir, body));
    assert!(matches!(result, Err(ConfigError::Validation { .. })));

    let body = "[virtual.tank]\nmembers = [\"ghost\"]\n";
    let result = load_config_from(&write(&dir, body));
    assert!(matches!(result, Err(ConfigError::Validation { .. })));
}

#[test]
fn test_unknown_device_lookup() {
    let config = Config::default();
    assert!(matches!(config.device_config("nope"), Err(ConfigError::UnknownDevice { .. })));
}

#[test]
fn test_save_then_load_keeps_profiles() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = Config::default();
    config.devices.insert(
        "mat".into(),
        DeviceProfile {
            ip: "10.0.0.9".into(),
            kind: DeviceKind::Mat,
            model: "RSMAT500".into(),
            hwid: Some("abc".into()),
            heads_nb: None,
            live_config: false,
            intensity_compensation: false,
            scan_interval: None,
        },
    );
    config.virtuals.insert("empty".into(), VirtualProfile::default());
    save_config_to(&config, &path).unwrap();

    let loaded = load_config_from(&path).unwrap();
    let mat = loaded.device_config("mat").unwrap();
    assert_eq!(mat.kind, DeviceKind::Mat);
    assert_eq!(mat.hwid.as_deref(), Some("abc"));
    assert!(loaded.virtuals["empty"].members.is_empty());
}
