// ── Runtime device configuration ──
//
// These types describe *what* to talk to and *how often*. They carry
// credential data and tuning, but never touch disk. The config crate or
// the CLI builds them and hands them in.

use std::time::Duration;

use reefsync_api::{RetryPolicy, TransportConfig};
use secrecy::SecretString;

use crate::model::DeviceKind;

/// Default poll period for local devices.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(120);
/// Default poll period for the cloud account.
pub const DEFAULT_CLOUD_SCAN_INTERVAL: Duration = Duration::from_secs(600);
/// Default settle time before polling after a user command.
pub const DEFAULT_COMMAND_GRACE: Duration = Duration::from_secs(2);

/// Transport and retry tuning shared by every device.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub transport: TransportConfig,
    pub retry: RetryPolicy,
    /// Optional wait before an explicit refresh so the device can settle.
    pub command_grace: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            retry: RetryPolicy::default(),
            command_grace: DEFAULT_COMMAND_GRACE,
        }
    }
}

/// Configuration for one local device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Unique name of the device record.
    pub id: String,
    pub kind: DeviceKind,
    /// Hardware model (e.g. `RSLED160`, `RSDOSE4`, `RSMAT500`).
    pub model: String,
    /// Base URL, e.g. `http://192.168.1.20`.
    pub base_url: String,
    /// Hardware id, if known before the first device-info fetch.
    pub hwid: Option<String>,
    /// Number of dosing heads (dosing pumps only).
    pub heads_nb: u8,
    /// Poll config sources on every tick.
    pub live_config: bool,
    /// Apply per-model intensity compensation on LED colour writes.
    pub intensity_compensation: bool,
    pub scan_interval: Duration,
    pub sync: SyncSettings,
}

impl DeviceConfig {
    pub fn new(id: impl Into<String>, kind: DeviceKind, model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            model: model.into(),
            base_url: base_url.into(),
            hwid: None,
            heads_nb: 4,
            live_config: false,
            intensity_compensation: false,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            sync: SyncSettings::default(),
        }
    }

    /// Base URL for a device reached by IP address on the LAN.
    pub fn for_ip(id: impl Into<String>, kind: DeviceKind, model: impl Into<String>, ip: &str) -> Self {
        Self::new(id, kind, model, format!("http://{ip}"))
    }
}

/// Configuration for the cloud account.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    pub id: String,
    /// Base URL, normally `https://cloud.reef-beat.com`.
    pub base_url: String,
    pub username: String,
    pub password: SecretString,
    pub client_id: String,
    pub client_secret: SecretString,
    pub scan_interval: Duration,
    pub sync: SyncSettings,
}

impl CloudConfig {
    pub fn new(id: impl Into<String>, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            id: id.into(),
            base_url: format!("https://{}", reefsync_api::DEFAULT_CLOUD_HOST),
            username: username.into(),
            password,
            client_id: String::new(),
            client_secret: SecretString::from(String::new()),
            scan_interval: DEFAULT_CLOUD_SCAN_INTERVAL,
            sync: SyncSettings::default(),
        }
    }
}
