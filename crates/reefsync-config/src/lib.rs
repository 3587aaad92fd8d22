//! Shared configuration for the reefsync tools.
//!
//! TOML profiles for local devices, the cloud account and virtual LED
//! groups; credential resolution (env + keyring + plaintext); and
//! translation to the `reefsync_core` config types.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use reefsync_core::{
    CloudConfig, DEFAULT_CLOUD_SCAN_INTERVAL, DEFAULT_COMMAND_GRACE, DEFAULT_SCAN_INTERVAL, DeviceConfig, DeviceKind,
    RetryPolicy, SyncSettings, TlsMode, TransportConfig,
};

/// Environment variable holding the cloud password.
pub const CLOUD_PASSWORD_ENV: &str = "REEFSYNC_CLOUD_PASSWORD";

const KEYRING_SERVICE: &str = "reefsync";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no password configured for cloud account '{username}'")]
    NoCredentials { username: String },

    #[error("unknown device '{name}'")]
    UnknownDevice { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    /// Local devices by name.
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceProfile>,

    /// The cloud account, if any.
    pub cloud: Option<CloudProfile>,

    /// Virtual LED groups by name.
    #[serde(default, rename = "virtual")]
    pub virtuals: BTreeMap<String, VirtualProfile>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// Per-call HTTP timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Pause between retries in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Poll period of local devices in seconds.
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,

    /// Wait after a command before its confirming refresh, in milliseconds.
    #[serde(default = "default_command_grace_ms")]
    pub command_grace_ms: u64,

    #[serde(default)]
    pub insecure: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            scan_interval: default_scan_interval(),
            command_grace_ms: default_command_grace_ms(),
            insecure: false,
        }
    }
}

fn default_timeout() -> u64 {
    reefsync_core::TransportConfig::default().timeout.as_secs()
}
fn default_retries() -> u32 {
    RetryPolicy::default().max_attempts
}
fn default_retry_delay_ms() -> u64 {
    duration_ms(RetryPolicy::default().delay)
}
fn default_scan_interval() -> u64 {
    DEFAULT_SCAN_INTERVAL.as_secs()
}
fn default_command_grace_ms() -> u64 {
    duration_ms(DEFAULT_COMMAND_GRACE)
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Defaults {
    /// Transport and retry settings shared by every client.
    pub fn sync_settings(&self) -> SyncSettings {
        let tls = if self.insecure {
            TlsMode::DangerAcceptInvalid
        } else {
            TlsMode::System
        };
        SyncSettings {
            transport: TransportConfig {
                tls,
                timeout: Duration::from_secs(self.timeout),
            },
            retry: RetryPolicy::new(self.retries, Duration::from_millis(self.retry_delay_ms)),
            command_grace: Duration::from_millis(self.command_grace_ms),
        }
    }
}

/// A local device reached on the LAN.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceProfile {
    /// IP address or host name (optionally with port).
    pub ip: String,

    pub kind: DeviceKind,

    /// Hardware model, e.g. "RSLED160" or "RSDOSE4".
    #[serde(default)]
    pub model: String,

    /// Hardware id; discovered at boot when absent.
    pub hwid: Option<String>,

    /// Dosing heads (2 or 4).
    pub heads_nb: Option<u8>,

    #[serde(default)]
    pub live_config: bool,

    #[serde(default)]
    pub intensity_compensation: bool,

    /// Override of the poll period in seconds.
    pub scan_interval: Option<u64>,
}

/// The cloud account.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CloudProfile {
    pub username: String,

    /// Plaintext password (prefer keyring or env var).
    pub password: Option<String>,

    pub client_id: Option<String>,

    pub client_secret: Option<String>,

    /// API host, defaults to the public cloud.
    pub host: Option<String>,

    /// Override of the poll period in seconds.
    pub scan_interval: Option<u64>,
}

/// A group of LED drivers driven as one.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VirtualProfile {
    pub members: Vec<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "reefsync", "reefsync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("reefsync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the Config from `path` + environment. A missing file yields the
/// defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("REEFSYNC_").split("__"));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Serialize config to TOML and write it to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── Validation & translation ────────────────────────────────────────

impl Config {
    /// Cross-field checks figment cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, profile) in &self.devices {
            profile.to_device_config(name, &self.defaults)?;
        }
        for (group, profile) in &self.virtuals {
            for member in &profile.members {
                let device = self.devices.get(member).ok_or_else(|| ConfigError::Validation {
                    field: format!("virtual.{group}.members"),
                    reason: format!("unknown device '{member}'"),
                })?;
                if !matches!(device.kind, DeviceKind::LedG1 | DeviceKind::LedG2) {
                    return Err(ConfigError::Validation {
                        field: format!("virtual.{group}.members"),
                        reason: format!("'{member}' is a {}, not an LED", device.kind),
                    });
                }
            }
        }
        Ok(())
    }

    /// Core config of the device named `name`.
    pub fn device_config(&self, name: &str) -> Result<DeviceConfig, ConfigError> {
        let profile = self.devices.get(name).ok_or_else(|| ConfigError::UnknownDevice {
            name: name.to_owned(),
        })?;
        profile.to_device_config(name, &self.defaults)
    }

    /// Core configs of every device, in name order.
    pub fn device_configs(&self) -> Result<Vec<DeviceConfig>, ConfigError> {
        self.devices
            .iter()
            .map(|(name, profile)| profile.to_device_config(name, &self.defaults))
            .collect()
    }

    /// Core config of the cloud account, resolving its password.
    pub fn cloud_config(&self) -> Result<Option<CloudConfig>, ConfigError> {
        self.cloud
            .as_ref()
            .map(|profile| profile.to_cloud_config(&self.defaults))
            .transpose()
    }
}

impl DeviceProfile {
    pub fn to_device_config(&self, name: &str, defaults: &Defaults) -> Result<DeviceConfig, ConfigError> {
        if matches!(self.kind, DeviceKind::Cloud | DeviceKind::VirtualLed) {
            return Err(ConfigError::Validation {
                field: format!("devices.{name}.kind"),
                reason: format!("{} is not a local device kind", self.kind),
            });
        }

        let base_url = format!("http://{}", self.ip.trim());
        let parsed = url::Url::parse(&base_url).map_err(|e| ConfigError::Validation {
            field: format!("devices.{name}.ip"),
            reason: format!("{e}: '{}'", self.ip),
        })?;
        if self.ip.trim().is_empty() || parsed.host_str().is_none() {
            return Err(ConfigError::Validation {
                field: format!("devices.{name}.ip"),
                reason: "missing host".into(),
            });
        }

        let mut config = DeviceConfig::new(name, self.kind, &self.model, base_url);
        config.hwid.clone_from(&self.hwid);
        if let Some(heads) = self.heads_nb {
            if !matches!(heads, 2 | 4) {
                return Err(ConfigError::Validation {
                    field: format!("devices.{name}.heads_nb"),
                    reason: format!("expected 2 or 4, got {heads}"),
                });
            }
            config.heads_nb = heads;
        }
        config.live_config = self.live_config;
        config.intensity_compensation = self.intensity_compensation;
        config.scan_interval = Duration::from_secs(self.scan_interval.unwrap_or(defaults.scan_interval));
        config.sync = defaults.sync_settings();
        Ok(config)
    }
}

impl CloudProfile {
    pub fn to_cloud_config(&self, defaults: &Defaults) -> Result<CloudConfig, ConfigError> {
        let password = resolve_cloud_password(self)?;
        let mut config = CloudConfig::new(&self.username, &self.username, password);
        if let Some(host) = &self.host {
            config.base_url = format!("https://{host}");
        }
        if let Some(id) = &self.client_id {
            config.client_id.clone_from(id);
        }
        if let Some(secret) = &self.client_secret {
            config.client_secret = SecretString::from(secret.clone());
        }
        config.scan_interval = self
            .scan_interval
            .map_or(DEFAULT_CLOUD_SCAN_INTERVAL, Duration::from_secs);
        config.sync = defaults.sync_settings();
        Ok(config)
    }
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the cloud password: env var, then system keyring, then the
/// plaintext value in the profile.
pub fn resolve_cloud_password(profile: &CloudProfile) -> Result<SecretString, ConfigError> {
    let from_env = std::env::var(CLOUD_PASSWORD_ENV).ok();
    let from_keyring = keyring::Entry::new(KEYRING_SERVICE, &format!("cloud/{}", profile.username))
        .ok()
        .and_then(|entry| entry.get_password().ok());
    pick_password(profile, from_env, from_keyring)
}

fn pick_password(
    profile: &CloudProfile,
    from_env: Option<String>,
    from_keyring: Option<String>,
) -> Result<SecretString, ConfigError> {
    from_env
        .or(from_keyring)
        .or_else(|| profile.password.clone())
        .map(SecretString::from)
        .ok_or_else(|| ConfigError::NoCredentials {
            username: profile.username.clone(),
        })
}

/// Store the cloud password in the system keyring.
pub fn store_cloud_password(username: &str, password: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &format!("cloud/{username}")).map_err(|e| {
        ConfigError::Validation {
            field: "keyring".into(),
            reason: e.to_string(),
        }
    })?;
    entry.set_password(password).map_err(|e| ConfigError::Validation {
        field: "keyring".into(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn cloud(password: Option<&str>) -> CloudProfile {
        CloudProfile {
            username: "me@example.com".into(),
            password: password.map(str::to_owned),
            client_id: None,
            client_secret: None,
            host: None,
            scan_interval: None,
        }
    }

    #[test]
    fn env_beats_keyring_beats_plaintext() {
        let profile = cloud(Some("plain"));
        let pick = |env: Option<&str>, ring: Option<&str>| {
            pick_password(&profile, env.map(str::to_owned), ring.map(str::to_owned))
                .map(|s| s.expose_secret().to_owned())
                .ok()
        };
        assert_eq!(pick(Some("env"), Some("ring")).as_deref(), Some("env"));
        assert_eq!(pick(None, Some("ring")).as_deref(), Some("ring"));
        assert_eq!(pick(None, None).as_deref(), Some("plain"));
    }

    #[test]
    fn missing_password_is_reported() {
        let result = pick_password(&cloud(None), None, None);
        assert!(matches!(result, Err(ConfigError::NoCredentials { .. })));
    }

    #[test]
    fn defaults_match_core_constants() {
        let defaults = Defaults::default();
        assert_eq!(defaults.timeout, 20);
        assert_eq!(defaults.retries, 5);
        assert_eq!(defaults.retry_delay_ms, 2000);
        assert_eq!(defaults.scan_interval, 120);
        assert_eq!(defaults.sync_settings().command_grace, DEFAULT_COMMAND_GRACE);
    }
}
