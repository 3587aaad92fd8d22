// ── Device adapters ──
//
// A `Device` is one document plus everything needed to keep it in sync:
// the path cache, the sync engine, the refresh policy, and the
// family-specific state that shapes reads and writes. The upward contract
// (`get_data`, `set_data`, `push_values`, `press`, `delete`,
// `fetch_config`) is the same for every family; family verbs live in the
// per-family modules as further `impl Device` blocks.

pub mod ato;
pub mod cloud;
pub mod color;
pub mod dose;
pub mod led;
pub mod mat;
pub mod run;
pub mod schedule;
pub mod wave;

use reefsync_api::{HttpClient, Method};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{CloudConfig, DeviceConfig};
use crate::error::CoreError;
use crate::model::{DeviceInfo, DeviceKind, SourceKind};
use crate::refresh::{RefreshPolicy, Selection};
use crate::store::{DataPath, Document, PathCache, SourceRegistry};
use crate::sync::{FetchReport, SyncEngine};

/// Sources every local device exposes.
const COMMON_INFO_SOURCES: [&str; 2] = ["/device-info", "/firmware"];

/// Family-independent device state.
pub struct DeviceCore {
    pub(crate) config: DeviceConfig,
    pub(crate) doc: Document,
    pub(crate) paths: PathCache,
    pub(crate) engine: SyncEngine,
    pub(crate) policy: RefreshPolicy,
}

impl DeviceCore {
    fn new(config: DeviceConfig, client: HttpClient, sources: SourceRegistry) -> Self {
        let policy = RefreshPolicy::new(config.live_config);
        Self {
            engine: SyncEngine::new(config.id.clone(), client),
            doc: Document::new(sources),
            paths: PathCache::new(),
            policy,
            config,
        }
    }

    pub(crate) fn client(&self) -> &HttpClient {
        self.engine.client()
    }

    /// Value at `path`, or `None` when it does not exist.
    pub(crate) fn read_opt(&mut self, path: &DataPath) -> Option<Value> {
        self.paths.read(&self.doc, path).ok()
    }

    pub(crate) fn read(&mut self, path: &DataPath) -> Result<Value, CoreError> {
        self.paths.read(&self.doc, path)
    }

    pub(crate) fn read_f64(&mut self, path: &DataPath) -> Option<f64> {
        self.read_opt(path).and_then(|v| v.as_f64())
    }

    pub(crate) fn write(&mut self, path: &DataPath, value: Value) -> Result<(), CoreError> {
        self.paths.write(&mut self.doc, path, value)
    }

    /// Payload of a registered source, cloned for sending.
    pub(crate) fn payload(&self, source: &str) -> Result<Value, CoreError> {
        self.doc
            .sources
            .payload(source)
            .cloned()
            .ok_or_else(|| CoreError::UnknownSource {
                name: source.to_owned(),
            })
    }

    /// Replace a source payload wholesale.
    pub(crate) fn store_payload(&mut self, source: &str, payload: Value) {
        self.doc.sources.set_payload(source, payload);
    }

    pub(crate) async fn push(&mut self, path: &str, method: Method, payload: Option<&Value>) -> Result<(), CoreError> {
        self.engine.push(&mut self.doc, path, method, payload).await
    }

    pub(crate) async fn fetch(&mut self, selection: &Selection) -> FetchReport {
        let names = selection.names(&self.doc.sources);
        self.engine.fetch(&mut self.doc, &names).await
    }

    /// Register a source discovered at runtime.
    pub(crate) fn add_source(&mut self, name: &str, kind: SourceKind) {
        if self.doc.sources.add_source(name, kind) {
            debug!(device = %self.config.id, source = name, ?kind, "source added");
        }
    }

    pub(crate) fn remove_source(&mut self, name: &str) {
        if self.doc.sources.remove_source(name).is_some() {
            self.paths.evict_source(name);
            debug!(device = %self.config.id, source = name, "source removed");
        }
    }

    /// First string found at `pointer` in any device-info source.
    fn info_field(&self, pointers: &[&str]) -> Option<String> {
        self.doc
            .sources
            .iter()
            .filter(|s| s.kind == SourceKind::DeviceInfo)
            .find_map(|s| {
                pointers
                    .iter()
                    .find_map(|p| s.payload.pointer(p).and_then(Value::as_str))
                    .map(str::to_owned)
            })
    }
}

/// Family-specific state.
pub(crate) enum Family {
    Led(led::LedState),
    Mat,
    Dose(dose::DoseState),
    Ato,
    Run,
    Wave,
    Cloud(cloud::CloudState),
}

/// One local device or cloud account with its cached document.
pub struct Device {
    pub(crate) core: DeviceCore,
    pub(crate) family: Family,
}

impl Device {
    /// Build a local device from its configuration. No I/O happens until
    /// [`get_initial_data`](Self::get_initial_data).
    pub fn new(config: DeviceConfig) -> Result<Self, CoreError> {
        let client = HttpClient::new(&config.base_url, &config.sync.transport, config.sync.retry)?;
        Self::with_client(config, client)
    }

    /// Build around a pre-built HTTP client.
    pub fn with_client(config: DeviceConfig, client: HttpClient) -> Result<Self, CoreError> {
        let mut sources = SourceRegistry::new();
        for name in COMMON_INFO_SOURCES {
            sources.add_source(name, SourceKind::DeviceInfo);
        }

        let family = match config.kind {
            DeviceKind::LedG1 | DeviceKind::LedG2 => Family::Led(led::LedState::register(&config, &mut sources)),
            DeviceKind::Mat => {
                mat::register(&mut sources);
                Family::Mat
            }
            DeviceKind::Dose => Family::Dose(dose::DoseState::register(&config, &mut sources)?),
            DeviceKind::Ato => {
                ato::register(&mut sources);
                Family::Ato
            }
            DeviceKind::Run => {
                run::register(&mut sources);
                Family::Run
            }
            DeviceKind::Wave => {
                wave::register(&mut sources);
                Family::Wave
            }
            DeviceKind::Cloud | DeviceKind::VirtualLed => {
                return Err(CoreError::Config {
                    message: format!("{} is not a local device kind", config.kind),
                });
            }
        };

        let mut device = Self {
            core: DeviceCore::new(config, client, sources),
            family,
        };
        device.seed_local();
        Ok(device)
    }

    /// Build the adapter for a cloud account.
    pub fn cloud(config: &CloudConfig) -> Result<Self, CoreError> {
        let client = cloud::connect(config)?;
        Ok(Self::cloud_with_client(config, client))
    }

    pub fn cloud_with_client(config: &CloudConfig, client: reefsync_api::CloudClient) -> Self {
        let mut device_config = DeviceConfig::new(&config.id, DeviceKind::Cloud, "cloud", &config.base_url);
        device_config.scan_interval = config.scan_interval;
        device_config.sync = config.sync.clone();

        let mut sources = SourceRegistry::new();
        cloud::register(&mut sources);
        let http = client.http().clone();
        Self {
            core: DeviceCore::new(device_config, http, sources),
            family: Family::Cloud(cloud::CloudState::new(client)),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn id(&self) -> &str {
        &self.core.config.id
    }

    pub fn kind(&self) -> DeviceKind {
        self.core.config.kind
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.core.config
    }

    pub fn document(&self) -> &Document {
        &self.core.doc
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.core.doc.sources
    }

    /// Whether the last fetch left a source with exhausted retries.
    pub fn in_error(&self) -> bool {
        self.core.engine.in_error()
    }

    /// Identity summary from the device-info sources. A configured hwid
    /// wins over the reported one.
    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            hwid: self
                .core
                .config
                .hwid
                .clone()
                .or_else(|| self.core.info_field(&["/hwid", "/hw_id", "/uid"])),
            name: self.core.info_field(&["/name", "/email"]),
            model: self
                .core
                .info_field(&["/hw_model", "/model"])
                .or_else(|| Some(self.core.config.model.clone()).filter(|m| !m.is_empty())),
            firmware: self.core.info_field(&["/sw_version", "/version", "/firmware"]),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Boot sequence: capability checks, then device-info, config (unless
    /// live-config mode defers it) and data.
    ///
    /// Any device-info source that exhausts its retries, or that answers
    /// with an empty body, aborts with [`CoreError::DeviceUnreachable`].
    pub async fn get_initial_data(&mut self) -> Result<(), CoreError> {
        self.prepare().await?;

        for stage in self.core.policy.boot_plan() {
            let report = self.core.fetch(&stage.selection).await;
            if !stage.fatal {
                continue;
            }
            if let Some((name, err)) = report.failed.first() {
                return Err(CoreError::DeviceUnreachable {
                    device: self.id().to_owned(),
                    reason: format!("{name}: {err}"),
                });
            }
            let empty = self
                .core
                .doc
                .sources
                .iter()
                .find(|s| s.kind == SourceKind::DeviceInfo && !s.has_payload());
            if let Some(source) = empty {
                return Err(CoreError::DeviceUnreachable {
                    device: self.id().to_owned(),
                    reason: format!("{}: empty response", source.name),
                });
            }
        }

        self.core.policy.finish_boot();
        self.derive();
        info!(device = %self.id(), kind = %self.kind(), sources = self.core.doc.sources.len(), "device ready");
        Ok(())
    }

    /// One steady-state poll tick.
    pub async fn refresh(&mut self) -> FetchReport {
        let selection = self.core.policy.next_tick();
        let report = self.core.fetch(&selection).await;
        self.derive();
        report
    }

    /// Explicit configuration refresh: every config source, or one source.
    ///
    /// A named source must be registered.
    pub async fn fetch_config(&mut self, source: Option<&str>) -> Result<FetchReport, CoreError> {
        if let Some(name) = source {
            if self.core.doc.sources.get(name).is_none() {
                return Err(CoreError::UnknownSource { name: name.to_owned() });
            }
        }
        let selection = RefreshPolicy::config_refresh(source);
        let report = self.core.fetch(&selection).await;
        self.derive();
        Ok(report)
    }

    /// Arm a one-shot refresh of `source` for the next tick.
    pub fn set_quick_refresh(&mut self, source: impl Into<String>) {
        self.core.policy.set_quick_refresh(source);
    }

    async fn prepare(&mut self) -> Result<(), CoreError> {
        match &mut self.family {
            Family::Led(state) => state.probe(&mut self.core).await,
            Family::Cloud(state) => state.login().await,
            Family::Mat | Family::Dose(_) | Family::Ato | Family::Run | Family::Wave => Ok(()),
        }
    }

    /// Recompute fields derived from fetched payloads.
    fn derive(&mut self) {
        match &self.family {
            Family::Led(state) => state.derive(&mut self.core),
            Family::Wave => wave::derive(&mut self.core),
            Family::Mat | Family::Dose(_) | Family::Ato | Family::Run | Family::Cloud(_) => {}
        }
    }

    /// Initial values of local staging fields.
    fn seed_local(&mut self) {
        match &self.family {
            Family::Dose(state) => state.seed(&mut self.core),
            Family::Mat => mat::seed(&mut self.core),
            Family::Led(_) | Family::Ato | Family::Run | Family::Wave | Family::Cloud(_) => {}
        }
    }

    // ── Upward contract ──────────────────────────────────────────────

    /// Read the value at `path`.
    ///
    /// A missing value is `Ok(None)` when `missing_ok`, otherwise it is
    /// logged and returned as [`CoreError::PathNotFound`].
    pub fn get_data(&mut self, path: &DataPath, missing_ok: bool) -> Result<Option<Value>, CoreError> {
        match self.core.read(path) {
            Ok(value) => Ok(Some(value)),
            Err(CoreError::PathNotFound { .. }) if missing_ok => Ok(None),
            Err(e) => {
                warn!(device = %self.id(), %path, error = %e, "read failed");
                Err(e)
            }
        }
    }

    /// Write `value` at `path` in the cache only. Nothing is sent until
    /// [`push_values`](Self::push_values).
    pub fn set_data(&mut self, path: &DataPath, value: Value) -> Result<(), CoreError> {
        match &self.family {
            Family::Led(state) => state.set_data(&mut self.core, path, value),
            _ => self.core.write(path, value),
        }
    }

    /// Send the cached payload of `source` with `method`.
    pub async fn push_values(&mut self, source: &str, method: Method) -> Result<(), CoreError> {
        let payload = self.core.payload(source)?;
        let payload = match &self.family {
            Family::Dose(state) => state.outgoing(&mut self.core, source, payload),
            _ => payload,
        };
        self.core.push(source, method, Some(&payload)).await
    }

    /// Trigger a device action. `head` addresses a dosing head or pump.
    pub async fn press(&mut self, action: &str, head: Option<u8>) -> Result<(), CoreError> {
        debug!(device = %self.id(), action, ?head, "press");
        match self.kind() {
            DeviceKind::LedG1 | DeviceKind::LedG2 => led::press(&mut self.core, action).await,
            DeviceKind::Mat => mat::press(&mut self.core, action).await,
            DeviceKind::Dose => self.press_head(action, head).await,
            DeviceKind::Ato => ato::press(&mut self.core, action).await,
            DeviceKind::Run | DeviceKind::Wave if action == "stop_preview" => self.stop_preview().await,
            kind => Err(CoreError::unsupported(format!("press {action}"), kind)),
        }
    }

    /// Send a DELETE to `source`.
    pub async fn delete(&mut self, source: &str) -> Result<(), CoreError> {
        self.core.push(source, Method::Delete, None).await
    }

    /// Leave preview mode: delete `/preview` and put the device back on
    /// its automatic program.
    pub async fn stop_preview(&mut self) -> Result<(), CoreError> {
        self.core.push("/preview", Method::Delete, None).await?;
        let mode = serde_json::json!({ "mode": "auto" });
        self.core.push("/mode", Method::Post, Some(&mode)).await?;
        if self.core.doc.sources.get("/mode").is_some() {
            self.core.store_payload("/mode", mode);
        }
        Ok(())
    }

    /// `true` when the cached `/mode` reports preview.
    pub(crate) fn in_preview(&mut self) -> bool {
        self.core
            .read_opt(&DataPath::source("/mode", "/mode"))
            .is_some_and(|m| m == "preview")
    }

    pub(crate) fn require(&self, ok: bool, operation: &str) -> Result<(), CoreError> {
        if ok {
            Ok(())
        } else {
            Err(CoreError::unsupported(operation, self.kind()))
        }
    }
}
