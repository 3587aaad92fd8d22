// ── Hub ──
//
// Owns every device handle, the cloud accounts, the virtual groups, and
// the background tasks that poll them. Devices are looked up by id in a
// shared registry; cross-device references (cloud links, virtual members)
// are weak and never keep a device alive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use reefsync_api::CloudClient;
use tokio::sync::{Mutex, MutexGuard, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregate::VirtualLed;
use crate::config::{CloudConfig, DeviceConfig};
use crate::device::Device;
use crate::error::CoreError;
use crate::link::{AccountState, CloudLink, LinkBus, LinkEvent, LinkState};
use crate::model::{DeviceInfo, DeviceKind};
use crate::sync::FetchReport;

// ── Device handle ────────────────────────────────────────────────────

/// Shared handle to one device.
///
/// The device itself sits behind an async mutex so the poll task and user
/// commands take turns on its document.
pub struct DeviceHandle {
    id: String,
    kind: DeviceKind,
    scan_interval: Duration,
    command_grace: Duration,
    hwid: ArcSwapOption<String>,
    link: ArcSwapOption<CloudLink>,
    link_requested: AtomicBool,
    device: Mutex<Device>,
}

impl DeviceHandle {
    pub fn new(device: Device) -> Self {
        let config = device.config();
        Self {
            id: config.id.clone(),
            kind: config.kind,
            scan_interval: config.scan_interval,
            command_grace: config.sync.command_grace,
            hwid: ArcSwapOption::from(device.info().hwid.map(Arc::new)),
            link: ArcSwapOption::empty(),
            link_requested: AtomicBool::new(false),
            device: Mutex::new(device),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn scan_interval(&self) -> Duration {
        self.scan_interval
    }

    /// Exclusive access to the device.
    pub async fn lock(&self) -> MutexGuard<'_, Device> {
        self.device.lock().await
    }

    pub async fn info(&self) -> DeviceInfo {
        self.device.lock().await.info()
    }

    pub fn hwid(&self) -> Option<Arc<String>> {
        self.hwid.load_full()
    }

    async fn remember_hwid(&self) {
        let hwid = self.device.lock().await.info().hwid;
        self.hwid.store(hwid.map(Arc::new));
    }

    // ── Refresh ──────────────────────────────────────────────────────

    /// Steady-state poll of the device.
    pub async fn refresh(&self) -> FetchReport {
        self.device.lock().await.refresh().await
    }

    /// User-triggered refresh. With `wait` the device gets the command
    /// grace period to settle first.
    pub async fn request_refresh(&self, wait: bool) -> FetchReport {
        if wait && !self.command_grace.is_zero() {
            debug!(device = %self.id, grace = ?self.command_grace, "waiting before refresh");
            tokio::time::sleep(self.command_grace).await;
        }
        self.refresh().await
    }

    pub async fn set_quick_refresh(&self, source: impl Into<String>) {
        self.device.lock().await.set_quick_refresh(source);
    }

    // ── Cloud link ───────────────────────────────────────────────────

    pub fn link_state(&self) -> LinkState {
        if self.link.load().is_some() {
            LinkState::Linked
        } else if self.link_requested.load(Ordering::Acquire) {
            LinkState::LinkRequested
        } else {
            LinkState::Unlinked
        }
    }

    /// Account name of the current link.
    pub fn linked_account(&self) -> Option<String> {
        self.link.load_full().map(|l| l.account.clone())
    }

    /// Client of the linked account, if the account is still alive.
    pub fn cloud_client(&self) -> Option<CloudClient> {
        let link = self.link.load_full()?;
        link.upgrade().map(|account| account.client.clone())
    }

    pub(crate) fn request_link(&self, bus: &LinkBus) {
        self.link_requested.store(true, Ordering::Release);
        bus.publish(LinkEvent::LinkRequested {
            device_id: self.id.clone(),
        });
    }

    pub(crate) fn install_link(&self, account: &Arc<CloudAccount>) {
        let link = CloudLink::new(account.id.clone(), Arc::downgrade(account));
        self.link.store(Some(Arc::new(link)));
        self.link_requested.store(false, Ordering::Release);
        info!(device = %self.id, account = %account.id, "cloud link installed");
    }

    /// Drop the link if it points at `account`.
    pub(crate) fn clear_link_for(&self, account: &str) -> bool {
        let matches = self.link.load_full().is_some_and(|l| l.account == account);
        if matches {
            self.link.store(None);
            info!(device = %self.id, account, "cloud link cleared");
        }
        matches
    }

    /// Apply the staged wave, through the linked account when `use_cloud`.
    pub async fn set_wave(&self, use_cloud: bool) -> Result<(), CoreError> {
        let client = self.cloud_client();
        self.device.lock().await.set_wave(client.as_ref(), use_cloud).await
    }

    /// [`set_wave`](Self::set_wave) for the interval in force at `minute`.
    pub async fn set_wave_at(&self, use_cloud: bool, minute: u32) -> Result<(), CoreError> {
        let client = self.cloud_client();
        self.device
            .lock()
            .await
            .set_wave_at(client.as_ref(), use_cloud, minute)
            .await
    }
}

// ── Registry ─────────────────────────────────────────────────────────

/// Concurrent id → handle map shared by the hub and its tasks.
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    devices: Arc<DashMap<String, Arc<DeviceHandle>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: Arc<DeviceHandle>) -> Option<Arc<DeviceHandle>> {
        self.devices.insert(handle.id().to_owned(), handle)
    }

    pub fn get(&self, id: &str) -> Option<Arc<DeviceHandle>> {
        self.devices.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: &str) -> Option<Arc<DeviceHandle>> {
        self.devices.remove(id).map(|(_, handle)| handle)
    }

    pub fn find_by_hwid(&self, hwid: &str) -> Option<Arc<DeviceHandle>> {
        self.devices
            .iter()
            .find(|entry| entry.value().hwid().is_some_and(|h| h.as_str() == hwid))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Every handle, sorted by id.
    pub fn handles(&self) -> Vec<Arc<DeviceHandle>> {
        let mut handles: Vec<_> = self.devices.iter().map(|e| Arc::clone(e.value())).collect();
        handles.sort_by(|a, b| a.id().cmp(b.id()));
        handles
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

// ── Cloud account ────────────────────────────────────────────────────

/// An authenticated cloud account and its polled document.
pub struct CloudAccount {
    id: String,
    client: CloudClient,
    handle: Arc<DeviceHandle>,
}

impl CloudAccount {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn client(&self) -> &CloudClient {
        &self.client
    }

    pub fn handle(&self) -> &Arc<DeviceHandle> {
        &self.handle
    }

    /// Whether the account's device list contains `hwid`.
    pub async fn serves(&self, hwid: &str) -> bool {
        self.handle
            .lock()
            .await
            .cloud_device_hwids()
            .iter()
            .any(|h| h == hwid)
    }

    pub async fn light_library(&self) -> Vec<serde_json::Value> {
        self.handle.lock().await.light_library()
    }

    pub async fn wave_library(&self) -> Vec<serde_json::Value> {
        self.handle.lock().await.wave_library()
    }

    pub async fn supplement_library(&self) -> Vec<serde_json::Value> {
        self.handle.lock().await.supplement_library()
    }
}

// ── Hub ──────────────────────────────────────────────────────────────

/// Owner of every device, account, virtual group, and background task.
pub struct Hub {
    registry: DeviceRegistry,
    accounts: DashMap<String, (Arc<CloudAccount>, CancellationToken)>,
    virtuals: DashMap<String, Arc<VirtualLed>>,
    device_tokens: DashMap<String, CancellationToken>,
    bus: LinkBus,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        Self {
            registry: DeviceRegistry::new(),
            accounts: DashMap::new(),
            virtuals: DashMap::new(),
            device_tokens: DashMap::new(),
            bus: LinkBus::new(),
            cancel: CancellationToken::new(),
            task_handles: Mutex::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn bus(&self) -> &LinkBus {
        &self.bus
    }

    pub fn device(&self, id: &str) -> Option<Arc<DeviceHandle>> {
        self.registry.get(id)
    }

    pub fn account(&self, id: &str) -> Option<Arc<CloudAccount>> {
        self.accounts.get(id).map(|entry| Arc::clone(&entry.value().0))
    }

    pub fn virtual_led(&self, name: &str) -> Option<Arc<VirtualLed>> {
        self.virtuals.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Build, boot, and start polling a local device.
    pub async fn add_device(&self, config: DeviceConfig) -> Result<Arc<DeviceHandle>, CoreError> {
        self.add_built(Device::new(config)?).await
    }

    /// Boot and start polling an already built device.
    ///
    /// Boot failures are returned and nothing is registered.
    pub async fn add_built(&self, mut device: Device) -> Result<Arc<DeviceHandle>, CoreError> {
        device.get_initial_data().await?;

        let handle = Arc::new(DeviceHandle::new(device));
        if self.registry.insert(Arc::clone(&handle)).is_some() {
            warn!(device = %handle.id(), "replaced an existing device with the same id");
        }

        let token = self.cancel.child_token();
        if let Some(previous) = self.device_tokens.insert(handle.id().to_owned(), token.clone()) {
            previous.cancel();
        }

        let mut tasks = self.task_handles.lock().await;
        tasks.retain(|task| !task.is_finished());
        tasks.push(tokio::spawn(poll_task(
            Arc::downgrade(&handle),
            handle.scan_interval(),
            token.clone(),
        )));
        if handle.kind().wants_cloud_link() {
            tasks.push(tokio::spawn(device_link_task(
                Arc::downgrade(&handle),
                self.bus.clone(),
                token,
            )));
        }
        Ok(handle)
    }

    /// Log in, boot, and start serving link requests for a cloud account.
    pub async fn add_cloud(&self, config: &CloudConfig) -> Result<Arc<CloudAccount>, CoreError> {
        self.add_cloud_device(Device::cloud(config)?).await
    }

    pub async fn add_cloud_device(&self, mut device: Device) -> Result<Arc<CloudAccount>, CoreError> {
        let client = device
            .cloud_client()
            .cloned()
            .ok_or_else(|| CoreError::unsupported("add_cloud", device.kind()))?;
        device.get_initial_data().await?;

        let handle = Arc::new(DeviceHandle::new(device));
        let account = Arc::new(CloudAccount {
            id: handle.id().to_owned(),
            client,
            handle: Arc::clone(&handle),
        });
        let token = self.cancel.child_token();
        self.accounts
            .insert(account.id.clone(), (Arc::clone(&account), token.clone()));

        let mut tasks = self.task_handles.lock().await;
        tasks.retain(|task| !task.is_finished());
        tasks.push(tokio::spawn(poll_task(
            Arc::downgrade(&handle),
            handle.scan_interval(),
            token.clone(),
        )));
        tasks.push(tokio::spawn(account_link_task(
            Arc::clone(&account),
            self.registry.clone(),
            self.bus.clone(),
            token,
        )));
        info!(account = %account.id, "cloud account ready");
        Ok(account)
    }

    /// Stop an account's tasks and clear every link pointing at it.
    pub fn remove_cloud(&self, id: &str) -> bool {
        let Some((_, (account, token))) = self.accounts.remove(id) else {
            return false;
        };
        token.cancel();
        self.bus.publish(LinkEvent::Teardown {
            account: account.id.clone(),
        });
        // Devices listening on the bus clear their links too; this covers
        // the ones that are not running a link task.
        for handle in self.registry.handles() {
            handle.clear_link_for(&account.id);
        }
        info!(account = %id, "cloud account removed");
        true
    }

    /// Group existing LED drivers into a virtual device.
    pub fn add_virtual(&self, name: &str, members: &[String]) -> Result<Arc<VirtualLed>, CoreError> {
        let mut handles = Vec::with_capacity(members.len());
        for id in members {
            let handle = self.registry.get(id).ok_or_else(|| CoreError::Config {
                message: format!("virtual LED {name}: unknown member {id}"),
            })?;
            if !handle.kind().is_led() {
                return Err(CoreError::Config {
                    message: format!("virtual LED {name}: {id} is a {}, not an LED", handle.kind()),
                });
            }
            handles.push(Arc::downgrade(&handle));
        }

        let group = Arc::new(VirtualLed::new(name, handles));
        self.virtuals.insert(name.to_owned(), Arc::clone(&group));
        Ok(group)
    }

    /// Stop a device's tasks and drop it from the registry. Virtual
    /// groups referencing it see it disappear.
    pub fn remove_device(&self, id: &str) -> bool {
        if let Some((_, token)) = self.device_tokens.remove(id) {
            token.cancel();
        }
        let removed = self.registry.remove(id).is_some();
        if removed {
            info!(device = id, "device removed");
        }
        removed
    }

    /// Cancel every background task and wait for them to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let mut handles = self.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("hub stopped");
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Periodically refresh one device. Ends when cancelled or when the
/// device has been dropped; the task never keeps it alive.
async fn poll_task(handle: Weak<DeviceHandle>, scan_interval: Duration, cancel: CancellationToken) {
    let period = scan_interval.max(Duration::from_secs(1));
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let Some(handle) = handle.upgrade() else { break };
                let report = handle.refresh().await;
                if !report.is_complete() {
                    let failed: Vec<&str> = report.failed_names().collect();
                    warn!(device = %handle.id(), ?failed, "periodic refresh incomplete, keeping cached payloads");
                }
            }
        }
    }
}

/// Device side of the pairing protocol. Holds the device weakly so a
/// removed device is not kept alive by its own link task.
async fn device_link_task(handle: Weak<DeviceHandle>, bus: LinkBus, cancel: CancellationToken) {
    let mut rx = bus.subscribe();
    match handle.upgrade() {
        Some(device) => device.request_link(&bus),
        None => return,
    }

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = rx.recv() => {
                let Some(device) = handle.upgrade() else { break };
                match event {
                    Ok(LinkEvent::LinkReady { account, state: AccountState::Ready }) => {
                        if device.link_state() != LinkState::Linked {
                            debug!(device = %device.id(), %account, "account ready, asking again for a link");
                            device.request_link(&bus);
                        }
                    }
                    Ok(LinkEvent::Teardown { account }) => {
                        device.clear_link_for(&account);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(device = %device.id(), skipped, "link events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

/// Account side of the pairing protocol.
async fn account_link_task(
    account: Arc<CloudAccount>,
    registry: DeviceRegistry,
    bus: LinkBus,
    cancel: CancellationToken,
) {
    let mut rx = bus.subscribe();
    bus.publish(LinkEvent::LinkReady {
        account: account.id.clone(),
        state: AccountState::Ready,
    });

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Ok(LinkEvent::LinkRequested { device_id }) => {
                    serve_request(&account, &registry, &bus, &device_id).await;
                }
                Ok(LinkEvent::Teardown { account: gone }) if gone == account.id => break,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(account = %account.id, skipped, "link events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

async fn serve_request(account: &Arc<CloudAccount>, registry: &DeviceRegistry, bus: &LinkBus, device_id: &str) {
    let Some(handle) = registry.get(device_id) else {
        debug!(account = %account.id, device = device_id, "link request from unknown device");
        return;
    };
    if handle.link_state() == LinkState::Linked {
        return;
    }
    if handle.hwid().is_none() {
        handle.remember_hwid().await;
    }
    let Some(hwid) = handle.hwid() else {
        debug!(device = device_id, "device has no hwid yet");
        return;
    };
    if !account.serves(&hwid).await {
        return;
    }

    handle.install_link(account);
    bus.publish(LinkEvent::LinkReady {
        account: account.id.clone(),
        state: AccountState::Ready,
    });
}
