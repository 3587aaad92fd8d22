//! Device state cache and sync engine between `reefsync-api` and its
//! consumers (CLI, entity layers).
//!
//! - **[`Device`]**: One aquarium controller (or the cloud account) with
//!   its cached [`Document`]. [`get_initial_data()`](Device::get_initial_data)
//!   boots it, [`refresh()`](Device::refresh) runs one poll tick, and the
//!   upward contract (`get_data`, `set_data`, `push_values`, `press`,
//!   `delete`, `fetch_config`) shapes reads and writes per device family.
//!
//! - **[`Document`] / [`PathCache`]**: Per-device nested state addressed by
//!   typed [`DataPath`]s. Resolutions are memoized; a stale route is evicted
//!   on its own.
//!
//! - **[`RefreshPolicy`]**: Boot and steady-state source selection, live
//!   config mode, and the one-shot quick refresh.
//!
//! - **[`SyncEngine`]**: Concurrent per-source fetches and write pushes on
//!   top of the retrying `HttpClient`.
//!
//! - **[`Hub`]**: Owns [`DeviceHandle`]s, cloud accounts and
//!   [`VirtualLed`] groups, runs the poll tasks, and carries the cloud
//!   pairing protocol over a [`LinkBus`].

pub mod aggregate;
pub mod config;
pub mod device;
pub mod error;
pub mod hub;
pub mod link;
pub mod model;
pub mod refresh;
pub mod store;
pub mod sync;

// ── Primary re-exports ──────────────────────────────────────────────
pub use aggregate::{VirtualLed, aggregate, aggregate_color};
pub use config::{
    CloudConfig, DEFAULT_CLOUD_SCAN_INTERVAL, DEFAULT_COMMAND_GRACE, DEFAULT_SCAN_INTERVAL, DeviceConfig, SyncSettings,
};
pub use device::Device;
pub use device::color::{KelvinIntensity, LedGeneration, WhiteBlue};
pub use device::dose::CalibrationStep;
pub use error::CoreError;
pub use hub::{CloudAccount, DeviceHandle, DeviceRegistry, Hub};
pub use link::{AccountState, CloudLink, LinkBus, LinkEvent, LinkState};
pub use model::{DeviceInfo, DeviceKind, Source, SourceKind};
pub use refresh::{Phase, RefreshPolicy, Selection};
pub use store::{DataPath, Document, PathCache, SourceRegistry};
pub use sync::{FetchReport, SyncEngine};

// The CLI and tests build clients and methods without a direct api dependency.
pub use reefsync_api::{Method, RetryPolicy, TlsMode, TransportConfig};
