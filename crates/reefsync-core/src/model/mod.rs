pub mod kind;
pub mod source;

use serde::{Deserialize, Serialize};

pub use kind::DeviceKind;
pub use source::{Source, SourceKind};

/// Identity summary built from a device's device-info sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub hwid: Option<String>,
    pub name: Option<String>,
    pub model: Option<String>,
    pub firmware: Option<String>,
}
