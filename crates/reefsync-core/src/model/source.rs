// ── Source domain types ──
//
// A source is one remote endpoint whose last payload lives in the
// device document. The kind decides when the refresh policy polls it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

/// Polling class of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SourceKind {
    /// Identity and firmware; fetched once at boot.
    DeviceInfo,
    /// Settings; fetched at boot, on demand, or every tick in live-config mode.
    Config,
    /// Live readings; fetched every tick.
    Data,
    /// UI simulation state; never polled automatically.
    Preview,
}

/// One named endpoint and its last fetched payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub kind: SourceKind,
    pub payload: Value,
}

impl Source {
    pub fn new(name: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            payload: Value::Null,
        }
    }

    /// `true` once a fetch stored something other than an empty value.
    pub fn has_payload(&self) -> bool {
        match &self.payload {
            Value::Null => false,
            Value::Object(map) => !map.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }
}
