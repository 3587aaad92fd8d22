// ── Source registry ──
//
// Ordered list of a device's endpoints. Names are unique; insertion order
// is preserved so fan-out fetches and snapshots stay deterministic.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::model::{Source, SourceKind};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct SourceRegistry {
    sources: Vec<Source>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(name, kind)` pairs; later duplicates are ignored.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, SourceKind)>) -> Self {
        let mut registry = Self::new();
        for (name, kind) in pairs {
            registry.add_source(name, kind);
        }
        registry
    }

    /// Register a source. Returns `false` if the name is already taken.
    pub fn add_source(&mut self, name: impl Into<String>, kind: SourceKind) -> bool {
        let name = name.into();
        if self.index_of(&name).is_some() {
            debug!(source = %name, "source already registered");
            return false;
        }
        self.sources.push(Source::new(name, kind));
        true
    }

    /// Unregister a source, returning it with its last payload.
    pub fn remove_source(&mut self, name: &str) -> Option<Source> {
        let idx = self.index_of(name)?;
        Some(self.sources.remove(idx))
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.sources.iter().position(|s| s.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Source> {
        self.sources.iter_mut().find(|s| s.name == name)
    }

    pub fn at(&self, index: usize) -> Option<&Source> {
        self.sources.get(index)
    }

    pub fn at_mut(&mut self, index: usize) -> Option<&mut Source> {
        self.sources.get_mut(index)
    }

    /// Payload of `name`, if registered.
    pub fn payload(&self, name: &str) -> Option<&Value> {
        self.get(name).map(|s| &s.payload)
    }

    /// Replace the payload of `name` wholesale. Returns `false` if unknown.
    pub fn set_payload(&mut self, name: &str, payload: Value) -> bool {
        match self.get_mut(name) {
            Some(source) => {
                source.payload = payload;
                true
            }
            None => false,
        }
    }

    /// Names of every source whose kind is in `kinds`, in registry order.
    pub fn names_of_kinds(&self, kinds: &[SourceKind]) -> Vec<String> {
        self.sources
            .iter()
            .filter(|s| kinds.contains(&s.kind))
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn names_are_unique() {
        let mut reg = SourceRegistry::new();
        assert!(reg.add_source("/manual", SourceKind::Data));
        assert!(!reg.add_source("/manual", SourceKind::Config));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("/manual").map(|s| s.kind), Some(SourceKind::Data));
    }

    #[test]
    fn kind_filter_preserves_order() {
        let reg = SourceRegistry::from_pairs([
            ("/device-info", SourceKind::DeviceInfo),
            ("/mode", SourceKind::Config),
            ("/manual", SourceKind::Data),
            ("/auto", SourceKind::Config),
            ("/preview", SourceKind::Preview),
        ]);
        assert_eq!(reg.names_of_kinds(&[SourceKind::Config]), ["/mode", "/auto"]);
        assert_eq!(
            reg.names_of_kinds(&[SourceKind::Config, SourceKind::Data]),
            ["/mode", "/manual", "/auto"]
        );
    }

    #[test]
    fn payload_is_replaced_wholesale() {
        let mut reg = SourceRegistry::from_pairs([("/manual", SourceKind::Data)]);
        reg.set_payload("/manual", json!({"white": 10, "blue": 20}));
        reg.set_payload("/manual", json!({"white": 30}));
        assert_eq!(reg.payload("/manual"), Some(&json!({"white": 30})));
        assert!(!reg.set_payload("/missing", json!(1)));
    }

    #[test]
    fn remove_returns_last_payload() {
        let mut reg = SourceRegistry::from_pairs([("/a", SourceKind::Data), ("/b", SourceKind::Data)]);
        reg.set_payload("/a", json!(1));
        let removed = reg.remove_source("/a");
        assert_eq!(removed.map(|s| s.payload), Some(json!(1)));
        assert_eq!(reg.index_of("/b"), Some(0));
    }
}
