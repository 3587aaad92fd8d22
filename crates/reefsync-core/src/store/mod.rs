// ── Device document ──
//
// Per-device nested state: the ordered source registry, adapter-owned
// local fields, and the envelope of the last write response. One task
// owns a document at a time; there is no internal locking.

pub mod path;
pub mod registry;

use serde::Serialize;
use serde_json::{Value, json};

pub use path::{DataPath, PathCache, Route};
pub use registry::SourceRegistry;

#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub sources: SourceRegistry,
    pub local: Value,
    pub message: Value,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            sources: SourceRegistry::new(),
            local: json!({}),
            message: json!({ "alert": "" }),
        }
    }
}

impl Document {
    pub fn new(sources: SourceRegistry) -> Self {
        Self {
            sources,
            ..Self::default()
        }
    }

    /// Value at a resolved route, or `None` when the route no longer applies.
    pub fn read_route(&self, route: &Route) -> Option<&Value> {
        match route {
            Route::Source {
                index,
                name,
                pointer,
            } => {
                let source = self.sources.at(*index).filter(|s| &s.name == name)?;
                source.payload.pointer(pointer)
            }
            Route::Local(pointer) => self.local.pointer(pointer),
            Route::Message(pointer) => self.message.pointer(pointer),
        }
    }

    /// Overwrite the value at a resolved route. Returns `false` when the
    /// route no longer applies; nothing is created.
    pub fn write_route(&mut self, route: &Route, value: Value) -> bool {
        let slot = match route {
            Route::Source {
                index,
                name,
                pointer,
            } => self
                .sources
                .at_mut(*index)
                .filter(|s| &s.name == name)
                .and_then(|s| s.payload.pointer_mut(pointer)),
            Route::Local(pointer) => self.local.pointer_mut(pointer),
            Route::Message(pointer) => self.message.pointer_mut(pointer),
        };
        match slot {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Write `value` at `path`, creating intermediate objects.
    pub fn insert(&mut self, path: &DataPath, value: Value) -> bool {
        match path {
            DataPath::Source { name, pointer } => match self.sources.get_mut(name) {
                Some(source) => path::insert_at(&mut source.payload, pointer, value),
                None => false,
            },
            DataPath::Local(pointer) => path::insert_at(&mut self.local, pointer, value),
            DataPath::Message(pointer) => path::insert_at(&mut self.message, pointer, value),
        }
    }

    /// Store a write response, defaulting `alert` to an empty string.
    pub fn set_message(&mut self, body: Option<Value>) {
        let mut message = match body {
            Some(Value::Object(map)) => Value::Object(map),
            Some(other) => json!({ "body": other }),
            None => json!({}),
        };
        if let Value::Object(map) = &mut message {
            map.entry("alert").or_insert_with(|| json!(""));
        }
        self.message = message;
    }
}
