// ── Path cache ──
//
// Typed addresses into a device document, resolved once into a route and
// memoized. A route that stops matching the document (source removed or
// reshaped) is evicted on its own; the rest of the cache is untouched.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use super::Document;
use crate::error::CoreError;

/// Address of a value inside a device document.
///
/// String form is `<region>#<json-pointer>`, where region is a source
/// name (starting with `/`), `local`, or `message`:
/// `/manual#/white`, `local#/head/1/manual_dose`, `message#/alert`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataPath {
    /// A field of a source payload.
    Source { name: String, pointer: String },
    /// An adapter-maintained field with no remote backing.
    Local(String),
    /// A field of the last write response.
    Message(String),
}

impl DataPath {
    pub fn source(name: impl Into<String>, pointer: impl Into<String>) -> Self {
        Self::Source {
            name: name.into(),
            pointer: pointer.into(),
        }
    }

    pub fn local(pointer: impl Into<String>) -> Self {
        Self::Local(pointer.into())
    }

    pub fn message(pointer: impl Into<String>) -> Self {
        Self::Message(pointer.into())
    }

    pub fn pointer(&self) -> &str {
        match self {
            Self::Source { pointer, .. } | Self::Local(pointer) | Self::Message(pointer) => pointer,
        }
    }

    /// Source name when this path addresses a source payload.
    pub fn source_name(&self) -> Option<&str> {
        match self {
            Self::Source { name, .. } => Some(name),
            Self::Local(_) | Self::Message(_) => None,
        }
    }

    /// Last pointer segment (the field name).
    pub fn leaf(&self) -> &str {
        self.pointer().rsplit('/').next().unwrap_or_default()
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source { name, pointer } => write!(f, "{name}#{pointer}"),
            Self::Local(pointer) => write!(f, "local#{pointer}"),
            Self::Message(pointer) => write!(f, "message#{pointer}"),
        }
    }
}

impl FromStr for DataPath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| CoreError::InvalidPath {
            path: s.to_owned(),
            reason: reason.to_owned(),
        };

        let (region, pointer) = s.split_once('#').unwrap_or((s, ""));
        if !pointer.is_empty() && !pointer.starts_with('/') {
            return Err(invalid("pointer must be empty or start with '/'"));
        }

        match region {
            "local" => Ok(Self::local(pointer)),
            "message" => Ok(Self::message(pointer)),
            name if name.starts_with('/') => Ok(Self::source(name, pointer)),
            _ => Err(invalid("region must be a source name, 'local' or 'message'")),
        }
    }
}

/// A resolved location. Source routes carry the registry index so reads
/// skip the name scan; the name is kept to detect a stale index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Source {
        index: usize,
        name: String,
        pointer: String,
    },
    Local(String),
    Message(String),
}

/// Memoized `DataPath` → `Route` resolutions for one document.
#[derive(Debug, Default)]
pub struct PathCache {
    routes: HashMap<DataPath, Route>,
    resolutions: usize,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `path` against `doc`, reusing a cached route when present.
    pub fn resolve(&mut self, doc: &Document, path: &DataPath) -> Result<Route, CoreError> {
        if let Some(route) = self.routes.get(path) {
            return Ok(route.clone());
        }

        self.resolutions += 1;
        let route = match path {
            DataPath::Source { name, pointer } => {
                let index = doc
                    .sources
                    .index_of(name)
                    .ok_or_else(|| not_found(path))?;
                Route::Source {
                    index,
                    name: name.clone(),
                    pointer: pointer.clone(),
                }
            }
            DataPath::Local(pointer) => Route::Local(pointer.clone()),
            DataPath::Message(pointer) => Route::Message(pointer.clone()),
        };

        if doc.read_route(&route).is_none() {
            return Err(not_found(path));
        }

        self.routes.insert(path.clone(), route.clone());
        Ok(route)
    }

    /// Read the value at `path`. A cached route that no longer applies is
    /// evicted and resolved once more before giving up.
    pub fn read(&mut self, doc: &Document, path: &DataPath) -> Result<Value, CoreError> {
        let route = self.resolve(doc, path)?;
        if let Some(value) = doc.read_route(&route) {
            return Ok(value.clone());
        }

        self.evict(path);
        let route = self.resolve(doc, path)?;
        doc.read_route(&route).cloned().ok_or_else(|| not_found(path))
    }

    /// Write `value` at `path`, creating missing intermediate objects.
    ///
    /// Writes into a source require the source to be registered.
    pub fn write(&mut self, doc: &mut Document, path: &DataPath, value: Value) -> Result<(), CoreError> {
        if let Ok(route) = self.resolve(doc, path) {
            if doc.write_route(&route, value.clone()) {
                return Ok(());
            }
            self.evict(path);
        }

        if doc.insert(path, value) {
            Ok(())
        } else {
            Err(not_found(path))
        }
    }

    /// Drop the cached route for `path` only.
    pub fn evict(&mut self, path: &DataPath) {
        self.routes.remove(path);
    }

    /// Drop every cached route into source `name` (used when the registry
    /// is reshaped).
    pub fn evict_source(&mut self, name: &str) {
        self.routes.retain(|path, _| path.source_name() != Some(name));
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Number of fresh resolutions performed so far.
    pub fn resolutions(&self) -> usize {
        self.resolutions
    }
}

fn not_found(path: &DataPath) -> CoreError {
    CoreError::PathNotFound {
        path: path.to_string(),
    }
}

// ── JSON pointer helpers ─────────────────────────────────────────────

fn unescape(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Set `value` at `pointer` below `root`, creating objects on the way.
/// Fails on a non-container in the way or an out-of-range array index.
pub(crate) fn insert_at(root: &mut Value, pointer: &str, value: Value) -> bool {
    if pointer.is_empty() {
        *root = value;
        return true;
    }
    let Some(rest) = pointer.strip_prefix('/') else {
        return false;
    };

    let tokens: Vec<String> = rest.split('/').map(unescape).collect();
    let Some((last, parents)) = tokens.split_last() else {
        return false;
    };

    let mut node = root;
    for token in parents {
        if node.is_null() {
            *node = Value::Object(serde_json::Map::new());
        }
        node = match node {
            Value::Object(map) => map
                .entry(token.clone())
                .or_insert_with(|| Value::Object(serde_json::Map::new())),
            Value::Array(items) => match token.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                Some(item) => item,
                None => return false,
            },
            _ => return false,
        };
    }

    if node.is_null() {
        *node = Value::Object(serde_json::Map::new());
    }
    match node {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            true
        }
        Value::Array(items) => match last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        },
        _ => false,
    }
}
