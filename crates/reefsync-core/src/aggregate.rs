// ── Virtual LED ──
//
// A composite of several LED drivers with no endpoint of its own. Reads
// fan out to every live member and are combined by value type; writes fan
// out to every member and are not rolled back when one member fails.

use std::sync::{Arc, Weak};

use reefsync_api::Method;
use serde_json::{Map, Number, Value};
use tracing::{debug, warn};

use crate::device::color::KelvinIntensity;
use crate::error::CoreError;
use crate::hub::DeviceHandle;
use crate::model::DeviceKind;
use crate::store::DataPath;

pub struct VirtualLed {
    name: String,
    members: Vec<Weak<DeviceHandle>>,
}

impl VirtualLed {
    pub fn new(name: impl Into<String>, members: Vec<Weak<DeviceHandle>>) -> Self {
        Self {
            name: name.into(),
            members,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Members that are still registered, in group order.
    pub fn members(&self) -> Vec<Arc<DeviceHandle>> {
        self.members.iter().filter_map(Weak::upgrade).collect()
    }

    /// `true` when the group is non-empty and made of first-generation
    /// drivers only.
    pub fn only_g1(&self) -> bool {
        let members = self.members();
        !members.is_empty() && members.iter().all(|m| m.kind() == DeviceKind::LedG1)
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Combined value of `path` across members.
    ///
    /// Members that lack the value are skipped. With no member holding it
    /// the result is `None`, or [`CoreError::PathNotFound`] unless
    /// `missing_ok`. An empty group always reads as `None`.
    pub async fn get_data(&self, path: &DataPath, missing_ok: bool) -> Result<Option<Value>, CoreError> {
        let members = self.members();
        if members.is_empty() {
            return Ok(None);
        }

        let mut values = Vec::with_capacity(members.len());
        for member in &members {
            if let Some(value) = member.lock().await.get_data(path, true)? {
                values.push(value);
            }
        }

        if values.is_empty() {
            return if missing_ok {
                Ok(None)
            } else {
                Err(CoreError::PathNotFound {
                    path: path.to_string(),
                })
            };
        }
        Ok(Some(aggregate(&values)))
    }

    /// Mean colour of the group; `(23000 K, 0 %)` when no member can
    /// report one.
    pub async fn color(&self) -> KelvinIntensity {
        let mut colors = Vec::new();
        for member in self.members() {
            match member.lock().await.led_color() {
                Ok(color) => colors.push(color),
                Err(e) => debug!(group = %self.name, device = %member.id(), error = %e, "member has no colour"),
            }
        }
        aggregate_color(&colors)
    }

    // ── Writes ───────────────────────────────────────────────────────

    pub async fn set_data(&self, path: &DataPath, value: &Value) -> Result<(), CoreError> {
        let members = self.members();
        let mut failures = Vec::new();
        for member in &members {
            if let Err(e) = member.lock().await.set_data(path, value.clone()) {
                warn!(group = %self.name, device = %member.id(), error = %e, "member write failed");
                failures.push(e);
            }
        }
        fan_out_result(members.len(), failures)
    }

    pub async fn push_values(&self, source: &str, method: Method) -> Result<(), CoreError> {
        let members = self.members();
        let mut failures = Vec::new();
        for member in &members {
            if let Err(e) = member.lock().await.push_values(source, method).await {
                warn!(group = %self.name, device = %member.id(), error = %e, "member push failed");
                failures.push(e);
            }
        }
        fan_out_result(members.len(), failures)
    }

    pub async fn press(&self, action: &str) -> Result<(), CoreError> {
        let members = self.members();
        let mut failures = Vec::new();
        for member in &members {
            if let Err(e) = member.lock().await.press(action, None).await {
                warn!(group = %self.name, device = %member.id(), action, error = %e, "member press failed");
                failures.push(e);
            }
        }
        fan_out_result(members.len(), failures)
    }

    /// Set every member to the same colour and push it.
    pub async fn set_color(&self, kelvin: f64, intensity: f64) -> Result<(), CoreError> {
        let members = self.members();
        let mut failures = Vec::new();
        for member in &members {
            if let Err(e) = member.lock().await.set_led_color(kelvin, intensity).await {
                warn!(group = %self.name, device = %member.id(), error = %e, "member colour failed");
                failures.push(e);
            }
        }
        fan_out_result(members.len(), failures)
    }
}

fn fan_out_result(total: usize, failures: Vec<CoreError>) -> Result<(), CoreError> {
    let failed = failures.len();
    match failures.into_iter().next() {
        None => Ok(()),
        Some(first) => Err(CoreError::PartialFailure {
            failed,
            total,
            first: Box::new(first),
        }),
    }
}

// ── Aggregation laws ─────────────────────────────────────────────────

/// Combine member values by runtime type.
///
/// - booleans: logical AND
/// - integers: arithmetic mean, truncated
/// - other numbers: arithmetic mean
/// - objects: each key aggregated independently
/// - anything else: the first value; disagreement is logged
///
/// An empty slice yields `null`.
pub fn aggregate(values: &[Value]) -> Value {
    let Some(first) = values.first() else {
        return Value::Null;
    };

    if values.iter().all(Value::is_boolean) {
        return Value::Bool(values.iter().all(|v| v.as_bool() == Some(true)));
    }
    if values.iter().all(Value::is_number) {
        return mean(values);
    }
    if values.iter().all(Value::is_object) {
        return aggregate_objects(values);
    }

    if values.iter().any(|v| v != first) {
        warn!(first = %first, count = values.len(), "members disagree, using first value");
    }
    first.clone()
}

fn mean(values: &[Value]) -> Value {
    let integers: Option<Vec<i128>> = values
        .iter()
        .map(|v| {
            v.as_i64()
                .map(i128::from)
                .or_else(|| v.as_u64().map(i128::from))
        })
        .collect();

    if let Some(integers) = integers {
        let count = i128::try_from(integers.len()).unwrap_or(i128::MAX);
        let truncated = integers.iter().sum::<i128>() / count;
        if let Ok(v) = i64::try_from(truncated) {
            return Value::Number(v.into());
        }
        if let Ok(v) = u64::try_from(truncated) {
            return Value::Number(v.into());
        }
    }

    let count = f64::from(u32::try_from(values.len()).unwrap_or(u32::MAX));
    let sum: f64 = values.iter().filter_map(Value::as_f64).sum();
    Number::from_f64(sum / count).map_or(Value::Null, Value::Number)
}

fn aggregate_objects(values: &[Value]) -> Value {
    let mut keys: Vec<&String> = Vec::new();
    for map in values.iter().filter_map(Value::as_object) {
        for key in map.keys() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }

    let combined: Map<String, Value> = keys
        .into_iter()
        .map(|key| {
            let column: Vec<Value> = values.iter().filter_map(|v| v.get(key)).cloned().collect();
            (key.clone(), aggregate(&column))
        })
        .collect();
    Value::Object(combined)
}

/// Mean of each colour component; [`KelvinIntensity::EMPTY`] for none.
pub fn aggregate_color(colors: &[KelvinIntensity]) -> KelvinIntensity {
    if colors.is_empty() {
        return KelvinIntensity::EMPTY;
    }
    let count = f64::from(u32::try_from(colors.len()).unwrap_or(u32::MAX));
    KelvinIntensity {
        kelvin: colors.iter().map(|c| c.kelvin).sum::<f64>() / count,
        intensity: colors.iter().map(|c| c.intensity).sum::<f64>() / count,
    }
}
