// ── Wave pump ──
//
// The daily program lives in `/auto` as a list of intervals, each with a
// start minute and a wave definition. Edits are staged in
// `local#/wave/preview` and applied to the interval in force, either
// through the cloud wave library or straight to the pump.

use reefsync_api::{CloudClient, Method};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::schedule::{current_minute, select_current};
use super::{Device, DeviceCore};
use crate::error::CoreError;
use crate::model::{DeviceKind, SourceKind};
use crate::store::{DataPath, SourceRegistry};

const AUTO: &str = "/auto";

/// Fields of a wave definition.
pub const WAVE_FIELDS: &[&str] = &[
    "uid",
    "type",
    "direction",
    "frt",
    "rrt",
    "fti",
    "rti",
    "sn",
    "pd",
    "default",
];

/// Fields a user may change through the preview.
const EDITABLE_FIELDS: &[&str] = &["type", "direction", "frt", "rrt", "fti", "rti", "sn", "pd"];

pub(crate) fn register(sources: &mut SourceRegistry) {
    sources.add_source(AUTO, SourceKind::Config);
    sources.add_source("/mode", SourceKind::Data);
    sources.add_source("/preview", SourceKind::Preview);
}

fn preview_path() -> DataPath {
    DataPath::local("/wave/preview")
}

fn intervals(core: &DeviceCore) -> Vec<Value> {
    core.doc
        .sources
        .payload(AUTO)
        .and_then(|auto| auto.get("intervals"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Seed the preview from the wave in force, once the program is known.
pub(crate) fn derive(core: &mut DeviceCore) {
    if core.read_opt(&preview_path()).is_some() {
        return;
    }
    let intervals = intervals(core);
    let Some(index) = select_current(&intervals, current_minute()) else {
        return;
    };
    let Some(Value::Object(wave)) = intervals.get(index).and_then(|i| i.get("wave")) else {
        return;
    };
    let preview: Map<String, Value> = wave
        .iter()
        .filter(|(k, _)| EDITABLE_FIELDS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if let Err(e) = core.write(&preview_path(), Value::Object(preview)) {
        debug!(device = %core.config.id, error = %e, "could not seed wave preview");
    }
}

/// `base` with the editable fields of `preview` laid over it.
fn merge_wave(base: &Value, preview: &Value) -> Value {
    let mut wave = base.as_object().cloned().unwrap_or_default();
    if let Some(fields) = preview.as_object() {
        for (k, v) in fields {
            if EDITABLE_FIELDS.contains(&k.as_str()) {
                wave.insert(k.clone(), v.clone());
            }
        }
    }
    Value::Object(wave)
}

impl Device {
    /// Apply the staged wave preview to the interval in force now.
    ///
    /// With `use_cloud` the wave goes through the cloud library and needs
    /// `cloud`; otherwise it is written to the pump directly.
    pub async fn set_wave(&mut self, cloud: Option<&CloudClient>, use_cloud: bool) -> Result<(), CoreError> {
        self.set_wave_at(cloud, use_cloud, current_minute()).await
    }

    /// Same as [`set_wave`](Self::set_wave) with an explicit minute of the day.
    pub async fn set_wave_at(
        &mut self,
        cloud: Option<&CloudClient>,
        use_cloud: bool,
        minute: u32,
    ) -> Result<(), CoreError> {
        self.require(self.kind() == DeviceKind::Wave, "set_wave")?;
        let cloud = match (use_cloud, cloud) {
            (true, None) => {
                return Err(CoreError::NotLinked {
                    device: self.id().to_owned(),
                });
            }
            (true, Some(client)) => Some(client),
            (false, _) => None,
        };

        if self.in_preview() {
            debug!(device = %self.id(), "leaving preview before applying wave");
            self.stop_preview().await?;
        }

        let mut intervals = intervals(&self.core);
        let index = select_current(&intervals, minute)
            .ok_or_else(|| CoreError::validation("wave program has no intervals"))?;
        let current = intervals
            .get(index)
            .and_then(|i| i.get("wave"))
            .cloned()
            .unwrap_or_else(|| json!({}));
        let preview = self.core.read_opt(&preview_path()).unwrap_or_else(|| json!({}));
        let mut wave = merge_wave(&current, &preview);

        match cloud {
            Some(client) => {
                let uid = self.publish_wave(client, &current, &wave).await?;
                wave["uid"] = json!(uid);
                wave["default"] = json!(false);
                if let Some(slot) = intervals.get_mut(index) {
                    slot["wave"] = wave;
                }

                let hwid = self
                    .info()
                    .hwid
                    .ok_or_else(|| CoreError::validation("wave pump hwid is unknown"))?;
                client
                    .set_wave_schedule(&hwid, &json!({ "intervals": intervals }))
                    .await?;
            }
            None => {
                if let Some(slot) = intervals.get_mut(index) {
                    slot["wave"] = wave;
                }
                self.push_program(&intervals).await?;
            }
        }

        let mut auto = self.core.payload(AUTO).unwrap_or_else(|_| json!({}));
        if !auto.is_object() {
            auto = json!({});
        }
        auto["intervals"] = Value::Array(intervals);
        self.core.store_payload(AUTO, auto);
        self.core.policy.set_quick_refresh(AUTO);
        info!(device = %self.id(), index, cloud = use_cloud, "wave applied");
        Ok(())
    }

    /// Create or edit the library wave; returns the uid to schedule.
    ///
    /// Default (shared) waves are never edited, and a type change always
    /// creates a new library entry.
    async fn publish_wave(&self, client: &CloudClient, current: &Value, wave: &Value) -> Result<String, CoreError> {
        let is_default = current.get("default").and_then(Value::as_bool).unwrap_or(true);
        let type_changed = current.get("type") != wave.get("type");
        let existing_uid = current.get("uid").and_then(Value::as_str);

        match existing_uid {
            Some(uid) if !is_default && !type_changed => {
                client.edit_wave(uid, wave).await?;
                debug!(device = %self.id(), uid, "library wave edited");
                Ok(uid.to_owned())
            }
            _ => {
                let mut body = wave.clone();
                if let Value::Object(map) = &mut body {
                    map.remove("uid");
                    map.remove("default");
                }
                let created = client.create_wave(&body).await?;
                let uid = created
                    .get("uid")
                    .and_then(Value::as_str)
                    .ok_or_else(|| CoreError::Internal("created wave has no uid".into()))?;
                debug!(device = %self.id(), uid, "library wave created");
                Ok(uid.to_owned())
            }
        }
    }

    /// Local program upload: init, one write per interval, complete, apply.
    async fn push_program(&mut self, intervals: &[Value]) -> Result<(), CoreError> {
        let core = &mut self.core;
        core.push("/auto/init", Method::Post, Some(&json!({ "nb": intervals.len() })))
            .await?;
        for (i, interval) in intervals.iter().enumerate() {
            core.push(&format!("{AUTO}/{}", i + 1), Method::Post, Some(interval))
                .await?;
        }
        core.push("/auto/complete", Method::Post, Some(&json!({}))).await?;
        core.push("/auto/apply", Method::Post, Some(&json!({}))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn merge_keeps_identity_and_overlays_editable_fields() {
        let base = json!({"uid": "w1", "type": "ra", "frt": 10, "default": false});
        let preview = json!({"type": "st", "frt": 5, "uid": "spoofed"});
        assert_eq!(
            merge_wave(&base, &preview),
            json!({"uid": "w1", "type": "st", "frt": 5, "default": false})
        );
    }

    #[test]
    fn wave_fields_cover_editable_fields() {
        assert!(EDITABLE_FIELDS.iter().all(|f| WAVE_FIELDS.contains(f)));
    }
}
