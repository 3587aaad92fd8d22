// ── Return / skimmer pump controller ──

use reefsync_api::Method;
use serde_json::{Value, json};
use tracing::debug;

use super::Device;
use super::schedule::{current_minute, select_current};
use crate::error::CoreError;
use crate::model::{DeviceKind, SourceKind};
use crate::store::{DataPath, SourceRegistry};

const PUMP_SETTINGS: &str = "/pump/settings";
const PUMPS: u8 = 2;

pub(crate) fn register(sources: &mut SourceRegistry) {
    sources.add_source(PUMP_SETTINGS, SourceKind::Config);
    sources.add_source("/dashboard", SourceKind::Data);
    sources.add_source("/preview", SourceKind::Preview);
}

impl Device {
    /// Set the intensity of the schedule entry in force now on `pump`.
    pub async fn set_pump_intensity(&mut self, pump: u8, intensity: u8) -> Result<(), CoreError> {
        self.set_pump_intensity_at(pump, intensity, current_minute()).await
    }

    /// Same as [`set_pump_intensity`](Self::set_pump_intensity) with an
    /// explicit minute of the day.
    pub async fn set_pump_intensity_at(&mut self, pump: u8, intensity: u8, minute: u32) -> Result<(), CoreError> {
        self.require(self.kind() == DeviceKind::Run, "set_pump_intensity")?;
        if !(1..=PUMPS).contains(&pump) {
            return Err(CoreError::validation(format!("pump {pump} out of range 1..={PUMPS}")));
        }
        if intensity > 100 {
            return Err(CoreError::validation(format!("intensity {intensity} above 100")));
        }

        let schedule_path = DataPath::source(PUMP_SETTINGS, format!("/pump_{pump}/schedule"));
        let schedule = self.core.read(&schedule_path)?;
        let entries = schedule.as_array().map(Vec::as_slice).unwrap_or_default();
        let index = select_current(entries, minute)
            .ok_or_else(|| CoreError::validation(format!("pump {pump} has an empty schedule")))?;
        debug!(device = %self.id(), pump, index, minute, "updating schedule entry");

        let entry = DataPath::source(PUMP_SETTINGS, format!("/pump_{pump}/schedule/{index}/ti"));
        self.core.write(&entry, json!(intensity))?;
        self.push_values(PUMP_SETTINGS, Method::Put).await
    }

    /// Intensity currently in force on `pump`, per the cached schedule.
    pub fn pump_intensity_at(&mut self, pump: u8, minute: u32) -> Option<u64> {
        let schedule = self
            .core
            .read_opt(&DataPath::source(PUMP_SETTINGS, format!("/pump_{pump}/schedule")))?;
        let entries = schedule.as_array()?;
        let index = select_current(entries, minute)?;
        entries.get(index)?.get("ti").and_then(Value::as_u64)
    }
}
