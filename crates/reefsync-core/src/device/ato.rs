// ── Auto top-off ──

use reefsync_api::Method;
use serde_json::json;

use super::{Device, DeviceCore};
use crate::error::CoreError;
use crate::model::{DeviceKind, SourceKind};
use crate::store::SourceRegistry;

pub(crate) fn register(sources: &mut SourceRegistry) {
    sources.add_source("/configuration", SourceKind::Config);
    sources.add_source("/dashboard", SourceKind::Data);
}

pub(crate) async fn press(core: &mut DeviceCore, action: &str) -> Result<(), CoreError> {
    match action {
        "resume" => resume(core).await,
        _ => Err(CoreError::unsupported(format!("press {action}"), DeviceKind::Ato)),
    }
}

/// Clear the empty-reservoir latch.
async fn resume(core: &mut DeviceCore) -> Result<(), CoreError> {
    core.push("/resume", Method::Post, Some(&json!({}))).await?;
    core.policy.set_quick_refresh("/dashboard");
    Ok(())
}

impl Device {
    /// Clear the empty-reservoir latch; same as `press("resume")`.
    pub async fn resume(&mut self) -> Result<(), CoreError> {
        self.require(self.kind() == DeviceKind::Ato, "resume")?;
        resume(&mut self.core).await
    }

    /// Declare the absolute volume (ml) left in the reservoir.
    pub async fn set_volume_left(&mut self, volume: f64) -> Result<(), CoreError> {
        self.require(self.kind() == DeviceKind::Ato, "set_volume_left")?;
        if !volume.is_finite() || volume < 0.0 {
            return Err(CoreError::validation(format!("invalid reservoir volume {volume}")));
        }
        self.core
            .push("/update-volume", Method::Post, Some(&json!({ "volume": volume })))
            .await?;
        self.core.policy.set_quick_refresh("/dashboard");
        Ok(())
    }
}
