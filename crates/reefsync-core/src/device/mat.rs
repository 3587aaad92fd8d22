// ── Roller mat ──

use reefsync_api::Method;
use serde_json::json;
use tracing::info;

use super::{Device, DeviceCore};
use crate::error::CoreError;
use crate::model::{DeviceKind, SourceKind};
use crate::store::{DataPath, SourceRegistry};

/// Diameter (cm) of an exhausted roll core.
pub const MAT_MIN_ROLL_DIAMETER: f64 = 4.0;
/// Fleece thickness (cm) of a stock roll.
pub const MAT_ROLL_THICKNESS: f64 = 0.0085;

/// Full-roll diameter (cm) per model.
const MAT_MAX_ROLL_DIAMETERS: &[(&str, f64)] = &[
    ("RSMAT250", 12.0),
    ("RSMAT500", 20.0),
    ("RSMAT1200", 20.0),
];

pub fn max_roll_diameter(model: &str) -> Option<f64> {
    MAT_MAX_ROLL_DIAMETERS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(model))
        .map(|&(_, diameter)| diameter)
}

pub(crate) fn register(sources: &mut SourceRegistry) {
    sources.add_source("/configuration", SourceKind::Config);
    sources.add_source("/dashboard", SourceKind::Data);
}

/// Staged fields of the "new roll" form.
pub(crate) fn seed(core: &mut DeviceCore) {
    let roll = json!({
        "diameter": MAT_MIN_ROLL_DIAMETER,
        "name": "",
        "thickness": MAT_ROLL_THICKNESS,
    });
    core.doc.local["roll"] = roll;
}

pub(crate) async fn press(core: &mut DeviceCore, action: &str) -> Result<(), CoreError> {
    match action {
        "new_roll" => new_roll(core).await,
        _ => Err(CoreError::unsupported(format!("press {action}"), DeviceKind::Mat)),
    }
}

/// Declare a newly mounted roll.
///
/// A staged diameter left at the minimum means a fresh roll of the model's
/// full size; anything else declares a partially used roll of that size.
async fn new_roll(core: &mut DeviceCore) -> Result<(), CoreError> {
    let staged = core
        .read_f64(&DataPath::local("/roll/diameter"))
        .unwrap_or(MAT_MIN_ROLL_DIAMETER);
    let fresh = (staged - MAT_MIN_ROLL_DIAMETER).abs() < f64::EPSILON;

    let diameter = if fresh {
        max_roll_diameter(&core.config.model).ok_or_else(|| {
            CoreError::validation(format!("no roll size known for model {}", core.config.model))
        })?
    } else {
        staged
    };

    let name = core
        .read_opt(&DataPath::local("/roll/name"))
        .unwrap_or_else(|| json!(""));
    let thickness = core
        .read_f64(&DataPath::local("/roll/thickness"))
        .unwrap_or(MAT_ROLL_THICKNESS);

    let body = json!({
        "external_diameter": diameter,
        "is_partial": !fresh,
        "name": name,
        "thickness": thickness,
    });
    core.push("/new-roll", Method::Post, Some(&body)).await?;
    info!(device = %core.config.id, diameter, partial = !fresh, "new roll declared");

    core.write(&DataPath::local("/roll/diameter"), json!(MAT_MIN_ROLL_DIAMETER))?;
    core.policy.set_quick_refresh("/configuration");
    Ok(())
}

impl Device {
    /// Declare a newly mounted roll; same as `press("new_roll")`.
    pub async fn new_roll(&mut self) -> Result<(), CoreError> {
        self.require(self.kind() == DeviceKind::Mat, "new_roll")?;
        new_roll(&mut self.core).await
    }
}
