// ── Dosing pump ──
//
// Two or four independently addressable heads. Each head has its own
// settings source and its own staging area under `local#/head/<n>`.

use reefsync_api::Method;
use serde_json::{Value, json};
use strum::{Display, EnumString};
use tracing::{info, warn};

use super::{Device, DeviceCore};
use crate::config::DeviceConfig;
use crate::error::CoreError;
use crate::model::{DeviceKind, SourceKind};
use crate::store::{DataPath, SourceRegistry};

const DEVICE_SETTINGS: &str = "/device-settings";
const DEFAULT_MANUAL_DOSE: f64 = 5.0;

/// Supplement uids sold as a multi-supplement bundle.
pub const BUNDLE_UIDS: &[&str] = &[
    "7d67412c-fde0-44d4-882a-dc8746fd4acb",
    "76cf3e7d-f67d-44e4-b0d4-2b1f79b1d36c",
    "6e2ec1c6-64a9-46d7-8b1d-3a4b4c2ad07c",
    "b703c1d6-56f8-4b6c-9da9-0e0bb5df14e9",
];

/// Head settings fields the pump refuses while bundle mode is active.
const BUNDLE_LOCKED_FIELDS: &[&str] = &["supplement", "supplement_uid"];

/// Steps of the head calibration workflow, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum CalibrationStep {
    Start,
    Dose,
    End,
    EndSetup,
}

impl CalibrationStep {
    fn endpoint(self) -> &'static str {
        match self {
            Self::Start => "start-calibration",
            Self::Dose => "calibration",
            Self::End => "end-calibration",
            Self::EndSetup => "end-setup",
        }
    }
}

pub fn settings_source(head: u8) -> String {
    format!("/head/{head}/settings")
}

fn staged(head: u8, field: &str) -> DataPath {
    DataPath::local(format!("/head/{head}/{field}"))
}

fn bundle_flag() -> DataPath {
    DataPath::source(DEVICE_SETTINGS, "/bundled_heads")
}

pub struct DoseState {
    heads_nb: u8,
}

impl DoseState {
    pub(crate) fn register(config: &DeviceConfig, sources: &mut SourceRegistry) -> Result<Self, CoreError> {
        if !matches!(config.heads_nb, 2 | 4) {
            return Err(CoreError::validation(format!(
                "dosing pump {} must have 2 or 4 heads, got {}",
                config.id, config.heads_nb
            )));
        }

        sources.add_source(DEVICE_SETTINGS, SourceKind::Config);
        for head in 1..=config.heads_nb {
            sources.add_source(settings_source(head), SourceKind::Config);
        }
        sources.add_source("/dashboard", SourceKind::Data);

        Ok(Self {
            heads_nb: config.heads_nb,
        })
    }

    pub fn heads_nb(&self) -> u8 {
        self.heads_nb
    }

    /// One staging entry per head, keyed by head number.
    pub(crate) fn seed(&self, core: &mut DeviceCore) {
        let heads: serde_json::Map<String, Value> = (1..=self.heads_nb)
            .map(|head| {
                let entry = json!({
                    "manual_dose": DEFAULT_MANUAL_DOSE,
                    "calibration_dose": 0.0,
                    "new_supplement": new_supplement_form(),
                });
                (head.to_string(), entry)
            })
            .collect();
        core.doc.local["head"] = Value::Object(heads);
    }

    fn check_head(&self, head: Option<u8>) -> Result<u8, CoreError> {
        match head {
            Some(h) if (1..=self.heads_nb).contains(&h) => Ok(h),
            Some(h) => Err(CoreError::validation(format!(
                "head {h} out of range 1..={}",
                self.heads_nb
            ))),
            None => Err(CoreError::validation("this action needs a head number")),
        }
    }

    /// Shape a head-settings payload before sending: while bundle mode is
    /// active the fields the pump refuses are dropped.
    pub(crate) fn outgoing(&self, core: &mut DeviceCore, source: &str, mut payload: Value) -> Value {
        let is_head_settings = source
            .strip_prefix("/head/")
            .and_then(|rest| rest.strip_suffix("/settings"))
            .is_some_and(|n| n.parse::<u8>().is_ok());

        if is_head_settings && bundle_active(core) {
            if let Value::Object(map) = &mut payload {
                for field in BUNDLE_LOCKED_FIELDS {
                    map.remove(*field);
                }
            }
        }
        payload
    }
}

fn new_supplement_form() -> Value {
    json!({ "name": "", "short_name": "", "brand_name": "", "concentration": 0 })
}

fn bundle_active(core: &mut DeviceCore) -> bool {
    core.read_opt(&bundle_flag()).and_then(|v| v.as_bool()).unwrap_or(false)
}

fn dose_state(device: &Device) -> Result<&DoseState, CoreError> {
    match &device.family {
        super::Family::Dose(state) => Ok(state),
        _ => Err(CoreError::unsupported("head action", device.kind())),
    }
}

impl Device {
    /// Number of heads of a dosing pump.
    pub fn heads_nb(&self) -> Option<u8> {
        dose_state(self).ok().map(DoseState::heads_nb)
    }

    pub(crate) async fn press_head(&mut self, action: &str, head: Option<u8>) -> Result<(), CoreError> {
        let head = dose_state(self)?.check_head(head)?;
        let core = &mut self.core;

        match action {
            "manual" => {
                let volume = core.read_f64(&staged(head, "manual_dose")).unwrap_or(0.0);
                if volume <= 0.0 {
                    return Err(CoreError::validation("manual dose must be positive"));
                }
                core.push(&format!("/head/{head}/manual"), Method::Post, Some(&json!({ "volume": volume })))
                    .await?;
                info!(device = %core.config.id, head, volume, "manual dose sent");
                core.policy.set_quick_refresh("/dashboard");
                Ok(())
            }
            "prime" | "stop" => {
                core.push(&format!("/head/{head}/{action}"), Method::Post, Some(&json!({})))
                    .await
            }
            "new_supplement" => self.push_new_supplement(head).await,
            other => match other.parse::<CalibrationStep>() {
                Ok(step) => self.calibration(step, Some(head)).await,
                Err(_) => Err(CoreError::unsupported(format!("press {action}"), DeviceKind::Dose)),
            },
        }
    }

    /// Run one calibration step on `head`.
    ///
    /// `End` reports the measured volume staged at
    /// `local#/head/<n>/calibration_dose`. `EndSetup` also turns bundle
    /// mode on when the head's supplement belongs to a bundle.
    pub async fn calibration(&mut self, step: CalibrationStep, head: Option<u8>) -> Result<(), CoreError> {
        let head = dose_state(self)?.check_head(head)?;
        let path = format!("/head/{head}/{}", step.endpoint());

        let body = match step {
            CalibrationStep::End => {
                let volume = self.core.read_f64(&staged(head, "calibration_dose")).unwrap_or(0.0);
                json!({ "volume": volume })
            }
            CalibrationStep::Start | CalibrationStep::Dose | CalibrationStep::EndSetup => json!({}),
        };
        self.core.push(&path, Method::Post, Some(&body)).await?;

        if step == CalibrationStep::EndSetup {
            let settings = settings_source(head);
            let uid = self
                .core
                .read_opt(&DataPath::source(&settings, "/supplement/uid"))
                .or_else(|| self.core.read_opt(&DataPath::source(&settings, "/supplement_uid")));
            let bundled = uid
                .as_ref()
                .and_then(Value::as_str)
                .is_some_and(|uid| BUNDLE_UIDS.contains(&uid));
            if bundled && !bundle_active(&mut self.core) {
                info!(device = %self.id(), head, "bundle supplement detected, enabling bundle mode");
                self.set_bundle(true).await?;
            }
            self.core.policy.set_quick_refresh(settings);
        }
        Ok(())
    }

    /// Enable or disable bundle mode on the pump.
    pub async fn set_bundle(&mut self, enabled: bool) -> Result<(), CoreError> {
        dose_state(self)?;
        let body = json!({ "bundled_heads": enabled });
        self.core.push(DEVICE_SETTINGS, Method::Put, Some(&body)).await?;
        self.core.write(&bundle_flag(), json!(enabled))
    }

    /// Write the staged new-supplement form into the head settings and
    /// push them.
    async fn push_new_supplement(&mut self, head: u8) -> Result<(), CoreError> {
        if bundle_active(&mut self.core) {
            return Err(CoreError::validation("supplements are locked while bundle mode is active"));
        }
        let form = self.core.read(&staged(head, "new_supplement"))?;
        if form.get("name").and_then(Value::as_str).is_none_or(str::is_empty) {
            return Err(CoreError::validation("new supplement needs a name"));
        }

        let source = settings_source(head);
        self.core.write(&DataPath::source(&source, "/supplement"), form)?;
        self.push_values(&source, Method::Put).await?;
        if let Err(e) = self.core.write(&staged(head, "new_supplement"), new_supplement_form()) {
            warn!(device = %self.id(), head, error = %e, "could not reset supplement form");
        }
        Ok(())
    }
}
