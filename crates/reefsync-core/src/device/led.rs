// ── LED drivers ──
//
// G1 drivers speak white/blue percentages on `/manual`; G2 drivers speak
// colour temperature and intensity. The other representation is derived
// into `local#/leds` after every fetch, and a write to either one is
// converted back into the native `/manual` fields.

use reefsync_api::Method;
use serde_json::{Value, json};
use tracing::debug;

use super::DeviceCore;
use super::color::{self, KelvinIntensity, LedGeneration, LedModel, WhiteBlue};
use crate::config::DeviceConfig;
use crate::error::CoreError;
use crate::model::{DeviceKind, SourceKind};
use crate::store::{DataPath, SourceRegistry};

const MANUAL: &str = "/manual";
const PRESET_NAME: &str = "/preset_name";
/// Firmwares without a flat `/preset_name` expose one entry per program.
const PRESET_SLOTS: u8 = 7;

pub struct LedState {
    generation: LedGeneration,
    model: &'static LedModel,
    compensate: bool,
    detected: bool,
}

impl LedState {
    pub(crate) fn register(config: &DeviceConfig, sources: &mut SourceRegistry) -> Self {
        sources.add_source("/mode", SourceKind::Data);
        sources.add_source(MANUAL, SourceKind::Data);
        sources.add_source("/auto", SourceKind::Config);
        sources.add_source(PRESET_NAME, SourceKind::Config);
        sources.add_source("/acclimation", SourceKind::Config);

        let generation = if config.kind == DeviceKind::LedG2 {
            LedGeneration::G2
        } else {
            LedGeneration::G1
        };
        Self {
            generation,
            model: color::lookup_model(&config.model, generation),
            compensate: config.intensity_compensation,
            detected: false,
        }
    }

    pub fn generation(&self) -> LedGeneration {
        self.generation
    }

    /// Detect firmware quirks once, at first connect: `/dashboard` versus
    /// root `/` as identity endpoint, and the per-slot preset names.
    pub(crate) async fn probe(&mut self, core: &mut DeviceCore) -> Result<(), CoreError> {
        if self.detected {
            return Ok(());
        }
        let client = core.client().clone();
        let device = core.config.id.clone();
        let unreachable = |e: reefsync_api::Error| CoreError::DeviceUnreachable {
            device: device.clone(),
            reason: e.to_string(),
        };

        let has_dashboard = client.probe("/dashboard").await.map_err(unreachable)?;
        if has_dashboard {
            core.add_source("/dashboard", SourceKind::DeviceInfo);
        } else {
            core.add_source("/", SourceKind::DeviceInfo);
        }

        if !client.probe(PRESET_NAME).await.map_err(unreachable)? {
            core.remove_source(PRESET_NAME);
            for slot in 1..=PRESET_SLOTS {
                core.add_source(&format!("{PRESET_NAME}/{slot}"), SourceKind::Config);
            }
        }

        debug!(device = %core.config.id, has_dashboard, "capability check done");
        self.detected = true;
        Ok(())
    }

    fn to_kelvin(&self, wb: WhiteBlue) -> KelvinIntensity {
        self.model.white_blue_to_kelvin(wb, self.compensate)
    }

    fn to_white_blue(&self, ki: KelvinIntensity) -> WhiteBlue {
        self.model.kelvin_to_white_blue(ki, self.compensate)
    }

    /// Refresh `local#/leds` from the native `/manual` fields.
    pub(crate) fn derive(&self, core: &mut DeviceCore) {
        let Some(manual) = core.doc.sources.payload(MANUAL).filter(|p| p.is_object()) else {
            return;
        };
        let field = |name: &str| manual.get(name).and_then(Value::as_f64);

        let derived = match self.generation {
            LedGeneration::G1 => {
                let (Some(white), Some(blue)) = (field("white"), field("blue")) else {
                    return;
                };
                let ki = self.to_kelvin(WhiteBlue { white, blue });
                json!({ "kelvin": ki.kelvin.round(), "intensity": ki.intensity.round() })
            }
            LedGeneration::G2 => {
                let (Some(kelvin), Some(intensity)) = (field("kelvin"), field("intensity")) else {
                    return;
                };
                let wb = self.to_white_blue(KelvinIntensity { kelvin, intensity });
                json!({ "white": wb.white.round(), "blue": wb.blue.round() })
            }
        };

        if let Err(e) = core.write(&DataPath::local("/leds"), derived) {
            debug!(device = %core.config.id, error = %e, "could not store derived colour");
        }
    }

    /// Cache write with colour-space shaping.
    ///
    /// Writes to the non-native pair under `local#/leds` are converted and
    /// written into `/manual`; the requested pair is kept as written.
    /// Colour-temperature writes are rounded to the driver's step.
    pub(crate) fn set_data(&self, core: &mut DeviceCore, path: &DataPath, value: Value) -> Result<(), CoreError> {
        let is_kelvin = path.leaf() == "kelvin";
        let value = match value.as_f64() {
            Some(k) if is_kelvin => json!(color::round_ui_kelvin(k, self.generation)),
            _ => value,
        };

        let derived_leaf = match (self.generation, path) {
            (LedGeneration::G1, DataPath::Local(p)) if p == "/leds/kelvin" || p == "/leds/intensity" => true,
            (LedGeneration::G2, DataPath::Local(p)) if p == "/leds/white" || p == "/leds/blue" => true,
            _ => false,
        };

        core.write(path, value)?;
        if !derived_leaf {
            if path.source_name() == Some(MANUAL) {
                self.derive(core);
            }
            return Ok(());
        }

        let read = |core: &mut DeviceCore, p: &str| core.read_f64(&DataPath::local(p)).unwrap_or(0.0);
        let native = match self.generation {
            LedGeneration::G1 => {
                let ki = KelvinIntensity {
                    kelvin: read(core, "/leds/kelvin"),
                    intensity: read(core, "/leds/intensity"),
                };
                let wb = self.to_white_blue(ki);
                [("white", wb.white.round()), ("blue", wb.blue.round())]
            }
            LedGeneration::G2 => {
                let wb = WhiteBlue {
                    white: read(core, "/leds/white"),
                    blue: read(core, "/leds/blue"),
                };
                let ki = self.to_kelvin(wb);
                [
                    ("kelvin", color::round_ui_kelvin(ki.kelvin, self.generation)),
                    ("intensity", ki.intensity.round()),
                ]
            }
        };
        for (field, v) in native {
            core.write(&DataPath::source(MANUAL, format!("/{field}")), json!(v))?;
        }
        Ok(())
    }
}

/// `manual` and `auto` switch the driver's mode.
pub(crate) async fn press(core: &mut DeviceCore, action: &str) -> Result<(), CoreError> {
    match action {
        "manual" | "auto" => {
            let body = json!({ "mode": action });
            core.push("/mode", Method::Post, Some(&body)).await?;
            core.store_payload("/mode", body);
            core.policy.set_quick_refresh(MANUAL);
            Ok(())
        }
        _ => Err(CoreError::unsupported(format!("press {action}"), core.config.kind)),
    }
}

impl super::Device {
    /// Generation of an LED driver; `None` for other families.
    pub fn led_generation(&self) -> Option<LedGeneration> {
        match &self.family {
            super::Family::Led(state) => Some(state.generation()),
            _ => None,
        }
    }

    /// Current colour as temperature and intensity.
    pub fn led_color(&mut self) -> Result<KelvinIntensity, CoreError> {
        let generation = self
            .led_generation()
            .ok_or_else(|| CoreError::unsupported("led_color", self.kind()))?;
        let (k, i) = match generation {
            LedGeneration::G1 => (DataPath::local("/leds/kelvin"), DataPath::local("/leds/intensity")),
            LedGeneration::G2 => (DataPath::source(MANUAL, "/kelvin"), DataPath::source(MANUAL, "/intensity")),
        };
        let kelvin = self.core.read(&k)?.as_f64().unwrap_or(color::MAX_KELVIN);
        let intensity = self.core.read(&i)?.as_f64().unwrap_or(0.0);
        Ok(KelvinIntensity { kelvin, intensity })
    }

    /// Set the colour in the cache and push `/manual`.
    pub async fn set_led_color(&mut self, kelvin: f64, intensity: f64) -> Result<(), CoreError> {
        let generation = self
            .led_generation()
            .ok_or_else(|| CoreError::unsupported("set_led_color", self.kind()))?;
        let (k, i) = match generation {
            LedGeneration::G1 => (DataPath::local("/leds/kelvin"), DataPath::local("/leds/intensity")),
            LedGeneration::G2 => (DataPath::source(MANUAL, "/kelvin"), DataPath::source(MANUAL, "/intensity")),
        };
        self.set_data(&k, json!(kelvin))?;
        self.set_data(&i, json!(intensity))?;
        self.push_values(MANUAL, Method::Post).await
    }
}
