// ── Device kinds ──
//
// Closed set of device families. Capability helpers replace any need to
// inspect a device's concrete type at runtime.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Hardware family of a device record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[non_exhaustive]
pub enum DeviceKind {
    /// First-generation LED driver (white/blue channels).
    LedG1,
    /// Second-generation LED driver (kelvin/intensity).
    LedG2,
    /// Roller mat filter.
    Mat,
    /// Dosing pump with 2 or 4 heads.
    Dose,
    /// Auto top-off unit.
    Ato,
    /// Return/skimmer pump controller.
    Run,
    /// Wave pump.
    Wave,
    /// Cloud account.
    Cloud,
    /// Composite of several LED drivers.
    VirtualLed,
}

impl DeviceKind {
    pub fn is_led(self) -> bool {
        matches!(self, Self::LedG1 | Self::LedG2)
    }

    /// Local devices are reached over plain HTTP on the LAN.
    pub fn is_local(self) -> bool {
        !matches!(self, Self::Cloud | Self::VirtualLed)
    }

    /// Devices that may hold a cloud link.
    pub fn wants_cloud_link(self) -> bool {
        matches!(self, Self::LedG1 | Self::LedG2 | Self::Wave)
    }

    /// Devices that accept `press(action, head)`.
    pub fn is_pressable(self) -> bool {
        !matches!(self, Self::Cloud)
    }

    /// Devices with independently addressable heads.
    pub fn is_head_addressable(self) -> bool {
        matches!(self, Self::Dose)
    }

    /// Devices with independently addressable pumps.
    pub fn is_pump_addressable(self) -> bool {
        matches!(self, Self::Run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kebab_case_names() {
        assert_eq!("led-g1".parse::<DeviceKind>().ok(), Some(DeviceKind::LedG1));
        assert_eq!("DOSE".parse::<DeviceKind>().ok(), Some(DeviceKind::Dose));
        assert_eq!(DeviceKind::VirtualLed.to_string(), "virtual-led");
    }

    #[test]
    fn capabilities_follow_family() {
        assert!(DeviceKind::LedG2.is_led());
        assert!(DeviceKind::Wave.wants_cloud_link());
        assert!(!DeviceKind::Mat.wants_cloud_link());
        assert!(DeviceKind::Dose.is_head_addressable());
        assert!(DeviceKind::Run.is_pump_addressable());
        assert!(!DeviceKind::Cloud.is_local());
    }
}
