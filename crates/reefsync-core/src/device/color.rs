// ── LED colour space ──
//
// Two equivalent views of an LED driver's output:
// (white %, blue %) and (colour temperature K, intensity %).
//
// The white/blue mix is reduced to a single "balance" in [0, 2]:
// blue/white when white dominates, 2 - white/blue when blue dominates.
// Each model carries a piecewise-linear table from Kelvin to balance,
// sorted ascending by Kelvin. Models without a table use a linear
// fallback over [9000, 23000] K.

use serde::{Deserialize, Serialize};

pub const MAX_KELVIN: f64 = 23_000.0;
pub const FALLBACK_MIN_KELVIN: f64 = 9_000.0;
pub const G1_MIN_KELVIN: f64 = 9_000.0;
pub const G2_MIN_KELVIN: f64 = 8_000.0;

/// Hardware generation of an LED driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedGeneration {
    G1,
    G2,
}

impl LedGeneration {
    pub fn min_kelvin(self) -> f64 {
        match self {
            Self::G1 => G1_MIN_KELVIN,
            Self::G2 => G2_MIN_KELVIN,
        }
    }
}

/// Per-model conversion data.
#[derive(Debug)]
pub struct LedModel {
    pub name: &'static str,
    pub generation: LedGeneration,
    /// `(kelvin, balance)` sorted ascending by Kelvin. Empty means fallback.
    pub balance_table: &'static [(f64, f64)],
    /// `(kelvin, watts equivalent at 100 %)` used for intensity compensation.
    pub output_table: &'static [(f64, f64)],
    /// Reference point of the compensation ratio.
    pub reference_kelvin: f64,
}

const G1_BALANCE: &[(f64, f64)] = &[
    (9_000.0, 0.0),
    (10_000.0, 0.22),
    (12_000.0, 0.5),
    (14_000.0, 0.78),
    (15_000.0, 1.0),
    (17_000.0, 1.32),
    (20_000.0, 1.68),
    (23_000.0, 2.0),
];

const G1_90_BALANCE: &[(f64, f64)] = &[
    (9_000.0, 0.0),
    (10_000.0, 0.2),
    (12_000.0, 0.46),
    (14_000.0, 0.75),
    (15_000.0, 1.0),
    (18_000.0, 1.45),
    (23_000.0, 2.0),
];

const G2_BALANCE: &[(f64, f64)] = &[
    (8_000.0, 0.0),
    (9_000.0, 0.12),
    (10_000.0, 0.28),
    (12_000.0, 0.55),
    (14_000.0, 0.82),
    (15_000.0, 1.0),
    (18_000.0, 1.4),
    (23_000.0, 2.0),
];

const G1_OUTPUT: &[(f64, f64)] = &[(9_000.0, 150.0), (15_000.0, 190.0), (23_000.0, 140.0)];
const G2_OUTPUT: &[(f64, f64)] = &[
    (8_000.0, 95.0),
    (12_000.0, 110.0),
    (15_000.0, 120.0),
    (23_000.0, 90.0),
];

pub static MODELS: &[LedModel] = &[
    LedModel {
        name: "RSLED50",
        generation: LedGeneration::G1,
        balance_table: &[],
        output_table: &[],
        reference_kelvin: 15_000.0,
    },
    LedModel {
        name: "RSLED90",
        generation: LedGeneration::G1,
        balance_table: G1_90_BALANCE,
        output_table: G1_OUTPUT,
        reference_kelvin: 15_000.0,
    },
    LedModel {
        name: "RSLED160",
        generation: LedGeneration::G1,
        balance_table: G1_BALANCE,
        output_table: G1_OUTPUT,
        reference_kelvin: 15_000.0,
    },
    LedModel {
        name: "RSLED60",
        generation: LedGeneration::G2,
        balance_table: G2_BALANCE,
        output_table: G2_OUTPUT,
        reference_kelvin: 15_000.0,
    },
    LedModel {
        name: "RSLED115",
        generation: LedGeneration::G2,
        balance_table: G2_BALANCE,
        output_table: G2_OUTPUT,
        reference_kelvin: 15_000.0,
    },
    LedModel {
        name: "RSLED170",
        generation: LedGeneration::G2,
        balance_table: G2_BALANCE,
        output_table: &[],
        reference_kelvin: 15_000.0,
    },
];

static GENERIC_G1: LedModel = LedModel {
    name: "generic-g1",
    generation: LedGeneration::G1,
    balance_table: &[],
    output_table: &[],
    reference_kelvin: 15_000.0,
};

static GENERIC_G2: LedModel = LedModel {
    name: "generic-g2",
    generation: LedGeneration::G2,
    balance_table: &[],
    output_table: &[],
    reference_kelvin: 15_000.0,
};

/// Conversion data for `name`, or a table-less model of `generation`.
pub fn lookup_model(name: &str, generation: LedGeneration) -> &'static LedModel {
    MODELS
        .iter()
        .find(|m| m.name.eq_ignore_ascii_case(name))
        .unwrap_or(match generation {
            LedGeneration::G1 => &GENERIC_G1,
            LedGeneration::G2 => &GENERIC_G2,
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WhiteBlue {
    pub white: f64,
    pub blue: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KelvinIntensity {
    pub kelvin: f64,
    pub intensity: f64,
}

impl KelvinIntensity {
    /// Value reported by an empty group of drivers.
    pub const EMPTY: Self = Self {
        kelvin: MAX_KELVIN,
        intensity: 0.0,
    };
}

/// Linear interpolation of `x` over `(x, y)` points sorted by x.
/// Out-of-range inputs clamp to the end points.
fn interpolate(points: impl Iterator<Item = (f64, f64)> + Clone, x: f64) -> Option<f64> {
    let mut iter = points.clone();
    let first = iter.next()?;
    if x <= first.0 {
        return Some(first.1);
    }

    let mut prev = first;
    for point in points.skip(1) {
        if x <= point.0 {
            let span = point.0 - prev.0;
            if span.abs() < f64::EPSILON {
                return Some(point.1);
            }
            return Some(prev.1 + (x - prev.0) * (point.1 - prev.1) / span);
        }
        prev = point;
    }
    Some(prev.1)
}

impl LedModel {
    fn kelvin_for_balance(&self, balance: f64) -> f64 {
        let inverse = self.balance_table.iter().map(|&(k, b)| (b, k));
        interpolate(inverse, balance).unwrap_or_else(|| {
            let span = MAX_KELVIN - FALLBACK_MIN_KELVIN;
            (FALLBACK_MIN_KELVIN + balance / 2.0 * span).clamp(FALLBACK_MIN_KELVIN, MAX_KELVIN)
        })
    }

    fn balance_for_kelvin(&self, kelvin: f64) -> f64 {
        interpolate(self.balance_table.iter().copied(), kelvin).unwrap_or_else(|| {
            let span = MAX_KELVIN - FALLBACK_MIN_KELVIN;
            ((kelvin - FALLBACK_MIN_KELVIN) / span * 2.0).clamp(0.0, 2.0)
        })
    }

    /// Ratio of reference output to output at `kelvin`; 1 without a table.
    pub fn compensation(&self, kelvin: f64) -> f64 {
        let table = self.output_table.iter().copied();
        match (
            interpolate(table.clone(), self.reference_kelvin),
            interpolate(table, kelvin),
        ) {
            (Some(reference), Some(here)) if here > 0.0 => reference / here,
            _ => 1.0,
        }
    }

    /// White/blue percentages to colour temperature and intensity.
    pub fn white_blue_to_kelvin(&self, wb: WhiteBlue, compensate: bool) -> KelvinIntensity {
        let white = wb.white.clamp(0.0, 100.0);
        let blue = wb.blue.clamp(0.0, 100.0);

        let (balance, raw_intensity) = if white >= blue {
            let ratio = if white > 0.0 { blue / white } else { 0.0 };
            (ratio, white)
        } else {
            (2.0 - white / blue, blue)
        };

        let kelvin = self.kelvin_for_balance(balance);
        let intensity = if compensate {
            raw_intensity / self.compensation(kelvin)
        } else {
            raw_intensity
        };
        KelvinIntensity { kelvin, intensity }
    }

    /// Colour temperature and intensity to white/blue percentages, each
    /// clamped to [0, 100].
    pub fn kelvin_to_white_blue(&self, ki: KelvinIntensity, compensate: bool) -> WhiteBlue {
        let balance = self.balance_for_kelvin(ki.kelvin);
        let intensity = if compensate {
            ki.intensity * self.compensation(ki.kelvin)
        } else {
            ki.intensity
        };

        let (white, blue) = if balance <= 1.0 {
            (intensity, intensity * balance)
        } else {
            (intensity * (2.0 - balance), intensity)
        };
        WhiteBlue {
            white: white.clamp(0.0, 100.0),
            blue: blue.clamp(0.0, 100.0),
        }
    }
}

/// Round a user-entered colour temperature to the driver's step
/// (200 K below 10000 K, 500 K above, halves rounding up) and clamp to the
/// supported range.
pub fn round_ui_kelvin(kelvin: f64, generation: LedGeneration) -> f64 {
    let step = if kelvin < 10_000.0 { 200.0 } else { 500.0 };
    ((kelvin / step).round() * step).clamp(generation.min_kelvin(), MAX_KELVIN)
}
