// Unit normalization for display
use serde::{Deserialize, Serialize};

/// How raw magnitudes from the feed are turned into display values.
///
/// Exactly one policy applies per deployment. `TieredGrams` expects the feed
/// to report grams and switches to kilograms and tons as the magnitude grows;
/// `Kilograms` expects kilograms and always shows two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitPolicy {
    TieredGrams,
    #[default]
    Kilograms,
}

/// A display-ready `(value, unit)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScaledWeight {
    pub value: String,
    pub unit: &'static str,
}

impl ScaledWeight {
    fn new(value: String, unit: &'static str) -> Self {
        Self { value, unit }
    }
}

impl std::fmt::Display for ScaledWeight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

const GRAMS_PER_KG: f64 = 1_000.0;
const GRAMS_PER_TON: f64 = 1_000_000.0;

impl UnitPolicy {
    /// Unit the feed reports magnitudes in
    pub fn base_unit(&self) -> &'static str {
        match self {
            UnitPolicy::TieredGrams => "g",
            UnitPolicy::Kilograms => "kg",
        }
    }

    /// Scale a raw magnitude for display.
    ///
    /// Negative and non-finite magnitudes are clamped to zero.
    pub fn scale(&self, magnitude: f64) -> ScaledWeight {
        let magnitude = if magnitude.is_finite() && magnitude > 0.0 {
            magnitude
        } else {
            0.0
        };

        match self {
            UnitPolicy::TieredGrams => {
                if magnitude >= GRAMS_PER_TON {
                    ScaledWeight::new(format!("{:.3}", magnitude / GRAMS_PER_TON), "tons")
                } else if magnitude >= GRAMS_PER_KG {
                    ScaledWeight::new(format!("{:.3}", magnitude / GRAMS_PER_KG), "kg")
                } else {
                    ScaledWeight::new(magnitude.to_string(), "grams")
                }
            }
            UnitPolicy::Kilograms => ScaledWeight::new(format!("{:.2}", magnitude), "kg"),
        }
    }
}
