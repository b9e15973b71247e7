use serde::{Deserialize, Serialize};

/// Kilometers per hour.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kph(pub f64);

impl Kph {
    pub fn to_meters_per_second(self) -> f64 {
        self.0 / 3.6
    }

    pub fn from_meters_per_second(mps: f64) -> Self {
        Kph(mps * 3.6)
    }

    /// Never below `min`, then never above `max`; `max` wins if they cross.
    pub fn bounded(self, min: Kph, max: Kph) -> Kph {
        Kph(self.0.max(min.0).min(max.0))
    }
}
