use serde::{Deserialize, Serialize};

use crate::geodesy::normalize_degrees;

/// A raw device-orientation reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CompassReading {
    /// Already clockwise from north (iOS-style compass heading).
    Heading(f64),
    /// Earth-frame `alpha`, which increases counter-clockwise.
    AbsoluteAlpha(f64),
}

impl CompassReading {
    pub fn heading(self) -> Option<f64> {
        let degrees = match self {
            CompassReading::Heading(h) => h,
            CompassReading::AbsoluteAlpha(alpha) => 360.0 - alpha,
        };

        degrees.is_finite().then(|| normalize_degrees(degrees))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HeadingArbitrator {
    min_speed_mps: f64,
}

impl HeadingArbitrator {
    pub fn new(min_speed_mps: f64) -> Self {
        Self { min_speed_mps }
    }

    /// Pick the heading to orient with.
    ///
    /// At or above the speed threshold the GPS course wins. Below it only the compass is
    /// used. `None` means "unknown, do not rotate".
    pub fn select(
        &self,
        gps_course: Option<f64>,
        speed_mps: Option<f64>,
        compass: Option<f64>,
    ) -> Option<f64> {
        let gps_course = gps_course.filter(|c| c.is_finite());
        let compass = compass.filter(|c| c.is_finite());
        let moving = speed_mps.is_some_and(|s| s >= self.min_speed_mps);

        let chosen = if moving {
            gps_course.or(compass)
        } else {
            compass
        };

        chosen.map(normalize_degrees)
    }
}
