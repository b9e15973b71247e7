//! Position smoothing.
//!
//! Each axis runs an independent one-dimensional Kalman filter with a constant-position
//! model: the prediction carries the previous estimate forward, and each fix pulls it
//! toward the measurement by a gain derived from the relative confidence.

use crate::geodesy::GeoPoint;

#[derive(Debug, Clone, Copy)]
struct Estimate {
    value: f64,
    covariance: f64,
}

#[derive(Debug, Clone)]
pub struct KalmanFilter1D {
    /// Measurement noise.
    r: f64,
    /// Process noise.
    q: f64,
    estimate: Option<Estimate>,
}

impl KalmanFilter1D {
    pub fn new(measurement_noise: f64, process_noise: f64) -> Self {
        Self {
            r: measurement_noise,
            q: process_noise,
            estimate: None,
        }
    }

    pub fn set_noise(&mut self, measurement_noise: f64, process_noise: f64) {
        self.r = measurement_noise;
        self.q = process_noise;
    }

    pub fn filter(&mut self, measurement: f64) -> f64 {
        let next = match self.estimate {
            None => Estimate {
                value: measurement,
                covariance: self.r,
            },
            Some(previous) => {
                let predicted_covariance = previous.covariance + self.q;
                let gain = predicted_covariance / (predicted_covariance + self.r);

                Estimate {
                    value: previous.value + gain * (measurement - previous.value),
                    covariance: predicted_covariance - gain * predicted_covariance,
                }
            }
        };

        self.estimate = Some(next);
        next.value
    }

    pub fn value(&self) -> Option<f64> {
        self.estimate.map(|e| e.value)
    }

    pub fn reset(&mut self) {
        self.estimate = None;
    }
}

#[derive(Debug, Clone)]
pub struct PositionFilter {
    latitude: KalmanFilter1D,
    longitude: KalmanFilter1D,
    min_accuracy_m: f64,
    max_accuracy_m: f64,
    process_noise: f64,
}

impl PositionFilter {
    pub fn new(min_accuracy_m: f64, max_accuracy_m: f64, process_noise: f64) -> Self {
        let max_accuracy_m = max_accuracy_m.max(min_accuracy_m);
        let seed_noise = min_accuracy_m * min_accuracy_m;

        Self {
            latitude: KalmanFilter1D::new(seed_noise, process_noise),
            longitude: KalmanFilter1D::new(seed_noise, process_noise),
            min_accuracy_m,
            max_accuracy_m,
            process_noise,
        }
    }

    /// Smooth one raw fix. Missing accuracy is treated as the worst effective accuracy.
    pub fn process(
        &mut self,
        latitude: f64,
        longitude: f64,
        accuracy_m: Option<f64>,
        _timestamp: Option<i64>,
    ) -> GeoPoint {
        let accuracy = accuracy_m
            .filter(|a| a.is_finite())
            .unwrap_or(self.max_accuracy_m)
            .clamp(self.min_accuracy_m, self.max_accuracy_m);
        let noise = accuracy * accuracy;

        self.latitude.set_noise(noise, self.process_noise);
        self.longitude.set_noise(noise, self.process_noise);

        GeoPoint::new(
            self.latitude.filter(latitude),
            self.longitude.filter(longitude),
        )
    }

    pub fn current(&self) -> Option<GeoPoint> {
        Some(GeoPoint::new(self.latitude.value()?, self.longitude.value()?))
    }

    pub fn reset(&mut self) {
        self.latitude.reset();
        self.longitude.reset();
    }
}
