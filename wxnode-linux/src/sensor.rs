//! Temperature/humidity source for the node.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub temperature_c: f32,
    pub humidity_percent: f32,
}

pub trait SensorSource: Send {
    /// `None` when the sensor could not be read this time.
    fn read(&mut self) -> Option<Reading>;
}

/// Random walk around a tropical baseline, clamped to plausible ranges.
pub struct SimulatedSensor {
    rng: StdRng,
    current: Reading,
}

impl SimulatedSensor {
    pub fn new(rng: StdRng) -> Self {
        Self {
            rng,
            current: Reading {
                temperature_c: 28.0,
                humidity_percent: 70.0,
            },
        }
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl SensorSource for SimulatedSensor {
    fn read(&mut self) -> Option<Reading> {
        let dt: f32 = self.rng.gen_range(-0.3..=0.3);
        let dh: f32 = self.rng.gen_range(-1.0..=1.0);
        self.current.temperature_c = (self.current.temperature_c + dt).clamp(-20.0, 50.0);
        self.current.humidity_percent = (self.current.humidity_percent + dh).clamp(0.0, 100.0);
        Some(self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readings_stay_in_range_and_drift_slowly() {
        let mut sensor = SimulatedSensor::new(StdRng::seed_from_u64(7));
        let mut prev = sensor.read().unwrap();
        for _ in 0..1000 {
            let r = sensor.read().unwrap();
            assert!((-20.0..=50.0).contains(&r.temperature_c));
            assert!((0.0..=100.0).contains(&r.humidity_percent));
            assert!((r.temperature_c - prev.temperature_c).abs() <= 0.31);
            prev = r;
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = SimulatedSensor::new(StdRng::seed_from_u64(42));
        let mut b = SimulatedSensor::new(StdRng::seed_from_u64(42));
        for _ in 0..10 {
            assert_eq!(a.read(), b.read());
        }
    }
}
