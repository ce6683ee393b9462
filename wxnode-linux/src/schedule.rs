//! What the host loop owes the master on each tick.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Due {
    /// Link just came up: announce and request weather.
    Bootstrap,
    SensorReading,
    WeatherRequest,
}

#[derive(Debug)]
pub struct Schedule {
    sensor_interval: Duration,
    weather_interval: Duration,
    was_linked: bool,
    last_sensor: Option<Instant>,
    last_weather: Option<Instant>,
}

impl Schedule {
    pub fn new(sensor_interval: Duration, weather_interval: Duration) -> Self {
        Self {
            sensor_interval,
            weather_interval,
            was_linked: false,
            last_sensor: None,
            last_weather: None,
        }
    }

    pub fn poll(&mut self, linked: bool, now: Instant) -> Vec<Due> {
        let mut due = Vec::new();
        let rising = linked && !self.was_linked;
        self.was_linked = linked;
        if !linked {
            return due;
        }

        if rising {
            due.push(Due::Bootstrap);
            self.last_weather = Some(now);
        }
        if elapsed(self.last_sensor, now, self.sensor_interval) {
            due.push(Due::SensorReading);
            self.last_sensor = Some(now);
        }
        if elapsed(self.last_weather, now, self.weather_interval) {
            due.push(Due::WeatherRequest);
            self.last_weather = Some(now);
        }
        due
    }
}

fn elapsed(last: Option<Instant>, now: Instant, interval: Duration) -> bool {
    last.map_or(true, |t| now.saturating_duration_since(t) >= interval)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> Schedule {
        Schedule::new(Duration::from_secs(10), Duration::from_secs(600))
    }

    #[test]
    fn nothing_while_unlinked() {
        let mut s = schedule();
        assert!(s.poll(false, Instant::now()).is_empty());
    }

    #[test]
    fn link_edge_bootstraps_once() {
        let mut s = schedule();
        let t0 = Instant::now();
        assert_eq!(s.poll(true, t0), vec![Due::Bootstrap, Due::SensorReading]);
        assert!(s.poll(true, t0 + Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn periodic_work_after_intervals() {
        let mut s = schedule();
        let t0 = Instant::now();
        s.poll(true, t0);
        assert_eq!(
            s.poll(true, t0 + Duration::from_secs(10)),
            vec![Due::SensorReading]
        );
        assert_eq!(
            s.poll(true, t0 + Duration::from_secs(600)),
            vec![Due::SensorReading, Due::WeatherRequest]
        );
    }

    #[test]
    fn relink_bootstraps_again() {
        let mut s = schedule();
        let t0 = Instant::now();
        s.poll(true, t0);
        s.poll(false, t0 + Duration::from_secs(20));
        assert_eq!(
            s.poll(true, t0 + Duration::from_secs(21)),
            vec![Due::Bootstrap, Due::SensorReading]
        );
    }
}
