// Demo simulator - deterministic synthetic devices shaped like live data
use crate::domain::device::{Device, Frame, Position, PositionAttributes};
use crate::infrastructure::config::DemoSettings;
use chrono::{DateTime, SecondsFormat, Utc};

/// Spacing between neighbouring devices in the initial layout, in degrees.
const INITIAL_SPREAD: f64 = 0.0012;
const INITIAL_BATTERY_STEP: u8 = 7;

pub struct DemoSimulator {
    settings: DemoSettings,
    rng: fastrand::Rng,
    devices: Vec<Device>,
    positions: Vec<Position>,
    batteries: Vec<u8>,
    next_position_id: i64,
}

impl DemoSimulator {
    pub fn new(settings: DemoSettings, now: DateTime<Utc>) -> Self {
        let count = settings.device_count;
        let timestamp = format_time(now);

        let devices: Vec<Device> = (0..count)
            .map(|i| {
                let number = i + 1;
                Device::new(
                    number as i64,
                    format!("Demo Wearable {:02}", number),
                    format!("demo-{:04}", number),
                )
            })
            .collect();

        let batteries: Vec<u8> = (0..count)
            .map(|i| {
                let drained = INITIAL_BATTERY_STEP.saturating_mul(i.min(u8::MAX as usize) as u8);
                100u8.saturating_sub(drained).max(settings.min_battery)
            })
            .collect();

        let positions = devices
            .iter()
            .enumerate()
            .map(|(i, device)| {
                let (lat, lng) = initial_coordinate(&settings, i);
                Position {
                    id: device.id,
                    device_id: device.id,
                    latitude: lat,
                    longitude: lng,
                    device_time: timestamp.clone(),
                    attributes: PositionAttributes::with_battery(batteries[i]),
                }
            })
            .collect();

        Self {
            rng: fastrand::Rng::with_seed(settings.seed),
            next_position_id: count as i64 + 1,
            settings,
            devices,
            positions,
            batteries,
        }
    }

    /// Move every device a little, refresh timestamps and drain batteries.
    ///
    /// Device 0 is the reference unit and keeps its battery level.
    pub fn step(&mut self, now: DateTime<Utc>) {
        let max = self.settings.max_step_degrees.abs();
        let timestamp = format_time(now);

        for (i, position) in self.positions.iter_mut().enumerate() {
            position.latitude = (position.latitude + self.rng.f64() * 2.0 * max - max).clamp(-90.0, 90.0);
            position.longitude = (position.longitude + self.rng.f64() * 2.0 * max - max).clamp(-180.0, 180.0);
            position.device_time = timestamp.clone();
            position.id = self.next_position_id;
            self.next_position_id += 1;

            if i > 0 && self.batteries[i] > self.settings.min_battery {
                self.batteries[i] -= 1;
            }
            position.attributes = PositionAttributes::with_battery(self.batteries[i]);
        }
    }

    pub fn frame(&self) -> Frame {
        Frame {
            devices: self.devices.clone(),
            positions: self.positions.clone(),
        }
    }
}

fn initial_coordinate(settings: &DemoSettings, index: usize) -> (f64, f64) {
    let spread = index as f64 * INITIAL_SPREAD;
    let lat = settings.base_lat + if index % 2 == 0 { spread } else { -spread };
    let lng = settings.base_lng + if index % 3 == 0 { spread } else { -spread / 2.0 };
    (lat, lng)
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn battery(position: &Position) -> u8 {
        position.attributes.battery_percent().unwrap()
    }

    #[test]
    fn test_initial_frame_shape() {
        let now = Utc::now();
        let frame = DemoSimulator::new(DemoSettings::default(), now).frame();

        assert_eq!(frame.devices.len(), 6);
        assert_eq!(frame.devices.len(), frame.positions.len());
        assert!(frame
            .positions
            .iter()
            .all(|p| p.latitude.is_finite() && p.longitude.is_finite()));
        for (device, position) in frame.devices.iter().zip(&frame.positions) {
            assert_eq!(device.id, position.device_id);
        }
    }

    #[test]
    fn test_initial_frame_is_reproducible() {
        let now = Utc::now();
        let a = DemoSimulator::new(DemoSettings::default(), now).frame();
        let b = DemoSimulator::new(DemoSettings { seed: 99, ..DemoSettings::default() }, now).frame();
        assert_eq!(a, b);
    }

    #[test]
    fn test_step_moves_and_drains() {
        let now = Utc::now();
        let settings = DemoSettings::default();
        let mut simulator = DemoSimulator::new(settings.clone(), now);
        let before = simulator.frame();

        let later = now + Duration::seconds(5);
        simulator.step(later);
        let after = simulator.frame();

        assert_eq!(before.devices, after.devices);
        assert_eq!(battery(&after.positions[0]), battery(&before.positions[0]));
        for (old, new) in before.positions.iter().zip(&after.positions).skip(1) {
            assert_eq!(battery(new), battery(old) - 1);
        }
        for (old, new) in before.positions.iter().zip(&after.positions) {
            assert!(new.latitude.is_finite() && new.longitude.is_finite());
            assert!((new.latitude - old.latitude).abs() <= settings.max_step_degrees + 1e-12);
            assert!((new.longitude - old.longitude).abs() <= settings.max_step_degrees + 1e-12);
            assert_eq!(new.device_time, format_time(later));
            assert_ne!(new.id, old.id);
        }
    }

    #[test]
    fn test_battery_floor() {
        let settings = DemoSettings {
            device_count: 3,
            ..DemoSettings::default()
        };
        let mut simulator = DemoSimulator::new(settings, Utc::now());

        for _ in 0..200 {
            simulator.step(Utc::now());
        }

        let frame = simulator.frame();
        assert_eq!(battery(&frame.positions[0]), 100);
        assert_eq!(battery(&frame.positions[1]), 5);
        assert_eq!(battery(&frame.positions[2]), 5);
    }

    #[test]
    fn test_same_seed_same_walk() {
        let now = Utc::now();
        let mut a = DemoSimulator::new(DemoSettings::default(), now);
        let mut b = DemoSimulator::new(DemoSettings::default(), now);
        a.step(now);
        b.step(now);
        assert_eq!(a.frame(), b.frame());
    }
}
