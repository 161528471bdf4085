// Position index - joins the device snapshot with the latest position reports
use crate::domain::device::{Device, Position};
use crate::domain::view::{self, DerivedRow, DeviceStatus, PLACEHOLDER};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Optional age thresholds. With neither set, any known position is `Green`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatusPolicy {
    pub attention_after: Option<Duration>,
    pub offline_after: Option<Duration>,
}

impl StatusPolicy {
    fn status_for(&self, position: &Position, now: DateTime<Utc>) -> DeviceStatus {
        if self.attention_after.is_none() && self.offline_after.is_none() {
            return DeviceStatus::Green;
        }

        let Some(age) = view::parse_timestamp(&position.device_time).map(|time| now - time) else {
            // Unknown age counts as stale once any threshold is configured
            return if self.offline_after.is_some() {
                DeviceStatus::Red
            } else {
                DeviceStatus::Yellow
            };
        };

        if self.offline_after.is_some_and(|limit| age > limit) {
            DeviceStatus::Red
        } else if self.attention_after.is_some_and(|limit| age > limit) {
            DeviceStatus::Yellow
        } else {
            DeviceStatus::Green
        }
    }
}

/// Latest position per device id. Later entries in batch order replace earlier ones.
#[derive(Debug, Default)]
pub struct PositionIndex<'a> {
    latest: HashMap<i64, &'a Position>,
}

impl<'a> PositionIndex<'a> {
    pub fn build(positions: &'a [Position]) -> Self {
        let mut latest = HashMap::with_capacity(positions.len());
        for position in positions {
            latest.insert(position.device_id, position);
        }
        Self { latest }
    }

    pub fn latest(&self, device_id: i64) -> Option<&'a Position> {
        self.latest.get(&device_id).copied()
    }

}

/// One row per device, in device order.
pub fn derive_rows(
    devices: &[Device],
    positions: &[Position],
    now: DateTime<Utc>,
    policy: &StatusPolicy,
) -> Vec<DerivedRow> {
    let index = PositionIndex::build(positions);

    devices
        .iter()
        .map(|device| match index.latest(device.id) {
            Some(position) => DerivedRow {
                device_id: device.id,
                label: device.label(),
                status: policy.status_for(position, now),
                last_seen_text: view::last_seen_text(&position.device_time, now),
                battery_text: view::battery_text(position.attributes.battery_percent()),
                lat: Some(position.latitude),
                lng: Some(position.longitude),
            },
            None => DerivedRow {
                device_id: device.id,
                label: device.label(),
                status: DeviceStatus::Gray,
                last_seen_text: PLACEHOLDER.to_string(),
                battery_text: PLACEHOLDER.to_string(),
                lat: None,
                lng: None,
            },
        })
        .collect()
}
