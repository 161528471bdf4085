// Tracking domain models - devices, position reports and route points
use serde::{Deserialize, Serialize};

/// Entries that must be checked after deserialization before they enter the core.
pub trait Validate: Sized {
    /// Returns the normalized entry, or `None` if it must be dropped.
    fn validate(self) -> Option<Self>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unique_id: String,
}

impl Device {
    pub fn new(id: i64, name: impl Into<String>, unique_id: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            unique_id: unique_id.into(),
        }
    }

    /// Display label: name, then unique id, then `#<id>`.
    pub fn label(&self) -> String {
        let name = self.name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
        let unique_id = self.unique_id.trim();
        if !unique_id.is_empty() {
            return unique_id.to_string();
        }
        format!("#{}", self.id)
    }
}

impl Validate for Device {
    fn validate(self) -> Option<Self> {
        Some(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PositionAttributes {
    pub fn with_battery(level: u8) -> Self {
        Self {
            battery_level: Some(f64::from(level)),
            extra: serde_json::Map::new(),
        }
    }

    /// Battery level rounded and clamped to 0-100.
    pub fn battery_percent(&self) -> Option<u8> {
        self.battery_level
            .filter(|level| level.is_finite())
            .map(|level| level.round().clamp(0.0, 100.0) as u8)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: i64,
    pub device_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    /// ISO-8601 timestamp as reported by the device.
    #[serde(default)]
    pub device_time: String,
    #[serde(default)]
    pub attributes: PositionAttributes,
}

impl Validate for Position {
    fn validate(mut self) -> Option<Self> {
        if !valid_coordinate(self.latitude, self.longitude) {
            return None;
        }
        // Battery is stored as a whole percentage
        self.attributes.battery_level = self
            .attributes
            .battery_percent()
            .map(f64::from);
        Some(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl Validate for RoutePoint {
    fn validate(self) -> Option<Self> {
        valid_coordinate(self.latitude, self.longitude).then_some(self)
    }
}

/// One coherent device/position pair, as delivered by a poll or a demo step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub devices: Vec<Device>,
    pub positions: Vec<Position>,
}

fn valid_coordinate(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
}
