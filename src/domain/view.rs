// Derived per-device view state
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const PLACEHOLDER: &str = "--";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Green,
    Yellow,
    Red,
    Gray,
}

impl DeviceStatus {
    /// Fixed marker palette.
    pub fn color(self) -> &'static str {
        match self {
            DeviceStatus::Green => "#16a34a",
            DeviceStatus::Yellow => "#eab308",
            DeviceStatus::Red => "#dc2626",
            DeviceStatus::Gray => "#9ca3af",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedRow {
    pub device_id: i64,
    pub label: String,
    pub status: DeviceStatus,
    pub last_seen_text: String,
    pub battery_text: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl DerivedRow {
    pub fn popup_text(&self) -> String {
        let coordinates = match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => format!("{:.5}, {:.5}", lat, lng),
            _ => PLACEHOLDER.to_string(),
        };
        format!(
            "{}\nLast seen: {}\nBattery: {}\n{}",
            self.label, self.last_seen_text, self.battery_text, coordinates
        )
    }
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|time| time.with_timezone(&Utc))
}

/// Buckets the time elapsed since `raw` into `now`, `N min`, `N h` or `N d`.
pub fn last_seen_text(raw: &str, now: DateTime<Utc>) -> String {
    let Some(time) = parse_timestamp(raw) else {
        return PLACEHOLDER.to_string();
    };

    let minutes = (now - time).num_milliseconds() as f64 / 60_000.0;
    if minutes < 1.0 {
        return "now".to_string();
    }
    if minutes < 60.0 {
        return format!("{} min", minutes.round());
    }
    let hours = minutes / 60.0;
    if hours < 24.0 {
        return format!("{} h", hours.round());
    }
    format!("{} d", (hours / 24.0).round())
}

pub fn battery_text(percent: Option<u8>) -> String {
    match percent {
        Some(percent) => format!("{}%", percent),
        None => PLACEHOLDER.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, SecondsFormat};

    fn ago(now: DateTime<Utc>, delta: Duration) -> String {
        (now - delta).to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    #[test]
    fn test_last_seen_buckets() {
        let now = Utc::now();
        assert_eq!(last_seen_text(&ago(now, Duration::seconds(0)), now), "now");
        assert_eq!(last_seen_text(&ago(now, Duration::seconds(59)), now), "now");
        assert_eq!(last_seen_text(&ago(now, Duration::minutes(5)), now), "5 min");
        assert_eq!(last_seen_text(&ago(now, Duration::minutes(90)), now), "2 h");
        assert_eq!(last_seen_text(&ago(now, Duration::hours(23)), now), "23 h");
        assert_eq!(last_seen_text(&ago(now, Duration::hours(60)), now), "3 d");
    }

    #[test]
    fn test_future_timestamp_reads_now() {
        let now = Utc::now();
        assert_eq!(last_seen_text(&ago(now, Duration::minutes(-10)), now), "now");
    }

    #[test]
    fn test_unparseable_timestamp() {
        let now = Utc::now();
        assert_eq!(last_seen_text("yesterday-ish", now), "--");
        assert_eq!(last_seen_text("", now), "--");
    }

    #[test]
    fn test_battery_text() {
        assert_eq!(battery_text(Some(42)), "42%");
        assert_eq!(battery_text(None), "--");
    }
}
