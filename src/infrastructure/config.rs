use crate::application::position_index::StatusPolicy;
use crate::application::transport::AuthMode;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TrackerConfig {
    pub server: ServerSettings,
    pub backend: BackendSettings,
    pub auth: AuthSettings,
    pub polling: PollingSettings,
    pub demo: DemoSettings,
    pub map: MapSettings,
    pub status: StatusSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BackendSettings {
    /// Same-origin proxy in front of the tracking server, tried first.
    pub proxy_url: String,
    /// The tracking server itself.
    pub direct_url: String,
    pub devices_path: String,
    pub positions_path: String,
    pub route_path: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            proxy_url: "http://localhost:8082/api/traccar".to_string(),
            direct_url: "http://localhost:8082/api".to_string(),
            devices_path: "/devices".to_string(),
            positions_path: "/positions".to_string(),
            route_path: "/reports/route".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthKind {
    #[default]
    Demo,
    Bearer,
    Session,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AuthSettings {
    pub mode: AuthKind,
    pub token: Option<String>,
    /// `name=value` cookie installed for session mode.
    pub session_cookie: Option<String>,
}

impl AuthSettings {
    pub fn auth_mode(&self) -> anyhow::Result<AuthMode> {
        match self.mode {
            AuthKind::Demo => Ok(AuthMode::None),
            AuthKind::Session => Ok(AuthMode::Session),
            AuthKind::Bearer => match self.token.as_deref().map(str::trim) {
                Some(token) if !token.is_empty() => Ok(AuthMode::Bearer(token.to_string())),
                _ => anyhow::bail!("auth.mode = \"bearer\" requires auth.token"),
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollingSettings {
    pub live_interval_secs: u64,
    pub demo_interval_secs: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            live_interval_secs: 15,
            demo_interval_secs: 5,
        }
    }
}

impl PollingSettings {
    pub fn live_interval(&self) -> Duration {
        Duration::from_secs(self.live_interval_secs.max(1))
    }

    pub fn demo_interval(&self) -> Duration {
        Duration::from_secs(self.demo_interval_secs.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DemoSettings {
    pub device_count: usize,
    pub base_lat: f64,
    pub base_lng: f64,
    pub max_step_degrees: f64,
    pub min_battery: u8,
    pub seed: u64,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            device_count: 6,
            base_lat: -23.5614,
            base_lng: -46.6559,
            max_step_degrees: 0.0003,
            min_battery: 5,
            seed: 0x5eed,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapSettings {
    pub default_lat: f64,
    pub default_lng: f64,
    pub initial_zoom: f64,
    pub single_zoom: f64,
    pub fit_padding: f64,
    pub route_window_hours: i64,
    pub viewport_width_px: u32,
    pub viewport_height_px: u32,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            default_lat: -23.5614,
            default_lng: -46.6559,
            initial_zoom: 13.0,
            single_zoom: 16.0,
            fit_padding: 0.2,
            route_window_hours: 24,
            viewport_width_px: 1024,
            viewport_height_px: 640,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StatusSettings {
    pub attention_after_mins: Option<i64>,
    pub offline_after_mins: Option<i64>,
}

impl StatusSettings {
    pub fn policy(&self) -> StatusPolicy {
        StatusPolicy {
            attention_after: self.attention_after_mins.map(chrono::Duration::minutes),
            offline_after: self.offline_after_mins.map(chrono::Duration::minutes),
        }
    }
}

pub fn load_tracker_config() -> anyhow::Result<TrackerConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/tracker").required(false))
        .add_source(config::Environment::with_prefix("TRACKER").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Join a base URL and a path with exactly one slash between them
pub fn endpoint_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
