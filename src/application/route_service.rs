// Route service - rolling-window route history for one device
use crate::application::fallback::{first_success, FallbackError, Strategy};
use crate::application::payload::decode_list;
use crate::application::transport::{AuthMode, CallRequest, Transport, TransportError};
use crate::domain::device::RoutePoint;
use crate::domain::geo::LatLng;
use crate::infrastructure::config::{endpoint_url, BackendSettings};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct RouteEndpoint {
    pub name: String,
    pub url: String,
    /// The direct backend answers with a spreadsheet unless JSON is asked for.
    pub force_json: bool,
}

impl Strategy for RouteEndpoint {
    fn name(&self) -> &str {
        &self.name
    }
}

impl RouteEndpoint {
    pub fn from_settings(backend: &BackendSettings) -> Vec<Self> {
        vec![
            Self {
                name: "proxy".to_string(),
                url: endpoint_url(&backend.proxy_url, &backend.route_path),
                force_json: false,
            },
            Self {
                name: "direct".to_string(),
                url: endpoint_url(&backend.direct_url, &backend.route_path),
                force_json: true,
            },
        ]
    }

    fn query_url(&self, device_id: i64, from: DateTime<Utc>, to: DateTime<Utc>) -> String {
        let from = from.to_rfc3339_opts(SecondsFormat::Millis, true);
        let to = to.to_rfc3339_opts(SecondsFormat::Millis, true);
        format!(
            "{}?deviceId={}&from={}&to={}",
            self.url,
            device_id,
            urlencoding::encode(&from),
            urlencoding::encode(&to)
        )
    }
}

#[derive(Clone)]
pub struct RouteService {
    transport: Arc<dyn Transport>,
    endpoints: Vec<RouteEndpoint>,
    window: Duration,
}

impl RouteService {
    pub fn new(transport: Arc<dyn Transport>, endpoints: Vec<RouteEndpoint>, window: Duration) -> Self {
        Self {
            transport,
            endpoints,
            window,
        }
    }

    /// Route points for `device_id` over the window ending at `now`.
    pub async fn fetch_route(
        &self,
        device_id: i64,
        auth: &AuthMode,
        now: DateTime<Utc>,
    ) -> Result<Vec<LatLng>, FallbackError> {
        let from = now - self.window;
        let attempt = first_success(&self.endpoints, |endpoint| {
            self.fetch_from(endpoint, device_id, auth, from, now)
        })
        .await?;

        tracing::debug!(
            "Route for device {} has {} points (via {})",
            device_id,
            attempt.value.len(),
            self.endpoints[attempt.strategy].name
        );
        Ok(attempt.value)
    }

    async fn fetch_from(
        &self,
        endpoint: &RouteEndpoint,
        device_id: i64,
        auth: &AuthMode,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LatLng>, TransportError> {
        let mut request = CallRequest::get(auth.clone());
        if endpoint.force_json {
            request = request.with_header("Accept", "application/json");
        }

        let payload = self
            .transport
            .call(&endpoint.query_url(device_id, from, to), request)
            .await?;
        let points: Vec<RoutePoint> = decode_list(payload, "route points")?;

        Ok(points
            .into_iter()
            .map(|p| LatLng::new(p.latitude, p.longitude))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::transport::testing::ScriptedTransport;
    use chrono::TimeZone;
    use serde_json::json;

    fn service(transport: &ScriptedTransport) -> RouteService {
        let backend = BackendSettings {
            proxy_url: "http://proxy/api".to_string(),
            direct_url: "http://direct/api".to_string(),
            ..BackendSettings::default()
        };
        RouteService::new(
            Arc::new(transport.clone()),
            RouteEndpoint::from_settings(&backend),
            Duration::hours(24),
        )
    }

    #[test]
    fn test_query_url_encodes_window() {
        let endpoint = RouteEndpoint {
            name: "proxy".to_string(),
            url: "http://proxy/api/reports/route".to_string(),
            force_json: false,
        };
        let to = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let url = endpoint.query_url(7, to - Duration::hours(24), to);
        assert_eq!(
            url,
            "http://proxy/api/reports/route?deviceId=7&from=2026-10-17T12%3A00%3A00.000Z&to=2026-10-18T12%3A00%3A00.000Z"
        );
    }

    #[tokio::test]
    async fn test_direct_fallback_forces_json() {
        let transport = ScriptedTransport::new();
        transport.respond("http://proxy/api/reports/route", Err(TransportError::Network("down".to_string())));
        transport.respond(
            "http://direct/api/reports/route",
            Ok(Some(json!([
                { "latitude": 1.0, "longitude": 2.0, "speed": 0 },
                { "latitude": 1.1, "longitude": 2.1 }
            ]))),
        );

        let points = service(&transport)
            .fetch_route(7, &AuthMode::Session, Utc::now())
            .await
            .unwrap();
        assert_eq!(points, vec![LatLng::new(1.0, 2.0), LatLng::new(1.1, 2.1)]);

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].request.headers.is_empty());
        assert!(calls[1].endpoint.contains("deviceId=7"));
        assert_eq!(
            calls[1].request.headers,
            vec![("Accept".to_string(), "application/json".to_string())]
        );
    }

    #[tokio::test]
    async fn test_spreadsheet_response_reads_as_empty_route() {
        let transport = ScriptedTransport::new();
        transport.respond("http://proxy/api/reports/route", Ok(None));

        let points = service(&transport)
            .fetch_route(3, &AuthMode::Session, Utc::now())
            .await
            .unwrap();
        assert!(points.is_empty());
        assert_eq!(transport.calls().len(), 1);
    }
}
