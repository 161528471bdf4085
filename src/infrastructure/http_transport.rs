// reqwest-backed transport implementation
use crate::application::transport::{AuthMode, CallRequest, Method, Transport, TransportError};
use crate::infrastructure::config::{AuthSettings, BackendSettings};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a client with a cookie store, seeded with the configured session cookie.
    pub fn new(auth: &AuthSettings, backend: &BackendSettings) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        if let Some(cookie) = auth.session_cookie.as_deref() {
            for base in [&backend.proxy_url, &backend.direct_url] {
                let url: reqwest::Url = base
                    .parse()
                    .with_context(|| format!("Invalid backend URL: {}", base))?;
                jar.add_cookie_str(cookie, &url);
            }
        }

        let client = reqwest::Client::builder()
            .cookie_provider(jar)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }

    fn method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, endpoint: &str, request: CallRequest) -> Result<Option<Value>, TransportError> {
        if request.auth == AuthMode::None {
            tracing::debug!("Offline mode, not calling {}", endpoint);
            return Ok(None);
        }

        let mut builder = self.client.request(Self::method(request.method), endpoint);
        if let AuthMode::Bearer(token) = &request.auth {
            builder = builder.bearer_auth(token);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                body_text,
            });
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("json"))
            .unwrap_or(false);
        if !is_json {
            tracing::debug!("Non-JSON response from {}, treating as empty", endpoint);
            return Ok(None);
        }

        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| TransportError::Payload(format!("invalid JSON from {}: {}", endpoint, e)))
    }
}
