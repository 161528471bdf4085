// Transport trait for backend access
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Credential mode used for a single call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Adds an `Authorization: Bearer` header.
    Bearer(String),
    /// Relies on the client's cookie store.
    Session,
    /// Offline/demo. No network call is made.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct CallRequest {
    pub auth: AuthMode,
    pub method: Method,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl CallRequest {
    pub fn get(auth: AuthMode) -> Self {
        Self {
            auth,
            method: Method::Get,
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Send `body` as JSON in a POST.
    pub fn post(mut self, body: Value) -> Self {
        self.method = Method::Post;
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// The request never reached the backend or no response came back.
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status} {status_text}: {body_text}")]
    Http {
        status: u16,
        status_text: String,
        body_text: String,
    },
    /// The response claimed to be JSON but had the wrong shape.
    #[error("unexpected payload: {0}")]
    Payload(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one call. `Ok(None)` is an empty result (non-JSON or empty body).
    async fn call(&self, endpoint: &str, request: CallRequest) -> Result<Option<Value>, TransportError>;
}
