//! ---
//! culvert_section: "02-control-client"
//! culvert_subsection: "module"
//! culvert_type: "source"
//! culvert_scope: "code"
//! culvert_description: "Typed HTTP transport for the control endpoint."
//! culvert_version: "v0.1.0"
//! culvert_owner: "tbd"
//! ---
use std::time::Duration;

use culvert_proto::{ApiResponse, Config, ControlAction, LogEntry, ServiceStatus};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::error::TransportError;

const API_PREFIX: &str = "/api";

// Keep slow or wedged agents from stalling callers indefinitely.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Typed client for one agent's control endpoint.
///
/// Every method returns the decoded envelope: a reachable agent that reports
/// `success == false` is a normal result, not an error. [`TransportError`]
/// is reserved for requests that never produced a decodable envelope.
#[derive(Debug, Clone)]
pub struct ControlClient {
    http: reqwest::Client,
    base: Url,
}

impl ControlClient {
    /// Build a client for `base_url`, e.g. `http://127.0.0.1:8080`.
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let base = Url::parse(base_url)?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(TransportError::Network)?;
        Ok(Self { http, base })
    }

    /// The configured endpoint base.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Current status of the supervised unit.
    pub async fn status(&self) -> Result<ApiResponse<ServiceStatus>, TransportError> {
        self.get("/service/status").await
    }

    /// Dispatch a lifecycle action. Permission checks belong to the caller;
    /// this is the raw wire call.
    pub async fn control(&self, action: ControlAction) -> Result<ApiResponse<()>, TransportError> {
        self.post(&format!("/service/{}", action.verb()), None::<&()>)
            .await
    }

    /// Recent journal entries for the unit, oldest first.
    pub async fn recent_logs(&self) -> Result<ApiResponse<Vec<LogEntry>>, TransportError> {
        self.get("/service/logs/recent").await
    }

    /// The agent's configuration document.
    pub async fn fetch_config(&self) -> Result<ApiResponse<Config>, TransportError> {
        self.get("/config").await
    }

    /// Replace the agent's configuration document.
    pub async fn update_config(&self, config: &Config) -> Result<ApiResponse<()>, TransportError> {
        self.post("/config", Some(config)).await
    }

    /// Liveness probe of the control endpoint itself.
    pub async fn health(&self) -> Result<ApiResponse<()>, TransportError> {
        self.get("/health").await
    }

    /// WebSocket URL of the live log stream, derived from the base URL.
    pub fn log_stream_url(&self) -> Result<Url, TransportError> {
        let mut url = self.endpoint("/service/logs")?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|()| TransportError::Url(format!("cannot derive stream url from {}", self.base)))?;
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        Ok(self.base.join(&format!("{API_PREFIX}{path}"))?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<ApiResponse<T>, TransportError> {
        let url = self.endpoint(path)?;
        self.send(self.http.get(url)).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<ApiResponse<T>, TransportError> {
        let url = self.endpoint(path)?;
        let mut request = self.http.post(url);
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send(request).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<ApiResponse<T>, TransportError> {
        let response = request.send().await.map_err(TransportError::Network)?;
        let status = response.status();
        let body = response.bytes().await.map_err(TransportError::Network)?;

        match serde_json::from_slice::<ApiResponse<T>>(&body) {
            Ok(envelope) => Ok(envelope),
            Err(err) if status.is_success() => Err(TransportError::Decode(err)),
            Err(_) => Err(TransportError::Http(format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("error")
            ))),
        }
    }
}
