use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{CollectorError, Result};
use crate::types::{ConnectionPayload, ConnectionRecord, StatsSnapshot};

const METRICS_PATH: &str = "/api/ids/metrics";
const CONNECTIONS_PATH: &str = "/api/ids/connections";
const MODEL_SWITCH_PATH: &str = "/api/ids/model-switch";

#[derive(Debug, Serialize)]
struct StatsEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: &'a StatsSnapshot,
}

#[derive(Debug, Default, Deserialize)]
struct SwitchResponse {
    #[serde(default)]
    request: Option<SwitchRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwitchRequest {
    #[serde(default)]
    model_type: Option<String>,
}

/// Body of a stats push.
pub fn stats_payload(snapshot: &StatsSnapshot) -> serde_json::Value {
    serde_json::to_value(StatsEnvelope { kind: "stats", data: snapshot }).unwrap_or_default()
}

/// Body of a connection push.
pub fn connection_payload(conn: &ConnectionRecord) -> serde_json::Value {
    serde_json::to_value(ConnectionPayload::from(conn)).unwrap_or_default()
}

/// Extracts the requested model type from a model-switch poll response.
pub fn parse_switch_request(body: &str) -> Option<String> {
    let parsed: SwitchResponse = serde_json::from_str(body).ok()?;
    parsed
        .request?
        .model_type
        .filter(|t| !t.is_empty())
}

/// Blocking HTTP client for the monitoring dashboard.
#[derive(Debug, Clone)]
pub struct DashboardClient {
    base_url: String,
    http: Client,
}

impl DashboardClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("kdd-collector/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn post(&self, path: &str, body: &serde_json::Value) -> Result<()> {
        let resp = self.http.post(self.url(path)).json(body).send()?;
        if resp.status() != StatusCode::OK {
            return Err(CollectorError::HttpStatus(resp.status().as_u16()));
        }
        Ok(())
    }

    pub fn send_stats(&self, snapshot: &StatsSnapshot) -> Result<()> {
        self.post(METRICS_PATH, &stats_payload(snapshot))?;
        debug!("Sent stats to dashboard");
        Ok(())
    }

    pub fn send_connection(&self, conn: &ConnectionRecord) -> Result<()> {
        self.post(CONNECTIONS_PATH, &connection_payload(conn))?;
        debug!(key = %conn.key, "Sent connection to dashboard");
        Ok(())
    }

    /// Returns the pending model-switch request, if any.
    pub fn poll_model_switch(&self) -> Result<Option<String>> {
        let resp = self.http.get(self.url(MODEL_SWITCH_PATH)).send()?;
        if resp.status() != StatusCode::OK {
            return Ok(None);
        }
        let body = resp.text()?;
        Ok(parse_switch_request(&body))
    }

    /// Clears the pending model-switch request.
    pub fn clear_model_switch(&self) -> Result<()> {
        self.http.delete(self.url(MODEL_SWITCH_PATH)).send()?;
        Ok(())
    }
}
