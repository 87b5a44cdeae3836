//! # Proxmox VE client
//!
//! A small blocking client for the parts of the Proxmox VE REST API that
//! proxbot drives: the cluster resource inventory, per-machine status and
//! configuration, power actions, cloning, deletion, snapshots and RRD
//! metrics.
//!
//! ```no_run
//! use proxbot_common::Hypervisor;
//! use proxbot_sdk::{ApiToken, HypervisorClient};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HypervisorClient::new(
//!     "pve.lan",
//!     ApiToken::new("root@pam", "proxbot", "00000000-0000-0000-0000-000000000000"),
//! )?;
//!
//! for resource in client.cluster_resources()? {
//!     println!("{} on {}", resource.vmid, resource.node);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Transport
//!
//! | Concern | Behavior |
//! |---------|----------|
//! | Auth | `Authorization: PVEAPIToken=user!name=value` on every request |
//! | TLS | certificate validation disabled (self-signed cluster certs) |
//! | Bodies | form-encoded, responses unwrapped from `{"data": ...}` |
//! | Timeout | 30s per request unless built with [`HypervisorClient::with_base_url`] |
//!
//! Every call blocks the calling thread. Async callers are expected to hop
//! onto a blocking pool first.

use std::time::Duration;

use proxbot_common::{
    CloneRequest, ClusterResource, Hypervisor, MachineConfig, MachineKind, MachineRef,
    MachineStatus, MetricSample, PowerAction, ProxbotError, Snapshot, Timeframe,
};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

const DEFAULT_PORT: u16 = 8006;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Invalid client configuration: {0}")]
    Config(String),
}

impl From<SdkError> for ProxbotError {
    fn from(err: SdkError) -> Self {
        match err {
            SdkError::Http(e) => ProxbotError::Http(e.to_string()),
            SdkError::Serialization(e) => ProxbotError::Decode(e.to_string()),
            SdkError::Api { status, message } => ProxbotError::Api { status, message },
            SdkError::Config(msg) => ProxbotError::Config(msg),
        }
    }
}

/// API token credentials (`user@realm!token_name` plus its secret).
#[derive(Clone)]
pub struct ApiToken {
    pub user: String,
    pub token_name: String,
    pub token_value: String,
}

impl ApiToken {
    pub fn new(
        user: impl Into<String>,
        token_name: impl Into<String>,
        token_value: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            token_name: token_name.into(),
            token_value: token_value.into(),
        }
    }

    fn header_value(&self) -> String {
        format!(
            "PVEAPIToken={}!{}={}",
            self.user, self.token_name, self.token_value
        )
    }
}

impl std::fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiToken")
            .field("user", &self.user)
            .field("token_name", &self.token_name)
            .field("token_value", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Blocking Proxmox VE API client.
///
/// Cheap to share behind an `Arc`; the underlying connection pool is reused
/// across calls.
pub struct HypervisorClient {
    client: Client,
    base_url: String,
}

impl HypervisorClient {
    /// Connects to `host`, which may be a bare hostname (port 8006 and https
    /// are assumed), `host:port`, or a full URL.
    pub fn new(host: &str, token: ApiToken) -> Result<Self, SdkError> {
        Self::with_base_url(normalize_base_url(host), token, DEFAULT_TIMEOUT)
    }

    /// Builds a client against an explicit base URL (`scheme://host:port`).
    pub fn with_base_url(
        base_url: String,
        token: ApiToken,
        timeout: Duration,
    ) -> Result<Self, SdkError> {
        let mut auth = HeaderValue::from_str(&token.header_value())
            .map_err(|e| SdkError::Config(format!("invalid API token: {e}")))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api2/json/{}", self.base_url, path)
    }

    fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, SdkError> {
        debug!(path, "GET");
        let request = self.client.get(self.url(path)).query(query);
        Self::send(request)
    }

    fn post(&self, path: &str, form: &[(&str, String)]) -> Result<(), SdkError> {
        debug!(path, "POST");
        let request = self.client.post(self.url(path)).form(form);
        Self::send::<serde_json::Value>(request).map(|_| ())
    }

    fn put(&self, path: &str, form: &[(&str, String)]) -> Result<(), SdkError> {
        debug!(path, "PUT");
        let request = self.client.put(self.url(path)).form(form);
        Self::send::<serde_json::Value>(request).map(|_| ())
    }

    fn delete(&self, path: &str) -> Result<(), SdkError> {
        debug!(path, "DELETE");
        let request = self.client.delete(self.url(path));
        Self::send::<serde_json::Value>(request).map(|_| ())
    }

    fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, SdkError> {
        let response = request.send()?;
        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            return Err(SdkError::Api {
                status: status.as_u16(),
                message: error_message(&body)
                    .or_else(|| status.canonical_reason().map(str::to_string))
                    .unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        let envelope: Envelope<T> = serde_json::from_str(&body)?;
        Ok(envelope.data)
    }
}

impl Hypervisor for HypervisorClient {
    fn cluster_resources(&self) -> proxbot_common::Result<Vec<ClusterResource>> {
        Ok(self.get("cluster/resources", &[("type", "vm")])?)
    }

    fn machine_status(&self, machine: &MachineRef) -> proxbot_common::Result<MachineStatus> {
        Ok(self.get(&format!("{}/status/current", machine.api_path()), &[])?)
    }

    fn machine_config(&self, machine: &MachineRef) -> proxbot_common::Result<MachineConfig> {
        Ok(self.get(&format!("{}/config", machine.api_path()), &[])?)
    }

    fn update_config(
        &self,
        machine: &MachineRef,
        cores: u32,
        memory_mb: u32,
    ) -> proxbot_common::Result<()> {
        let path = format!("{}/config", machine.api_path());
        let form = [("cores", cores.to_string()), ("memory", memory_mb.to_string())];
        // QEMU accepts an async POST; containers only take PUT.
        match machine.kind {
            MachineKind::Vm => self.post(&path, &form)?,
            MachineKind::Container => self.put(&path, &form)?,
        }
        Ok(())
    }

    fn power(&self, machine: &MachineRef, action: PowerAction) -> proxbot_common::Result<()> {
        let path = format!("{}/status/{}", machine.api_path(), action.as_str());
        Ok(self.post(&path, &[])?)
    }

    fn clone_machine(
        &self,
        template: &MachineRef,
        request: &CloneRequest,
    ) -> proxbot_common::Result<()> {
        let name_field = match template.kind {
            MachineKind::Vm => "name",
            MachineKind::Container => "hostname",
        };
        let mut form = vec![
            ("newid", request.new_id.to_string()),
            (name_field, request.name.clone()),
            ("full", if request.full { "1" } else { "0" }.to_string()),
        ];
        if let Some(target) = &request.target_node {
            form.push(("target", target.clone()));
        }
        Ok(self.post(&format!("{}/clone", template.api_path()), &form)?)
    }

    fn delete_machine(&self, machine: &MachineRef) -> proxbot_common::Result<()> {
        Ok(self.delete(&machine.api_path())?)
    }

    fn create_snapshot(&self, machine: &MachineRef, name: &str) -> proxbot_common::Result<()> {
        let path = format!("{}/snapshot", machine.api_path());
        Ok(self.post(&path, &[("snapname", name.to_string())])?)
    }

    fn list_snapshots(&self, machine: &MachineRef) -> proxbot_common::Result<Vec<Snapshot>> {
        Ok(self.get(&format!("{}/snapshot", machine.api_path()), &[])?)
    }

    fn rollback_snapshot(&self, machine: &MachineRef, name: &str) -> proxbot_common::Result<()> {
        let path = format!(
            "{}/snapshot/{}/rollback",
            machine.api_path(),
            urlencoding::encode(name)
        );
        Ok(self.post(&path, &[])?)
    }

    fn rrd_data(
        &self,
        machine: &MachineRef,
        timeframe: Timeframe,
    ) -> proxbot_common::Result<Vec<MetricSample>> {
        let path = format!("{}/rrddata", machine.api_path());
        Ok(self.get(&path, &[("timeframe", timeframe.as_str())])?)
    }
}

fn normalize_base_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else if host.contains(':') {
        format!("https://{host}")
    } else {
        format!("https://{host}:{DEFAULT_PORT}")
    }
}

/// Pulls a readable message out of an error body. Parameter validation
/// failures come back as `{"errors": {"field": "reason"}}`.
fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value) => {
            if let Some(errors) = value.get("errors").and_then(|e| e.as_object()) {
                let mut parts: Vec<String> = errors
                    .iter()
                    .map(|(field, reason)| {
                        let reason = reason
                            .as_str()
                            .map(str::to_string)
                            .unwrap_or_else(|| reason.to_string());
                        format!("{field}: {}", reason.trim())
                    })
                    .collect();
                parts.sort();
                return Some(parts.join("; "));
            }
            if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
                return Some(message.trim().to_string());
            }
            None
        }
        Err(_) => Some(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("pve.lan"), "https://pve.lan:8006");
        assert_eq!(normalize_base_url("10.0.0.5:443"), "https://10.0.0.5:443");
        assert_eq!(
            normalize_base_url("http://127.0.0.1:1234/"),
            "http://127.0.0.1:1234"
        );
    }

    #[test]
    fn test_error_message_formats() {
        assert_eq!(
            error_message(r#"{"data":null,"errors":{"memory":"value must be >= 16"}}"#).as_deref(),
            Some("memory: value must be >= 16")
        );
        assert_eq!(error_message(r#"{"data":null}"#), None);
        assert_eq!(error_message("").as_deref(), None);
        assert_eq!(
            error_message("no such VM").as_deref(),
            Some("no such VM")
        );
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = ApiToken::new("root@pam", "bot", "secret");
        let debug = format!("{token:?}");
        assert!(!debug.contains("secret"));
        assert_eq!(token.header_value(), "PVEAPIToken=root@pam!bot=secret");
    }
}
