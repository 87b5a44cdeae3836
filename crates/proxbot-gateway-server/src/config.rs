use std::net::SocketAddr;
use std::path::PathBuf;

use proxbot_orchestrator::bridge::DEFAULT_MAX_BLOCKING_CALLS;
use proxbot_orchestrator::watchlist::DEFAULT_WATCHLIST_PATH;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Everything the binary reads from the environment, loaded once at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub proxmox_host: String,
    pub proxmox_user: String,
    pub proxmox_token_name: String,
    pub proxmox_token_value: String,
    pub default_node: Option<String>,
    pub admin_category_id: u64,
    pub alert_channel_id: Option<u64>,
    pub alert_webhook_url: Option<String>,
    pub renderer_url: Option<String>,
    pub monitor_seed: Vec<u32>,
    pub watchlist_path: PathBuf,
    pub listen_addr: SocketAddr,
    pub max_blocking_calls: usize,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Empty values count as
    /// unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let host = get("PROXBOT_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or("PROXBOT_PORT", get("PROXBOT_PORT"), 8080u16)?;
        let listen_addr = format!("{host}:{port}")
            .parse()
            .map_err(|_| ConfigError::Invalid {
                name: "PROXBOT_HOST",
                value: host.clone(),
            })?;

        Ok(Self {
            proxmox_host: required("PROXMOX_HOST")?,
            proxmox_user: required("PROXMOX_USER")?,
            proxmox_token_name: required("PROXMOX_TOKEN_NAME")?,
            proxmox_token_value: required("PROXMOX_TOKEN_VALUE")?,
            default_node: get("PROXMOX_NODE"),
            admin_category_id: parse("PROXBOT_ADMIN_CATEGORY_ID", required("PROXBOT_ADMIN_CATEGORY_ID")?)?,
            alert_channel_id: get("PROXBOT_ALERT_CHANNEL_ID")
                .map(|v| parse("PROXBOT_ALERT_CHANNEL_ID", v))
                .transpose()?,
            alert_webhook_url: get("PROXBOT_ALERT_WEBHOOK_URL"),
            renderer_url: get("PROXBOT_RENDERER_URL"),
            monitor_seed: parse_ids(get("PROXBOT_MONITOR_IDS").as_deref().unwrap_or(""))?,
            watchlist_path: get("PROXBOT_WATCHLIST_PATH")
                .unwrap_or_else(|| DEFAULT_WATCHLIST_PATH.to_string())
                .into(),
            listen_addr,
            max_blocking_calls: parse_or(
                "PROXBOT_MAX_BLOCKING_CALLS",
                get("PROXBOT_MAX_BLOCKING_CALLS"),
                DEFAULT_MAX_BLOCKING_CALLS,
            )?,
        })
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    value.map_or(Ok(default), |v| parse(name, v))
}

/// Comma-separated machine ids, e.g. `100,101, 105`.
fn parse_ids(raw: &str) -> Result<Vec<u32>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse("PROXBOT_MONITOR_IDS", s.to_string()))
        .collect()
}
