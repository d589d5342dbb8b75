use std::{
    net::SocketAddr,
    time::Duration,
};

use alloy_primitives::{
    Address,
    address,
};
use serde::{
    Deserialize,
    Serialize,
};
use url::Url;

use crate::error::{
    EndpointError,
    Result,
};

/// Probe contract that answers `eth_call` liveness checks (0xf1a54b075 -> "0xflashbots").
pub const DEFAULT_PROBE_CONTRACT: Address = address!("f1a54b0759b58661cea17cff19dd37940a9b5f1a");

/// Default request body limit (2 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Runtime configuration for the RPC endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Address the HTTP server listens on (e.g. `127.0.0.1:9000`).
    pub bind_addr: SocketAddr,
    /// JSON-RPC path exposed by the endpoint.
    pub rpc_path: String,
    /// Upstream Ethereum JSON-RPC node every non-intercepted call is forwarded to.
    pub upstream_http: Url,
    /// Client timeout for upstream forwarding.
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,
    /// Largest request body accepted from clients, in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Redis connection string. Without it, state lives in process memory.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Prefix for every Redis key written or read by the endpoint.
    #[serde(default = "default_redis_prefix")]
    pub redis_prefix: String,
    /// Interceptor configuration.
    #[serde(default)]
    pub intercept: InterceptConfig,
}

const fn default_upstream_timeout_secs() -> u64 {
    10
}

const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

fn default_redis_prefix() -> String {
    "rpc-endpoint".into()
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 9000)),
            rpc_path: "/".into(),
            upstream_http: Url::parse("http://127.0.0.1:8545").expect("static URL"),
            upstream_timeout_secs: default_upstream_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
            redis_url: None,
            redis_prefix: default_redis_prefix(),
            intercept: InterceptConfig::default(),
        }
    }
}

impl EndpointConfig {
    /// Validates a configuration loaded from CLI flags or disk.
    pub fn validate(self) -> Result<Self> {
        if self.rpc_path.is_empty() || !self.rpc_path.starts_with('/') {
            return Err(EndpointError::InvalidConfig(
                "rpc_path must start with '/'".to_string(),
            ));
        }
        if self.rpc_path == "/health" {
            return Err(EndpointError::InvalidConfig(
                "rpc_path must not shadow /health".to_string(),
            ));
        }
        if self.upstream_timeout_secs == 0 {
            return Err(EndpointError::InvalidConfig(
                "upstream_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(EndpointError::InvalidConfig(
                "max_body_bytes must be greater than zero".to_string(),
            ));
        }
        if self.redis_prefix.is_empty() {
            return Err(EndpointError::InvalidConfig(
                "redis_prefix must not be empty".to_string(),
            ));
        }
        self.intercept.validate()?;

        Ok(self)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

/// Knobs injected into the interceptor set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InterceptConfig {
    /// Base URL of the private transaction status API.
    #[serde(default = "default_tx_status_api")]
    pub tx_status_api: Url,
    /// Client timeout for tx status lookups.
    #[serde(default = "default_tx_status_timeout_secs")]
    pub tx_status_timeout_secs: u64,
    /// `eth_call` target answered locally with a fixed success word.
    #[serde(default = "default_probe_contract")]
    pub probe_contract: Address,
    /// Treat `UNKNOWN` tx status like `FAILED`. Only for deployments that never
    /// actually relay transactions.
    #[serde(default)]
    pub debug_unknown_as_failed: bool,
    /// How many times a spoofed nonce is returned before real values flow again.
    #[serde(default = "default_max_nonce_fix_responses")]
    pub max_nonce_fix_responses: u64,
    /// Only apply the nonce fix to requests coming from the MetaMask extension.
    #[serde(default = "default_nonce_fix_metamask_only")]
    pub nonce_fix_metamask_only: bool,
    /// Remove an account's nonce fix once one of its transactions lands successfully.
    #[serde(default)]
    pub clear_nonce_fix_on_success: bool,
}

fn default_tx_status_api() -> Url {
    Url::parse("https://protect.flashbots.net").expect("static URL")
}

const fn default_tx_status_timeout_secs() -> u64 {
    5
}

const fn default_probe_contract() -> Address {
    DEFAULT_PROBE_CONTRACT
}

// MetaMask flags a tx as dropped after a handful of nonce responses past it.
const fn default_max_nonce_fix_responses() -> u64 {
    4
}

const fn default_nonce_fix_metamask_only() -> bool {
    true
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            tx_status_api: default_tx_status_api(),
            tx_status_timeout_secs: default_tx_status_timeout_secs(),
            probe_contract: default_probe_contract(),
            debug_unknown_as_failed: false,
            max_nonce_fix_responses: default_max_nonce_fix_responses(),
            nonce_fix_metamask_only: default_nonce_fix_metamask_only(),
            clear_nonce_fix_on_success: false,
        }
    }
}

impl InterceptConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tx_status_timeout_secs == 0 {
            return Err(EndpointError::InvalidConfig(
                "tx_status_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.tx_status_api.cannot_be_a_base() {
            return Err(EndpointError::InvalidConfig(format!(
                "tx_status_api is not a base URL: {}",
                self.tx_status_api
            )));
        }
        Ok(())
    }

    pub fn tx_status_timeout(&self) -> Duration {
        Duration::from_secs(self.tx_status_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EndpointConfig::default().validate().unwrap();
        assert_eq!(config.upstream_timeout(), Duration::from_secs(10));
        assert_eq!(config.intercept.max_nonce_fix_responses, 4);
        assert!(config.intercept.nonce_fix_metamask_only);
        assert!(!config.intercept.clear_nonce_fix_on_success);
    }

    #[test]
    fn rejects_relative_rpc_path() {
        let config = EndpointConfig {
            rpc_path: "rpc".into(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EndpointError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_zero_timeouts() {
        let config = EndpointConfig {
            upstream_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = EndpointConfig::default();
        config.intercept.tx_status_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_body_limit() {
        let config = EndpointConfig {
            max_body_bytes: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EndpointError::InvalidConfig(_))
        ));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: EndpointConfig = serde_json::from_value(serde_json::json!({
            "bind_addr": "0.0.0.0:9000",
            "rpc_path": "/",
            "upstream_http": "http://localhost:8545",
            "intercept": { "debug_unknown_as_failed": true }
        }))
        .unwrap();

        assert_eq!(config.redis_prefix, "rpc-endpoint");
        assert_eq!(config.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert!(config.intercept.debug_unknown_as_failed);
        assert_eq!(config.intercept.probe_contract, DEFAULT_PROBE_CONTRACT);
        assert_eq!(config.intercept.max_nonce_fix_responses, 4);
    }
}
