use alloy_primitives::Address;
use clap::Parser;
use rpc_endpoint::{
    EndpointConfig,
    InterceptConfig,
    RpcEndpointBuilder,
    config::{
        DEFAULT_MAX_BODY_BYTES,
        DEFAULT_PROBE_CONTRACT,
    },
};
use tracing_subscriber::{
    EnvFilter,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use url::Url;

#[derive(Debug, Parser)]
#[command(author, version, about = "Private-relay aware JSON-RPC endpoint", long_about = None)]
struct Cli {
    /// Address for the HTTP server (e.g. 0.0.0.0:9000)
    #[arg(long = "listen", env = "RPC_ENDPOINT_LISTEN", default_value = "127.0.0.1:9000")]
    listen_addr: String,
    /// JSON-RPC path exposed by the endpoint
    #[arg(long = "rpc-path", env = "RPC_ENDPOINT_RPC_PATH", default_value = "/")]
    rpc_path: String,
    /// Upstream Ethereum node HTTP endpoint
    #[arg(long = "upstream", env = "RPC_ENDPOINT_UPSTREAM", default_value = "http://127.0.0.1:8545")]
    upstream: String,
    /// Upstream client timeout in seconds
    #[arg(long = "upstream-timeout", env = "RPC_ENDPOINT_UPSTREAM_TIMEOUT", default_value = "10")]
    upstream_timeout_secs: u64,
    /// Largest accepted request body in bytes
    #[arg(long = "max-body-bytes", env = "RPC_ENDPOINT_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,
    /// Redis URL for nonce-fix and tx sender state; in-memory when unset
    #[arg(long = "redis-url", env = "RPC_ENDPOINT_REDIS_URL")]
    redis_url: Option<String>,
    /// Prefix for Redis keys
    #[arg(long = "redis-prefix", env = "RPC_ENDPOINT_REDIS_PREFIX", default_value = "rpc-endpoint")]
    redis_prefix: String,
    /// Base URL of the private transaction status API
    #[arg(long = "tx-status-api", env = "RPC_ENDPOINT_TX_STATUS_API", default_value = "https://protect.flashbots.net")]
    tx_status_api: String,
    /// Tx status API timeout in seconds
    #[arg(long = "tx-status-timeout", env = "RPC_ENDPOINT_TX_STATUS_TIMEOUT", default_value = "5")]
    tx_status_timeout_secs: u64,
    /// Contract whose eth_call is answered locally as a connectivity probe
    #[arg(long = "probe-contract", env = "RPC_ENDPOINT_PROBE_CONTRACT")]
    probe_contract: Option<Address>,
    /// Treat UNKNOWN tx status as FAILED (test deployments only)
    #[arg(long = "debug-unknown-as-failed", env = "RPC_ENDPOINT_DEBUG_UNKNOWN_AS_FAILED")]
    debug_unknown_as_failed: bool,
    /// Spoofed nonce responses before real values flow again
    #[arg(long = "max-nonce-fix-responses", env = "RPC_ENDPOINT_MAX_NONCE_FIX_RESPONSES", default_value = "4")]
    max_nonce_fix_responses: u64,
    /// Apply the nonce fix to every client, not only MetaMask
    #[arg(long = "nonce-fix-any-origin", env = "RPC_ENDPOINT_NONCE_FIX_ANY_ORIGIN")]
    nonce_fix_any_origin: bool,
    /// Drop an account's nonce fix once one of its transactions succeeds
    #[arg(long = "clear-nonce-fix-on-success", env = "RPC_ENDPOINT_CLEAR_NONCE_FIX_ON_SUCCESS")]
    clear_nonce_fix_on_success: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = EndpointConfig {
        bind_addr: cli.listen_addr.parse()?,
        rpc_path: cli.rpc_path,
        upstream_http: Url::parse(&cli.upstream)?,
        upstream_timeout_secs: cli.upstream_timeout_secs,
        max_body_bytes: cli.max_body_bytes,
        redis_url: cli.redis_url,
        redis_prefix: cli.redis_prefix,
        intercept: InterceptConfig {
            tx_status_api: Url::parse(&cli.tx_status_api)?,
            tx_status_timeout_secs: cli.tx_status_timeout_secs,
            probe_contract: cli.probe_contract.unwrap_or(DEFAULT_PROBE_CONTRACT),
            debug_unknown_as_failed: cli.debug_unknown_as_failed,
            max_nonce_fix_responses: cli.max_nonce_fix_responses,
            nonce_fix_metamask_only: !cli.nonce_fix_any_origin,
            clear_nonce_fix_on_success: cli.clear_nonce_fix_on_success,
        },
    }
    .validate()?;

    if config.intercept.debug_unknown_as_failed {
        tracing::warn!("DEBUG MODE ENABLED: UNKNOWN tx status is treated as FAILED");
    }

    RpcEndpointBuilder::new(config).build()?.serve().await?;
    Ok(())
}
