//! Per-method hooks evaluated around the upstream call.
//!
//! Pre-call hooks may answer a request without contacting the node. Post-call
//! hooks see the node's answer and may replace it. Store and oracle failures
//! never surface to the client: the hook logs and falls through.

use alloy_primitives::{
    Address,
    B256,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{
    debug,
    info,
    warn,
};

use crate::{
    config::InterceptConfig,
    context::RequestContext,
    oracle::{
        SharedTxStatusOracle,
        TxStatus,
    },
    store::SharedStateStore,
    types::{
        Intercept,
        JsonRpcResponse,
        RpcCall,
        RpcErrorObject,
        lower_hex_address,
        lower_hex_hash,
    },
};

/// Nonce far enough ahead that the wallet treats its pending tx as dropped.
pub const SPOOFED_NONCE: u64 = 1_000_000_000 + 1;

/// Message returned when a privately relayed tx is confirmed failed.
pub const TX_FAILED_MESSAGE: &str = "Transaction failed";

/// Word returned for `eth_call`s against the probe contract.
pub const PROBE_CALL_RESULT: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000001";

/// The fields of a receipt the expiry policy looks at.
#[derive(Debug, Deserialize)]
struct ReceiptSummary {
    from: Address,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Clone)]
pub struct Interceptors {
    config: InterceptConfig,
    store: SharedStateStore,
    oracle: SharedTxStatusOracle,
}

impl Interceptors {
    pub fn new(config: InterceptConfig, store: SharedStateStore, oracle: SharedTxStatusOracle) -> Self {
        Self {
            config,
            store,
            oracle,
        }
    }

    pub fn config(&self) -> &InterceptConfig {
        &self.config
    }

    /// Evaluate the hook registered to run before `call` is forwarded.
    pub async fn pre_call(&self, ctx: &RequestContext, call: &RpcCall) -> Intercept {
        let outcome = match call {
            RpcCall::GetTransactionCount { address } => {
                if self.config.nonce_fix_metamask_only && !ctx.is_metamask() {
                    Intercept::NotIntercepted
                } else {
                    self.intercept_transaction_count(*address).await
                }
            }
            RpcCall::Call { to } => self.intercept_probe_call(*to),
            RpcCall::GetTransactionReceipt { .. } | RpcCall::Other => Intercept::NotIntercepted,
        };
        record(call, "pre", &outcome);
        outcome
    }

    /// Evaluate the hook registered to run once the upstream answered `call`.
    pub async fn post_call(
        &self,
        ctx: &RequestContext,
        call: &RpcCall,
        response: &JsonRpcResponse,
    ) -> Intercept {
        let outcome = match call {
            RpcCall::GetTransactionReceipt { tx_hash } => {
                self.check_transaction_receipt(*tx_hash, response).await
            }
            _ => Intercept::NotIntercepted,
        };
        if outcome.is_intercepted() {
            info!(method = ctx.method(), "overriding upstream response");
        }
        record(call, "post", &outcome);
        outcome
    }

    /// A `null` receipt for a tx the private relay reports as failed turns into
    /// a "Transaction failed" error, and arms the nonce fix for its sender.
    pub async fn check_transaction_receipt(
        &self,
        tx_hash: B256,
        response: &JsonRpcResponse,
    ) -> Intercept {
        if !response.has_null_result() {
            if self.config.clear_nonce_fix_on_success {
                self.clear_nonce_fix_after_success(response).await;
            }
            return Intercept::NotIntercepted;
        }

        let tx_hash_hex = lower_hex_hash(&tx_hash);
        info!(tx_hash = %tx_hash_hex, "receipt is null, checking private tx status");

        let status = match self.oracle.tx_status(tx_hash).await {
            Ok(status) => status,
            Err(err) => {
                warn!(tx_hash = %tx_hash_hex, %err, "tx status lookup failed");
                metrics::counter!("rpc_endpoint_oracle_errors_total").increment(1);
                return Intercept::NotIntercepted;
            }
        };
        info!(tx_hash = %tx_hash_hex, %status, "private tx status");

        let failed = status == TxStatus::Failed
            || (self.config.debug_unknown_as_failed && status == TxStatus::Unknown);
        if !failed {
            return Intercept::NotIntercepted;
        }

        info!(tx_hash = %tx_hash_hex, "private tx failed");
        if !self.ensure_nonce_fix(tx_hash).await {
            return Intercept::NotIntercepted;
        }

        Intercept::Failed(RpcErrorObject::internal(TX_FAILED_MESSAGE))
    }

    /// Arm the nonce fix for the sender of `tx_hash`. Returns `false` when the
    /// store could not be consulted; an unknown sender still counts as done.
    async fn ensure_nonce_fix(&self, tx_hash: B256) -> bool {
        let sender = match self.store.sender_of_tx_hash(tx_hash).await {
            Ok(Some(sender)) => sender,
            Ok(None) => {
                debug!(tx_hash = %lower_hex_hash(&tx_hash), "no sender recorded, skipping nonce fix");
                return true;
            }
            Err(err) => {
                warn!(%err, "sender lookup failed");
                metrics::counter!("rpc_endpoint_store_errors_total").increment(1);
                return false;
            }
        };

        let account = lower_hex_address(&sender);
        match self.store.nonce_fix_for_account(sender).await {
            Ok(Some(_)) => return true,
            Ok(None) => {}
            Err(err) => {
                warn!(%account, %err, "nonce fix lookup failed");
                metrics::counter!("rpc_endpoint_store_errors_total").increment(1);
                return false;
            }
        }

        if let Err(err) = self.store.set_nonce_fix_for_account(sender, 0).await {
            warn!(%account, %err, "failed to arm nonce fix");
            metrics::counter!("rpc_endpoint_store_errors_total").increment(1);
            return false;
        }

        info!(%account, "nonce fix armed");
        true
    }

    async fn clear_nonce_fix_after_success(&self, response: &JsonRpcResponse) {
        let Some(result) = &response.result else {
            return;
        };
        let Ok(receipt) = ReceiptSummary::deserialize(result) else {
            return;
        };
        if receipt.status.as_deref() != Some("0x1") {
            return;
        }

        let account = lower_hex_address(&receipt.from);
        match self.store.nonce_fix_for_account(receipt.from).await {
            Ok(Some(_)) => {
                if let Err(err) = self.store.delete_nonce_fix_for_account(receipt.from).await {
                    warn!(%account, %err, "failed to clear nonce fix");
                    metrics::counter!("rpc_endpoint_store_errors_total").increment(1);
                } else {
                    info!(%account, "nonce fix cleared after successful tx");
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(%account, %err, "nonce fix lookup failed");
                metrics::counter!("rpc_endpoint_store_errors_total").increment(1);
            }
        }
    }

    /// While a nonce fix is active, answer with [`SPOOFED_NONCE`] up to
    /// `max_nonce_fix_responses` times. The counter is read, incremented and
    /// written without a lock; a lost update costs one extra spoofed poll.
    pub async fn intercept_transaction_count(&self, address: Address) -> Intercept {
        let account = lower_hex_address(&address);
        let attempts_sent = match self.store.nonce_fix_for_account(address).await {
            Ok(Some(attempts_sent)) => attempts_sent,
            Ok(None) => return Intercept::NotIntercepted,
            Err(err) => {
                warn!(%account, %err, "nonce fix lookup failed");
                metrics::counter!("rpc_endpoint_store_errors_total").increment(1);
                return Intercept::NotIntercepted;
            }
        };

        let attempts_sent = attempts_sent.saturating_add(1);
        if attempts_sent > self.config.max_nonce_fix_responses {
            debug!(%account, attempts_sent, "nonce fix exhausted");
            return Intercept::NotIntercepted;
        }

        if let Err(err) = self.store.set_nonce_fix_for_account(address, attempts_sent).await {
            warn!(%account, %err, "failed to persist nonce fix attempt");
            metrics::counter!("rpc_endpoint_store_errors_total").increment(1);
            return Intercept::NotIntercepted;
        }

        info!(%account, attempts_sent, "intercepted eth_getTransactionCount");
        Intercept::Responded(Value::String(format!("{SPOOFED_NONCE:#x}")))
    }

    pub fn intercept_probe_call(&self, to: Option<Address>) -> Intercept {
        match to {
            Some(to) if to == self.config.probe_contract => {
                info!("intercepted eth_call to probe contract");
                Intercept::Responded(Value::String(PROBE_CALL_RESULT.to_string()))
            }
            _ => Intercept::NotIntercepted,
        }
    }
}

fn record(call: &RpcCall, stage: &'static str, outcome: &Intercept) {
    if matches!(call, RpcCall::Other) {
        return;
    }
    metrics::counter!(
        "rpc_endpoint_intercept_total",
        "method" => call.method(),
        "stage" => stage,
        "outcome" => outcome.outcome_label()
    )
    .increment(1);
}
