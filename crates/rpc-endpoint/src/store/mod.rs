//! Durable per-account state shared by otherwise stateless requests.
//!
//! Two relationships live here:
//!
//! - sender-of-tx-hash: which account submitted a privately relayed tx. Written
//!   by the relay path, only read by the interceptors.
//! - nonce-fix: per-account counter of spoofed `eth_getTransactionCount`
//!   responses. The record's existence means the workaround is active.
//!
//! Keys are always rendered as lower-case hex, so mixed-case client input can
//! never cause a miss.

use std::sync::Arc;

use alloy_primitives::{
    Address,
    B256,
};
use async_trait::async_trait;

use crate::error::Result;

pub mod memory;
pub mod redis;

pub use self::{
    memory::InMemoryStateStore,
    redis::RedisStateStore,
};

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn sender_of_tx_hash(&self, tx_hash: B256) -> Result<Option<Address>>;

    async fn set_sender_of_tx_hash(&self, tx_hash: B256, sender: Address) -> Result<()>;

    /// Number of spoofed nonces already sent, or `None` when no fix is active.
    async fn nonce_fix_for_account(&self, account: Address) -> Result<Option<u64>>;

    async fn set_nonce_fix_for_account(&self, account: Address, attempts_sent: u64) -> Result<()>;

    async fn delete_nonce_fix_for_account(&self, account: Address) -> Result<()>;
}

pub type SharedStateStore = Arc<dyn StateStore>;
