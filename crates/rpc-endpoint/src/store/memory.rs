use std::sync::Arc;

use alloy_primitives::{
    Address,
    B256,
};
use async_trait::async_trait;
use dashmap::DashMap;

use super::StateStore;
use crate::error::Result;

/// Process-local store used in tests and when no Redis URL is configured.
/// State does not survive a restart and is not shared between replicas.
#[derive(Clone, Debug, Default)]
pub struct InMemoryStateStore {
    senders: Arc<DashMap<B256, Address>>,
    nonce_fixes: Arc<DashMap<Address, u64>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn sender_of_tx_hash(&self, tx_hash: B256) -> Result<Option<Address>> {
        Ok(self.senders.get(&tx_hash).map(|entry| *entry))
    }

    async fn set_sender_of_tx_hash(&self, tx_hash: B256, sender: Address) -> Result<()> {
        self.senders.insert(tx_hash, sender);
        Ok(())
    }

    async fn nonce_fix_for_account(&self, account: Address) -> Result<Option<u64>> {
        Ok(self.nonce_fixes.get(&account).map(|entry| *entry))
    }

    async fn set_nonce_fix_for_account(&self, account: Address, attempts_sent: u64) -> Result<()> {
        self.nonce_fixes.insert(account, attempts_sent);
        Ok(())
    }

    async fn delete_nonce_fix_for_account(&self, account: Address) -> Result<()> {
        self.nonce_fixes.remove(&account);
        Ok(())
    }
}
