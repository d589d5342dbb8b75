//! Redis-backed [`StateStore`].
//!
//! The `redis` crate is used in its synchronous flavour; every command runs on
//! a blocking thread so the async runtime stays responsive.
//!
//! Key schema:
//! - `{prefix}:sender-of-txhash:{tx_hash}` - sender address string
//! - `{prefix}:nonce-fix:{address}` - decimal count of spoofed nonces sent

use std::{
    str::FromStr,
    sync::Arc,
};

use alloy_primitives::{
    Address,
    B256,
};
use async_trait::async_trait;
use redis::RedisResult;

use super::StateStore;
use crate::{
    error::{
        EndpointError,
        Result,
    },
    types::{
        lower_hex_address,
        lower_hex_hash,
    },
};

#[derive(Clone)]
pub struct RedisStateStore {
    client: Arc<redis::Client>,
    prefix: String,
}

impl RedisStateStore {
    /// Opening the client does not connect; connections are made per command.
    pub fn new(redis_url: &str, prefix: impl Into<String>) -> RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client: Arc::new(client),
            prefix: prefix.into(),
        })
    }

    fn sender_key(&self, tx_hash: &B256) -> String {
        format!("{}:sender-of-txhash:{}", self.prefix, lower_hex_hash(tx_hash))
    }

    fn nonce_fix_key(&self, account: &Address) -> String {
        format!("{}:nonce-fix:{}", self.prefix, lower_hex_address(account))
    }

    async fn get(&self, key: String) -> Result<Option<String>> {
        self.with_connection(move |conn| {
            let value: Option<String> = redis::cmd("GET").arg(&key).query(conn)?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: String, value: String) -> Result<()> {
        self.with_connection(move |conn| {
            redis::cmd("SET").arg(&key).arg(&value).query::<()>(conn)?;
            Ok(())
        })
        .await
    }

    async fn with_connection<T, F>(&self, func: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut redis::Connection) -> Result<T> + Send + 'static,
    {
        let client = self.client.clone();
        tokio::task::spawn_blocking(move || -> Result<T> {
            let mut conn = client.get_connection()?;
            func(&mut conn)
        })
        .await?
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn sender_of_tx_hash(&self, tx_hash: B256) -> Result<Option<Address>> {
        let key = self.sender_key(&tx_hash);
        let value = self.get(key.clone()).await?;
        value
            .map(|raw| parse_stored(&key, &raw, |v| Address::from_str(v).ok()))
            .transpose()
    }

    async fn set_sender_of_tx_hash(&self, tx_hash: B256, sender: Address) -> Result<()> {
        self.set(self.sender_key(&tx_hash), lower_hex_address(&sender))
            .await
    }

    async fn nonce_fix_for_account(&self, account: Address) -> Result<Option<u64>> {
        let key = self.nonce_fix_key(&account);
        let value = self.get(key.clone()).await?;
        value
            .map(|raw| parse_stored(&key, &raw, |v| v.parse::<u64>().ok()))
            .transpose()
    }

    async fn set_nonce_fix_for_account(&self, account: Address, attempts_sent: u64) -> Result<()> {
        self.set(self.nonce_fix_key(&account), attempts_sent.to_string())
            .await
    }

    async fn delete_nonce_fix_for_account(&self, account: Address) -> Result<()> {
        let key = self.nonce_fix_key(&account);
        self.with_connection(move |conn| {
            redis::cmd("DEL").arg(&key).query::<()>(conn)?;
            Ok(())
        })
        .await
    }
}

fn parse_stored<T>(key: &str, raw: &str, parse: impl FnOnce(&str) -> Option<T>) -> Result<T> {
    parse(raw.trim()).ok_or_else(|| {
        EndpointError::MalformedStoreValue {
            key: key.to_string(),
            value: raw.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{
        address,
        b256,
    };

    #[test]
    fn keys_are_prefixed_and_lower_case() {
        let store = RedisStateStore::new("redis://127.0.0.1:6379", "rpc").unwrap();
        let account = address!("F39FD6E51AAD88F6F4CE6AB8827279CFFFB92266");
        let tx_hash = b256!("E3B0C44298FC1C149AFBF4C8996FB92427AE41E4649B934CA495991B7852B855");

        assert_eq!(
            store.nonce_fix_key(&account),
            "rpc:nonce-fix:0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert_eq!(
            store.sender_key(&tx_hash),
            "rpc:sender-of-txhash:0xe3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn malformed_values_surface_as_errors() {
        let err = parse_stored("k", "not-a-number", |v| v.parse::<u64>().ok()).unwrap_err();
        assert!(matches!(err, EndpointError::MalformedStoreValue { .. }));

        let parsed = parse_stored("k", " 3 ", |v| v.parse::<u64>().ok()).unwrap();
        assert_eq!(parsed, 3);
    }

    #[tokio::test]
    async fn unreachable_redis_is_an_error() {
        // Port 1 is never a Redis server; the lookup must fail rather than miss.
        let store = RedisStateStore::new("redis://127.0.0.1:1", "rpc").unwrap();
        let account = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");
        assert!(store.nonce_fix_for_account(account).await.is_err());
    }

    /// Requires a live Redis at `REDIS_URL`.
    #[tokio::test]
    #[ignore]
    async fn round_trips_against_live_redis() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let prefix = format!("rpc-endpoint-test-{}", uuid::Uuid::new_v4());
        let store = RedisStateStore::new(&url, prefix).unwrap();
        let account = address!("70997970c51812dc3a010c7d01b50e0d17dc79c8");
        let tx_hash = b256!("0000000000000000000000000000000000000000000000000000000000000abc");

        assert_eq!(store.nonce_fix_for_account(account).await.unwrap(), None);
        store.set_nonce_fix_for_account(account, 2).await.unwrap();
        assert_eq!(store.nonce_fix_for_account(account).await.unwrap(), Some(2));
        store.delete_nonce_fix_for_account(account).await.unwrap();
        assert_eq!(store.nonce_fix_for_account(account).await.unwrap(), None);

        store.set_sender_of_tx_hash(tx_hash, account).await.unwrap();
        assert_eq!(store.sender_of_tx_hash(tx_hash).await.unwrap(), Some(account));
    }
}
