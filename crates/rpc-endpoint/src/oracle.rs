//! Private transaction status lookups.
//!
//! A privately relayed transaction is invisible to the public node until it is
//! mined, so a `null` receipt alone cannot tell "still pending" apart from
//! "dropped". The status API that relayed it can.

use std::{
    fmt,
    sync::Arc,
    time::Duration,
};

use alloy_primitives::B256;
use async_trait::async_trait;
use reqwest::Client;
use serde::{
    Deserialize,
    Serialize,
};
use url::Url;

use crate::{
    error::{
        EndpointError,
        Result,
    },
    types::lower_hex_hash,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    Unknown,
    Pending,
    Included,
    Failed,
    Cancelled,
    #[serde(other)]
    Other,
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TxStatus::Unknown => "UNKNOWN",
            TxStatus::Pending => "PENDING",
            TxStatus::Included => "INCLUDED",
            TxStatus::Failed => "FAILED",
            TxStatus::Cancelled => "CANCELLED",
            TxStatus::Other => "OTHER",
        };
        f.write_str(label)
    }
}

#[async_trait]
pub trait TxStatusOracle: Send + Sync {
    async fn tx_status(&self, tx_hash: B256) -> Result<TxStatus>;
}

pub type SharedTxStatusOracle = Arc<dyn TxStatusOracle>;

#[derive(Debug, Deserialize)]
struct TxStatusResponse {
    status: TxStatus,
}

/// Queries `GET {base}/tx/{tx_hash}` on the private transaction API.
#[derive(Debug, Clone)]
pub struct HttpTxStatusOracle {
    client: Client,
    base_url: Url,
}

impl HttpTxStatusOracle {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    fn status_url(&self, tx_hash: &B256) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                EndpointError::InvalidConfig(format!(
                    "tx status API is not a base URL: {}",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .push("tx")
            .push(&lower_hex_hash(tx_hash));
        Ok(url)
    }
}

#[async_trait]
impl TxStatusOracle for HttpTxStatusOracle {
    async fn tx_status(&self, tx_hash: B256) -> Result<TxStatus> {
        let url = self.status_url(&tx_hash)?;
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EndpointError::TxStatusApi(response.status()));
        }

        let body: TxStatusResponse = response.json().await?;
        Ok(body.status)
    }
}
