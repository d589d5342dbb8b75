//! JSON-RPC endpoint for wallets whose transactions are relayed privately.
//!
//! The endpoint forwards every call to a public Ethereum node and intercepts
//! three of them:
//!
//! - `eth_getTransactionReceipt`: a `null` receipt for a tx the private relay
//!   reports as failed becomes a "Transaction failed" error, and the sender's
//!   nonce fix is armed.
//! - `eth_getTransactionCount`: while a nonce fix is armed, MetaMask is shown a
//!   nonce far in the future a bounded number of times so it drops the stuck tx.
//! - `eth_call`: calls to the probe contract are answered locally.
//!
//! The pieces can be embedded individually: [`Interceptors`] only needs a
//! [`StateStore`](store::StateStore) and a [`TxStatusOracle`](oracle::TxStatusOracle).

pub mod config;
pub mod context;
pub mod error;
pub mod intercept;
pub mod oracle;
pub mod proxy;
pub mod server;
pub mod store;
pub mod types;

pub use config::{
    EndpointConfig,
    InterceptConfig,
};
pub use error::{
    EndpointError,
    Result,
};
pub use intercept::Interceptors;
pub use server::{
    RpcEndpoint,
    RpcEndpointBuilder,
};
