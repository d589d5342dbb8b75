//! JSON-RPC wire types and the per-method typed decode step.
//!
//! Parameters are decoded once, at dispatch, into an [`RpcCall`]. Anything
//! that fails to decode becomes [`RpcCall::Other`], so interceptors never see
//! loosely-typed positional values.

use alloy_primitives::{
    Address,
    B256,
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
};
use serde_json::Value;

use crate::error::EndpointError;

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC error code for internal errors, also used for failed private txs.
pub const INTERNAL_ERROR_CODE: i64 = -32603;

/// JSON-RPC error code for upstream transport failures.
pub const SERVER_ERROR_CODE: i64 = -32000;

/// A single JSON-RPC 2.0 request as received from the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default)]
    pub id: Value,
}

fn default_jsonrpc() -> String {
    JSONRPC_VERSION.to_string()
}

/// A JSON-RPC 2.0 response.
///
/// `result` distinguishes a present-but-null value (`Some(Value::Null)`) from
/// an absent one (`None`); the receipt hook only acts on the former.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// True only when the upstream answered with a literal `"result": null`.
    pub fn has_null_result(&self) -> bool {
        matches!(self.result, Some(Value::Null))
    }
}

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

impl RpcErrorObject {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: INTERNAL_ERROR_CODE,
            message: message.into(),
        }
    }
}

impl From<EndpointError> for RpcErrorObject {
    fn from(err: EndpointError) -> Self {
        let code = match err {
            EndpointError::Reqwest(_) | EndpointError::Io(_) => SERVER_ERROR_CODE,
            _ => INTERNAL_ERROR_CODE,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

/// Outcome of evaluating an interceptor.
#[derive(Debug, Clone, PartialEq)]
pub enum Intercept {
    /// Fall through to (or keep) the upstream response.
    NotIntercepted,
    /// Short-circuit with a synthetic `result`.
    Responded(Value),
    /// Short-circuit with a JSON-RPC error.
    Failed(RpcErrorObject),
}

impl Intercept {
    pub fn is_intercepted(&self) -> bool {
        !matches!(self, Intercept::NotIntercepted)
    }

    pub(crate) fn outcome_label(&self) -> &'static str {
        match self {
            Intercept::NotIntercepted => "passthrough",
            Intercept::Responded(_) => "responded",
            Intercept::Failed(_) => "failed",
        }
    }
}

/// The subset of `eth_call`'s call object the endpoint looks at.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallObject {
    #[serde(default)]
    pub to: Option<Address>,
}

/// A JSON-RPC request decoded into the shape its interceptor needs.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcCall {
    GetTransactionReceipt { tx_hash: B256 },
    GetTransactionCount { address: Address },
    Call { to: Option<Address> },
    /// Any other method, or an intercepted method whose params did not decode.
    Other,
}

impl RpcCall {
    /// Decode the request's params. Never fails: a malformed or missing first
    /// param yields [`RpcCall::Other`].
    pub fn decode(request: &JsonRpcRequest) -> Self {
        match Self::try_decode(request) {
            Ok(call) => call,
            Err(err) => {
                tracing::debug!(method = %request.method, %err, "params not applicable for interception");
                RpcCall::Other
            }
        }
    }

    fn try_decode(request: &JsonRpcRequest) -> Result<Self, EndpointError> {
        let call = match request.method.as_str() {
            "eth_getTransactionReceipt" => RpcCall::GetTransactionReceipt {
                tx_hash: first_param(request)?,
            },
            "eth_getTransactionCount" => RpcCall::GetTransactionCount {
                address: first_param(request)?,
            },
            "eth_call" => {
                let call: CallObject = first_param(request)?;
                RpcCall::Call { to: call.to }
            }
            _ => RpcCall::Other,
        };
        Ok(call)
    }

    pub fn method(&self) -> &'static str {
        match self {
            RpcCall::GetTransactionReceipt { .. } => "eth_getTransactionReceipt",
            RpcCall::GetTransactionCount { .. } => "eth_getTransactionCount",
            RpcCall::Call { .. } => "eth_call",
            RpcCall::Other => "other",
        }
    }
}

fn first_param<T>(request: &JsonRpcRequest) -> Result<T, EndpointError>
where
    T: for<'de> Deserialize<'de>,
{
    let value = request.params.first().cloned().ok_or_else(|| {
        EndpointError::InvalidParams(format!("{} expects at least one param", request.method))
    })?;
    serde_json::from_value(value).map_err(|err| {
        EndpointError::InvalidParams(format!("{}: {err}", request.method))
    })
}

/// Render an address as `0x` followed by lower-case hex.
pub fn lower_hex_address(address: &Address) -> String {
    format!("0x{}", alloy_primitives::hex::encode(address))
}

/// Render a hash as `0x` followed by lower-case hex.
pub fn lower_hex_hash(hash: &B256) -> String {
    format!("0x{}", alloy_primitives::hex::encode(hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use serde_json::json;

    fn request(method: &str, params: Value) -> JsonRpcRequest {
        serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": method,
            "params": params,
        }))
        .unwrap()
    }

    #[test]
    fn decodes_transaction_count_in_any_case() {
        let lower = request(
            "eth_getTransactionCount",
            json!(["0x70997970c51812dc3a010c7d01b50e0d17dc79c8", "latest"]),
        );
        let mixed = request(
            "eth_getTransactionCount",
            json!(["0x70997970C51812dc3A010C7d01b50e0d17dc79C8", "latest"]),
        );
        let expected = RpcCall::GetTransactionCount {
            address: address!("70997970c51812dc3a010c7d01b50e0d17dc79c8"),
        };
        assert_eq!(RpcCall::decode(&lower), expected);
        assert_eq!(RpcCall::decode(&mixed), expected);
    }

    #[test]
    fn missing_or_malformed_params_are_not_applicable() {
        assert_eq!(
            RpcCall::decode(&request("eth_getTransactionReceipt", json!([]))),
            RpcCall::Other
        );
        assert_eq!(
            RpcCall::decode(&request("eth_getTransactionReceipt", json!([42]))),
            RpcCall::Other
        );
        assert_eq!(
            RpcCall::decode(&request("eth_call", json!(["not-an-object"]))),
            RpcCall::Other
        );
        assert_eq!(
            RpcCall::decode(&request("eth_call", json!([{ "to": "0x1234" }]))),
            RpcCall::Other
        );
    }

    #[test]
    fn eth_call_without_to_decodes_to_none() {
        let call = RpcCall::decode(&request("eth_call", json!([{ "data": "0x" }, "latest"])));
        assert_eq!(call, RpcCall::Call { to: None });
    }

    #[test]
    fn unrelated_methods_are_other() {
        assert_eq!(
            RpcCall::decode(&request("eth_blockNumber", json!([]))),
            RpcCall::Other
        );
    }

    #[test]
    fn null_result_is_distinguished_from_missing_result() {
        let null: JsonRpcResponse =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1, "result": null})).unwrap();
        let missing: JsonRpcResponse = serde_json::from_value(
            json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32000, "message": "boom"}}),
        )
        .unwrap();
        let present: JsonRpcResponse =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1, "result": {"status": "0x1"}}))
                .unwrap();

        assert!(null.has_null_result());
        assert!(!missing.has_null_result());
        assert!(!present.has_null_result());
    }

    #[test]
    fn success_response_serializes_null_result() {
        let response = JsonRpcResponse::success(json!(1), Value::Null);
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded, json!({"jsonrpc": "2.0", "id": 1, "result": null}));
    }

    #[tokio::test]
    async fn upstream_transport_errors_map_to_server_error() {
        let err = reqwest::Client::new()
            .post("http://127.0.0.1:1")
            .send()
            .await
            .unwrap_err();
        let error = RpcErrorObject::from(EndpointError::from(err));
        assert_eq!(error.code, SERVER_ERROR_CODE);

        let io = EndpointError::from(std::io::Error::other("connection reset"));
        assert_eq!(RpcErrorObject::from(io).code, SERVER_ERROR_CODE);
    }

    #[test]
    fn everything_else_maps_to_internal_error() {
        let error = RpcErrorObject::from(EndpointError::ResponseAlreadyWritten("req-1".into()));
        assert_eq!(error.code, INTERNAL_ERROR_CODE);
        assert_eq!(error.message, "response for request req-1 was already written");

        let error = RpcErrorObject::from(EndpointError::MalformedStoreValue {
            key: "k".into(),
            value: "v".into(),
        });
        assert_eq!(error.code, INTERNAL_ERROR_CODE);
    }

    #[test]
    fn keys_are_lower_case() {
        let addr = address!("F1A54B0759B58661CEA17CFF19DD37940A9B5F1A");
        assert_eq!(
            lower_hex_address(&addr),
            "0xf1a54b0759b58661cea17cff19dd37940a9b5f1a"
        );
    }
}
