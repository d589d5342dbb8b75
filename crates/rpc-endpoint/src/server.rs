use std::{
    net::SocketAddr,
    sync::Arc,
};

use axum::{
    Json,
    Router,
    body::{
        Body,
        Bytes,
    },
    extract::{
        ConnectInfo,
        Request,
        State,
    },
    http::{
        HeaderValue,
        StatusCode,
        header,
    },
    response::{
        IntoResponse,
        Response,
    },
    routing::{
        get,
        post,
    },
};
use serde_json::Value;
use tokio::signal;
use tracing::{
    Instrument,
    debug,
    error,
    info,
    warn,
};

use crate::{
    config::EndpointConfig,
    context::RequestContext,
    error::Result,
    intercept::Interceptors,
    oracle::{
        HttpTxStatusOracle,
        SharedTxStatusOracle,
    },
    proxy::{
        UpstreamClient,
        UpstreamReply,
        truncate_text,
    },
    store::{
        InMemoryStateStore,
        RedisStateStore,
        SharedStateStore,
    },
    types::{
        JsonRpcRequest,
        JsonRpcResponse,
        RpcCall,
        RpcErrorObject,
    },
};

/// Characters of a body echoed into debug logs.
const LOG_BODY_CHARS: usize = 200;

/// Builder that wires configuration, state store and tx status oracle together.
pub struct RpcEndpointBuilder {
    config: EndpointConfig,
    store: Option<SharedStateStore>,
    oracle: Option<SharedTxStatusOracle>,
}

impl RpcEndpointBuilder {
    pub fn new(config: EndpointConfig) -> Self {
        Self {
            config,
            store: None,
            oracle: None,
        }
    }

    pub fn with_state_store(mut self, store: SharedStateStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_tx_status_oracle(mut self, oracle: SharedTxStatusOracle) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn build(self) -> Result<RpcEndpoint> {
        let config = self.config.validate()?;
        let store: SharedStateStore = if let Some(custom) = self.store {
            custom
        } else if let Some(redis_url) = &config.redis_url {
            Arc::new(RedisStateStore::new(redis_url, config.redis_prefix.clone())?)
        } else {
            warn!("no redis url configured, nonce fixes are kept in process memory");
            Arc::new(InMemoryStateStore::new())
        };
        let oracle: SharedTxStatusOracle = if let Some(custom) = self.oracle {
            custom
        } else {
            Arc::new(HttpTxStatusOracle::new(
                config.intercept.tx_status_api.clone(),
                config.intercept.tx_status_timeout(),
            )?)
        };
        let upstream = UpstreamClient::new(config.upstream_http.clone(), config.upstream_timeout())?;
        let interceptors = Interceptors::new(config.intercept.clone(), store, oracle);
        let state = EndpointState {
            upstream,
            interceptors,
            max_body_bytes: config.max_body_bytes,
        };

        Ok(RpcEndpoint { config, state })
    }
}

pub struct RpcEndpoint {
    config: EndpointConfig,
    state: EndpointState,
}

impl RpcEndpoint {
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn state(&self) -> &EndpointState {
        &self.state
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route(&self.config.rpc_path, post(handle_rpc))
            .with_state(self.state.clone())
    }

    pub async fn serve(self) -> Result<()> {
        let addr = self.config.bind_addr;
        let path = self.config.rpc_path.clone();
        let upstream = self.state.upstream.url().clone();
        let router = self.router();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, %path, %upstream, "rpc endpoint listening");

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;
        info!("rpc endpoint shutdown complete");

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(%err, "failed to listen for shutdown signal");
    }
}

#[derive(Clone)]
pub struct EndpointState {
    upstream: UpstreamClient,
    interceptors: Interceptors,
    max_body_bytes: usize,
}

impl EndpointState {
    pub fn interceptors(&self) -> &Interceptors {
        &self.interceptors
    }

    /// Run one JSON-RPC request through the pre-call hooks, the upstream node
    /// and the post-call hooks, inside the request's span.
    pub async fn handle(&self, ctx: &RequestContext, body: Bytes) -> Result<Response> {
        self.dispatch(ctx, body).instrument(ctx.span().clone()).await
    }

    async fn dispatch(&self, ctx: &RequestContext, body: Bytes) -> Result<Response> {
        let call = RpcCall::decode(ctx.request());

        let outcome = self.interceptors.pre_call(ctx, &call).await;
        if let Some(response) = ctx.respond(outcome)? {
            return Ok(json_response(StatusCode::OK, &response));
        }

        let reply = self.upstream.forward(body).await?;
        if matches!(call, RpcCall::Other) {
            return Ok(raw_response(reply));
        }

        let upstream_response: JsonRpcResponse = match serde_json::from_slice(&reply.body) {
            Ok(response) => response,
            Err(err) => {
                debug!(
                    %err,
                    body = truncate_text(&String::from_utf8_lossy(&reply.body), LOG_BODY_CHARS),
                    "upstream response is not a JSON-RPC object, passing through"
                );
                return Ok(raw_response(reply));
            }
        };

        let outcome = self
            .interceptors
            .post_call(ctx, &call, &upstream_response)
            .await;
        match ctx.respond(outcome)? {
            Some(response) => Ok(json_response(StatusCode::OK, &response)),
            None => Ok(raw_response(reply)),
        }
    }
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn handle_rpc(State(state): State<EndpointState>, request: Request) -> Response {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let headers = request.headers().clone();

    let body = match axum::body::to_bytes(request.into_body(), state.max_body_bytes).await {
        Ok(body) => body,
        Err(err) => {
            warn!(%err, "failed to read request body");
            return error_response(
                StatusCode::BAD_REQUEST,
                Value::Null,
                RpcErrorObject {
                    code: -32700,
                    message: "unable to read request body".into(),
                },
            );
        }
    };

    // Batches and anything else that is not a single call go straight through.
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            debug!(
                %err,
                body = truncate_text(&String::from_utf8_lossy(&body), LOG_BODY_CHARS),
                "not a single JSON-RPC request, forwarding untouched"
            );
            return forward_untouched(&state, body).await;
        }
    };

    let ctx = RequestContext::new(request, &headers, remote_addr);
    let id = ctx.id().clone();

    match state.handle(&ctx, body).await {
        Ok(response) => response,
        Err(err) => {
            ctx.span().in_scope(|| error!(%err, "request failed"));
            error_response(StatusCode::BAD_GATEWAY, id, RpcErrorObject::from(err))
        }
    }
}

async fn forward_untouched(state: &EndpointState, body: Bytes) -> Response {
    match state.upstream.forward(body).await {
        Ok(reply) => raw_response(reply),
        Err(err) => {
            error!(%err, "upstream forwarding failed");
            error_response(StatusCode::BAD_GATEWAY, Value::Null, RpcErrorObject::from(err))
        }
    }
}

fn raw_response(reply: UpstreamReply) -> Response {
    let content_type = reply
        .content_type
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));
    (
        reply.status,
        [(header::CONTENT_TYPE, content_type)],
        Body::from(reply.body),
    )
        .into_response()
}

fn json_response(status: StatusCode, response: &JsonRpcResponse) -> Response {
    (status, Json(response)).into_response()
}

fn error_response(status: StatusCode, id: Value, error: RpcErrorObject) -> Response {
    json_response(status, &JsonRpcResponse::failure(id, error))
}
