//! Per-request facade handed to every interceptor.

use std::{
    net::SocketAddr,
    sync::atomic::{
        AtomicBool,
        Ordering,
    },
};

use axum::http::HeaderMap;
use serde_json::Value;
use tracing::Span;
use uuid::Uuid;

use crate::{
    error::{
        EndpointError,
        Result,
    },
    proxy::{
        client_ip,
        is_metamask,
    },
    types::{
        Intercept,
        JsonRpcRequest,
        JsonRpcResponse,
    },
};

/// Everything an interceptor may know about the call it is evaluating.
///
/// The context owns the request's tracing span; any work instrumented with
/// [`RequestContext::span`] is logged with the request id attached. The
/// response may be written at most once.
#[derive(Debug)]
pub struct RequestContext {
    request_id: String,
    request: JsonRpcRequest,
    client_ip: String,
    is_metamask: bool,
    span: Span,
    responded: AtomicBool,
}

impl RequestContext {
    pub fn new(request: JsonRpcRequest, headers: &HeaderMap, remote_addr: Option<SocketAddr>) -> Self {
        let request_id = Uuid::new_v4().to_string();
        let client_ip = client_ip(headers, remote_addr);
        let is_metamask = is_metamask(headers);
        let span = tracing::info_span!(
            "rpc",
            request_id = %request_id,
            method = %request.method,
            ip = %client_ip,
            metamask = is_metamask,
        );
        Self {
            request_id,
            request,
            client_ip,
            is_metamask,
            span,
            responded: AtomicBool::new(false),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn method(&self) -> &str {
        &self.request.method
    }

    pub fn params(&self) -> &[Value] {
        &self.request.params
    }

    pub fn id(&self) -> &Value {
        &self.request.id
    }

    pub fn request(&self) -> &JsonRpcRequest {
        &self.request
    }

    pub fn client_ip(&self) -> &str {
        &self.client_ip
    }

    pub fn is_metamask(&self) -> bool {
        self.is_metamask
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn has_responded(&self) -> bool {
        self.responded.load(Ordering::Acquire)
    }

    /// Turn an interceptor outcome into the request's single response.
    ///
    /// Returns `Ok(None)` for [`Intercept::NotIntercepted`], leaving the slot
    /// open. A second intercepted write is rejected.
    pub fn respond(&self, outcome: Intercept) -> Result<Option<JsonRpcResponse>> {
        let response = match outcome {
            Intercept::NotIntercepted => return Ok(None),
            Intercept::Responded(result) => JsonRpcResponse::success(self.id().clone(), result),
            Intercept::Failed(error) => JsonRpcResponse::failure(self.id().clone(), error),
        };

        if self.responded.swap(true, Ordering::AcqRel) {
            tracing::error!(parent: &self.span, "attempted to write a second response");
            return Err(EndpointError::ResponseAlreadyWritten(self.request_id.clone()));
        }
        Ok(Some(response))
    }
}
