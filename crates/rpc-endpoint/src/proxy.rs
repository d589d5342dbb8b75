//! Transport helpers: upstream forwarding and client classification.

use std::{
    net::SocketAddr,
    time::Duration,
};

use axum::{
    body::Bytes,
    http::{
        HeaderMap,
        HeaderValue,
        StatusCode,
        header,
    },
};
use reqwest::Client;
use url::Url;

use crate::error::Result;

/// `Origin` header sent by the MetaMask browser extension.
pub const METAMASK_ORIGIN: &str = "chrome-extension://nkbihfbeogaeaoehlefnkodbefgpgknn";

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Client address, preferring the `X-Forwarded-For` header set by the load
/// balancer over the socket peer.
pub fn client_ip(headers: &HeaderMap, remote_addr: Option<SocketAddr>) -> String {
    headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| remote_addr.map(|addr| addr.to_string()))
        .unwrap_or_default()
}

pub fn is_metamask(headers: &HeaderMap) -> bool {
    headers
        .get(header::ORIGIN)
        .is_some_and(|origin| origin.as_bytes() == METAMASK_ORIGIN.as_bytes())
}

/// Cut `text` to at most `max_chars` characters without splitting a UTF-8
/// sequence.
pub fn truncate_text(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Raw upstream answer, kept as bytes so pass-through responses are untouched.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: StatusCode,
    /// Upstream `Content-Type`, if it sent one.
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

/// Forwards raw JSON-RPC bodies to the upstream node.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: Client,
    url: Url,
}

impl UpstreamClient {
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn forward(&self, body: Bytes) -> Result<UpstreamReply> {
        let response = self
            .http
            .post(self.url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::CONTENT_LENGTH, body.len())
            .body(body)
            .send()
            .await?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| HeaderValue::from_bytes(value.as_bytes()).ok());
        let body = response.bytes().await?;
        metrics::counter!("rpc_endpoint_forward_total").increment(1);

        Ok(UpstreamReply {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock,
        MockServer,
        ResponseTemplate,
        matchers::{
            body_string,
            header as header_matcher,
            method,
        },
    };

    #[test]
    fn forwarded_for_wins_over_remote_addr() {
        let mut headers = HeaderMap::new();
        let remote: SocketAddr = "10.0.0.1:4000".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(remote)), "10.0.0.1:4000");

        headers.insert(FORWARDED_FOR, HeaderValue::from_static("203.0.113.7"));
        assert_eq!(client_ip(&headers, Some(remote)), "203.0.113.7");
        assert_eq!(client_ip(&HeaderMap::new(), None), "");
    }

    #[test]
    fn detects_metamask_origin() {
        let mut headers = HeaderMap::new();
        assert!(!is_metamask(&headers));

        headers.insert(header::ORIGIN, HeaderValue::from_static("https://app.uniswap.org"));
        assert!(!is_metamask(&headers));

        headers.insert(header::ORIGIN, HeaderValue::from_static(METAMASK_ORIGIN));
        assert!(is_metamask(&headers));
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello", 3), "hel");
        assert_eq!(truncate_text("héllo", 2), "hé");
        assert_eq!(truncate_text("", 0), "");
    }

    #[tokio::test]
    async fn forwards_raw_body_with_json_headers() {
        let server = MockServer::start().await;
        let body = r#"{"jsonrpc":"2.0","id":1,"method":"eth_chainId","params":[]}"#;
        Mock::given(method("POST"))
            .and(header_matcher("content-type", "application/json"))
            .and(header_matcher("accept", "application/json"))
            .and(header_matcher("content-length", body.len().to_string().as_str()))
            .and(body_string(body))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(r#"{"jsonrpc":"2.0","id":1,"result":"0x1"}"#, "application/json"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client =
            UpstreamClient::new(Url::parse(&server.uri()).unwrap(), Duration::from_secs(2)).unwrap();
        let reply = client.forward(Bytes::from_static(body.as_bytes())).await.unwrap();

        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(
            reply.content_type,
            Some(HeaderValue::from_static("application/json"))
        );
        assert_eq!(reply.body.as_ref(), br#"{"jsonrpc":"2.0","id":1,"result":"0x1"}"#);
    }

    #[tokio::test]
    async fn keeps_upstream_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_raw("<html>bad gateway</html>", "text/html"))
            .mount(&server)
            .await;

        let client =
            UpstreamClient::new(Url::parse(&server.uri()).unwrap(), Duration::from_secs(2)).unwrap();
        let reply = client.forward(Bytes::from_static(b"{}")).await.unwrap();

        assert_eq!(reply.status, StatusCode::BAD_GATEWAY);
        assert_eq!(reply.content_type, Some(HeaderValue::from_static("text/html")));
        assert_eq!(reply.body.as_ref(), b"<html>bad gateway</html>");
    }
}
