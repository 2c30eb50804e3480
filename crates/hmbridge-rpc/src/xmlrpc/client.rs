//! XML-RPC client over HTTP

use std::time::Duration;

use async_trait::async_trait;
use hmbridge_core::{RpcClient, RpcError, RpcResult, RpcValue, WireProtocol};
use tracing::debug;

use super::codec::{decode_response, encode_call};

/// Client for one XML-RPC interface (e.g. `hmip`)
pub struct XmlRpcClient {
    url: String,
    http: reqwest::Client,
}

impl XmlRpcClient {
    pub fn new(host: &str, port: u16, timeout: Duration) -> RpcResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::ConnectionFailed(e.to_string()))?;
        Ok(Self {
            url: format!("http://{}:{}/", host, port),
            http,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RpcClient for XmlRpcClient {
    async fn call(&self, method: &str, params: Vec<RpcValue>) -> RpcResult<RpcValue> {
        debug!(url = %self.url, method, "XML-RPC call");
        let response = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(encode_call(method, &params))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::Timeout(format!("{} on {}", method, self.url))
                } else if e.is_connect() {
                    RpcError::ConnectionFailed(e.to_string())
                } else {
                    RpcError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(RpcError::Transport(format!("HTTP {} from {}", status, self.url)));
        }
        decode_response(&body)
    }

    fn protocol(&self) -> WireProtocol {
        WireProtocol::XmlRpc
    }
}
