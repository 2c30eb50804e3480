//! Mock RPC client for testing

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hmbridge_core::{RpcClient, RpcError, RpcResult, RpcValue, WireProtocol};
use parking_lot::RwLock;

/// One call seen by the mock
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: String,
    pub params: Vec<RpcValue>,
}

/// Scripted [`RpcClient`] that records every call
///
/// Methods without a scripted answer return an empty string, which is what
/// the controller answers for most write calls.
pub struct MockRpcClient {
    protocol: WireProtocol,
    reachable: AtomicBool,
    latency: RwLock<Duration>,
    responses: RwLock<HashMap<String, RpcResult<RpcValue>>>,
    calls: RwLock<Vec<RecordedCall>>,
}

impl MockRpcClient {
    pub fn new(protocol: WireProtocol) -> Self {
        Self {
            protocol,
            reachable: AtomicBool::new(true),
            latency: RwLock::new(Duration::ZERO),
            responses: RwLock::new(HashMap::new()),
            calls: RwLock::new(Vec::new()),
        }
    }

    /// Answer `method` with `value` from now on
    pub fn set_response(&self, method: &str, value: RpcValue) {
        self.responses.write().insert(method.to_string(), Ok(value));
    }

    /// Fail `method` with `error` from now on
    pub fn set_error(&self, method: &str, error: RpcError) {
        self.responses.write().insert(method.to_string(), Err(error));
    }

    /// Simulate the controller going away; calls and connects fail
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Delay every call
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = latency;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().clone()
    }

    /// Parameters of every call to `method`, oldest first
    pub fn calls_to(&self, method: &str) -> Vec<Vec<RpcValue>> {
        self.calls
            .read()
            .iter()
            .filter(|c| c.method == method)
            .map(|c| c.params.clone())
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.write().clear();
    }
}

#[async_trait]
impl RpcClient for MockRpcClient {
    async fn call(&self, method: &str, params: Vec<RpcValue>) -> RpcResult<RpcValue> {
        self.calls.write().push(RecordedCall {
            method: method.to_string(),
            params,
        });

        let latency = *self.latency.read();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(RpcError::NotConnected);
        }

        tracing::debug!(method, "Mock RPC call");
        self.responses
            .read()
            .get(method)
            .cloned()
            .unwrap_or_else(|| Ok(RpcValue::String(String::new())))
    }

    async fn connect(&self) -> RpcResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RpcError::ConnectionFailed("mock unreachable".to_string()))
        }
    }

    fn protocol(&self) -> WireProtocol {
        self.protocol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_and_log() {
        let mock = MockRpcClient::new(WireProtocol::XmlRpc);
        mock.set_response("getVersion", RpcValue::from("2.0"));
        mock.set_error("init", RpcError::fault("busy"));

        assert_eq!(mock.call("getVersion", vec![]).await, Ok(RpcValue::from("2.0")));
        assert_eq!(mock.call("init", vec![]).await, Err(RpcError::fault("busy")));
        assert_eq!(mock.call("setValue", vec![1.into()]).await, Ok(RpcValue::from("")));

        assert_eq!(mock.calls().len(), 3);
        assert_eq!(mock.calls_to("setValue"), vec![vec![RpcValue::Int(1)]]);

        mock.set_reachable(false);
        assert!(mock.connect().await.is_err());
        assert_eq!(mock.call("ping", vec![]).await, Err(RpcError::NotConnected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_holds_the_answer() {
        use tokio_test::{assert_pending, assert_ready_eq, task};

        let mock = MockRpcClient::new(WireProtocol::BinRpc);
        mock.set_latency(Duration::from_secs(2));

        let mut call = task::spawn(mock.call("ping", vec![RpcValue::from("gateway")]));
        assert_pending!(call.poll());
        // Recorded before the answer is due
        assert_eq!(mock.calls_to("ping").len(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_pending!(call.poll());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_ready_eq!(call.poll(), Ok(RpcValue::from("")));
    }
}
