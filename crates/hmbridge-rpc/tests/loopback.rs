//! Client ⇄ server loopback over real sockets

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hmbridge_core::{RpcClient, RpcError, RpcHandler, RpcResult, RpcValue};
use hmbridge_rpc::{BinRpcClient, BinRpcClientConfig, BinRpcServer, XmlRpcClient, XmlRpcServer};
use parking_lot::Mutex;

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<(String, Vec<RpcValue>)>>,
}

#[async_trait]
impl RpcHandler for Recorder {
    async fn handle(&self, method: &str, params: Vec<RpcValue>) -> RpcResult<RpcValue> {
        self.seen.lock().push((method.to_string(), params));
        match method {
            "system.listMethods" => Ok(RpcValue::Array(vec!["event".into()])),
            "event" => Ok(RpcValue::from("")),
            _ => Err(RpcError::Fault {
                code: -32601,
                message: format!("unknown method {}", method),
            }),
        }
    }
}

fn event_params() -> Vec<RpcValue> {
    vec![
        "gateway_hmip".into(),
        "ABC1234:1".into(),
        "LEVEL".into(),
        RpcValue::Double(0.75),
    ]
}

#[tokio::test]
async fn xmlrpc_client_reaches_server() {
    let recorder = Arc::new(Recorder::default());
    let server = XmlRpcServer::bind("127.0.0.1:0".parse().unwrap(), recorder.clone())
        .await
        .unwrap();
    let port = server.local_addr().unwrap().port();
    server.spawn();

    let client = XmlRpcClient::new("127.0.0.1", port, Duration::from_secs(5)).unwrap();
    assert_eq!(client.url(), format!("http://127.0.0.1:{}/", port));

    let result = client.call("event", event_params()).await.unwrap();
    assert_eq!(result, RpcValue::from(""));

    let err = client.call("bogus", vec![]).await.unwrap_err();
    assert!(matches!(err, RpcError::Fault { code: -32601, .. }));

    let seen = recorder.seen.lock();
    assert_eq!(seen[0], ("event".to_string(), event_params()));
}

#[tokio::test]
async fn binrpc_client_reaches_server() {
    let recorder = Arc::new(Recorder::default());
    let server = BinRpcServer::bind("127.0.0.1:0".parse().unwrap(), recorder.clone())
        .await
        .unwrap();
    let port = server.local_addr().unwrap().port();
    server.spawn();

    let client = BinRpcClient::new(BinRpcClientConfig::new("127.0.0.1", port));
    client.connect().await.unwrap();

    let methods = client.call("system.listMethods", vec![]).await.unwrap();
    assert_eq!(methods, RpcValue::Array(vec!["event".into()]));

    let result = client.call("event", event_params()).await.unwrap();
    assert_eq!(result, RpcValue::from(""));

    assert_eq!(recorder.seen.lock().len(), 2);
}
