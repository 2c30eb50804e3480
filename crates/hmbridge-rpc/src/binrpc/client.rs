//! BIN-RPC client over a persistent TCP connection

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use hmbridge_core::{RpcClient, RpcError, RpcResult, RpcValue, WireProtocol};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::codec::{decode_frame, encode_request};

/// BIN-RPC client settings
#[derive(Debug, Clone)]
pub struct BinRpcClientConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub call_timeout: Duration,
}

impl BinRpcClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Duration::from_secs(5),
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Client for one BIN-RPC interface (e.g. `rfd`, `hs485d`)
///
/// Calls are serialized over a single connection. A connection the peer has
/// closed is re-established once per call before the error is reported.
pub struct BinRpcClient {
    config: BinRpcClientConfig,
    connection: Mutex<Option<TcpStream>>,
    connected: AtomicBool,
}

impl BinRpcClient {
    pub fn new(config: BinRpcClientConfig) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    async fn open(&self) -> RpcResult<TcpStream> {
        let addr = self.addr();
        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| RpcError::Timeout(format!("Connecting to {}", addr)))?
            .map_err(|e| RpcError::ConnectionFailed(format!("{}: {}", addr, e)))?;
        stream.set_nodelay(true).ok();
        Ok(stream)
    }

    async fn exchange(stream: &mut TcpStream, request: &[u8]) -> RpcResult<RpcValue> {
        stream
            .write_all(request)
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let mut buf = BytesMut::with_capacity(4096);
        loop {
            if let Some(frame) = decode_frame(&mut buf)? {
                return frame.into_result();
            }
            let n = stream
                .read_buf(&mut buf)
                .await
                .map_err(|e| RpcError::Transport(e.to_string()))?;
            if n == 0 {
                return Err(RpcError::NotConnected);
            }
        }
    }

    async fn call_inner(&self, method: &str, params: &[RpcValue]) -> RpcResult<RpcValue> {
        let request = encode_request(method, params);
        let mut guard = self.connection.lock().await;

        let reused = guard.is_some();
        let mut stream = match guard.take() {
            Some(stream) => stream,
            None => self.open().await?,
        };

        let result = match Self::exchange(&mut stream, &request).await {
            Err(RpcError::NotConnected) | Err(RpcError::Transport(_)) if reused => {
                debug!(addr = %self.addr(), "Stale BIN-RPC connection, reconnecting");
                stream = self.open().await?;
                Self::exchange(&mut stream, &request).await
            }
            other => other,
        };

        match &result {
            Ok(_) | Err(RpcError::Fault { .. }) => {
                *guard = Some(stream);
                self.connected.store(true, Ordering::SeqCst);
            }
            Err(_) => self.connected.store(false, Ordering::SeqCst),
        }
        result
    }
}

#[async_trait]
impl RpcClient for BinRpcClient {
    async fn call(&self, method: &str, params: Vec<RpcValue>) -> RpcResult<RpcValue> {
        debug!(addr = %self.addr(), method, "BIN-RPC call");
        match tokio::time::timeout(self.config.call_timeout, self.call_inner(method, &params)).await
        {
            Ok(result) => result,
            Err(_) => {
                // The connection state is unknown after an abandoned exchange
                *self.connection.lock().await = None;
                self.connected.store(false, Ordering::SeqCst);
                Err(RpcError::Timeout(format!("{} on {}", method, self.addr())))
            }
        }
    }

    /// Open the connection so registration can follow
    async fn connect(&self) -> RpcResult<()> {
        let mut guard = self.connection.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        match self.open().await {
            Ok(stream) => {
                *guard = Some(stream);
                self.connected.store(true, Ordering::SeqCst);
                info!(addr = %self.addr(), "BIN-RPC connected");
                Ok(())
            }
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                warn!(addr = %self.addr(), error = %e, "BIN-RPC connect failed");
                Err(e)
            }
        }
    }

    fn protocol(&self) -> WireProtocol {
        WireProtocol::BinRpc
    }
}
