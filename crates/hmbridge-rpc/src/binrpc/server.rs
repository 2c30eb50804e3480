//! BIN-RPC callback server

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use hmbridge_core::{RpcError, RpcHandler, RpcResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::codec::{decode_frame, encode_fault, encode_response, Frame};

/// Accepts controller callbacks (`event`, `newDevices`, ...) over BIN-RPC
pub struct BinRpcServer {
    listener: TcpListener,
    handler: Arc<dyn RpcHandler>,
}

impl BinRpcServer {
    pub async fn bind(addr: SocketAddr, handler: Arc<dyn RpcHandler>) -> RpcResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RpcError::ConnectionFailed(format!("bind {}: {}", addr, e)))?;
        Ok(Self { listener, handler })
    }

    pub fn local_addr(&self) -> RpcResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| RpcError::Transport(e.to_string()))
    }

    /// Run the accept loop on a background task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "BIN-RPC server listening");
        }
        loop {
            match self.listener.accept().await {
                Ok((socket, peer)) => {
                    debug!(%peer, "BIN-RPC connection accepted");
                    let handler = Arc::clone(&self.handler);
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(socket, handler).await {
                            warn!(%peer, error = %e, "BIN-RPC connection closed with error");
                        }
                    });
                }
                Err(e) => error!(error = %e, "BIN-RPC accept failed"),
            }
        }
    }
}

async fn serve_connection(mut socket: TcpStream, handler: Arc<dyn RpcHandler>) -> RpcResult<()> {
    let mut buf = BytesMut::with_capacity(8192);
    loop {
        while let Some(frame) = decode_frame(&mut buf)? {
            let reply = match frame {
                Frame::Request { method, params } => match handler.handle(&method, params).await {
                    Ok(value) => encode_response(&value),
                    Err(RpcError::Fault { code, message }) => encode_fault(code, &message),
                    Err(e) => encode_fault(-1, &e.to_string()),
                },
                other => {
                    warn!(frame = ?other, "Ignoring non-request frame");
                    continue;
                }
            };
            socket
                .write_all(&reply)
                .await
                .map_err(|e| RpcError::Transport(e.to_string()))?;
        }

        let n = socket
            .read_buf(&mut buf)
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        if n == 0 {
            return Ok(());
        }
    }
}
