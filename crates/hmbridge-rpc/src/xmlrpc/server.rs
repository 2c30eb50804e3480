//! XML-RPC callback server

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use hmbridge_core::{RpcError, RpcHandler, RpcResult};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::codec::{decode_call, encode_fault, encode_response};

/// Router answering XML-RPC calls posted to `/`
pub fn create_router(handler: Arc<dyn RpcHandler>) -> Router {
    Router::new()
        .route("/", post(handle_call))
        .layer(TraceLayer::new_for_http())
        .with_state(handler)
}

async fn handle_call(State(handler): State<Arc<dyn RpcHandler>>, body: String) -> impl IntoResponse {
    let xml = match decode_call(&body) {
        Ok((method, params)) => match handler.handle(&method, params).await {
            Ok(value) => encode_response(&value),
            Err(RpcError::Fault { code, message }) => encode_fault(code, &message),
            Err(e) => encode_fault(-1, &e.to_string()),
        },
        Err(e) => {
            warn!(error = %e, "Malformed XML-RPC request");
            encode_fault(-32700, &e.to_string())
        }
    };
    ([(header::CONTENT_TYPE, "text/xml")], xml)
}

/// Accepts controller callbacks over XML-RPC
pub struct XmlRpcServer {
    listener: TcpListener,
    router: Router,
}

impl XmlRpcServer {
    pub async fn bind(addr: SocketAddr, handler: Arc<dyn RpcHandler>) -> RpcResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RpcError::ConnectionFailed(format!("bind {}: {}", addr, e)))?;
        Ok(Self {
            listener,
            router: create_router(handler),
        })
    }

    pub fn local_addr(&self) -> RpcResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| RpcError::Transport(e.to_string()))
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Ok(addr) = self.listener.local_addr() {
                info!(%addr, "XML-RPC server listening");
            }
            if let Err(e) = axum::serve(self.listener, self.router).await {
                error!(error = %e, "XML-RPC server stopped");
            }
        })
    }
}
