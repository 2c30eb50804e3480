//! hmbridge-rpc - Wire protocols for Homematic controller interfaces
//!
//! This crate provides the transports behind the `RpcClient` and
//! `RpcHandler` traits:
//! - BIN-RPC client and callback server (`rfd`, `hs485d`)
//! - XML-RPC client and callback server (`hmip`)
//! - Interface discovery by TCP probing
//! - Mock client for testing
//!
//! # Example
//!
//! ```ignore
//! use hmbridge_rpc::{create_client, discovery};
//!
//! let found = discovery::discover("ccu3", discovery::default_candidates(), timeout).await;
//! for spec in &found {
//!     let client = create_client(spec, "ccu3")?;
//!     client.call("ping", vec!["gateway".into()]).await?;
//! }
//! ```

pub mod binrpc;
pub mod discovery;
pub mod mock;
pub mod xmlrpc;

use std::sync::Arc;
use std::time::Duration;

use hmbridge_core::{RpcClient, RpcResult, WireProtocol};

pub use binrpc::{BinRpcClient, BinRpcClientConfig, BinRpcServer};
pub use discovery::{default_candidates, discover, InterfaceSpec};
pub use mock::MockRpcClient;
pub use xmlrpc::{XmlRpcClient, XmlRpcServer};

/// Deepest array/struct nesting accepted from a peer
pub const MAX_NESTING: usize = 64;

/// Default time allowed for a single outbound call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a client for a discovered interface
pub fn create_client(spec: &InterfaceSpec, host: &str) -> RpcResult<Arc<dyn RpcClient>> {
    match spec.protocol {
        WireProtocol::BinRpc => {
            let mut config = BinRpcClientConfig::new(host, spec.port);
            config.call_timeout = DEFAULT_CALL_TIMEOUT;
            Ok(Arc::new(BinRpcClient::new(config)))
        }
        WireProtocol::XmlRpc => Ok(Arc::new(XmlRpcClient::new(
            host,
            spec.port,
            DEFAULT_CALL_TIMEOUT,
        )?)),
    }
}
