//! RPC transport traits
//!
//! The gateway talks to the controller through [`RpcClient`] and answers the
//! controller's callbacks through [`RpcHandler`]. Concrete BIN-RPC and XML-RPC
//! implementations live in `hmbridge-rpc`.

use std::fmt;

use async_trait::async_trait;

use crate::error::RpcResult;
use crate::value::RpcValue;

/// Wire dialect spoken by a controller interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireProtocol {
    BinRpc,
    XmlRpc,
}

impl WireProtocol {
    /// URL scheme used in the `init` callback URL
    pub fn callback_scheme(&self) -> &'static str {
        match self {
            WireProtocol::BinRpc => "xmlrpc_bin",
            WireProtocol::XmlRpc => "http",
        }
    }

    /// Callback URL announced to the controller for this dialect
    ///
    /// ```
    /// # use hmbridge_core::WireProtocol;
    /// assert_eq!(WireProtocol::BinRpc.callback_url("10.0.0.5", 2127), "xmlrpc_bin://10.0.0.5:2127");
    /// assert_eq!(WireProtocol::XmlRpc.callback_url("10.0.0.5", 2126), "http://10.0.0.5:2126");
    /// ```
    pub fn callback_url(&self, host: &str, port: u16) -> String {
        format!("{}://{}:{}", self.callback_scheme(), host, port)
    }
}

impl fmt::Display for WireProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireProtocol::BinRpc => f.write_str("binrpc"),
            WireProtocol::XmlRpc => f.write_str("xmlrpc"),
        }
    }
}

/// Outbound RPC client bound to one controller interface
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Invoke a remote method and wait for its result
    async fn call(&self, method: &str, params: Vec<RpcValue>) -> RpcResult<RpcValue>;

    /// Establish the underlying transport
    ///
    /// Stateless transports (XML-RPC over HTTP) are always ready.
    async fn connect(&self) -> RpcResult<()> {
        Ok(())
    }

    /// Dialect spoken by this client
    fn protocol(&self) -> WireProtocol;
}

/// Server-side method dispatch shared by all inbound servers
#[async_trait]
pub trait RpcHandler: Send + Sync {
    /// Answer one inbound call; an error is sent back as a fault
    async fn handle(&self, method: &str, params: Vec<RpcValue>) -> RpcResult<RpcValue>;
}
