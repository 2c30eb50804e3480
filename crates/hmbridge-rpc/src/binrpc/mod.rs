//! BIN-RPC transport
//!
//! Binary dialect spoken by the `rfd` (radio) and `hs485d` (wired)
//! interfaces. Registration uses the `xmlrpc_bin://` callback scheme.

pub mod codec;
mod client;
mod server;

pub use client::{BinRpcClient, BinRpcClientConfig};
pub use server::BinRpcServer;
