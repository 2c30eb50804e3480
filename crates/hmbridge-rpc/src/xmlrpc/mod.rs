//! XML-RPC transport
//!
//! Spoken by the `hmip` interface. Registration uses a plain `http://`
//! callback URL.

pub mod codec;
mod client;
mod server;

pub use client::XmlRpcClient;
pub use server::{create_router, XmlRpcServer};
