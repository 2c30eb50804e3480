//! hmbridge-core - Core types and traits for the Homematic RPC gateway
//!
//! This crate provides the vocabulary shared by the wire protocols, the value
//! codec and the gateway engine: typed RPC values, device and paramset
//! descriptors, and the traits behind which the gateway's collaborators
//! (RPC transport, message bus, persistence, logic layer) live.

pub mod bus;
pub mod error;
pub mod logic;
pub mod models;
pub mod names;
pub mod rpc;
pub mod store;
pub mod topics;
pub mod value;

pub use bus::MessageBus;
pub use error::{BusError, DescriptorError, RpcError, RpcResult, StoreError};
pub use logic::{LogicLayer, NoLogicLayer};
pub use models::*;
pub use names::NameTable;
pub use rpc::{RpcClient, RpcHandler, WireProtocol};
pub use store::BlobStore;
pub use value::RpcValue;
