//! hmbridge-gateway - Homematic RPC ⇄ message bus gateway engine
//!
//! This crate ties the controller interfaces to the message bus: it
//! registers with every interface, answers the controller's callbacks,
//! caches device and paramset metadata, and turns bus commands into RPC
//! calls.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Gateway                                 │
//! │                                                                  │
//! │   bus message ──► router ──────────────┐                         │
//! │                                        ▼                         │
//! │   callback ────► InboundDispatcher ─► GatewayContext             │
//! │                                        │  MetadataRegistry       │
//! │                                        │  ValueTracker           │
//! │                                        │  FetchQueue (per iface) │
//! │                                        ▼                         │
//! │              ┌─────────────────┬─────────────────┐               │
//! │              ▼                 ▼                 ▼               │
//! │     InterfaceConnection InterfaceConnection InterfaceConnection  │
//! │          (rfd)             (hs485d)            (hmip)            │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let gateway = Gateway::builder(config, bus, store)
//!     .interface(InterfaceSpec::new("hmip", 2010, WireProtocol::XmlRpc), client)
//!     .build();
//! XmlRpcServer::bind(addr, gateway.handler()).await?.spawn();
//! gateway.start().await;
//! gateway.handle_message("hm/set/Kitchen Blind/LEVEL", "0.5").await;
//! ```

pub mod config;
pub mod connection;
pub mod context;
pub mod dispatcher;
pub mod duty_cycle;
pub mod error;
pub mod fetch_queue;
pub mod gateway;
pub mod registry;
pub mod router;
pub mod testing;
pub mod timers;
pub mod values;

pub use config::GatewayConfig;
pub use connection::{ConnectionState, InterfaceConnection};
pub use context::GatewayContext;
pub use dispatcher::{InboundDispatcher, InboundMethod};
pub use error::{GatewayError, GatewayResult};
pub use gateway::{Gateway, GatewayBuilder};
pub use registry::MetadataRegistry;
pub use router::TopicCommand;
