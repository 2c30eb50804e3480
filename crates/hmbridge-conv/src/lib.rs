//! hmbridge-conv - Value conversion for the Homematic RPC gateway
//!
//! Converts between bus payloads and typed RPC values, driven by the
//! datapoint descriptors the controller publishes:
//!
//! - **Inbound** ([`inbound`]): payload text (or `{"val": ...}` JSON) into the
//!   RPC value matching the datapoint's declared type, clamped to its range
//! - **Outbound** ([`outbound`]): RPC event values into `{val, ts, lc, hm}`
//!   status payloads
//! - **Permission** ([`permission`]): write checks shared by both write paths
//!
//! # Quick Start
//!
//! ```rust
//! use hmbridge_conv::coerce_payload;
//! use hmbridge_core::{DataType, DatapointDescriptor, RpcValue};
//!
//! let level = DatapointDescriptor::new(DataType::Float, 7).with_range(0.0, 1.0);
//! assert_eq!(coerce_payload("1.5", Some(&level)), RpcValue::Double(1.0));
//! assert_eq!(coerce_payload(r#"{"val": 0.25}"#, Some(&level)), RpcValue::Double(0.25));
//! ```

pub mod error;
pub mod inbound;
mod lenient;
pub mod outbound;
pub mod permission;

pub use error::{ConvError, ConvResult};
pub use inbound::{coerce, coerce_payload, extract_value, parse_bulk_payload, stringify_value};
pub use outbound::{event_payload, fix_unit, is_retained, EventMeta, EventPayload};
pub use permission::{check_write, WriteCheck};
