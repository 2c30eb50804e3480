//! BIN-RPC frame and value encoding
//!
//! Frame layout: `"Bin"`, one message type byte, a big-endian `u32` body
//! length, then the body. Requests carry the method name followed by the
//! parameter array; responses carry a single value; faults carry a
//! `{faultCode, faultString}` struct.
//!
//! Type bytes with bit `0x40` set announce a header block (`u32` length plus
//! payload) between the frame header and the body. Headers are skipped.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use hmbridge_core::{RpcError, RpcResult, RpcValue};

use crate::MAX_NESTING;

const MAGIC: &[u8; 3] = b"Bin";
const FRAME_HEADER_LEN: usize = 8;

const MSG_REQUEST: u8 = 0x00;
const MSG_RESPONSE: u8 = 0x01;
const MSG_FAULT: u8 = 0xFF;
const MSG_HEADERS_FLAG: u8 = 0x40;

const TYPE_INTEGER: u32 = 0x01;
const TYPE_BOOL: u32 = 0x02;
const TYPE_STRING: u32 = 0x03;
const TYPE_DOUBLE: u32 = 0x04;
const TYPE_BASE64: u32 = 0x11;
const TYPE_ARRAY: u32 = 0x100;
const TYPE_STRUCT: u32 = 0x101;

/// Upper bound for a single frame body; larger announcements are rejected
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Mantissa scale of the BIN-RPC double representation
const MANTISSA_SCALE: f64 = 1_073_741_824.0; // 0x40000000

/// A decoded BIN-RPC message
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Request {
        method: String,
        params: Vec<RpcValue>,
    },
    Response(RpcValue),
    Fault {
        code: i32,
        message: String,
    },
}

impl Frame {
    /// Response or fault as a call result
    pub fn into_result(self) -> RpcResult<RpcValue> {
        match self {
            Frame::Response(value) => Ok(value),
            Frame::Fault { code, message } => Err(RpcError::Fault { code, message }),
            Frame::Request { method, .. } => Err(RpcError::Protocol(format!(
                "Expected response, got request for {}",
                method
            ))),
        }
    }
}

pub fn encode_request(method: &str, params: &[RpcValue]) -> Bytes {
    let mut body = BytesMut::new();
    put_string(&mut body, method);
    body.put_u32(params.len() as u32);
    for param in params {
        put_value(&mut body, param);
    }
    frame(MSG_REQUEST, body)
}

pub fn encode_response(value: &RpcValue) -> Bytes {
    let mut body = BytesMut::new();
    put_value(&mut body, value);
    frame(MSG_RESPONSE, body)
}

pub fn encode_fault(code: i32, message: &str) -> Bytes {
    let mut members = BTreeMap::new();
    members.insert("faultCode".to_string(), RpcValue::Int(code));
    members.insert("faultString".to_string(), RpcValue::from(message));
    let mut body = BytesMut::new();
    put_value(&mut body, &RpcValue::Struct(members));
    frame(MSG_FAULT, body)
}

fn frame(msg_type: u8, body: BytesMut) -> Bytes {
    let mut out = BytesMut::with_capacity(FRAME_HEADER_LEN + body.len());
    out.put_slice(MAGIC);
    out.put_u8(msg_type);
    out.put_u32(body.len() as u32);
    out.put_slice(&body);
    out.freeze()
}

/// Try to take one complete frame off the front of `buf`
///
/// Returns `Ok(None)` while more bytes are needed. Consumed bytes are removed
/// from the buffer only once a whole frame is available.
pub fn decode_frame(buf: &mut BytesMut) -> RpcResult<Option<Frame>> {
    if buf.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }
    if &buf[..3] != MAGIC {
        return Err(RpcError::Protocol("Missing BIN-RPC magic".to_string()));
    }
    let msg_type = buf[3];

    let mut offset = 4;
    if msg_type != MSG_FAULT && msg_type & MSG_HEADERS_FLAG != 0 {
        let header_len = read_len_at(buf, offset)?;
        offset += 4 + header_len;
        if buf.len() < offset + 4 {
            return Ok(None);
        }
    }
    let body_len = read_len_at(buf, offset)?;
    offset += 4;
    if buf.len() < offset + body_len {
        return Ok(None);
    }

    let frame_bytes = buf.split_to(offset + body_len);
    let mut body = &frame_bytes[offset..];

    let frame = match msg_type {
        MSG_FAULT => {
            let value = get_value(&mut body, 0)?;
            Frame::Fault {
                code: value.get("faultCode").and_then(RpcValue::as_i32).unwrap_or(-1),
                message: value
                    .get("faultString")
                    .and_then(RpcValue::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }
        }
        t if t & !MSG_HEADERS_FLAG == MSG_REQUEST => {
            let method = get_string(&mut body)?;
            let count = get_u32(&mut body)? as usize;
            let mut params = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                params.push(get_value(&mut body, 0)?);
            }
            Frame::Request { method, params }
        }
        t if t & !MSG_HEADERS_FLAG == MSG_RESPONSE => {
            if body.is_empty() {
                Frame::Response(RpcValue::Nil)
            } else {
                Frame::Response(get_value(&mut body, 0)?)
            }
        }
        other => {
            return Err(RpcError::Protocol(format!(
                "Unknown BIN-RPC message type 0x{:02X}",
                other
            )))
        }
    };
    Ok(Some(frame))
}

fn read_len_at(buf: &[u8], offset: usize) -> RpcResult<usize> {
    let bytes = buf
        .get(offset..offset + 4)
        .ok_or_else(|| RpcError::Protocol("Truncated length".to_string()))?;
    let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(RpcError::Protocol(format!("Frame too large: {} bytes", len)));
    }
    Ok(len)
}

fn put_string(out: &mut BytesMut, s: &str) {
    out.put_u32(s.len() as u32);
    out.put_slice(s.as_bytes());
}

fn put_value(out: &mut BytesMut, value: &RpcValue) {
    match value {
        RpcValue::Int(i) => {
            out.put_u32(TYPE_INTEGER);
            out.put_i32(*i);
        }
        RpcValue::Bool(b) => {
            out.put_u32(TYPE_BOOL);
            out.put_u8(u8::from(*b));
        }
        RpcValue::String(s) | RpcValue::DateTime(s) => {
            out.put_u32(TYPE_STRING);
            put_string(out, s);
        }
        RpcValue::Double(d) => {
            let (mantissa, exponent) = split_double(*d);
            out.put_u32(TYPE_DOUBLE);
            out.put_i32(mantissa);
            out.put_i32(exponent);
        }
        RpcValue::Base64(data) => {
            out.put_u32(TYPE_BASE64);
            put_string(out, &BASE64_STANDARD.encode(data));
        }
        RpcValue::Array(items) => {
            out.put_u32(TYPE_ARRAY);
            out.put_u32(items.len() as u32);
            for item in items {
                put_value(out, item);
            }
        }
        RpcValue::Struct(members) => {
            out.put_u32(TYPE_STRUCT);
            out.put_u32(members.len() as u32);
            for (name, member) in members {
                put_string(out, name);
                put_value(out, member);
            }
        }
        // No nil on the wire
        RpcValue::Nil => {
            out.put_u32(TYPE_STRING);
            out.put_u32(0);
        }
    }
}

/// Mantissa/exponent pair with `value = mantissa / 2^30 * 2^exponent`
fn split_double(value: f64) -> (i32, i32) {
    if value == 0.0 || !value.is_finite() {
        return (0, 0);
    }
    let exponent = value.abs().log2().floor() as i32 + 1;
    let mantissa = (value * 2f64.powi(-exponent) * MANTISSA_SCALE).floor() as i32;
    (mantissa, exponent)
}

fn join_double(mantissa: i32, exponent: i32) -> f64 {
    let value = f64::from(mantissa) / MANTISSA_SCALE * 2f64.powi(exponent);
    // The representation carries ~30 bits; trim the noise it leaves behind
    (value * 1e6).round() / 1e6
}

fn need(buf: &&[u8], n: usize) -> RpcResult<()> {
    if buf.remaining() < n {
        Err(RpcError::Protocol(format!(
            "Truncated BIN-RPC body: need {} bytes, have {}",
            n,
            buf.remaining()
        )))
    } else {
        Ok(())
    }
}

fn get_u32(buf: &mut &[u8]) -> RpcResult<u32> {
    need(buf, 4)?;
    Ok(buf.get_u32())
}

fn get_i32(buf: &mut &[u8]) -> RpcResult<i32> {
    need(buf, 4)?;
    Ok(buf.get_i32())
}

fn get_bytes(buf: &mut &[u8]) -> RpcResult<Vec<u8>> {
    let len = get_u32(buf)? as usize;
    need(buf, len)?;
    let data = buf[..len].to_vec();
    buf.advance(len);
    Ok(data)
}

/// Strings are decoded lossily; firmware occasionally sends Latin-1 units
fn get_string(buf: &mut &[u8]) -> RpcResult<String> {
    let data = get_bytes(buf)?;
    Ok(String::from_utf8_lossy(&data).into_owned())
}

fn get_value(buf: &mut &[u8], depth: usize) -> RpcResult<RpcValue> {
    if depth > MAX_NESTING {
        return Err(RpcError::Protocol(format!(
            "BIN-RPC value nesting deeper than {}",
            MAX_NESTING
        )));
    }
    let tag = get_u32(buf)?;
    let value = match tag {
        TYPE_INTEGER => RpcValue::Int(get_i32(buf)?),
        TYPE_BOOL => {
            need(buf, 1)?;
            RpcValue::Bool(buf.get_u8() != 0)
        }
        TYPE_STRING => RpcValue::String(get_string(buf)?),
        TYPE_DOUBLE => {
            let mantissa = get_i32(buf)?;
            let exponent = get_i32(buf)?;
            RpcValue::Double(join_double(mantissa, exponent))
        }
        TYPE_BASE64 => {
            let text = get_string(buf)?;
            let data = BASE64_STANDARD
                .decode(text.trim())
                .map_err(|e| RpcError::Protocol(format!("Invalid base64: {}", e)))?;
            RpcValue::Base64(data)
        }
        TYPE_ARRAY => {
            let count = get_u32(buf)? as usize;
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                items.push(get_value(buf, depth + 1)?);
            }
            RpcValue::Array(items)
        }
        TYPE_STRUCT => {
            let count = get_u32(buf)? as usize;
            let mut members = BTreeMap::new();
            for _ in 0..count {
                let name = get_string(buf)?;
                members.insert(name, get_value(buf, depth + 1)?);
            }
            RpcValue::Struct(members)
        }
        other => {
            return Err(RpcError::Protocol(format!(
                "Unknown BIN-RPC value type 0x{:X}",
                other
            )))
        }
    };
    Ok(value)
}
