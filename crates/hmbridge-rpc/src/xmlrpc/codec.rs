//! XML-RPC document encoding and decoding

use std::collections::BTreeMap;
use std::fmt::Write as _;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use hmbridge_core::{RpcError, RpcResult, RpcValue};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::MAX_NESTING;

const XML_DECL: &str = r#"<?xml version="1.0"?>"#;

/// Element depth bound: envelope plus three elements per value level
const MAX_ELEMENT_DEPTH: usize = 8 + 3 * MAX_NESTING;

/// Minimal element tree built from the event stream
#[derive(Debug, Default)]
struct Element {
    name: String,
    children: Vec<Node>,
}

#[derive(Debug)]
enum Node {
    Element(Element),
    Text(String),
}

impl Element {
    fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|el| el.name == name)
    }

    fn expect_child(&self, name: &str) -> RpcResult<&Element> {
        self.child(name).ok_or_else(|| {
            RpcError::Protocol(format!("<{}> is missing <{}>", self.name, name))
        })
    }

    fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let Node::Text(t) = node {
                out.push_str(t);
            }
        }
        out
    }
}

fn parse_document(xml: &str) -> RpcResult<Element> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = vec![Element::default()];

    loop {
        let event = reader
            .read_event()
            .map_err(|e| RpcError::Protocol(format!("XML: {}", e)))?;
        match event {
            Event::Start(start) => {
                if stack.len() > MAX_ELEMENT_DEPTH {
                    return Err(RpcError::Protocol(format!(
                        "XML nesting deeper than {} elements",
                        MAX_ELEMENT_DEPTH
                    )));
                }
                stack.push(Element {
                    name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
                    children: Vec::new(),
                })
            }
            Event::Empty(empty) => {
                let el = Element {
                    name: String::from_utf8_lossy(empty.local_name().as_ref()).into_owned(),
                    children: Vec::new(),
                };
                push_child(&mut stack, Node::Element(el))?;
            }
            Event::End(_) => {
                if stack.len() < 2 {
                    return Err(RpcError::Protocol("Unbalanced XML".to_string()));
                }
                if let Some(done) = stack.pop() {
                    push_child(&mut stack, Node::Element(done))?;
                }
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| RpcError::Protocol(format!("XML text: {}", e)))?;
                push_child(&mut stack, Node::Text(text.into_owned()))?;
            }
            Event::CData(data) => {
                let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                push_child(&mut stack, Node::Text(text))?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() != 1 {
        return Err(RpcError::Protocol("Unterminated XML element".to_string()));
    }
    stack
        .pop()
        .and_then(|root| {
            root.children.into_iter().find_map(|node| match node {
                Node::Element(el) => Some(el),
                Node::Text(_) => None,
            })
        })
        .ok_or_else(|| RpcError::Protocol("Empty XML document".to_string()))
}

fn push_child(stack: &mut [Element], node: Node) -> RpcResult<()> {
    stack
        .last_mut()
        .map(|parent| parent.children.push(node))
        .ok_or_else(|| RpcError::Protocol("Unbalanced XML".to_string()))
}

fn decode_value(value: &Element, depth: usize) -> RpcResult<RpcValue> {
    if depth > MAX_NESTING {
        return Err(RpcError::Protocol(format!(
            "XML-RPC value nesting deeper than {}",
            MAX_NESTING
        )));
    }
    let Some(typed) = value.elements().next() else {
        // Untyped <value>text</value> is a string
        return Ok(RpcValue::String(value.text()));
    };

    let text = typed.text();
    let parsed = match typed.name.as_str() {
        "i4" | "int" => RpcValue::Int(
            text.trim()
                .parse()
                .map_err(|_| RpcError::Protocol(format!("Invalid int: {}", text)))?,
        ),
        "i8" => {
            let wide: i64 = text
                .trim()
                .parse()
                .map_err(|_| RpcError::Protocol(format!("Invalid i8: {}", text)))?;
            i32::try_from(wide)
                .map(RpcValue::Int)
                .unwrap_or(RpcValue::Double(wide as f64))
        }
        "boolean" => RpcValue::Bool(matches!(text.trim(), "1" | "true")),
        "string" => RpcValue::String(text),
        "double" => RpcValue::Double(
            text.trim()
                .parse()
                .map_err(|_| RpcError::Protocol(format!("Invalid double: {}", text)))?,
        ),
        "base64" => {
            let compact: String = text.split_whitespace().collect();
            RpcValue::Base64(
                BASE64_STANDARD
                    .decode(compact)
                    .map_err(|e| RpcError::Protocol(format!("Invalid base64: {}", e)))?,
            )
        }
        "dateTime.iso8601" => RpcValue::DateTime(text.trim().to_string()),
        "array" => {
            let data = typed.expect_child("data")?;
            RpcValue::Array(
                data.elements()
                    .filter(|el| el.name == "value")
                    .map(|el| decode_value(el, depth + 1))
                    .collect::<RpcResult<Vec<_>>>()?,
            )
        }
        "struct" => {
            let mut members = BTreeMap::new();
            for member in typed.elements().filter(|el| el.name == "member") {
                let name = member.expect_child("name")?.text();
                let value = decode_value(member.expect_child("value")?, depth + 1)?;
                members.insert(name, value);
            }
            RpcValue::Struct(members)
        }
        "nil" => RpcValue::Nil,
        other => {
            return Err(RpcError::Protocol(format!(
                "Unsupported XML-RPC type <{}>",
                other
            )))
        }
    };
    Ok(parsed)
}

fn decode_params(params: Option<&Element>) -> RpcResult<Vec<RpcValue>> {
    let Some(params) = params else {
        return Ok(Vec::new());
    };
    params
        .elements()
        .filter(|el| el.name == "param")
        .map(|param| decode_value(param.expect_child("value")?, 0))
        .collect()
}

/// Parse a `<methodCall>` document into method name and parameters
pub fn decode_call(xml: &str) -> RpcResult<(String, Vec<RpcValue>)> {
    let root = parse_document(xml)?;
    if root.name != "methodCall" {
        return Err(RpcError::Protocol(format!(
            "Expected <methodCall>, got <{}>",
            root.name
        )));
    }
    let method = root.expect_child("methodName")?.text().trim().to_string();
    let params = decode_params(root.child("params"))?;
    Ok((method, params))
}

/// Parse a `<methodResponse>` document; a fault becomes [`RpcError::Fault`]
pub fn decode_response(xml: &str) -> RpcResult<RpcValue> {
    let root = parse_document(xml)?;
    if root.name != "methodResponse" {
        return Err(RpcError::Protocol(format!(
            "Expected <methodResponse>, got <{}>",
            root.name
        )));
    }
    if let Some(fault) = root.child("fault") {
        let value = decode_value(fault.expect_child("value")?, 0)?;
        return Err(RpcError::Fault {
            code: value.get("faultCode").and_then(RpcValue::as_i32).unwrap_or(-1),
            message: value
                .get("faultString")
                .and_then(RpcValue::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }
    Ok(decode_params(root.child("params"))?
        .into_iter()
        .next()
        .unwrap_or(RpcValue::String(String::new())))
}

fn write_value(out: &mut String, value: &RpcValue) {
    out.push_str("<value>");
    match value {
        RpcValue::Int(i) => {
            let _ = write!(out, "<i4>{}</i4>", i);
        }
        RpcValue::Bool(b) => {
            let _ = write!(out, "<boolean>{}</boolean>", u8::from(*b));
        }
        RpcValue::String(s) => {
            let _ = write!(out, "<string>{}</string>", escape(s.as_str()));
        }
        RpcValue::Double(d) => {
            let _ = write!(out, "<double>{}</double>", format_double(*d));
        }
        RpcValue::Base64(data) => {
            let _ = write!(out, "<base64>{}</base64>", BASE64_STANDARD.encode(data));
        }
        RpcValue::DateTime(s) => {
            let _ = write!(out, "<dateTime.iso8601>{}</dateTime.iso8601>", escape(s.as_str()));
        }
        RpcValue::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(out, item);
            }
            out.push_str("</data></array>");
        }
        RpcValue::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                let _ = write!(out, "<member><name>{}</name>", escape(name.as_str()));
                write_value(out, member);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
        RpcValue::Nil => out.push_str("<nil/>"),
    }
    out.push_str("</value>");
}

/// Doubles always carry a decimal point so peers never read them as integers
fn format_double(d: f64) -> String {
    if !d.is_finite() {
        "0.0".to_string()
    } else if d.fract() == 0.0 {
        format!("{:.1}", d)
    } else {
        format!("{}", d)
    }
}

pub fn encode_call(method: &str, params: &[RpcValue]) -> String {
    let mut out = String::with_capacity(256);
    out.push_str(XML_DECL);
    let _ = write!(
        out,
        "<methodCall><methodName>{}</methodName><params>",
        escape(method)
    );
    for param in params {
        out.push_str("<param>");
        write_value(&mut out, param);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}

pub fn encode_response(value: &RpcValue) -> String {
    let mut out = String::with_capacity(128);
    out.push_str(XML_DECL);
    out.push_str("<methodResponse><params><param>");
    write_value(&mut out, value);
    out.push_str("</param></params></methodResponse>");
    out
}

pub fn encode_fault(code: i32, message: &str) -> String {
    let mut members = BTreeMap::new();
    members.insert("faultCode".to_string(), RpcValue::Int(code));
    members.insert("faultString".to_string(), RpcValue::from(message));
    let mut out = String::with_capacity(256);
    out.push_str(XML_DECL);
    out.push_str("<methodResponse><fault>");
    write_value(&mut out, &RpcValue::Struct(members));
    out.push_str("</fault></methodResponse>");
    out
}
