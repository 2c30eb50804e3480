//! Write permission check shared by all write paths

use hmbridge_core::DatapointDescriptor;

/// Outcome of checking a write against the descriptor cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCheck {
    /// Declared and writeable; coerce to the declared type
    Allowed,
    /// Not declared; written untyped after a warning
    Unknown,
    /// Declared without the write bit; no RPC call is made
    Denied,
}

impl WriteCheck {
    pub fn is_permitted(&self) -> bool {
        !matches!(self, WriteCheck::Denied)
    }
}

pub fn check_write(desc: Option<&DatapointDescriptor>) -> WriteCheck {
    match desc {
        None => WriteCheck::Unknown,
        Some(d) if d.is_writable() => WriteCheck::Allowed,
        Some(_) => WriteCheck::Denied,
    }
}
