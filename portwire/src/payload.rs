//! Payload model: plain data plus live transferable values.
//!
//! A [`Payload`] is what callers post through an endpoint. It mirrors
//! `serde_json::Value` and adds the two values that cannot travel inline:
//! [`ChannelEndpoint`] halves and [`BinaryBuffer`]s.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::channel::ChannelEndpoint;
use crate::error::{PortalError, PortalResult};

/// Element type a binary buffer is viewed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementView {
    /// Untyped raw bytes.
    Buffer,
    /// 8-bit unsigned elements.
    Uint8,
    /// 16-bit unsigned elements, little-endian.
    Uint16,
    /// 32-bit unsigned elements, little-endian.
    Uint32,
}

impl ElementView {
    /// Size of one element in bytes.
    pub const fn element_size(self) -> usize {
        match self {
            ElementView::Buffer | ElementView::Uint8 => 1,
            ElementView::Uint16 => 2,
            ElementView::Uint32 => 4,
        }
    }

    /// Marker tag used on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            ElementView::Buffer => "buffer",
            ElementView::Uint8 => "uint8",
            ElementView::Uint16 => "uint16",
            ElementView::Uint32 => "uint32",
        }
    }
}

/// Fixed-length byte sequence with the element view it was created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryBuffer {
    view: ElementView,
    bytes: Vec<u8>,
}

impl BinaryBuffer {
    /// Raw, untyped bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            view: ElementView::Buffer,
            bytes: bytes.into(),
        }
    }

    /// Bytes viewed as 8-bit elements.
    pub fn uint8(elements: impl Into<Vec<u8>>) -> Self {
        Self {
            view: ElementView::Uint8,
            bytes: elements.into(),
        }
    }

    /// 16-bit elements.
    pub fn uint16(elements: &[u16]) -> Self {
        Self {
            view: ElementView::Uint16,
            bytes: elements.iter().flat_map(|e| e.to_le_bytes()).collect(),
        }
    }

    /// 32-bit elements.
    pub fn uint32(elements: &[u32]) -> Self {
        Self {
            view: ElementView::Uint32,
            bytes: elements.iter().flat_map(|e| e.to_le_bytes()).collect(),
        }
    }

    /// Rebuild a buffer from its view and raw bytes.
    ///
    /// # Errors
    ///
    /// Fails if the byte length is not a whole number of elements.
    pub fn from_parts(view: ElementView, bytes: Vec<u8>) -> PortalResult<Self> {
        if bytes.len() % view.element_size() != 0 {
            return Err(PortalError::InvalidMarker {
                message: format!(
                    "{} bytes is not a whole number of {} elements",
                    bytes.len(),
                    view.as_str()
                ),
            });
        }
        Ok(Self { view, bytes })
    }

    /// Element view recorded for this buffer.
    pub fn view(&self) -> ElementView {
        self.view
    }

    /// Underlying bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the buffer, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Length in bytes.
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Number of elements in the recorded view.
    pub fn len(&self) -> usize {
        self.bytes.len() / self.view.element_size()
    }

    /// Whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Element at `index` in the recorded view, widened to `u32`.
    pub fn element(&self, index: usize) -> Option<u32> {
        let size = self.view.element_size();
        let start = index.checked_mul(size)?;
        let end = start.checked_add(size)?;
        let chunk = self.bytes.get(start..end)?;
        Some(match self.view {
            ElementView::Buffer | ElementView::Uint8 => u32::from(chunk[0]),
            ElementView::Uint16 => u32::from(u16::from_le_bytes([chunk[0], chunk[1]])),
            ElementView::Uint32 => u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
        })
    }

    /// All elements in the recorded view, widened to `u32`.
    pub fn elements(&self) -> Vec<u32> {
        (0..self.len()).filter_map(|i| self.element(i)).collect()
    }
}

/// A message body: plain JSON-like data that may embed transferable values.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    /// JSON null.
    #[default]
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON number.
    Number(Number),
    /// JSON string.
    String(String),
    /// Ordered list of payloads.
    Array(Vec<Payload>),
    /// String-keyed map of payloads.
    Object(BTreeMap<String, Payload>),
    /// Live channel endpoint, carried by surrogate.
    Port(ChannelEndpoint),
    /// Binary buffer, carried through the byte store.
    Buffer(BinaryBuffer),
}

impl Payload {
    /// Build an object payload from key/value pairs.
    pub fn object<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Payload>,
    {
        Payload::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Look up a field of an object payload.
    pub fn get(&self, key: &str) -> Option<&Payload> {
        match self {
            Payload::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// Look up an element of an array payload.
    pub fn at(&self, index: usize) -> Option<&Payload> {
        match self {
            Payload::Array(items) => items.get(index),
            _ => None,
        }
    }

    /// The endpoint, if this is a port.
    pub fn as_port(&self) -> Option<&ChannelEndpoint> {
        match self {
            Payload::Port(port) => Some(port),
            _ => None,
        }
    }

    /// The buffer, if this is a binary buffer.
    pub fn as_buffer(&self) -> Option<&BinaryBuffer> {
        match self {
            Payload::Buffer(buffer) => Some(buffer),
            _ => None,
        }
    }

    /// The string, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Payload::String(s) => Some(s),
            _ => None,
        }
    }

    /// The integer, if this is a number representable as `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Payload::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// Whether this is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Payload::Null)
    }

    /// Every channel endpoint embedded in this payload, depth-first.
    pub fn ports(&self) -> Vec<ChannelEndpoint> {
        let mut ports = Vec::new();
        self.collect_ports(&mut ports);
        ports
    }

    fn collect_ports(&self, ports: &mut Vec<ChannelEndpoint>) {
        match self {
            Payload::Port(port) => ports.push(port.clone()),
            Payload::Array(items) => items.iter().for_each(|item| item.collect_ports(ports)),
            Payload::Object(map) => map.values().for_each(|value| value.collect_ports(ports)),
            _ => {}
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Payload::Null,
            Value::Bool(b) => Payload::Bool(b),
            Value::Number(n) => Payload::Number(n),
            Value::String(s) => Payload::String(s),
            Value::Array(items) => Payload::Array(items.into_iter().map(Payload::from).collect()),
            Value::Object(map) => {
                Payload::Object(map.into_iter().map(|(k, v)| (k, Payload::from(v))).collect())
            }
        }
    }
}

impl From<ChannelEndpoint> for Payload {
    fn from(port: ChannelEndpoint) -> Self {
        Payload::Port(port)
    }
}

impl From<BinaryBuffer> for Payload {
    fn from(buffer: BinaryBuffer) -> Self {
        Payload::Buffer(buffer)
    }
}

impl From<Vec<Payload>> for Payload {
    fn from(items: Vec<Payload>) -> Self {
        Payload::Array(items)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::String(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::String(s)
    }
}

impl From<bool> for Payload {
    fn from(b: bool) -> Self {
        Payload::Bool(b)
    }
}

macro_rules! payload_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Payload {
                fn from(n: $ty) -> Self {
                    Payload::Number(Number::from(n))
                }
            }
        )*
    };
}

payload_from_integer!(i32, i64, u32, u64, usize);

impl From<f64> for Payload {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(Payload::Null, Payload::Number)
    }
}
