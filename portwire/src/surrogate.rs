//! Surrogate ids and the inline markers that stand in for transferables.
//!
//! # Wire format
//!
//! Markers are JSON objects carrying the reserved [`MARKER_KEY`]:
//!
//! ```text
//! {"__PORT__@": "port",   "port": "__PORT__@1718000000000-1-9f3c..."}
//! {"__PORT__@": "uint16", "blob": "mem:4"}
//! ```
//!
//! A port marker's id is also the name of the backing connection that
//! carries that endpoint's traffic.

use std::cell::Cell;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};

use crate::error::{PortalError, PortalResult};
use crate::payload::ElementView;
use crate::store::StoreHandle;

/// Reserved object key identifying a surrogate marker.
pub const MARKER_KEY: &str = "__PORT__@";

/// Default prefix of surrogate ids and virtual connection names.
pub const DEFAULT_NAMESPACE_PREFIX: &str = "__PORT__@";

const PORT_KIND: &str = "port";
const PORT_FIELD: &str = "port";
const BLOB_FIELD: &str = "blob";

/// Unique id minted for each serialized endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurrogateId(String);

impl SurrogateId {
    /// Wrap an existing id, e.g. one read from a marker.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string; also the backing connection name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SurrogateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a connection name belongs to the virtual port namespace.
pub fn is_virtual_port_name(name: &str, prefix: &str) -> bool {
    name.starts_with(prefix)
}

/// Mints surrogate ids: prefix, wall-clock millis, sequence, random suffix.
///
/// The per-minter sequence guarantees ids are never reused even when two
/// mintings share a millisecond and the random suffix collides.
#[derive(Debug)]
pub struct SurrogateIdMinter {
    prefix: String,
    sequence: Cell<u64>,
}

impl SurrogateIdMinter {
    /// Create a minter for the given namespace prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            sequence: Cell::new(0),
        }
    }

    /// Namespace prefix of minted ids.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Mint a fresh id.
    pub fn mint(&self) -> SurrogateId {
        let sequence = self.sequence.get() + 1;
        self.sequence.set(sequence);

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let suffix: u64 = rand::random();

        SurrogateId(format!(
            "{}{}-{}-{:016x}",
            self.prefix, millis, sequence, suffix
        ))
    }

    /// Number of ids minted so far.
    pub fn minted(&self) -> u64 {
        self.sequence.get()
    }
}

/// Inline placeholder for a transferable value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurrogateMarker {
    /// A channel endpoint, reachable over the connection named `id`.
    Port {
        /// Surrogate id and backing connection name.
        id: SurrogateId,
    },
    /// A binary buffer published to the byte store.
    Buffer {
        /// View recorded at serialization time.
        view: ElementView,
        /// Store handle of the bytes.
        handle: StoreHandle,
    },
}

/// Result of inspecting an object for a marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerMatch {
    /// No marker key present: an ordinary object.
    Plain,
    /// A marker with a known kind.
    Known(SurrogateMarker),
    /// The marker key is present but its kind is not one we reconstruct.
    Unrecognized(Value),
}

impl SurrogateMarker {
    /// Encode the marker as its JSON object.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        match self {
            SurrogateMarker::Port { id } => {
                map.insert(MARKER_KEY.to_string(), Value::from(PORT_KIND));
                map.insert(PORT_FIELD.to_string(), Value::from(id.as_str()));
            }
            SurrogateMarker::Buffer { view, handle } => {
                map.insert(MARKER_KEY.to_string(), Value::from(view.as_str()));
                map.insert(BLOB_FIELD.to_string(), Value::from(handle.as_str()));
            }
        }
        Value::Object(map)
    }

    /// Inspect an object for a marker.
    ///
    /// # Errors
    ///
    /// Fails when the kind is known but its id or handle field is missing.
    pub fn inspect(object: &Map<String, Value>) -> PortalResult<MarkerMatch> {
        let Some(kind) = object.get(MARKER_KEY) else {
            return Ok(MarkerMatch::Plain);
        };

        if kind.as_str() == Some(PORT_KIND) {
            let id = required_str(object, PORT_FIELD)?;
            return Ok(MarkerMatch::Known(SurrogateMarker::Port {
                id: SurrogateId::new(id),
            }));
        }

        match serde_json::from_value::<ElementView>(kind.clone()) {
            Ok(view) => {
                let handle = required_str(object, BLOB_FIELD)?;
                Ok(MarkerMatch::Known(SurrogateMarker::Buffer {
                    view,
                    handle: StoreHandle::new(handle),
                }))
            }
            Err(_) => Ok(MarkerMatch::Unrecognized(kind.clone())),
        }
    }
}

fn required_str<'a>(object: &'a Map<String, Value>, field: &str) -> PortalResult<&'a str> {
    object
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| PortalError::InvalidMarker {
            message: format!("marker is missing string field '{field}'"),
        })
}
