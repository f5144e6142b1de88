//! Configuration structures for port virtualization.

use crate::surrogate::DEFAULT_NAMESPACE_PREFIX;

/// How backing connections for surrogate ids are resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Topology {
    /// This process opens the backing connection itself, by name.
    #[default]
    PeerInitiated,

    /// This process accepts inbound backing connections and hands them to
    /// whichever pairing is waiting on that name.
    HubBrokered,
}

/// Limits and naming used by the serializer and deserializer.
#[derive(Clone, Debug)]
pub struct PortalConfig {
    /// Prefix of every surrogate id and therefore of every backing
    /// connection name owned by this machinery.
    pub namespace_prefix: String,

    /// Maximum nesting depth walked in a single payload.
    pub max_depth: usize,

    /// Maximum size in bytes of a buffer published to the store.
    pub max_buffer_len: usize,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            namespace_prefix: DEFAULT_NAMESPACE_PREFIX.to_string(),
            max_depth: 128,
            max_buffer_len: 64 * 1024 * 1024,
        }
    }
}

impl PortalConfig {
    /// Create a configuration with the given limits and the default prefix.
    pub fn new(max_depth: usize, max_buffer_len: usize) -> Self {
        Self {
            namespace_prefix: DEFAULT_NAMESPACE_PREFIX.to_string(),
            max_depth,
            max_buffer_len,
        }
    }

    /// Use a different namespace prefix.
    pub fn with_namespace_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.namespace_prefix = prefix.into();
        self
    }

    /// Tight limits for untrusted peers.
    pub fn strict() -> Self {
        Self {
            namespace_prefix: DEFAULT_NAMESPACE_PREFIX.to_string(),
            max_depth: 32,
            max_buffer_len: 1024 * 1024,
        }
    }

    /// Generous limits for trusted, same-host peers.
    pub fn permissive() -> Self {
        Self {
            namespace_prefix: DEFAULT_NAMESPACE_PREFIX.to_string(),
            max_depth: 1024,
            max_buffer_len: 1024 * 1024 * 1024,
        }
    }
}
