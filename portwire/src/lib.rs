//! # Portwire
//!
//! Port virtualization: carry an RPC transport over named channels that can
//! only move plain data.
//!
//! This crate provides:
//! - **Endpoint adapter**: the RPC transport contract over one backing connection
//! - **Serializer / deserializer**: live endpoints and binary buffers become
//!   surrogate markers on the wire and are reconstructed on arrival, recursively
//! - **Shadow pairings**: per-endpoint relays over connections named by
//!   surrogate id
//! - **Connection registry**: hub-side rendezvous of inbound connections and
//!   waiting pairings
//!
//! Everything is single-threaded: run it inside a `tokio::task::LocalSet`.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// =============================================================================
// Modules
// =============================================================================

/// Error types for port virtualization.
pub mod error;

/// Limits, naming and topology selection.
pub mod config;

/// Waker-notified FIFO queue used by channels and adapters.
pub mod queue;

/// In-process paired channel endpoints.
pub mod channel;

/// Structured payloads and binary buffers.
pub mod payload;

/// Surrogate ids and wire markers.
pub mod surrogate;

/// External byte store for buffer contents.
pub mod store;

/// Backing connection and host contracts, plus an in-memory implementation.
pub mod connection;

/// Hub-side table of accepted connections.
pub mod registry;

/// Strategies resolving surrogate ids to backing connections.
pub mod resolver;

/// Endpoint adapter implementing the RPC transport contract.
pub mod endpoint;

/// Process-wide state and its builder.
pub mod manager;

mod codec;
mod forwarder;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use channel::ChannelEndpoint;
pub use config::{PortalConfig, Topology};
pub use connection::{
    BackingConnection, ConnectListener, ConnectionHost, DisconnectListener, ListenerId,
    LoopbackHost, MemoryConnection, MessageListener,
};
pub use endpoint::{
    EventKind, MessageEvent, MessageHandler, PortalEndpoint, RpcEndpoint, Subscription,
};
pub use error::{PortalError, PortalResult};
pub use manager::{PortalManager, PortalManagerBuilder};
pub use payload::{BinaryBuffer, ElementView, Payload};
pub use registry::ConnectionRegistry;
pub use resolver::{ConnectResolver, HubResolver, PortResolver};
pub use store::{ByteStore, MemoryByteStore, StoreHandle};
pub use surrogate::{SurrogateId, SurrogateIdMinter, DEFAULT_NAMESPACE_PREFIX, MARKER_KEY};
