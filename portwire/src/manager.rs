//! Per-process owner of the port virtualization state.

use std::cell::Cell;
use std::rc::Rc;

use serde_json::Value;

use crate::codec;
use crate::config::{PortalConfig, Topology};
use crate::connection::{BackingConnection, ConnectionHost, ListenerId};
use crate::endpoint::PortalEndpoint;
use crate::error::{PortalError, PortalResult};
use crate::payload::Payload;
use crate::registry::ConnectionRegistry;
use crate::resolver::{ConnectResolver, HubResolver, PortResolver};
use crate::store::ByteStore;
use crate::surrogate::{SurrogateId, SurrogateIdMinter};

/// Handle to the process-wide state shared by every endpoint adapter.
///
/// Owns the connection registry, the surrogate id minter and the resolution
/// strategy. Build one per process with [`PortalManager::builder`] and clone
/// the handle wherever it is needed.
///
/// # Example
///
/// ```rust,ignore
/// let manager = PortalManager::builder()
///     .host(host)
///     .store(Rc::new(MemoryByteStore::new()))
///     .topology(Topology::HubBrokered)
///     .build()?;
/// manager.init();
///
/// let endpoint = manager.connect("main")?;
/// endpoint.post_message(Payload::object([("port", port)]))?;
/// ```
#[derive(Clone)]
pub struct PortalManager {
    inner: Rc<ManagerInner>,
}

struct ManagerInner {
    config: PortalConfig,
    topology: Topology,
    host: Rc<dyn ConnectionHost>,
    store: Rc<dyn ByteStore>,
    resolver: Rc<dyn PortResolver>,
    registry: Rc<ConnectionRegistry>,
    minter: SurrogateIdMinter,
    accept_listener: Cell<Option<ListenerId>>,
    active_pairings: Cell<usize>,
}

impl PortalManager {
    /// Start building a manager.
    pub fn builder() -> PortalManagerBuilder {
        PortalManagerBuilder::new()
    }

    /// Start accepting inbound virtual port connections.
    ///
    /// Only the hub-brokered topology listens; otherwise this does nothing.
    /// Calling it again is a no-op.
    pub fn init(&self) {
        if self.inner.topology != Topology::HubBrokered
            || self.inner.accept_listener.get().is_some()
        {
            return;
        }

        let registry = self.inner.registry.clone();
        let id = self
            .inner
            .host
            .on_connect(Rc::new(move |connection: Rc<dyn BackingConnection>| {
                registry.accept(connection);
            }));
        self.inner.accept_listener.set(Some(id));
        tracing::debug!(prefix = self.inner.minter.prefix(), "portal manager accepting");
    }

    /// Stop accepting and abandon every queued resolution.
    ///
    /// Established pairings keep running. Calling it again is a no-op.
    pub fn shutdown(&self) {
        if let Some(id) = self.inner.accept_listener.take() {
            self.inner.host.remove_on_connect(id);
        }
        let abandoned = self.inner.registry.abandon_pending();
        if abandoned > 0 {
            tracing::debug!(abandoned, "abandoned pending resolutions");
        }
    }

    /// Whether [`init`](Self::init) is currently subscribed to the host.
    pub fn is_accepting(&self) -> bool {
        self.inner.accept_listener.get().is_some()
    }

    /// Wrap a backing connection in an endpoint adapter.
    pub fn endpoint(&self, connection: Rc<dyn BackingConnection>) -> PortalEndpoint {
        PortalEndpoint::new(self.clone(), connection)
    }

    /// Open a named connection through the host and wrap it.
    pub fn connect(&self, name: &str) -> PortalResult<PortalEndpoint> {
        let connection = self.inner.host.connect(name)?;
        Ok(self.endpoint(connection))
    }

    /// Replace every transferable in `payload` with a surrogate marker.
    ///
    /// Each endpoint gets a shadow pairing on a local task, so this must be
    /// called from within a `tokio::task::LocalSet` when `payload` carries
    /// endpoints.
    pub fn serialize(&self, payload: Payload) -> PortalResult<Value> {
        codec::serialize(self, payload)
    }

    /// Reconstruct a payload from plain data, resolving every marker.
    pub async fn deserialize(&self, value: Value) -> PortalResult<Payload> {
        codec::deserialize(self, value).await
    }

    /// Mint a fresh surrogate id.
    pub fn mint_id(&self) -> SurrogateId {
        let id = self.inner.minter.mint();
        tracing::trace!(surrogate = %id, "minted surrogate id");
        id
    }

    /// Active configuration.
    pub fn config(&self) -> &PortalConfig {
        &self.inner.config
    }

    /// Resolution topology.
    pub fn topology(&self) -> Topology {
        self.inner.topology
    }

    /// Connection host.
    pub fn host(&self) -> &Rc<dyn ConnectionHost> {
        &self.inner.host
    }

    /// External byte store.
    pub fn store(&self) -> &Rc<dyn ByteStore> {
        &self.inner.store
    }

    /// Resolution strategy.
    pub fn resolver(&self) -> &Rc<dyn PortResolver> {
        &self.inner.resolver
    }

    /// Registry of accepted connections.
    pub fn registry(&self) -> &Rc<ConnectionRegistry> {
        &self.inner.registry
    }

    /// Number of shadow pairings currently relaying.
    pub fn active_pairings(&self) -> usize {
        self.inner.active_pairings.get()
    }

    pub(crate) fn pairing_started(&self) {
        let active = &self.inner.active_pairings;
        active.set(active.get() + 1);
    }

    pub(crate) fn pairing_stopped(&self) {
        let active = &self.inner.active_pairings;
        active.set(active.get().saturating_sub(1));
    }
}

/// Builder for [`PortalManager`].
#[derive(Default)]
pub struct PortalManagerBuilder {
    host: Option<Rc<dyn ConnectionHost>>,
    store: Option<Rc<dyn ByteStore>>,
    topology: Topology,
    resolver: Option<Rc<dyn PortResolver>>,
    config: PortalConfig,
}

impl PortalManagerBuilder {
    /// Create a builder with default topology and configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection host (required).
    pub fn host(mut self, host: Rc<dyn ConnectionHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// Set the external byte store (required).
    pub fn store(mut self, store: Rc<dyn ByteStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Select the built-in resolution strategy.
    pub fn topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Use a custom resolution strategy instead of the topology's.
    ///
    /// The topology still decides whether [`PortalManager::init`] accepts
    /// inbound connections into the registry.
    pub fn resolver(mut self, resolver: Rc<dyn PortResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Set limits and naming.
    pub fn config(mut self, config: PortalConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the manager.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::InvalidConfiguration`] if the host or store is
    /// missing, the namespace prefix is empty, or `max_depth` is zero.
    pub fn build(self) -> PortalResult<PortalManager> {
        let host = self
            .host
            .ok_or_else(|| PortalError::InvalidConfiguration("host is required".to_string()))?;
        let store = self
            .store
            .ok_or_else(|| PortalError::InvalidConfiguration("store is required".to_string()))?;

        if self.config.namespace_prefix.is_empty() {
            return Err(PortalError::InvalidConfiguration(
                "namespace_prefix must not be empty".to_string(),
            ));
        }
        if self.config.max_depth == 0 {
            return Err(PortalError::InvalidConfiguration(
                "max_depth must be at least 1".to_string(),
            ));
        }

        let registry = Rc::new(ConnectionRegistry::new(
            self.config.namespace_prefix.clone(),
        ));
        let resolver: Rc<dyn PortResolver> = match (self.resolver, self.topology) {
            (Some(resolver), _) => resolver,
            (None, Topology::PeerInitiated) => Rc::new(ConnectResolver::new(host.clone())),
            (None, Topology::HubBrokered) => Rc::new(HubResolver::new(registry.clone())),
        };

        tracing::debug!(
            topology = ?self.topology,
            prefix = %self.config.namespace_prefix,
            max_depth = self.config.max_depth,
            "portal manager created"
        );

        Ok(PortalManager {
            inner: Rc::new(ManagerInner {
                minter: SurrogateIdMinter::new(self.config.namespace_prefix.clone()),
                config: self.config,
                topology: self.topology,
                host,
                store,
                resolver,
                registry,
                accept_listener: Cell::new(None),
                active_pairings: Cell::new(0),
            }),
        })
    }
}
