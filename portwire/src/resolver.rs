//! Resolution strategies: surrogate id → backing connection.
//!
//! [`ConnectResolver`] opens the connection itself (peer-initiated);
//! [`HubResolver`] waits for the peer to open it and picks it up from the
//! [`ConnectionRegistry`] (hub-brokered). The strategy is chosen when the
//! manager is built; custom strategies implement [`PortResolver`].

use std::rc::Rc;

use async_trait::async_trait;

use crate::connection::{BackingConnection, ConnectionHost};
use crate::error::PortalResult;
use crate::registry::ConnectionRegistry;
use crate::surrogate::SurrogateId;

/// Strategy resolving the backing connection for a surrogate id.
#[async_trait(?Send)]
pub trait PortResolver {
    /// Resolve the connection named by `id`.
    async fn resolve(&self, id: &SurrogateId) -> PortalResult<Rc<dyn BackingConnection>>;
}

/// Peer-initiated: open the connection directly by name.
pub struct ConnectResolver {
    host: Rc<dyn ConnectionHost>,
}

impl ConnectResolver {
    /// Create a resolver opening connections through `host`.
    pub fn new(host: Rc<dyn ConnectionHost>) -> Self {
        Self { host }
    }
}

#[async_trait(?Send)]
impl PortResolver for ConnectResolver {
    async fn resolve(&self, id: &SurrogateId) -> PortalResult<Rc<dyn BackingConnection>> {
        self.host.connect(id.as_str())
    }
}

/// Hub-brokered: wait for the peer's inbound connection in the registry.
pub struct HubResolver {
    registry: Rc<ConnectionRegistry>,
}

impl HubResolver {
    /// Create a resolver backed by `registry`.
    pub fn new(registry: Rc<ConnectionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait(?Send)]
impl PortResolver for HubResolver {
    async fn resolve(&self, id: &SurrogateId) -> PortalResult<Rc<dyn BackingConnection>> {
        self.registry.resolve(id.as_str()).await
    }
}
