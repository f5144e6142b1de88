//! ConnectionRegistry: name → accepted backing connection (hub topology).
//!
//! The hub accepts inbound connections named by surrogate id and hands them
//! to whichever shadow pairing is waiting on that name. A pairing that asks
//! before the connection arrives is queued until it does.
//!
//! # Semantics
//!
//! - Broadcast: one accepted connection satisfies *every* waiter queued for
//!   its name, and stays registered for later lookups until forgotten.
//! - Inbound connections outside the namespace prefix are ignored and left
//!   for other consumers of the host.
//! - There is no timeout. A waiter whose connection never arrives stays
//!   queued until [`ConnectionRegistry::abandon_pending`] drops it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tokio::sync::oneshot;

use crate::connection::BackingConnection;
use crate::error::{PortalError, PortalResult};
use crate::surrogate::is_virtual_port_name;

type Waiter = oneshot::Sender<Rc<dyn BackingConnection>>;

/// Table of accepted virtual port connections and queued resolutions.
pub struct ConnectionRegistry {
    prefix: String,
    connections: RefCell<HashMap<String, Rc<dyn BackingConnection>>>,
    pending: RefCell<HashMap<String, Vec<Waiter>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry accepting names with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            connections: RefCell::new(HashMap::new()),
            pending: RefCell::new(HashMap::new()),
        }
    }

    /// Handle a new inbound connection.
    ///
    /// Returns `false` if the name lacks the namespace prefix; such
    /// connections are not stored or touched.
    pub fn accept(&self, connection: Rc<dyn BackingConnection>) -> bool {
        let name = connection.name().to_string();
        if !is_virtual_port_name(&name, &self.prefix) {
            tracing::trace!(connection = %name, "ignoring non-virtual connection");
            return false;
        }

        self.connections
            .borrow_mut()
            .insert(name.clone(), connection.clone());
        let waiters = self.pending.borrow_mut().remove(&name).unwrap_or_default();

        tracing::debug!(
            connection = %name,
            waiters = waiters.len(),
            "accepted virtual port connection"
        );

        for waiter in waiters {
            // The waiting pairing may have been dropped meanwhile.
            let _ = waiter.send(connection.clone());
        }
        true
    }

    /// Resolve a connection by name, waiting for it to be accepted if needed.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::ResolutionAbandoned`] if the wait is abandoned.
    pub async fn resolve(&self, name: &str) -> PortalResult<Rc<dyn BackingConnection>> {
        if let Some(connection) = self.get(name) {
            return Ok(connection);
        }

        let (tx, rx) = oneshot::channel();
        self.pending
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .push(tx);
        tracing::trace!(connection = name, "queued resolution");

        rx.await.map_err(|_| PortalError::ResolutionAbandoned {
            name: name.to_string(),
        })
    }

    /// Look up an accepted connection without waiting.
    pub fn get(&self, name: &str) -> Option<Rc<dyn BackingConnection>> {
        self.connections.borrow().get(name).cloned()
    }

    /// Drop an accepted connection from the table.
    pub fn forget(&self, name: &str) -> Option<Rc<dyn BackingConnection>> {
        self.connections.borrow_mut().remove(name)
    }

    /// Drop every queued waiter; each fails with `ResolutionAbandoned`.
    ///
    /// Returns how many waiters were dropped.
    pub fn abandon_pending(&self) -> usize {
        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        pending.values().map(Vec::len).sum()
    }

    /// Number of accepted connections still registered.
    pub fn connection_count(&self) -> usize {
        self.connections.borrow().len()
    }

    /// Number of waiters queued across all names.
    pub fn pending_count(&self) -> usize {
        self.pending.borrow().values().map(Vec::len).sum()
    }
}
