//! Backing connections: named, plain-data channels to a peer process.
//!
//! These traits are the contract the rest of the crate consumes. Establishing
//! real connections is the host's business; [`LoopbackHost`] provides an
//! in-memory pair of hosts for tests and single-process wiring.

mod memory;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::Value;

use crate::error::PortalResult;

pub use memory::{LoopbackHost, MemoryConnection};

/// Callback invoked with each inbound plain-data message.
pub type MessageListener = Rc<dyn Fn(Value)>;

/// Callback invoked once the peer disconnects.
pub type DisconnectListener = Rc<dyn Fn()>;

/// Callback invoked with each new inbound connection.
pub type ConnectListener = Rc<dyn Fn(Rc<dyn BackingConnection>)>;

/// Handle returned when registering a listener; consumed to remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Named, connection-oriented channel carrying only plain data.
pub trait BackingConnection {
    /// Connection name. Virtual port connections are named by surrogate id.
    fn name(&self) -> &str;

    /// Send a plain-data message to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PortalError::ConnectionClosed`] once disconnected.
    fn post_message(&self, message: Value) -> PortalResult<()>;

    /// Register a listener for inbound messages.
    fn add_listener(&self, listener: MessageListener) -> ListenerId;

    /// Remove a message listener. Returns `false` if it was not registered.
    fn remove_listener(&self, id: ListenerId) -> bool;

    /// Register a listener fired when the peer disconnects.
    ///
    /// A disconnect that happened before any listener was registered is
    /// still reported, after messages received ahead of it.
    fn on_disconnect(&self, listener: DisconnectListener) -> ListenerId;

    /// Remove a disconnect listener. Returns `false` if it was not registered.
    fn remove_disconnect_listener(&self, id: ListenerId) -> bool;

    /// Close the connection. The peer observes a disconnect.
    fn disconnect(&self);

    /// Whether messages can still be posted.
    fn is_connected(&self) -> bool;
}

/// Process-level access to backing connections.
pub trait ConnectionHost {
    /// Open a connection with the given name to the peer process.
    fn connect(&self, name: &str) -> PortalResult<Rc<dyn BackingConnection>>;

    /// Subscribe to inbound connections opened by the peer process.
    fn on_connect(&self, listener: ConnectListener) -> ListenerId;

    /// Unsubscribe from inbound connections.
    fn remove_on_connect(&self, id: ListenerId) -> bool;
}

/// Ordered listener list keyed by [`ListenerId`].
///
/// Callers take a [`snapshot`](ListenerTable::snapshot) before invoking
/// listeners so a listener may add or remove listeners while running.
pub struct ListenerTable<L> {
    entries: RefCell<Vec<(ListenerId, L)>>,
    next_id: Cell<u64>,
}

impl<L> Default for ListenerTable<L> {
    fn default() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }
}

impl<L: Clone> ListenerTable<L> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener.
    pub fn add(&self, listener: L) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.entries.borrow_mut().push((id, listener));
        id
    }

    /// Remove a listener. Returns `false` if unknown.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Current listeners, in registration order.
    pub fn snapshot(&self) -> Vec<L> {
        self.entries
            .borrow()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect()
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Remove every listener.
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}
