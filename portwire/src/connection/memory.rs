//! In-memory backing connections between two loopback hosts.
//!
//! Delivery is asynchronous: posting enqueues on the peer half and a local
//! task flushes the queue to listeners. Messages that arrive before any
//! listener is attached are held and flushed, in order, once one is. A
//! disconnect is held the same way until a disconnect listener exists.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use serde_json::Value;

use super::{
    BackingConnection, ConnectListener, ConnectionHost, DisconnectListener, ListenerId,
    ListenerTable, MessageListener,
};
use crate::error::{PortalError, PortalResult};

enum Delivery {
    Message(Value),
    Disconnect,
}

#[derive(Default)]
struct HalfState {
    listeners: ListenerTable<MessageListener>,
    disconnect_listeners: ListenerTable<DisconnectListener>,
    backlog: RefCell<VecDeque<Delivery>>,
    flush_scheduled: Cell<bool>,
}

impl HalfState {
    fn deliver(self: &Rc<Self>, delivery: Delivery) {
        self.backlog.borrow_mut().push_back(delivery);
        self.schedule_flush();
    }

    fn has_deliverable(&self) -> bool {
        match self.backlog.borrow().front() {
            None => false,
            Some(Delivery::Message(_)) => !self.listeners.is_empty(),
            Some(Delivery::Disconnect) => !self.disconnect_listeners.is_empty(),
        }
    }

    fn schedule_flush(self: &Rc<Self>) {
        if self.flush_scheduled.get() || !self.has_deliverable() {
            return;
        }
        self.flush_scheduled.set(true);

        let half = Rc::clone(self);
        tokio::task::spawn_local(async move {
            half.flush();
        });
    }

    fn flush(&self) {
        while self.has_deliverable() {
            let Some(delivery) = self.backlog.borrow_mut().pop_front() else {
                break;
            };
            match delivery {
                Delivery::Message(value) => {
                    for listener in self.listeners.snapshot() {
                        listener(value.clone());
                    }
                }
                Delivery::Disconnect => {
                    for listener in self.disconnect_listeners.snapshot() {
                        listener();
                    }
                }
            }
        }
        self.flush_scheduled.set(false);
    }
}

struct Link {
    name: String,
    connected: Cell<bool>,
    halves: [Rc<HalfState>; 2],
}

/// One end of an in-memory backing connection.
pub struct MemoryConnection {
    link: Rc<Link>,
    side: usize,
}

impl MemoryConnection {
    /// Create both ends of a connection with the given name.
    pub fn pair(name: impl Into<String>) -> (MemoryConnection, MemoryConnection) {
        let link = Rc::new(Link {
            name: name.into(),
            connected: Cell::new(true),
            halves: [Rc::new(HalfState::default()), Rc::new(HalfState::default())],
        });
        (
            MemoryConnection {
                link: link.clone(),
                side: 0,
            },
            MemoryConnection { link, side: 1 },
        )
    }

    fn own(&self) -> &Rc<HalfState> {
        &self.link.halves[self.side]
    }

    fn peer(&self) -> &Rc<HalfState> {
        &self.link.halves[1 - self.side]
    }
}

impl BackingConnection for MemoryConnection {
    fn name(&self) -> &str {
        &self.link.name
    }

    fn post_message(&self, message: Value) -> PortalResult<()> {
        if !self.link.connected.get() {
            return Err(PortalError::ConnectionClosed {
                name: self.link.name.clone(),
            });
        }
        self.peer().deliver(Delivery::Message(message));
        Ok(())
    }

    fn add_listener(&self, listener: MessageListener) -> ListenerId {
        let id = self.own().listeners.add(listener);
        self.own().schedule_flush();
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.own().listeners.remove(id)
    }

    fn on_disconnect(&self, listener: DisconnectListener) -> ListenerId {
        let id = self.own().disconnect_listeners.add(listener);
        self.own().schedule_flush();
        id
    }

    fn remove_disconnect_listener(&self, id: ListenerId) -> bool {
        self.own().disconnect_listeners.remove(id)
    }

    fn disconnect(&self) {
        if !self.link.connected.replace(false) {
            return;
        }
        tracing::trace!(connection = %self.link.name, "memory connection disconnected");
        self.peer().deliver(Delivery::Disconnect);
    }

    fn is_connected(&self) -> bool {
        self.link.connected.get()
    }
}

struct HostLink {
    connect_listeners: [ListenerTable<ConnectListener>; 2],
}

/// One of two in-memory hosts standing in for two processes.
///
/// `connect` on one host announces the other end to the peer host's
/// `on_connect` listeners. With no listener on the peer, the connection is
/// returned already disconnected.
#[derive(Clone)]
pub struct LoopbackHost {
    link: Rc<HostLink>,
    side: usize,
}

impl LoopbackHost {
    /// Create two hosts connected to each other.
    pub fn pair() -> (LoopbackHost, LoopbackHost) {
        let link = Rc::new(HostLink {
            connect_listeners: [ListenerTable::new(), ListenerTable::new()],
        });
        (
            LoopbackHost {
                link: link.clone(),
                side: 0,
            },
            LoopbackHost { link, side: 1 },
        )
    }
}

impl ConnectionHost for LoopbackHost {
    fn connect(&self, name: &str) -> PortalResult<Rc<dyn BackingConnection>> {
        let (mine, theirs) = MemoryConnection::pair(name);
        let listeners = self.link.connect_listeners[1 - self.side].snapshot();

        if listeners.is_empty() {
            tracing::debug!(connection = name, "no peer listening, connection dropped");
            mine.link.connected.set(false);
        } else {
            let theirs: Rc<dyn BackingConnection> = Rc::new(theirs);
            for listener in listeners {
                listener(theirs.clone());
            }
        }

        Ok(Rc::new(mine))
    }

    fn on_connect(&self, listener: ConnectListener) -> ListenerId {
        self.link.connect_listeners[self.side].add(listener)
    }

    fn remove_on_connect(&self, id: ListenerId) -> bool {
        self.link.connect_listeners[self.side].remove(id)
    }
}
