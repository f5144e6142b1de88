//! Endpoint adapter: the RPC transport contract over one backing connection.
//!
//! Outbound payloads are serialized and posted directly. Inbound plain data
//! is fed by a single backing listener into a FIFO queue; one pump task
//! deserializes each payload in arrival order and dispatches it only once it
//! is fully reconstructed. A peer disconnect travels through the same queue,
//! so disconnect handlers run after every payload that preceded it.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tokio::sync::Notify;

use crate::channel::ChannelEndpoint;
use crate::codec;
use crate::connection::{BackingConnection, DisconnectListener, ListenerId, ListenerTable};
use crate::error::{PortalError, PortalResult};
use crate::manager::PortalManager;
use crate::payload::Payload;
use crate::queue::MessageQueue;

static NEXT_ADAPTER_ID: AtomicU64 = AtomicU64::new(1);

/// Kind of event a handler subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// An inbound, fully deserialized message.
    Message,
}

/// A delivered inbound message.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    /// The reconstructed payload.
    pub data: Payload,
    /// Every live endpoint found in `data`, depth-first.
    pub ports: Vec<ChannelEndpoint>,
}

impl MessageEvent {
    /// Wrap a payload, collecting the endpoints it carries.
    pub fn new(data: Payload) -> Self {
        let ports = data.ports();
        Self { data, ports }
    }
}

/// Handler invoked for each inbound message.
pub type MessageHandler = Rc<dyn Fn(&MessageEvent)>;

/// Registration handle returned by [`RpcEndpoint::add_event_listener`].
///
/// Consumed by [`RpcEndpoint::remove_event_listener`]; a subscription from a
/// different endpoint is never matched.
#[derive(Debug, PartialEq, Eq)]
pub struct Subscription {
    adapter: u64,
    id: ListenerId,
}

/// Bidirectional transport contract expected by the RPC layer.
pub trait RpcEndpoint {
    /// Serialize `message` and send it to the peer.
    fn post_message(&self, message: Payload) -> PortalResult<()>;

    /// Register `handler` for future inbound events of `kind`.
    fn add_event_listener(&self, kind: EventKind, handler: MessageHandler) -> Subscription;

    /// Detach a handler. Returns `false` if the subscription is unknown.
    fn remove_event_listener(&self, kind: EventKind, subscription: Subscription) -> bool;
}

/// [`RpcEndpoint`] implementation wrapping one backing connection.
///
/// Cheap to clone; clones share handlers and the inbound queue. Inbound
/// dispatch runs on a local task, so handlers must be added from within a
/// `tokio::task::LocalSet`.
///
/// While no message handler is registered, inbound payloads are held, both
/// those still on the connection and any already taken off it.
#[derive(Clone)]
pub struct PortalEndpoint {
    inner: Rc<AdapterInner>,
}

enum Inbound {
    Message(Value),
    Disconnected,
}

struct AdapterInner {
    id: u64,
    connection: Rc<dyn BackingConnection>,
    manager: PortalManager,
    handlers: ListenerTable<MessageHandler>,
    disconnect_handlers: ListenerTable<DisconnectListener>,
    inbound: Rc<MessageQueue<Inbound>>,
    resume: Rc<Notify>,
    backing_listener: Cell<Option<ListenerId>>,
    backing_disconnect: Cell<Option<ListenerId>>,
    pump_started: Cell<bool>,
}

impl AdapterInner {
    fn attach(&self) {
        if self.backing_listener.get().is_some() {
            return;
        }
        let queue = self.inbound.clone();
        let id = self.connection.add_listener(Rc::new(move |value: Value| {
            if !queue.push(Inbound::Message(value)) {
                tracing::trace!("adapter closed, inbound message dropped");
            }
        }));
        self.backing_listener.set(Some(id));
    }

    fn attach_disconnect(&self) {
        if self.backing_disconnect.get().is_some() {
            return;
        }
        let queue = self.inbound.clone();
        let id = self.connection.on_disconnect(Rc::new(move || {
            queue.push(Inbound::Disconnected);
        }));
        self.backing_disconnect.set(Some(id));
    }

    fn detach(&self) {
        if let Some(id) = self.backing_listener.take() {
            self.connection.remove_listener(id);
        }
    }
}

impl Drop for AdapterInner {
    fn drop(&mut self) {
        self.detach();
        if let Some(id) = self.backing_disconnect.take() {
            self.connection.remove_disconnect_listener(id);
        }
        self.inbound.close();
        self.resume.notify_one();
    }
}

impl PortalEndpoint {
    pub(crate) fn new(manager: PortalManager, connection: Rc<dyn BackingConnection>) -> Self {
        Self {
            inner: Rc::new(AdapterInner {
                id: NEXT_ADAPTER_ID.fetch_add(1, Ordering::Relaxed),
                connection,
                manager,
                handlers: ListenerTable::new(),
                disconnect_handlers: ListenerTable::new(),
                inbound: Rc::new(MessageQueue::new()),
                resume: Rc::new(Notify::new()),
                backing_listener: Cell::new(None),
                backing_disconnect: Cell::new(None),
                pump_started: Cell::new(false),
            }),
        }
    }

    /// The wrapped backing connection.
    pub fn connection(&self) -> &Rc<dyn BackingConnection> {
        &self.inner.connection
    }

    /// Number of registered message handlers.
    pub fn handler_count(&self) -> usize {
        self.inner.handlers.len()
    }

    /// Register `handler` to run once the peer disconnects.
    ///
    /// Runs on the pump, after every payload received before the disconnect
    /// has been dispatched.
    pub fn on_disconnect(&self, handler: DisconnectListener) -> ListenerId {
        let id = self.inner.disconnect_handlers.add(handler);
        self.inner.attach_disconnect();
        self.start_pump();
        id
    }

    /// Remove a disconnect handler. Returns `false` if it was not registered.
    pub fn remove_disconnect_listener(&self, id: ListenerId) -> bool {
        self.inner.disconnect_handlers.remove(id)
    }

    /// Stop receiving and disconnect the backing connection.
    ///
    /// Payloads still queued are dispatched before the pump exits.
    pub fn close(&self) {
        self.inner.detach();
        self.inner.inbound.close();
        self.inner.connection.disconnect();
    }

    fn start_pump(&self) {
        if self.inner.pump_started.replace(true) {
            return;
        }
        let adapter = Rc::downgrade(&self.inner);
        let inbound = self.inner.inbound.clone();
        let resume = self.inner.resume.clone();
        tokio::task::spawn_local(pump(adapter, inbound, resume));
    }
}

async fn pump(adapter: Weak<AdapterInner>, inbound: Rc<MessageQueue<Inbound>>, resume: Rc<Notify>) {
    while let Some(item) = inbound.recv().await {
        let value = match item {
            Inbound::Message(value) => value,
            Inbound::Disconnected => {
                let Some(inner) = adapter.upgrade() else {
                    break;
                };
                tracing::trace!(connection = inner.connection.name(), "peer disconnected");
                for handler in inner.disconnect_handlers.snapshot() {
                    handler();
                }
                continue;
            }
        };

        let Some(manager) = adapter.upgrade().map(|inner| inner.manager.clone()) else {
            break;
        };
        let payload = match codec::deserialize(&manager, value).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "dropping inbound payload that failed to deserialize");
                continue;
            }
        };
        let event = MessageEvent::new(payload);

        loop {
            let Some(inner) = adapter.upgrade() else {
                return;
            };
            let handlers = inner.handlers.snapshot();
            if !handlers.is_empty() {
                tracing::trace!(
                    connection = inner.connection.name(),
                    ports = event.ports.len(),
                    "dispatching inbound message"
                );
                for handler in handlers {
                    handler(&event);
                }
                break;
            }
            drop(inner);
            resume.notified().await;
        }
    }
    tracing::trace!("adapter pump stopped");
}

impl RpcEndpoint for PortalEndpoint {
    fn post_message(&self, message: Payload) -> PortalResult<()> {
        let connection = &self.inner.connection;
        if !connection.is_connected() {
            return Err(PortalError::ConnectionClosed {
                name: connection.name().to_string(),
            });
        }
        let value = codec::serialize(&self.inner.manager, message)?;
        connection.post_message(value)
    }

    fn add_event_listener(&self, kind: EventKind, handler: MessageHandler) -> Subscription {
        match kind {
            EventKind::Message => {
                let id = self.inner.handlers.add(handler);
                self.inner.attach();
                self.start_pump();
                self.inner.resume.notify_one();
                Subscription {
                    adapter: self.inner.id,
                    id,
                }
            }
        }
    }

    fn remove_event_listener(&self, kind: EventKind, subscription: Subscription) -> bool {
        if subscription.adapter != self.inner.id {
            return false;
        }
        match kind {
            EventKind::Message => {
                let removed = self.inner.handlers.remove(subscription.id);
                if self.inner.handlers.is_empty() {
                    self.inner.detach();
                }
                removed
            }
        }
    }
}

impl fmt::Debug for PortalEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalEndpoint")
            .field("connection", &self.inner.connection.name())
            .field("handlers", &self.inner.handlers.len())
            .finish()
    }
}
