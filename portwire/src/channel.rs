//! In-process paired message channels.
//!
//! A [`ChannelEndpoint`] is one half of an entangled pair: whatever is posted
//! on one half is received on the other. Halves are the live values the
//! serializer replaces with port markers.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::payload::Payload;
use crate::queue::{MessageQueue, RecvFuture};

static NEXT_ENDPOINT_ID: AtomicU64 = AtomicU64::new(1);

/// One half of an in-process bidirectional channel.
///
/// Cloning yields another handle to the *same* half. When every handle to a
/// half is dropped, the pair is closed.
#[derive(Clone)]
pub struct ChannelEndpoint {
    inner: Rc<EndpointHalf>,
}

struct EndpointHalf {
    id: u64,
    inbox: Rc<MessageQueue<Payload>>,
    peer_inbox: Rc<MessageQueue<Payload>>,
}

impl Drop for EndpointHalf {
    fn drop(&mut self) {
        self.inbox.close();
        self.peer_inbox.close();
    }
}

impl ChannelEndpoint {
    /// Create a new entangled pair of halves.
    pub fn pair() -> (ChannelEndpoint, ChannelEndpoint) {
        let first = Rc::new(MessageQueue::new());
        let second = Rc::new(MessageQueue::new());
        (
            ChannelEndpoint::half(first.clone(), second.clone()),
            ChannelEndpoint::half(second, first),
        )
    }

    fn half(inbox: Rc<MessageQueue<Payload>>, peer_inbox: Rc<MessageQueue<Payload>>) -> Self {
        Self {
            inner: Rc::new(EndpointHalf {
                id: NEXT_ENDPOINT_ID.fetch_add(1, Ordering::Relaxed),
                inbox,
                peer_inbox,
            }),
        }
    }

    /// Process-local identifier of this half, for logging.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Send a message to the other half.
    ///
    /// Returns `false` if the channel is closed and the message was dropped.
    pub fn post_message(&self, message: impl Into<Payload>) -> bool {
        self.inner.peer_inbox.push(message.into())
    }

    /// Wait for the next message posted on the other half.
    ///
    /// Returns `None` once the channel is closed and drained.
    pub fn recv(&self) -> RecvFuture<'_, Payload> {
        self.inner.inbox.recv()
    }

    /// Take the next message if one is already queued.
    pub fn try_recv(&self) -> Option<Payload> {
        self.inner.inbox.try_recv()
    }

    /// Close both directions of the channel.
    pub fn close(&self) {
        self.inner.inbox.close();
        self.inner.peer_inbox.close();
    }

    /// Whether the channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.inbox.is_closed()
    }

    /// Whether two handles refer to the same half.
    pub fn same_half(&self, other: &ChannelEndpoint) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for ChannelEndpoint {
    fn eq(&self, other: &Self) -> bool {
        self.same_half(other)
    }
}

impl fmt::Debug for ChannelEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelEndpoint")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
